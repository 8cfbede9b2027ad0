//! failover-bench
//!
//! Stress client for a storage service whose primary fails over.
//!
//! ```text
//!      coordination service                         storage service
//!   (directory of node files)                 (primary + standby, WebHDFS)
//!              │                                          ▲
//!              ▼                                          │
//!  ┌───────────────────────┐   generation    ┌────────────┴──────────┐
//!  │    EndpointLocator    │───────────────▶│   StreamedOperation   │
//!  │  watch loop (1 task)  │  FailoverState  │ chunk + hot check     │
//!  └───────────────────────┘        │        └────────────▲──────────┘
//!                                   │                     │
//!                                   ▼                     │
//!                        ┌─────────────────────┐          │
//!                        │  RetryCoordinator   │──────────┘
//!                        │ classify, wait, cap │
//!                        └──────────▲──────────┘
//!                                   │
//!                        ┌──────────┴──────────┐
//!                        │   BenchmarkClient   │──▶ report lines (stdout)
//!                        │ write/list/read/del │
//!                        └─────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};

use failover_bench::config::loader::{read_config, ConfigError};
use failover_bench::config::validation::validate_config;
use failover_bench::config::{BenchConfig, LocatorMode};
use failover_bench::lifecycle::{signals, Runtime, Shutdown};
use failover_bench::observability::{logging, metrics};
use failover_bench::workload::{resolve_hostname, ReportLine};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    /// Fixed primary address
    Static,
    /// Primary published through the coordination service
    Ha,
}

#[derive(Parser, Debug)]
#[command(name = "failover-bench")]
#[command(about = "Failover-aware storage benchmark client", long_about = None)]
struct Cli {
    /// Endpoint lookup mode
    #[arg(value_enum, ignore_case = true)]
    mode: Mode,

    /// Primary address (host:port); fallback endpoint in ha mode
    primary: String,

    /// Coordination connect string (directory of node files)
    coordination: String,

    /// Number of files to write
    files: u32,

    /// Blocks per file
    blocks: u64,

    /// Pass "false" to keep files after reading them
    delete: Option<String>,

    /// TOML config file; positional arguments override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host name used in file names and report lines
    #[arg(long)]
    hostname: Option<String>,

    /// Concurrent workers
    #[arg(short, long)]
    workers: Option<usize>,
}

impl Cli {
    fn apply(self, config: &mut BenchConfig) {
        config.mode = match self.mode {
            Mode::Static => LocatorMode::Static,
            Mode::Ha => LocatorMode::Ha,
        };
        config.storage.primary = self.primary;
        config.coordination.connect_string = self.coordination;
        config.workload.files = self.files;
        config.workload.blocks = self.blocks;
        config.workload.delete_after_read = !matches!(self.delete.as_deref(), Some(d) if d.eq_ignore_ascii_case("false"));
        if let Some(hostname) = self.hostname {
            config.workload.hostname = Some(hostname);
        }
        if let Some(workers) = self.workers {
            config.workload.workers = workers;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // File names and report lines share the host name fixed here.
    let hostname = resolve_hostname(cli.hostname.as_deref());
    ReportLine::start(&hostname).emit();

    let mut config = match &cli.config {
        Some(path) => read_config(path)?,
        None => BenchConfig::default(),
    };
    cli.apply(&mut config);
    config.workload.hostname = Some(hostname.clone());
    validate_config(&config).map_err(ConfigError::Validation)?;

    logging::init_logging(&config.observability.log_level);

    tracing::info!(
        mode = ?config.mode,
        primary = %config.storage.primary,
        coordination = %config.coordination.connect_string,
        files = config.workload.files,
        blocks = config.workload.blocks,
        delete = config.workload.delete_after_read,
        "failover-bench v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let shutdown = Arc::new(Shutdown::new());
    let _signals = signals::spawn_signal_handler(shutdown.clone());

    let runtime = Runtime::start(&config, shutdown).await?;
    let summary = runtime.client.clone().run().await;
    runtime.stop().await;

    ReportLine::end(&hostname).emit();

    if summary.files_failed > 0 {
        tracing::warn!(failed = summary.files_failed, "Some files could not be processed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("failover-bench").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_positional_arguments() {
        let mut config = BenchConfig::default();
        parse(&["ha", "nn1:50070", "/tmp/coord", "3", "2"]).apply(&mut config);

        assert_eq!(config.mode, LocatorMode::Ha);
        assert_eq!(config.storage.primary, "nn1:50070");
        assert_eq!(config.coordination.connect_string, "/tmp/coord");
        assert_eq!(config.workload.files, 3);
        assert_eq!(config.workload.blocks, 2);
        assert!(config.workload.delete_after_read);
    }

    #[test]
    fn test_delete_flag() {
        let mut config = BenchConfig::default();
        parse(&["STATIC", "nn1:50070", "-", "1", "1", "FALSE"]).apply(&mut config);
        assert!(!config.workload.delete_after_read);
        assert_eq!(config.mode, LocatorMode::Static);

        parse(&["static", "nn1:50070", "-", "1", "1", "true"]).apply(&mut config);
        assert!(config.workload.delete_after_read);
    }

    #[test]
    fn test_missing_arguments_are_rejected() {
        let args = ["failover-bench", "static", "nn1:50070"];
        assert!(Cli::try_parse_from(args).is_err());
        assert!(Cli::try_parse_from(["failover-bench", "static", "nn1", "-", "many", "1"]).is_err());
    }

    #[test]
    fn test_overrides() {
        let mut config = BenchConfig::default();
        parse(&["static", "nn1:50070", "-", "1", "1", "--workers", "4", "--hostname", "bench-9"]).apply(&mut config);
        assert_eq!(config.workload.workers, 4);
        assert_eq!(config.workload.hostname.as_deref(), Some("bench-9"));
    }
}
