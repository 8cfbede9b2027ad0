//! Configuration schema definitions.
//!
//! Every section carries `#[serde(default)]` so a config file only needs the
//! values it overrides. CLI arguments are applied on top of the file.

use serde::{Deserialize, Serialize};

/// Bytes in one storage block of generated test data (64 MiB).
pub const DEFAULT_BLOCK_SIZE: u64 = 64 * 1024 * 1024;

/// Root configuration for the benchmark client.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BenchConfig {
    /// How the primary endpoint is located.
    pub mode: LocatorMode,

    /// Storage backend and transfer settings.
    pub storage: StorageConfig,

    /// Coordination service settings (used in `ha` mode).
    pub coordination: CoordinationConfig,

    /// Retry and wait policy.
    pub retry: RetryConfig,

    /// Files, blocks and workers.
    pub workload: WorkloadConfig,

    /// Release of stale stream handles.
    pub cleanup: CleanupConfig,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,
}

/// Endpoint lookup mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LocatorMode {
    /// Fixed primary address.
    #[default]
    Static,
    /// Primary address published through the coordination service.
    Ha,
}

/// Storage implementation to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// WebHDFS REST API.
    #[default]
    Webhdfs,
    /// Process-local object map (smoke runs).
    Memory,
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,

    /// Primary address (e.g., "127.0.0.1:50070"). Fallback endpoint in `ha` mode.
    pub primary: String,

    /// URI scheme used when naming objects.
    pub scheme: String,

    /// Transfer buffer size in bytes.
    pub chunk_size: usize,

    /// Bytes transferred between two failover checks (1 = per byte).
    pub check_interval_bytes: usize,

    /// Size of one generated block in bytes.
    pub block_size: u64,

    /// Optional `user.name` passed to WebHDFS.
    pub user: Option<String>,

    /// HTTP request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Webhdfs,
            primary: "127.0.0.1:50070".to_string(),
            scheme: "hdfs".to_string(),
            chunk_size: 4096,
            check_interval_bytes: 4096,
            block_size: DEFAULT_BLOCK_SIZE,
            user: None,
            request_timeout_secs: 60,
        }
    }
}

/// Coordination service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CoordinationConfig {
    /// Connection string (directory for the file-backed coordinator).
    pub connect_string: String,

    /// Watched path holding the primary endpoint.
    pub path: String,

    /// Session timeout in seconds.
    pub session_timeout_secs: u64,

    /// Poll interval for filesystem notification fallbacks in milliseconds.
    pub poll_interval_ms: u64,

    /// Base delay for reconnect backoff in milliseconds.
    pub reconnect_base_ms: u64,

    /// Maximum delay for reconnect backoff in milliseconds.
    pub reconnect_max_ms: u64,

    /// How long startup waits for the first endpoint read, in seconds.
    pub ready_timeout_secs: u64,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            connect_string: String::new(),
            path: "/namenode".to_string(),
            session_timeout_secs: 180,
            poll_interval_ms: 2000,
            reconnect_base_ms: 500,
            reconnect_max_ms: 30_000,
            ready_timeout_secs: 30,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts per operation.
    pub max_attempts: u32,

    /// Wait after an operation aborted because the endpoint changed.
    pub failover_complete_wait_ms: u64,

    /// Random extra wait added to the failover-complete wait.
    pub failover_complete_jitter_ms: u64,

    /// Wait after an I/O error when a failover is already known.
    pub regular_error_wait_ms: u64,

    /// Upper bound on waiting for an unannounced failover, in seconds.
    pub failover_in_progress_wait_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            failover_complete_wait_ms: 2000,
            failover_complete_jitter_ms: 500,
            regular_error_wait_ms: 5000,
            failover_in_progress_wait_secs: 300,
        }
    }
}

/// Workload configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkloadConfig {
    /// Number of files each run creates.
    pub files: u32,

    /// Blocks written per file.
    pub blocks: u64,

    /// Delete each file after reading it back.
    pub delete_after_read: bool,

    /// Concurrent worker tasks.
    pub workers: usize,

    /// Host name used in file names and report lines.
    pub hostname: Option<String>,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            files: 1,
            blocks: 1,
            delete_after_read: true,
            workers: 1,
            hostname: None,
        }
    }
}

/// Cleanup configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CleanupConfig {
    /// Maximum concurrent background closers.
    pub max_background_closers: usize,

    /// Timeout for closing a single stream in milliseconds.
    pub close_timeout_ms: u64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            max_background_closers: 4,
            close_timeout_ms: 10_000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BenchConfig::default();
        assert_eq!(config.mode, LocatorMode::Static);
        assert_eq!(config.retry.max_attempts, 10);
        assert_eq!(config.storage.chunk_size, 4096);
        assert_eq!(config.coordination.path, "/namenode");
        assert!(config.workload.delete_after_read);
    }

    #[test]
    fn test_partial_toml() {
        let config: BenchConfig = toml::from_str(
            r#"
            mode = "ha"

            [coordination]
            connect_string = "/tmp/coord"

            [retry]
            max_attempts = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.mode, LocatorMode::Ha);
        assert_eq!(config.coordination.connect_string, "/tmp/coord");
        assert_eq!(config.coordination.session_timeout_secs, 180);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.regular_error_wait_ms, 5000);
    }
}
