//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Locator, retry loop, transfers, workload:
//!     → logging.rs (tracing events on stderr, `event` field carries the marker)
//!     → metrics.rs (counters and gauges, optional Prometheus scrape endpoint)
//!
//! Benchmark report lines:
//!     → stdout (workload/report.rs), never through the log pipeline
//! ```
//!
//! # Design Decisions
//! - Metric updates are no-ops until a recorder is installed
//! - Log level comes from config, `RUST_LOG` wins when set

pub mod logging;
pub mod metrics;
