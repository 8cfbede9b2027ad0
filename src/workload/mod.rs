//! Benchmark workload.
//!
//! # Data Flow
//! ```text
//! BenchmarkClient::run
//!     → one task per worker, files "<host>-<i>" split round-robin
//!     → per file: write → list → read → delete (optional)
//!     → every step through RetryCoordinator::run
//!     → ReportLine on stdout after each completed transfer
//! ```

pub mod report;
pub mod runner;

pub use report::{throughput_mb_s, ReportEvent, ReportLine};
pub use runner::{resolve_hostname, BenchmarkClient, RunSummary};
