//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Benchmark step (create / list / read / delete):
//!     → retries.rs (bounded attempt loop, classify failure, pick a wait)
//!     → FailoverState::await_change when a failover is suspected
//!     → backoff.rs (jittered fixed waits, reconnect backoff for the watch loop)
//! ```
//!
//! # Design Decisions
//! - A failure caused by a known endpoint change retries quickly
//! - An I/O error with no failover seen blocks until one is announced
//! - The attempt budget is counted in attempts, not wall-clock time

pub mod backoff;
pub mod retries;
