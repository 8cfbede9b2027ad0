//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validated config → locator → storage → close queue → transfer → retry → workload
//!
//! Shutdown (shutdown.rs):
//!     Trigger → waits abandoned → workers stop → locator stops → close queue drains
//!
//! Signals (signals.rs):
//!     SIGINT → trigger shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, endpoint next, workers last
//! - Ordered shutdown: workers, locator, then pending stream releases

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::Runtime;
