//! Streamed transfer subsystem.
//!
//! # Data Flow
//! ```text
//! write: DeadBeefSource → chunk → slice per check interval → ByteSink
//! read:  ByteSource → chunk → slice per check interval → NullSink
//!                            ↳ FailoverState::generation() after every slice
//! abort: stale stream → CloseQueue (background, bounded) → close/abort
//! ```
//!
//! # Design Decisions
//! - One Operation per attempt; nothing is reused across attempts
//! - The sink close is the commit and always runs inline

pub mod cleanup;
pub mod operation;

pub use cleanup::{CloseQueue, Release};
pub use operation::{Direction, Operation, StreamedOperation, TransferSettings, TransferStats};
