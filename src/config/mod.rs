//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → CLI overrides (mode, primary, coordination, files, blocks, delete)
//!     → validation.rs (semantic checks)
//!     → BenchConfig (validated, immutable)
//!     → sections handed to the subsystems that own them
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Wait constants of the retry policy are configuration, not code

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::BenchConfig;
pub use schema::CleanupConfig;
pub use schema::CoordinationConfig;
pub use schema::LocatorMode;
pub use schema::ObservabilityConfig;
pub use schema::RetryConfig;
pub use schema::StorageBackend;
pub use schema::StorageConfig;
pub use schema::WorkloadConfig;
