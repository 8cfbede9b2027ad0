//! Failover-aware storage benchmark client library

pub mod config;
pub mod coordination;
pub mod error;
pub mod lifecycle;
pub mod locator;
pub mod observability;
pub mod resilience;
pub mod storage;
pub mod transfer;
pub mod workload;

pub use config::schema::BenchConfig;
pub use error::{ClientError, ClientResult, OperationError};
pub use lifecycle::Shutdown;
pub use locator::{Endpoint, EndpointLocator, FailoverState};
pub use resilience::retries::RetryCoordinator;
pub use transfer::operation::StreamedOperation;
pub use workload::runner::BenchmarkClient;
