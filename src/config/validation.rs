//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (sizes > 0, attempts > 0)
//! - Check the wait ordering the retry policy relies on
//! - Check mode-specific settings (`ha` needs a coordination target)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: BenchConfig → Result<(), Vec<ValidationError>>

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::{BenchConfig, LocatorMode};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self { field, message: message.into() }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a configuration, collecting every error.
pub fn validate_config(config: &BenchConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let storage = &config.storage;
    if storage.chunk_size == 0 {
        errors.push(ValidationError::new("storage.chunk_size", "must be greater than 0"));
    }
    if storage.check_interval_bytes == 0 || storage.check_interval_bytes > storage.chunk_size {
        errors.push(ValidationError::new(
            "storage.check_interval_bytes",
            "must be between 1 and storage.chunk_size",
        ));
    }
    if storage.block_size == 0 {
        errors.push(ValidationError::new("storage.block_size", "must be greater than 0"));
    }
    if storage.scheme.is_empty() {
        errors.push(ValidationError::new("storage.scheme", "must not be empty"));
    }
    if storage.request_timeout_secs == 0 {
        errors.push(ValidationError::new("storage.request_timeout_secs", "must be greater than 0"));
    }

    match config.mode {
        LocatorMode::Static => {
            if storage.primary.trim().is_empty() {
                errors.push(ValidationError::new("storage.primary", "required in static mode"));
            }
        }
        LocatorMode::Ha => {
            let coordination = &config.coordination;
            if coordination.connect_string.trim().is_empty() {
                errors.push(ValidationError::new(
                    "coordination.connect_string",
                    "required in ha mode",
                ));
            }
            if !coordination.path.starts_with('/') {
                errors.push(ValidationError::new("coordination.path", "must start with '/'"));
            }
            if coordination.session_timeout_secs == 0 {
                errors.push(ValidationError::new(
                    "coordination.session_timeout_secs",
                    "must be greater than 0",
                ));
            }
            if config.retry.failover_in_progress_wait_secs <= coordination.session_timeout_secs {
                errors.push(ValidationError::new(
                    "retry.failover_in_progress_wait_secs",
                    "must exceed coordination.session_timeout_secs",
                ));
            }
            if coordination.reconnect_base_ms > coordination.reconnect_max_ms {
                errors.push(ValidationError::new(
                    "coordination.reconnect_base_ms",
                    "must not exceed coordination.reconnect_max_ms",
                ));
            }
        }
    }

    let retry = &config.retry;
    if retry.max_attempts == 0 {
        errors.push(ValidationError::new("retry.max_attempts", "must be at least 1"));
    }
    if retry.failover_complete_wait_ms > retry.regular_error_wait_ms {
        errors.push(ValidationError::new(
            "retry.failover_complete_wait_ms",
            "must not exceed retry.regular_error_wait_ms",
        ));
    }
    if retry.failover_in_progress_wait_secs.saturating_mul(1000) < retry.regular_error_wait_ms {
        errors.push(ValidationError::new(
            "retry.failover_in_progress_wait_secs",
            "must not be shorter than retry.regular_error_wait_ms",
        ));
    }

    if config.workload.workers == 0 {
        errors.push(ValidationError::new("workload.workers", "must be at least 1"));
    }
    if config.cleanup.max_background_closers == 0 {
        errors.push(ValidationError::new("cleanup.max_background_closers", "must be at least 1"));
    }
    if config.cleanup.close_timeout_ms == 0 {
        errors.push(ValidationError::new("cleanup.close_timeout_ms", "must be greater than 0"));
    }

    let observability = &config.observability;
    if !LOG_LEVELS.contains(&observability.log_level.as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level '{}'", observability.log_level),
        ));
    }
    if observability.metrics_enabled && observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("invalid socket address '{}'", observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(validate_config(&BenchConfig::default()).is_ok());
    }

    #[test]
    fn test_ha_requires_connect_string() {
        let mut config = BenchConfig::default();
        config.mode = LocatorMode::Ha;

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.field == "coordination.connect_string"));

        config.coordination.connect_string = "/tmp/coord".to_string();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_in_progress_wait_must_cover_session_timeout() {
        let mut config = BenchConfig::default();
        config.mode = LocatorMode::Ha;
        config.coordination.connect_string = "/tmp/coord".to_string();
        config.retry.failover_in_progress_wait_secs = 180;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "retry.failover_in_progress_wait_secs");
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = BenchConfig::default();
        config.storage.chunk_size = 0;
        config.retry.max_attempts = 0;
        config.workload.workers = 0;
        config.observability.log_level = "loud".to_string();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert!(fields.contains(&"storage.chunk_size"));
        assert!(fields.contains(&"storage.check_interval_bytes"));
        assert!(fields.contains(&"retry.max_attempts"));
        assert!(fields.contains(&"workload.workers"));
        assert!(fields.contains(&"observability.log_level"));
    }

    #[test]
    fn test_known_complete_wait_is_shorter() {
        let mut config = BenchConfig::default();
        config.retry.failover_complete_wait_ms = 10_000;
        config.retry.regular_error_wait_ms = 1_000;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "retry.failover_complete_wait_ms");
    }
}
