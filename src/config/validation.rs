//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (max_attempts > 0, non-zero limits)
//! - Validate addresses parse as socket addresses
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before the server is built

use std::net::SocketAddr;

use crate::config::schema::{DispatchConfig, ServerConfig};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} must be positive")]
    NotPositive { field: &'static str },

    #[error("{field} is not a valid socket address: {value:?}")]
    Address { field: &'static str, value: String },
}

/// Validate the whole configuration.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = validate_dispatch(&config.dispatch).err().unwrap_or_default();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.observability.metrics_enabled {
        check_address(&mut errors, "observability.metrics_address", &config.observability.metrics_address);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate the dispatch section alone.
pub fn validate_dispatch(config: &DispatchConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let positive = [
        ("dispatch.max_attempts", config.max_attempts as usize),
        ("dispatch.multipart_max_memory", config.multipart_max_memory),
        ("dispatch.max_body_bytes", config.max_body_bytes),
        ("dispatch.stream_buffer", config.stream_buffer),
    ];
    for (field, value) in positive {
        if value == 0 {
            errors.push(ValidationError::NotPositive { field });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::Address {
            field,
            value: value.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(validate_config(&ServerConfig::default()), Ok(()));
    }

    #[test]
    fn zero_attempts_rejected() {
        let mut config = ServerConfig::default();
        config.dispatch.max_attempts = 0;
        assert_eq!(
            validate_config(&config),
            Err(vec![ValidationError::NotPositive { field: "dispatch.max_attempts" }])
        );
    }

    #[test]
    fn all_errors_reported() {
        let mut config = ServerConfig::default();
        config.dispatch.max_attempts = 0;
        config.dispatch.stream_buffer = 0;
        config.listener.bind_address = "localhost".to_string();
        assert_eq!(validate_config(&config).unwrap_err().len(), 3);
    }

    #[test]
    fn metrics_address_checked_only_when_enabled() {
        let mut config = ServerConfig::default();
        config.observability.metrics_address = "nope".to_string();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        assert!(validate_config(&config).is_err());
    }
}
