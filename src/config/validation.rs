//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Resolve engine type tags against the known variants
//! - Validate value ranges (hop limits, addresses, log levels)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::AppConfig;
use crate::engine::{EngineKind, EngineSpec};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("app.name must not be empty")]
    EmptyAppName,

    #[error("app.max_forward_hops must be at least 1")]
    ZeroForwardHops,

    #[error("engines.{kind}: unknown type `{name}`")]
    UnknownEngineType { kind: EngineKind, name: String },

    #[error("listener.bind_address `{0}` is not a socket address")]
    InvalidBindAddress(String),

    #[error("observability.log_level `{0}` is not a known level")]
    InvalidLogLevel(String),
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.app.name.trim().is_empty() {
        errors.push(ValidationError::EmptyAppName);
    }

    if config.app.max_forward_hops == 0 {
        errors.push(ValidationError::ZeroForwardHops);
    }

    for (kind, engine) in config.engines.configured() {
        if EngineSpec::resolve(kind, engine).is_err() {
            errors.push(ValidationError::UnknownEngineType {
                kind,
                name: engine.kind.clone(),
            });
        }
    }

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::InvalidLogLevel(
            config.observability.log_level.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
