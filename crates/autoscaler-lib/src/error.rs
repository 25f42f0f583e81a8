//! Error types for the autoscaler library

use thiserror::Error;

/// Configuration errors. Fatal at startup, rejected on reload.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("no services configured")]
    NoServices,

    #[error("duplicate service name '{0}'")]
    DuplicateService(String),

    #[error("service name must not be empty")]
    EmptyServiceName,

    #[error("service '{service}': min_replicas ({min}) exceeds max_replicas ({max})")]
    InvalidBounds { service: String, min: u32, max: u32 },

    #[error("service '{service}': initial replicas {initial} outside [{min}, {max}]")]
    InitialOutOfBounds {
        service: String,
        initial: u32,
        min: u32,
        max: u32,
    },

    #[error("service '{service}': unknown scaling algorithm '{algorithm}'")]
    UnknownAlgorithm { service: String, algorithm: String },

    #[error("service '{service}': invalid threshold: {reason}")]
    InvalidThreshold { service: String, reason: String },

    #[error("service '{service}': growth factor {value} must be in (1.0, 4.0]")]
    InvalidGrowthFactor { service: String, value: f64 },

    #[error("{field} must be greater than zero")]
    ZeroValue { field: &'static str },

    #[error("{field} must be at least {min}")]
    BelowMinimum { field: &'static str, min: u64 },

    #[error("{field} = {value} exceeds the maximum of {max}")]
    AboveMaximum {
        field: &'static str,
        value: u64,
        max: u64,
    },
}
