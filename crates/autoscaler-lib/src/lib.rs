//! Autoscaler library for multi-tier services
//!
//! This crate provides the core functionality for:
//! - Concurrent metric sampling with per-call timeouts
//! - Per-service trend tracking
//! - Linear, exponential and predictive scaling decisions
//! - Scale command execution with retry and cooldown
//! - Status reporting and observability

pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod executor;
pub mod models;
pub mod observability;
pub mod profile;
pub mod sampler;
pub mod status;
pub mod trend;

pub use config::{AutoscalerConfig, LoopSettings, RetryPolicy, ServiceConfig, Thresholds};
pub use controller::{ControlLoop, TickReport};
pub use error::ConfigError;
pub use executor::{DryRunOrchestrator, Orchestrator, ScalingExecutor};
pub use models::*;
pub use observability::{AutoscalerMetrics, StructuredLogger};
pub use profile::{Algorithm, ServiceProfile};
pub use sampler::{CollectionResults, MetricSource, Sampler};
pub use status::{
    ComponentStatus, HealthResponse, LoopStatus, ReadinessResponse, ServiceStatus,
    StatusReporter, StatusSnapshot,
};
pub use trend::{Trend, TrendStore, TrendWindow};
