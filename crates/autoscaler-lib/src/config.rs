//! Autoscaler configuration and validation
//!
//! The configuration surface is deserialized with serde defaults and then
//! validated into [`ServiceProfile`]s. Any validation failure is a
//! [`ConfigError`]; the daemon treats it as fatal at startup and rejects the
//! new file on reload.

use crate::error::ConfigError;
use crate::profile::{Algorithm, ServiceProfile};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Upper bound for interval-like settings, in seconds (one day)
pub const MAX_INTERVAL_SECS: u64 = 86_400;

/// Upper bound for per-call timeouts and retry backoff, in milliseconds (one hour)
pub const MAX_TIMEOUT_MS: u64 = 3_600_000;

/// Upper bound for a service cooldown, in seconds (thirty days)
pub const MAX_COOLDOWN_SECS: u64 = 30 * 86_400;

fn at_most(field: &'static str, value: u64, max: u64) -> Result<(), ConfigError> {
    if value > max {
        return Err(ConfigError::AboveMaximum { field, value, max });
    }
    Ok(())
}

/// Top-level control loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoscalerConfig {
    /// Interval between ticks in seconds
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,

    /// Wall-clock budget for one tick; defaults to the check interval
    #[serde(default)]
    pub tick_budget_secs: Option<u64>,

    /// Per-service metric fetch timeout in milliseconds
    #[serde(default = "default_sample_timeout")]
    pub sample_timeout_ms: u64,

    /// Cap on simultaneous outbound metric requests
    #[serde(default = "default_max_concurrent_samples")]
    pub max_concurrent_samples: usize,

    /// Samples retained per service for trend analysis
    #[serde(default = "default_trend_window")]
    pub trend_window_size: usize,

    /// Samples required before a slope is reported
    #[serde(default = "default_trend_min_samples")]
    pub trend_min_samples: usize,

    /// Predictive look-ahead horizon in seconds
    #[serde(default = "default_lookahead")]
    pub lookahead_secs: u64,

    #[serde(default)]
    pub retry: RetryConfig,

    /// Thresholds applied to services that do not override them
    #[serde(default)]
    pub thresholds: Thresholds,

    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

/// Orchestrator retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

/// Scale-up and scale-down thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    #[serde(default = "default_cpu_up")]
    pub cpu_scale_up: f64,
    #[serde(default = "default_cpu_down")]
    pub cpu_scale_down: f64,
    #[serde(default = "default_memory_up")]
    pub memory_scale_up: f64,
    #[serde(default = "default_memory_down")]
    pub memory_scale_down: f64,
    #[serde(default = "default_response_time_up")]
    pub response_time_scale_up_ms: Option<f64>,
    #[serde(default = "default_response_time_down")]
    pub response_time_scale_down_ms: Option<f64>,
    #[serde(default = "default_error_rate_up")]
    pub error_rate_scale_up: Option<f64>,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            cpu_scale_up: default_cpu_up(),
            cpu_scale_down: default_cpu_down(),
            memory_scale_up: default_memory_up(),
            memory_scale_down: default_memory_down(),
            response_time_scale_up_ms: default_response_time_up(),
            response_time_scale_down_ms: default_response_time_down(),
            error_rate_scale_up: default_error_rate_up(),
        }
    }
}

impl Thresholds {
    fn validate(&self, service: &str) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidThreshold {
            service: service.to_string(),
            reason,
        };

        let percentages = [
            ("cpu_scale_up", Some(self.cpu_scale_up)),
            ("cpu_scale_down", Some(self.cpu_scale_down)),
            ("memory_scale_up", Some(self.memory_scale_up)),
            ("memory_scale_down", Some(self.memory_scale_down)),
            ("error_rate_scale_up", self.error_rate_scale_up),
        ];
        for (name, value) in percentages {
            if let Some(v) = value {
                if !v.is_finite() || !(0.0..=100.0).contains(&v) {
                    return Err(invalid(format!("{} = {} is not a percentage", name, v)));
                }
            }
        }

        for (name, value) in [
            ("response_time_scale_up_ms", self.response_time_scale_up_ms),
            ("response_time_scale_down_ms", self.response_time_scale_down_ms),
        ] {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    return Err(invalid(format!("{} = {} must be non-negative", name, v)));
                }
            }
        }

        if self.cpu_scale_down >= self.cpu_scale_up {
            return Err(invalid(format!(
                "cpu scale-down {} must be below scale-up {}",
                self.cpu_scale_down, self.cpu_scale_up
            )));
        }
        if self.memory_scale_down >= self.memory_scale_up {
            return Err(invalid(format!(
                "memory scale-down {} must be below scale-up {}",
                self.memory_scale_down, self.memory_scale_up
            )));
        }
        if let (Some(up), Some(down)) = (
            self.response_time_scale_up_ms,
            self.response_time_scale_down_ms,
        ) {
            if down >= up {
                return Err(invalid(format!(
                    "response time scale-down {}ms must be below scale-up {}ms",
                    down, up
                )));
            }
        }

        Ok(())
    }
}

/// Per-service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,

    #[serde(default = "default_min_replicas")]
    pub min_replicas: u32,

    #[serde(default = "default_max_replicas")]
    pub max_replicas: u32,

    /// Starting replica count; defaults to `min_replicas`
    #[serde(default)]
    pub initial_replicas: Option<u32>,

    /// One of `linear`, `exponential`, `predictive`
    #[serde(default = "default_algorithm")]
    pub algorithm: String,

    /// Multiplier used by the exponential algorithm
    #[serde(default = "default_growth_factor")]
    pub growth_factor: f64,

    /// Consecutive breaching samples the exponential algorithm needs
    #[serde(default = "default_sustained_samples")]
    pub sustained_samples: usize,

    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,

    #[serde(default)]
    pub thresholds: Option<Thresholds>,
}

impl ServiceConfig {
    /// Service with defaults for everything but the name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            min_replicas: default_min_replicas(),
            max_replicas: default_max_replicas(),
            initial_replicas: None,
            algorithm: default_algorithm(),
            growth_factor: default_growth_factor(),
            sustained_samples: default_sustained_samples(),
            cooldown_secs: default_cooldown(),
            thresholds: None,
        }
    }
}

/// Loop-wide settings derived from a validated configuration
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub check_interval: Duration,
    pub tick_budget: Duration,
    pub sample_timeout: Duration,
    pub max_concurrent_samples: usize,
    pub trend_window_size: usize,
    pub trend_min_samples: usize,
    pub retry: RetryPolicy,
}

/// Bounded exponential backoff for scale commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Delay before the given retry (1-based count of failures so far)
    pub fn backoff(&self, failures: u32) -> Duration {
        let factor = 2u32.saturating_pow(failures.saturating_sub(1));
        std::cmp::min(self.initial_backoff.saturating_mul(factor), self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryConfig::default().into()
    }
}

impl From<RetryConfig> for RetryPolicy {
    fn from(config: RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }
}

impl Default for AutoscalerConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval(),
            tick_budget_secs: None,
            sample_timeout_ms: default_sample_timeout(),
            max_concurrent_samples: default_max_concurrent_samples(),
            trend_window_size: default_trend_window(),
            trend_min_samples: default_trend_min_samples(),
            lookahead_secs: default_lookahead(),
            retry: RetryConfig::default(),
            thresholds: Thresholds::default(),
            services: Vec::new(),
        }
    }
}

impl AutoscalerConfig {
    /// Validate loop-wide settings
    pub fn settings(&self) -> Result<LoopSettings, ConfigError> {
        if self.check_interval_secs == 0 {
            return Err(ConfigError::ZeroValue {
                field: "check_interval_secs",
            });
        }
        if self.tick_budget_secs == Some(0) {
            return Err(ConfigError::ZeroValue {
                field: "tick_budget_secs",
            });
        }
        if self.sample_timeout_ms == 0 {
            return Err(ConfigError::ZeroValue {
                field: "sample_timeout_ms",
            });
        }
        if self.max_concurrent_samples == 0 {
            return Err(ConfigError::ZeroValue {
                field: "max_concurrent_samples",
            });
        }
        if self.trend_window_size == 0 {
            return Err(ConfigError::ZeroValue {
                field: "trend_window_size",
            });
        }
        // A slope needs at least two points
        if self.trend_min_samples < 2 {
            return Err(ConfigError::BelowMinimum {
                field: "trend_min_samples",
                min: 2,
            });
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ZeroValue {
                field: "retry.max_attempts",
            });
        }

        at_most("check_interval_secs", self.check_interval_secs, MAX_INTERVAL_SECS)?;
        if let Some(budget) = self.tick_budget_secs {
            at_most("tick_budget_secs", budget, MAX_INTERVAL_SECS)?;
        }
        at_most("lookahead_secs", self.lookahead_secs, MAX_INTERVAL_SECS)?;
        at_most("sample_timeout_ms", self.sample_timeout_ms, MAX_TIMEOUT_MS)?;
        at_most(
            "retry.initial_backoff_ms",
            self.retry.initial_backoff_ms,
            MAX_TIMEOUT_MS,
        )?;
        at_most("retry.max_backoff_ms", self.retry.max_backoff_ms, MAX_TIMEOUT_MS)?;

        Ok(LoopSettings {
            check_interval: Duration::from_secs(self.check_interval_secs),
            tick_budget: Duration::from_secs(
                self.tick_budget_secs.unwrap_or(self.check_interval_secs),
            ),
            sample_timeout: Duration::from_millis(self.sample_timeout_ms),
            max_concurrent_samples: self.max_concurrent_samples,
            trend_window_size: self.trend_window_size,
            trend_min_samples: self.trend_min_samples.min(self.trend_window_size),
            retry: self.retry.clone().into(),
        })
    }

    /// Validate every service and build its profile
    pub fn profiles(&self) -> Result<Vec<ServiceProfile>, ConfigError> {
        if self.services.is_empty() {
            return Err(ConfigError::NoServices);
        }

        let mut seen = HashSet::new();
        let mut profiles = Vec::with_capacity(self.services.len());

        for service in &self.services {
            if service.name.trim().is_empty() {
                return Err(ConfigError::EmptyServiceName);
            }
            if !seen.insert(service.name.as_str()) {
                return Err(ConfigError::DuplicateService(service.name.clone()));
            }
            profiles.push(self.profile_for(service)?);
        }

        Ok(profiles)
    }

    /// Validate both settings and services in one pass
    pub fn validate(&self) -> Result<(LoopSettings, Vec<ServiceProfile>), ConfigError> {
        Ok((self.settings()?, self.profiles()?))
    }

    fn profile_for(&self, service: &ServiceConfig) -> Result<ServiceProfile, ConfigError> {
        if service.min_replicas > service.max_replicas {
            return Err(ConfigError::InvalidBounds {
                service: service.name.clone(),
                min: service.min_replicas,
                max: service.max_replicas,
            });
        }

        let initial = service.initial_replicas.unwrap_or(service.min_replicas);
        if initial < service.min_replicas || initial > service.max_replicas {
            return Err(ConfigError::InitialOutOfBounds {
                service: service.name.clone(),
                initial,
                min: service.min_replicas,
                max: service.max_replicas,
            });
        }

        let thresholds = service
            .thresholds
            .clone()
            .unwrap_or_else(|| self.thresholds.clone());
        thresholds.validate(&service.name)?;

        let algorithm = Algorithm::from_config(
            &service.name,
            &service.algorithm,
            service.growth_factor,
            service.sustained_samples,
            Duration::from_secs(self.lookahead_secs),
        )?;

        at_most("cooldown_secs", service.cooldown_secs, MAX_COOLDOWN_SECS)?;
        let cooldown = chrono::Duration::seconds(service.cooldown_secs as i64);

        Ok(ServiceProfile {
            name: service.name.clone(),
            current_replicas: initial,
            min_replicas: service.min_replicas,
            max_replicas: service.max_replicas,
            algorithm,
            thresholds,
            cooldown,
            last_scaled_at: None,
            cooldown_until: None,
        })
    }
}

fn default_check_interval() -> u64 {
    30
}

fn default_sample_timeout() -> u64 {
    5_000
}

fn default_max_concurrent_samples() -> usize {
    8
}

fn default_trend_window() -> usize {
    10
}

fn default_trend_min_samples() -> usize {
    3
}

fn default_lookahead() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff() -> u64 {
    500
}

fn default_max_backoff() -> u64 {
    8_000
}

fn default_cpu_up() -> f64 {
    70.0
}

fn default_cpu_down() -> f64 {
    20.0
}

fn default_memory_up() -> f64 {
    80.0
}

fn default_memory_down() -> f64 {
    40.0
}

fn default_response_time_up() -> Option<f64> {
    Some(1000.0)
}

fn default_response_time_down() -> Option<f64> {
    Some(200.0)
}

fn default_error_rate_up() -> Option<f64> {
    Some(5.0)
}

fn default_min_replicas() -> u32 {
    2
}

fn default_max_replicas() -> u32 {
    10
}

fn default_algorithm() -> String {
    "linear".to_string()
}

fn default_growth_factor() -> f64 {
    1.5
}

fn default_sustained_samples() -> usize {
    2
}

fn default_cooldown() -> u64 {
    120
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(service: ServiceConfig) -> AutoscalerConfig {
        AutoscalerConfig {
            services: vec![service],
            ..AutoscalerConfig::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = AutoscalerConfig::default();
        assert_eq!(config.check_interval_secs, 30);
        assert_eq!(config.thresholds.cpu_scale_up, 70.0);
        assert_eq!(config.thresholds.memory_scale_down, 40.0);
        assert_eq!(config.retry.max_attempts, 3);

        let settings = config.settings().unwrap();
        assert_eq!(settings.tick_budget, Duration::from_secs(30));
    }

    #[test]
    fn test_valid_service_builds_profile() {
        let config = config_with(ServiceConfig::named("api"));
        let profiles = config.profiles().unwrap();

        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].name, "api");
        assert_eq!(profiles[0].current_replicas, 2);
        assert_eq!(profiles[0].algorithm, Algorithm::Linear);
        assert_eq!(profiles[0].cooldown, chrono::Duration::seconds(120));
    }

    #[test]
    fn test_min_greater_than_max_rejected() {
        let mut service = ServiceConfig::named("api");
        service.min_replicas = 5;
        service.max_replicas = 3;

        let err = config_with(service).profiles().unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidBounds {
                service: "api".to_string(),
                min: 5,
                max: 3
            }
        );
    }

    #[test]
    fn test_unknown_algorithm_rejected() {
        let mut service = ServiceConfig::named("cache");
        service.algorithm = "quantum".to_string();

        let err = config_with(service).profiles().unwrap_err();
        assert!(matches!(err, ConfigError::UnknownAlgorithm { .. }));
        assert!(err.to_string().contains("quantum"));
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let mut service = ServiceConfig::named("db");
        service.thresholds = Some(Thresholds {
            cpu_scale_up: 30.0,
            cpu_scale_down: 60.0,
            ..Thresholds::default()
        });

        let err = config_with(service).profiles().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidThreshold { .. }));
    }

    #[test]
    fn test_out_of_range_percentage_rejected() {
        let mut config = config_with(ServiceConfig::named("api"));
        config.thresholds.memory_scale_up = 140.0;

        assert!(matches!(
            config.profiles(),
            Err(ConfigError::InvalidThreshold { .. })
        ));
    }

    #[test]
    fn test_duplicate_service_rejected() {
        let config = AutoscalerConfig {
            services: vec![ServiceConfig::named("api"), ServiceConfig::named("api")],
            ..AutoscalerConfig::default()
        };

        assert_eq!(
            config.profiles().unwrap_err(),
            ConfigError::DuplicateService("api".to_string())
        );
    }

    #[test]
    fn test_initial_replicas_outside_bounds_rejected() {
        let mut service = ServiceConfig::named("api");
        service.initial_replicas = Some(20);

        assert!(matches!(
            config_with(service).profiles(),
            Err(ConfigError::InitialOutOfBounds { initial: 20, .. })
        ));
    }

    #[test]
    fn test_empty_services_rejected() {
        assert_eq!(
            AutoscalerConfig::default().profiles().unwrap_err(),
            ConfigError::NoServices
        );
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = AutoscalerConfig {
            check_interval_secs: 0,
            ..AutoscalerConfig::default()
        };
        assert!(matches!(
            config.settings(),
            Err(ConfigError::ZeroValue {
                field: "check_interval_secs"
            })
        ));
    }

    #[test]
    fn test_oversized_durations_rejected() {
        let cases: Vec<(&str, AutoscalerConfig)> = vec![
            (
                "check_interval_secs",
                AutoscalerConfig {
                    check_interval_secs: u64::MAX,
                    ..AutoscalerConfig::default()
                },
            ),
            (
                "tick_budget_secs",
                AutoscalerConfig {
                    tick_budget_secs: Some(u64::MAX),
                    ..AutoscalerConfig::default()
                },
            ),
            (
                "sample_timeout_ms",
                AutoscalerConfig {
                    sample_timeout_ms: u64::MAX,
                    ..AutoscalerConfig::default()
                },
            ),
            (
                "lookahead_secs",
                AutoscalerConfig {
                    lookahead_secs: MAX_INTERVAL_SECS + 1,
                    ..AutoscalerConfig::default()
                },
            ),
            (
                "retry.max_backoff_ms",
                AutoscalerConfig {
                    retry: RetryConfig {
                        max_backoff_ms: u64::MAX,
                        ..RetryConfig::default()
                    },
                    ..AutoscalerConfig::default()
                },
            ),
        ];

        for (expected, config) in cases {
            match config.settings() {
                Err(ConfigError::AboveMaximum { field, .. }) => assert_eq!(field, expected),
                other => panic!("{} accepted: {:?}", expected, other),
            }
        }
    }

    #[test]
    fn test_oversized_cooldown_rejected() {
        let mut service = ServiceConfig::named("api");
        service.cooldown_secs = 9_000_000_000_000;
        let config = AutoscalerConfig {
            services: vec![service],
            ..AutoscalerConfig::default()
        };

        assert!(matches!(
            config.profiles(),
            Err(ConfigError::AboveMaximum {
                field: "cooldown_secs",
                ..
            })
        ));
    }

    #[test]
    fn test_largest_accepted_values_validate() {
        let mut service = ServiceConfig::named("api");
        service.cooldown_secs = MAX_COOLDOWN_SECS;
        let config = AutoscalerConfig {
            check_interval_secs: MAX_INTERVAL_SECS,
            sample_timeout_ms: MAX_TIMEOUT_MS,
            services: vec![service],
            ..AutoscalerConfig::default()
        };

        let (settings, profiles) = config.validate().unwrap();
        assert_eq!(settings.tick_budget, Duration::from_secs(MAX_INTERVAL_SECS));
        assert_eq!(profiles[0].cooldown.num_seconds(), MAX_COOLDOWN_SECS as i64);
    }

    #[test]
    fn test_retry_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_millis(1500),
        };

        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_millis(1000));
        assert_eq!(policy.backoff(3), Duration::from_millis(1500));
        assert_eq!(policy.backoff(10), Duration::from_millis(1500));
    }

    #[test]
    fn test_deserialize_from_json() {
        let json = r#"{
            "check_interval_secs": 15,
            "services": [
                {"name": "api", "min_replicas": 2, "max_replicas": 8, "algorithm": "predictive"},
                {"name": "redis", "max_replicas": 2, "algorithm": "exponential", "growth_factor": 2.0}
            ]
        }"#;

        let config: AutoscalerConfig = serde_json::from_str(json).unwrap();
        let (settings, profiles) = config.validate().unwrap();

        assert_eq!(settings.check_interval, Duration::from_secs(15));
        assert_eq!(profiles.len(), 2);
        assert!(matches!(profiles[0].algorithm, Algorithm::Predictive { .. }));
        assert_eq!(
            profiles[1].algorithm,
            Algorithm::Exponential {
                growth_factor: 2.0,
                sustained_samples: 2
            }
        );
    }
}
