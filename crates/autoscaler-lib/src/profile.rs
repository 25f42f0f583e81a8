//! Per-service scaling profile and algorithm selection

use crate::config::Thresholds;
use crate::error::ConfigError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// Scaling algorithm, selected once at configuration load
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Algorithm {
    /// Step by one replica on threshold breach
    Linear,
    /// Multiply replicas on a sustained breach
    Exponential {
        growth_factor: f64,
        sustained_samples: usize,
    },
    /// Scale up ahead of a projected breach
    Predictive {
        #[serde(with = "duration_secs")]
        lookahead: Duration,
    },
}

impl Algorithm {
    pub fn from_config(
        service: &str,
        name: &str,
        growth_factor: f64,
        sustained_samples: usize,
        lookahead: Duration,
    ) -> Result<Self, ConfigError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "linear" => Ok(Algorithm::Linear),
            "exponential" => {
                if !growth_factor.is_finite() || growth_factor <= 1.0 || growth_factor > 4.0 {
                    return Err(ConfigError::InvalidGrowthFactor {
                        service: service.to_string(),
                        value: growth_factor,
                    });
                }
                Ok(Algorithm::Exponential {
                    growth_factor,
                    sustained_samples: sustained_samples.max(1),
                })
            }
            "predictive" => Ok(Algorithm::Predictive { lookahead }),
            _ => Err(ConfigError::UnknownAlgorithm {
                service: service.to_string(),
                algorithm: name.to_string(),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::Linear => "linear",
            Algorithm::Exponential { .. } => "exponential",
            Algorithm::Predictive { .. } => "predictive",
        }
    }
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }
}

/// Mutable scaling state for one tier, owned by the control loop
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceProfile {
    pub name: String,
    pub current_replicas: u32,
    pub min_replicas: u32,
    pub max_replicas: u32,
    pub algorithm: Algorithm,
    pub thresholds: Thresholds,
    pub cooldown: chrono::Duration,
    pub last_scaled_at: Option<DateTime<Utc>>,
    pub cooldown_until: Option<DateTime<Utc>>,
}

impl ServiceProfile {
    /// Returns true while a previous scale action is cooling down
    pub fn in_cooldown(&self, now: DateTime<Utc>) -> bool {
        self.cooldown_until.map(|until| now < until).unwrap_or(false)
    }

    pub fn within_bounds(&self, replicas: u32) -> bool {
        (self.min_replicas..=self.max_replicas).contains(&replicas)
    }

    pub fn clamp(&self, replicas: i64) -> u32 {
        replicas.clamp(self.min_replicas as i64, self.max_replicas as i64) as u32
    }

    /// Record a confirmed scale action and start the cooldown window
    pub fn record_scale(&mut self, replicas: u32, now: DateTime<Utc>) {
        self.current_replicas = replicas;
        self.last_scaled_at = Some(now);
        self.cooldown_until = Some(cooldown_expiry(now, self.cooldown));
    }

    /// Take configuration from a reloaded profile, keeping runtime state
    pub fn reconfigure(&mut self, updated: ServiceProfile) {
        self.min_replicas = updated.min_replicas;
        self.max_replicas = updated.max_replicas;
        self.algorithm = updated.algorithm;
        self.thresholds = updated.thresholds;
        self.cooldown = updated.cooldown;
        if let Some(last) = self.last_scaled_at {
            self.cooldown_until = Some(cooldown_expiry(last, self.cooldown));
        }
    }
}

/// End of a cooldown window, saturating at the latest representable time
fn cooldown_expiry(start: DateTime<Utc>, cooldown: chrono::Duration) -> DateTime<Utc> {
    start
        .checked_add_signed(cooldown)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> ServiceProfile {
        ServiceProfile {
            name: "api".to_string(),
            current_replicas: 3,
            min_replicas: 2,
            max_replicas: 10,
            algorithm: Algorithm::Linear,
            thresholds: Thresholds::default(),
            cooldown: chrono::Duration::seconds(120),
            last_scaled_at: None,
            cooldown_until: None,
        }
    }

    #[test]
    fn test_algorithm_parsing() {
        let lookahead = Duration::from_secs(30);
        assert_eq!(
            Algorithm::from_config("api", "Linear", 1.5, 2, lookahead).unwrap(),
            Algorithm::Linear
        );
        assert_eq!(
            Algorithm::from_config("api", "predictive", 1.5, 2, lookahead).unwrap(),
            Algorithm::Predictive { lookahead }
        );
        assert!(matches!(
            Algorithm::from_config("api", "random", 1.5, 2, lookahead),
            Err(ConfigError::UnknownAlgorithm { .. })
        ));
    }

    #[test]
    fn test_exponential_growth_factor_validated() {
        let lookahead = Duration::from_secs(30);
        assert!(matches!(
            Algorithm::from_config("api", "exponential", 1.0, 2, lookahead),
            Err(ConfigError::InvalidGrowthFactor { .. })
        ));
        assert!(Algorithm::from_config("api", "exponential", 2.0, 2, lookahead).is_ok());
    }

    #[test]
    fn test_cooldown_window() {
        let mut profile = profile();
        let now = Utc::now();
        assert!(!profile.in_cooldown(now));

        profile.record_scale(4, now);
        assert_eq!(profile.current_replicas, 4);
        assert!(profile.in_cooldown(now + chrono::Duration::seconds(119)));
        assert!(!profile.in_cooldown(now + chrono::Duration::seconds(120)));
    }

    #[test]
    fn test_cooldown_saturates_instead_of_overflowing() {
        let mut profile = profile();
        profile.cooldown = chrono::Duration::MAX;
        let now = Utc::now();

        profile.record_scale(4, now);
        assert_eq!(profile.current_replicas, 4);
        assert_eq!(profile.cooldown_until, Some(DateTime::<Utc>::MAX_UTC));

        profile.reconfigure(profile.clone());
        assert!(profile.in_cooldown(now + chrono::Duration::days(365)));
    }

    #[test]
    fn test_clamp() {
        let profile = profile();
        assert_eq!(profile.clamp(-1), 2);
        assert_eq!(profile.clamp(5), 5);
        assert_eq!(profile.clamp(42), 10);
    }

    #[test]
    fn test_reconfigure_keeps_runtime_state() {
        let mut profile = profile();
        let now = Utc::now();
        profile.record_scale(6, now);

        let mut updated = profile.clone();
        updated.current_replicas = 2;
        updated.max_replicas = 5;
        updated.cooldown = chrono::Duration::seconds(30);
        updated.last_scaled_at = None;
        profile.reconfigure(updated);

        assert_eq!(profile.current_replicas, 6);
        assert_eq!(profile.max_replicas, 5);
        assert_eq!(profile.cooldown_until, Some(now + chrono::Duration::seconds(30)));
    }
}
