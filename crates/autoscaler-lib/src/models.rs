//! Core data models for the autoscaler

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw reading returned by a metric source for one service
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricReading {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    /// Mean response time in milliseconds
    #[serde(default)]
    pub response_time_ms: f64,
    #[serde(default)]
    pub error_rate_percent: f64,
}

/// Point-in-time metric snapshot for a service, stamped by the sampler
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub timestamp: DateTime<Utc>,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub response_time_ms: f64,
    pub error_rate_percent: f64,
    /// False when collection failed or timed out
    pub valid: bool,
}

impl MetricSample {
    pub fn from_reading(timestamp: DateTime<Utc>, reading: MetricReading) -> Self {
        Self {
            timestamp,
            cpu_percent: reading.cpu_percent,
            memory_percent: reading.memory_percent,
            response_time_ms: reading.response_time_ms,
            error_rate_percent: reading.error_rate_percent,
            valid: true,
        }
    }

    /// Placeholder sample for a failed or timed-out collection
    pub fn invalid(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            cpu_percent: 0.0,
            memory_percent: 0.0,
            response_time_ms: 0.0,
            error_rate_percent: 0.0,
            valid: false,
        }
    }

    pub fn value(&self, metric: MetricKind) -> f64 {
        match metric {
            MetricKind::Cpu => self.cpu_percent,
            MetricKind::Memory => self.memory_percent,
            MetricKind::ResponseTime => self.response_time_ms,
            MetricKind::ErrorRate => self.error_rate_percent,
        }
    }
}

/// Metric dimensions tracked per service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Cpu,
    Memory,
    ResponseTime,
    ErrorRate,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetricKind::Cpu => "cpu",
            MetricKind::Memory => "memory",
            MetricKind::ResponseTime => "response_time",
            MetricKind::ErrorRate => "error_rate",
        };
        f.write_str(name)
    }
}

/// Direction of a scaling decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    None,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::None => "none",
        }
    }
}

/// Metric values that led to a decision
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TriggerMetrics {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub response_time_ms: f64,
    pub error_rate_percent: f64,
    /// Projected value used by a preemptive scale-up
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projected: Option<f64>,
}

impl From<&MetricSample> for TriggerMetrics {
    fn from(sample: &MetricSample) -> Self {
        Self {
            cpu_percent: sample.cpu_percent,
            memory_percent: sample.memory_percent,
            response_time_ms: sample.response_time_ms,
            error_rate_percent: sample.error_rate_percent,
            projected: None,
        }
    }
}

/// Outcome of evaluating one service for one tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingDecision {
    pub service: String,
    pub tick: u64,
    pub direction: Direction,
    pub current_replicas: u32,
    pub target_replicas: u32,
    pub reason: String,
    pub trigger: TriggerMetrics,
    pub decided_at: DateTime<Utc>,
}

impl ScalingDecision {
    /// Returns true if the decision asks for a replica change
    pub fn is_change(&self) -> bool {
        self.direction != Direction::None && self.target_replicas != self.current_replicas
    }
}

/// Result of handing a decision to the scaling executor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ApplyOutcome {
    /// Decision was a no-op, nothing was sent
    NoAction,
    /// Orchestrator confirmed the new replica count
    Applied { from: u32, to: u32, attempts: u32 },
    /// Monitoring-only mode: the command was logged, replicas left as observed
    Simulated { from: u32, to: u32 },
    /// Every attempt failed; profile left unchanged
    Failed { attempts: u32, error: String },
    /// A decision for this tick was already handled
    Duplicate { tick: u64 },
    /// Target fell outside the replica bounds
    Rejected { reason: String },
}

impl ApplyOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ApplyOutcome::NoAction => "no_action",
            ApplyOutcome::Applied { .. } => "applied",
            ApplyOutcome::Simulated { .. } => "simulated",
            ApplyOutcome::Failed { .. } => "failed",
            ApplyOutcome::Duplicate { .. } => "duplicate",
            ApplyOutcome::Rejected { .. } => "rejected",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_sample_is_flagged() {
        let sample = MetricSample::invalid(Utc::now());
        assert!(!sample.valid);
        assert_eq!(sample.cpu_percent, 0.0);
    }

    #[test]
    fn test_reading_missing_optional_fields() {
        let reading: MetricReading =
            serde_json::from_str(r#"{"cpu_percent": 42.5, "memory_percent": 10.0}"#).unwrap();
        assert_eq!(reading.cpu_percent, 42.5);
        assert_eq!(reading.response_time_ms, 0.0);
        assert_eq!(reading.error_rate_percent, 0.0);
    }

    #[test]
    fn test_apply_outcome_serializes_with_tag() {
        let outcome = ApplyOutcome::Applied {
            from: 2,
            to: 3,
            attempts: 1,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["result"], "applied");
        assert_eq!(json["to"], 3);
    }
}
