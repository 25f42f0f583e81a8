//! Scaling decision engine
//!
//! Turns the latest sample (and trend window) of a service into a
//! [`ScalingDecision`]. Each algorithm is a pure function of its inputs;
//! nothing here touches the orchestrator or mutates the profile.
//!
//! Evaluation order per service per tick:
//! 1. invalid sample or active cooldown -> hold
//! 2. replica count outside bounds -> move to the nearest bound
//! 3. configured algorithm, with scale-up taking priority over scale-down
//! 4. clamp to bounds; unchanged target -> hold

use crate::config::Thresholds;
use crate::models::{Direction, MetricKind, MetricSample, ScalingDecision, TriggerMetrics};
use crate::profile::{Algorithm, ServiceProfile};
use crate::trend::TrendWindow;
use chrono::{DateTime, Utc};

pub const REASON_INVALID_SAMPLE: &str = "skipped: invalid sample";
pub const REASON_COOLDOWN: &str = "skipped: cooldown";
pub const REASON_TICK_BUDGET: &str = "skipped: tick budget exceeded";

/// Threshold evaluation of a single sample
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pressure {
    /// Human-readable description of every scale-up breach
    pub breaches: Vec<String>,
    /// All scale-down conditions hold
    pub idle: bool,
}

impl Pressure {
    pub fn assess(thresholds: &Thresholds, sample: &MetricSample) -> Self {
        let mut breaches = Vec::new();

        if sample.cpu_percent > thresholds.cpu_scale_up {
            breaches.push(format!(
                "cpu {:.1}% > {:.1}%",
                sample.cpu_percent, thresholds.cpu_scale_up
            ));
        }
        if sample.memory_percent > thresholds.memory_scale_up {
            breaches.push(format!(
                "memory {:.1}% > {:.1}%",
                sample.memory_percent, thresholds.memory_scale_up
            ));
        }
        if let Some(limit) = thresholds.response_time_scale_up_ms {
            if sample.response_time_ms > limit {
                breaches.push(format!(
                    "response time {:.0}ms > {:.0}ms",
                    sample.response_time_ms, limit
                ));
            }
        }
        if let Some(limit) = thresholds.error_rate_scale_up {
            if sample.error_rate_percent > limit {
                breaches.push(format!(
                    "error rate {:.1}% > {:.1}%",
                    sample.error_rate_percent, limit
                ));
            }
        }

        let idle = sample.cpu_percent < thresholds.cpu_scale_down
            && sample.memory_percent < thresholds.memory_scale_down
            && thresholds
                .response_time_scale_down_ms
                .map(|limit| sample.response_time_ms < limit)
                .unwrap_or(true);

        Self { breaches, idle }
    }

    pub fn wants_up(&self) -> bool {
        !self.breaches.is_empty()
    }
}

/// Unclamped target produced by an algorithm
#[derive(Debug, Clone, PartialEq)]
struct Proposal {
    target: i64,
    reason: String,
    projected: Option<f64>,
}

impl Proposal {
    fn hold(current: u32, reason: impl Into<String>) -> Self {
        Self {
            target: current as i64,
            reason: reason.into(),
            projected: None,
        }
    }
}

/// Evaluate one service for one tick
pub fn decide(
    profile: &ServiceProfile,
    sample: &MetricSample,
    window: Option<&TrendWindow>,
    now: DateTime<Utc>,
    tick: u64,
) -> ScalingDecision {
    let trigger = TriggerMetrics::from(sample);

    if !sample.valid {
        return hold(profile, tick, now, REASON_INVALID_SAMPLE, trigger);
    }
    if profile.in_cooldown(now) {
        return hold(profile, tick, now, REASON_COOLDOWN, trigger);
    }

    let current = profile.current_replicas;
    let proposal = if current < profile.min_replicas {
        Proposal {
            target: profile.min_replicas as i64,
            reason: format!("below minimum of {} replicas", profile.min_replicas),
            projected: None,
        }
    } else if current > profile.max_replicas {
        Proposal {
            target: profile.max_replicas as i64,
            reason: format!("above maximum of {} replicas", profile.max_replicas),
            projected: None,
        }
    } else {
        let pressure = Pressure::assess(&profile.thresholds, sample);
        match &profile.algorithm {
            Algorithm::Linear => linear(current, &pressure),
            Algorithm::Exponential {
                growth_factor,
                sustained_samples,
            } => exponential(
                current,
                &pressure,
                &profile.thresholds,
                window,
                *growth_factor,
                *sustained_samples,
            ),
            Algorithm::Predictive { lookahead } => predictive(
                current,
                &pressure,
                &profile.thresholds,
                sample,
                window,
                lookahead.as_secs_f64(),
            ),
        }
    };

    let target = profile.clamp(proposal.target);
    let trigger = TriggerMetrics {
        projected: proposal.projected,
        ..trigger
    };

    if target == current {
        let reason = if proposal.target > current as i64 {
            format!(
                "{}; already at maximum of {} replicas",
                proposal.reason, profile.max_replicas
            )
        } else if proposal.target < current as i64 {
            format!(
                "{}; already at minimum of {} replicas",
                proposal.reason, profile.min_replicas
            )
        } else {
            proposal.reason
        };
        return hold(profile, tick, now, reason, trigger);
    }

    ScalingDecision {
        service: profile.name.clone(),
        tick,
        direction: if target > current {
            Direction::Up
        } else {
            Direction::Down
        },
        current_replicas: current,
        target_replicas: target,
        reason: proposal.reason,
        trigger,
        decided_at: now,
    }
}

/// No-op decision with the given reason
pub fn hold(
    profile: &ServiceProfile,
    tick: u64,
    now: DateTime<Utc>,
    reason: impl Into<String>,
    trigger: TriggerMetrics,
) -> ScalingDecision {
    ScalingDecision {
        service: profile.name.clone(),
        tick,
        direction: Direction::None,
        current_replicas: profile.current_replicas,
        target_replicas: profile.current_replicas,
        reason: reason.into(),
        trigger,
        decided_at: now,
    }
}

fn linear(current: u32, pressure: &Pressure) -> Proposal {
    if pressure.wants_up() {
        return Proposal {
            target: current as i64 + 1,
            reason: format!("scale up: {}", pressure.breaches.join(", ")),
            projected: None,
        };
    }
    if pressure.idle {
        return Proposal {
            target: current as i64 - 1,
            reason: "scale down: all metrics below scale-down thresholds".to_string(),
            projected: None,
        };
    }
    Proposal::hold(current, "within thresholds")
}

fn exponential(
    current: u32,
    pressure: &Pressure,
    thresholds: &Thresholds,
    window: Option<&TrendWindow>,
    growth_factor: f64,
    sustained_samples: usize,
) -> Proposal {
    if !pressure.wants_up() {
        return linear(current, pressure);
    }

    let sustained = window
        .filter(|w| w.len() >= sustained_samples)
        .map(|w| {
            w.recent(sustained_samples)
                .all(|s| Pressure::assess(thresholds, s).wants_up())
        })
        .unwrap_or(false);

    if !sustained {
        return linear(current, pressure);
    }

    let grown = (current as f64 * growth_factor).ceil() as i64;
    Proposal {
        target: grown.max(current as i64 + 1),
        reason: format!(
            "scale up x{:.2}: sustained {} over {} samples",
            growth_factor,
            pressure.breaches.join(", "),
            sustained_samples
        ),
        projected: None,
    }
}

fn predictive(
    current: u32,
    pressure: &Pressure,
    thresholds: &Thresholds,
    sample: &MetricSample,
    window: Option<&TrendWindow>,
    lookahead_secs: f64,
) -> Proposal {
    if pressure.wants_up() {
        return linear(current, pressure);
    }

    if let Some(window) = window {
        let watched = [
            (MetricKind::Cpu, thresholds.cpu_scale_up),
            (MetricKind::Memory, thresholds.memory_scale_up),
        ];
        for (metric, limit) in watched {
            // Only a rising trend may trigger a speculative scale-up
            let Some(slope) = window.trend(metric).rising() else {
                continue;
            };
            let projected = sample.value(metric) + slope * lookahead_secs;
            if projected > limit {
                return Proposal {
                    target: current as i64 + 1,
                    reason: format!(
                        "predicted {} {:.1}% > {:.1}% within {:.0}s",
                        metric, projected, limit, lookahead_secs
                    ),
                    projected: Some(projected),
                };
            }
        }
    }

    // Scale-down is reactive only
    linear(current, pressure)
}
