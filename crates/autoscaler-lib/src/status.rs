//! Status reporting for the control loop
//!
//! The loop publishes a full snapshot at the end of every tick; the HTTP
//! layer only ever reads. Health and readiness are derived from the loop
//! timestamps at read time, so a stalled loop shows up as degraded without
//! the loop having to report it.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Health status of the control loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    /// Ticks are completing on schedule
    Healthy,
    /// No tick completed recently, or a tick is stuck
    Degraded,
}

/// Last known state of one service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub name: String,
    pub replicas: u32,
    pub min_replicas: u32,
    pub max_replicas: u32,
    pub algorithm: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_direction: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_outcome: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_scaled_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_until: Option<DateTime<Utc>>,
    pub last_sample_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_average: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_average: Option<f64>,
}

/// Loop-level progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopStatus {
    pub ticks_completed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_tick_started: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_tick_completed: Option<DateTime<Utc>>,
    pub tick_in_progress: bool,
    pub stalled: bool,
    pub interval_secs: u64,
    pub dry_run: bool,
}

/// Everything served at `/status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    #[serde(rename = "loop")]
    pub loop_status: LoopStatus,
    pub services: BTreeMap<String, ServiceStatus>,
}

/// Overall health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_tick_completed: Option<DateTime<Utc>>,
}

/// Readiness response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Shared, read-mostly view of loop and service state
#[derive(Debug, Clone)]
pub struct StatusReporter {
    snapshot: Arc<RwLock<StatusSnapshot>>,
    ready: Arc<RwLock<bool>>,
    started_at: DateTime<Utc>,
}

impl StatusReporter {
    pub fn new(interval: Duration, dry_run: bool) -> Self {
        Self {
            snapshot: Arc::new(RwLock::new(StatusSnapshot {
                loop_status: LoopStatus {
                    ticks_completed: 0,
                    last_tick_started: None,
                    last_tick_completed: None,
                    tick_in_progress: false,
                    stalled: false,
                    interval_secs: interval.as_secs(),
                    dry_run,
                },
                services: BTreeMap::new(),
            })),
            ready: Arc::new(RwLock::new(false)),
            started_at: Utc::now(),
        }
    }

    /// Mark a tick as started
    pub async fn begin_tick(&self, now: DateTime<Utc>) {
        let mut snapshot = self.snapshot.write().await;
        snapshot.loop_status.last_tick_started = Some(now);
        snapshot.loop_status.tick_in_progress = true;
    }

    /// Replace the service view and mark the tick complete
    pub async fn publish(&self, services: BTreeMap<String, ServiceStatus>, now: DateTime<Utc>) {
        let mut snapshot = self.snapshot.write().await;
        snapshot.services = services;
        snapshot.loop_status.ticks_completed += 1;
        snapshot.loop_status.last_tick_completed = Some(now);
        snapshot.loop_status.tick_in_progress = false;
    }

    /// Replace the service view without counting a tick
    pub async fn publish_services(&self, services: BTreeMap<String, ServiceStatus>) {
        self.snapshot.write().await.services = services;
    }

    pub async fn set_interval(&self, interval: Duration) {
        self.snapshot.write().await.loop_status.interval_secs = interval.as_secs();
    }

    pub async fn set_ready(&self, ready: bool) {
        let mut r = self.ready.write().await;
        *r = ready;
    }

    /// Current snapshot with the stalled flag evaluated at `now`
    pub async fn snapshot_at(&self, now: DateTime<Utc>) -> StatusSnapshot {
        let mut snapshot = self.snapshot.read().await.clone();
        snapshot.loop_status.stalled = self.is_stalled(&snapshot.loop_status, now);
        snapshot
    }

    pub async fn snapshot(&self) -> StatusSnapshot {
        self.snapshot_at(Utc::now()).await
    }

    pub async fn service(&self, name: &str) -> Option<ServiceStatus> {
        self.snapshot.read().await.services.get(name).cloned()
    }

    /// Healthy while a tick completed within the last two intervals.
    ///
    /// Before the first tick the daemon gets two intervals of grace from
    /// startup.
    pub async fn health_at(&self, now: DateTime<Utc>) -> HealthResponse {
        let snapshot = self.snapshot.read().await;
        let status = &snapshot.loop_status;
        let window = stale_after(status.interval_secs);
        let reference = status.last_tick_completed.unwrap_or(self.started_at);

        if self.is_stalled(status, now) {
            return HealthResponse {
                status: ComponentStatus::Degraded,
                message: Some("tick in progress for more than two intervals".to_string()),
                last_tick_completed: status.last_tick_completed,
            };
        }

        if now - reference > window {
            let message = match status.last_tick_completed {
                Some(_) => "no tick completed within the last two intervals",
                None => "no tick completed since startup",
            };
            return HealthResponse {
                status: ComponentStatus::Degraded,
                message: Some(message.to_string()),
                last_tick_completed: status.last_tick_completed,
            };
        }

        HealthResponse {
            status: ComponentStatus::Healthy,
            message: None,
            last_tick_completed: status.last_tick_completed,
        }
    }

    pub async fn health(&self) -> HealthResponse {
        self.health_at(Utc::now()).await
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        let ready = *self.ready.read().await;
        if ready {
            ReadinessResponse {
                ready: true,
                reason: None,
            }
        } else {
            ReadinessResponse {
                ready: false,
                reason: Some("Control loop not yet initialized".to_string()),
            }
        }
    }

    fn is_stalled(&self, status: &LoopStatus, now: DateTime<Utc>) -> bool {
        status.tick_in_progress
            && status
                .last_tick_started
                .map(|started| now - started > stale_after(status.interval_secs))
                .unwrap_or(false)
    }
}

fn stale_after(interval_secs: u64) -> ChronoDuration {
    let secs = i64::try_from(interval_secs.saturating_mul(2)).unwrap_or(i64::MAX);
    ChronoDuration::try_seconds(secs).unwrap_or(ChronoDuration::MAX)
}
