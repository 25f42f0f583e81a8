//! Scaling executor
//!
//! Applies non-trivial decisions through the [`Orchestrator`] with bounded
//! exponential backoff. The profile is only updated after the orchestrator
//! confirms the command, so a failed application leaves no partial state.

use crate::config::RetryPolicy;
use crate::models::{ApplyOutcome, ScalingDecision};
use crate::profile::ServiceProfile;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// External system that owns replica placement
#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// Set the desired replica count. Must be idempotent.
    async fn scale(&self, service: &str, replicas: u32) -> Result<()>;

    /// Replica count the orchestrator currently reports
    async fn replicas(&self, service: &str) -> Result<u32>;

    /// True when commands are only logged and never reach a real orchestrator
    fn is_dry_run(&self) -> bool {
        false
    }
}

/// Orchestrator for monitoring-only mode: logs commands, changes nothing
#[derive(Debug, Default, Clone)]
pub struct DryRunOrchestrator;

#[async_trait]
impl Orchestrator for DryRunOrchestrator {
    async fn scale(&self, service: &str, replicas: u32) -> Result<()> {
        info!(
            service = %service,
            replicas = replicas,
            "Dry run: would scale service"
        );
        Ok(())
    }

    async fn replicas(&self, service: &str) -> Result<u32> {
        anyhow::bail!("dry run orchestrator does not track replicas for {}", service)
    }

    fn is_dry_run(&self) -> bool {
        true
    }
}

/// Issues scale commands with retry and tracks applied ticks
pub struct ScalingExecutor {
    orchestrator: Arc<dyn Orchestrator>,
    retry: RetryPolicy,
    /// Last tick handled per service
    handled_ticks: HashMap<String, u64>,
}

impl ScalingExecutor {
    pub fn new(orchestrator: Arc<dyn Orchestrator>, retry: RetryPolicy) -> Self {
        Self {
            orchestrator,
            retry,
            handled_ticks: HashMap::new(),
        }
    }

    pub fn set_retry_policy(&mut self, retry: RetryPolicy) {
        self.retry = retry;
    }

    pub fn orchestrator(&self) -> &Arc<dyn Orchestrator> {
        &self.orchestrator
    }

    /// Apply a decision to its profile.
    ///
    /// At most one successful command is issued per service per tick.
    pub async fn apply(
        &mut self,
        profile: &mut ServiceProfile,
        decision: &ScalingDecision,
        now: DateTime<Utc>,
    ) -> ApplyOutcome {
        if !decision.is_change() {
            return ApplyOutcome::NoAction;
        }

        if let Some(&last) = self.handled_ticks.get(&profile.name) {
            if decision.tick <= last {
                warn!(
                    service = %profile.name,
                    tick = decision.tick,
                    last_tick = last,
                    "Ignoring decision for a tick that was already handled"
                );
                return ApplyOutcome::Duplicate {
                    tick: decision.tick,
                };
            }
        }

        let target = decision.target_replicas;
        if !profile.within_bounds(target) {
            return ApplyOutcome::Rejected {
                reason: format!(
                    "target {} outside [{}, {}]",
                    target, profile.min_replicas, profile.max_replicas
                ),
            };
        }
        if profile.current_replicas != decision.current_replicas {
            return ApplyOutcome::Rejected {
                reason: format!(
                    "stale decision: made at {} replicas, service now at {}",
                    decision.current_replicas, profile.current_replicas
                ),
            };
        }

        self.handled_ticks.insert(profile.name.clone(), decision.tick);

        let from = profile.current_replicas;
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.orchestrator.scale(&profile.name, target).await {
                Ok(()) if self.orchestrator.is_dry_run() => {
                    // Nothing was scaled, so replicas and cooldown stay as observed
                    return ApplyOutcome::Simulated { from, to: target };
                }
                Ok(()) => {
                    profile.record_scale(target, now);
                    debug!(
                        service = %profile.name,
                        from = from,
                        to = target,
                        attempts = attempts,
                        "Scale command confirmed"
                    );
                    return ApplyOutcome::Applied {
                        from,
                        to: target,
                        attempts,
                    };
                }
                Err(e) => {
                    if attempts >= self.retry.max_attempts {
                        return ApplyOutcome::Failed {
                            attempts,
                            error: format!("{:#}", e),
                        };
                    }

                    let backoff = self.retry.backoff(attempts);
                    warn!(
                        service = %profile.name,
                        error = %e,
                        attempt = attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        "Scale command failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    /// Forget tick history for services no longer configured
    pub fn retain<'a>(&mut self, services: impl IntoIterator<Item = &'a str>) {
        let keep: std::collections::HashSet<&str> = services.into_iter().collect();
        self.handled_ticks
            .retain(|name, _| keep.contains(name.as_str()));
    }
}
