//! Control loop
//!
//! A single owned actor drives every tick: sample all services in parallel,
//! record trends, then decide and apply sequentially in service name order.
//! Configuration reloads arrive over a channel and are applied between
//! ticks, never during one.

use crate::config::{AutoscalerConfig, LoopSettings};
use crate::engine::{self, REASON_TICK_BUDGET};
use crate::error::ConfigError;
use crate::executor::{Orchestrator, ScalingExecutor};
use crate::models::{ApplyOutcome, MetricKind, MetricSample, ScalingDecision, TriggerMetrics};
use crate::observability::{AutoscalerMetrics, StructuredLogger};
use crate::profile::ServiceProfile;
use crate::sampler::{MetricSource, Sampler};
use crate::status::{ServiceStatus, StatusReporter};
use crate::trend::TrendStore;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Per-service bookkeeping that outlives a single tick
#[derive(Debug, Clone, Default)]
struct ServiceLedger {
    last_decision: Option<ScalingDecision>,
    last_outcome: Option<ApplyOutcome>,
    last_failed_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    last_sample_valid: bool,
}

/// Summary of one tick
#[derive(Debug, Clone)]
pub struct TickReport {
    pub tick: u64,
    pub decisions: Vec<ScalingDecision>,
    pub outcomes: BTreeMap<String, ApplyOutcome>,
    /// Sampling failures by service
    pub sample_errors: HashMap<String, String>,
    pub budget_skips: usize,
    pub duration: Duration,
}

impl TickReport {
    pub fn decision(&self, service: &str) -> Option<&ScalingDecision> {
        self.decisions.iter().find(|d| d.service == service)
    }

    pub fn applied(&self) -> usize {
        self.outcomes
            .values()
            .filter(|o| matches!(o, ApplyOutcome::Applied { .. }))
            .count()
    }
}

/// Owns all scaling state and runs ticks on a fixed interval
pub struct ControlLoop {
    profiles: BTreeMap<String, ServiceProfile>,
    ledger: BTreeMap<String, ServiceLedger>,
    settings: LoopSettings,
    source: Arc<dyn MetricSource>,
    sampler: Sampler,
    trends: TrendStore,
    executor: ScalingExecutor,
    status: StatusReporter,
    metrics: AutoscalerMetrics,
    logger: StructuredLogger,
    tick: u64,
}

impl ControlLoop {
    /// Validate the configuration and build the loop
    pub fn new(
        config: &AutoscalerConfig,
        source: Arc<dyn MetricSource>,
        orchestrator: Arc<dyn Orchestrator>,
        status: StatusReporter,
    ) -> Result<Self, ConfigError> {
        let (settings, profiles) = config.validate()?;
        let metrics = AutoscalerMetrics::new();

        let profiles: BTreeMap<String, ServiceProfile> = profiles
            .into_iter()
            .map(|p| (p.name.clone(), p))
            .collect();
        for profile in profiles.values() {
            metrics.set_replicas(&profile.name, profile.current_replicas);
        }
        let ledger = profiles
            .keys()
            .map(|name| (name.clone(), ServiceLedger::default()))
            .collect();

        Ok(Self {
            sampler: Sampler::new(
                Arc::clone(&source),
                settings.sample_timeout,
                settings.max_concurrent_samples,
            ),
            trends: TrendStore::new(settings.trend_window_size, settings.trend_min_samples),
            executor: ScalingExecutor::new(orchestrator, settings.retry.clone()),
            source,
            profiles,
            ledger,
            settings,
            status,
            metrics,
            logger: StructuredLogger::new("autoscaler"),
            tick: 0,
        })
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn profile(&self, name: &str) -> Option<&ServiceProfile> {
        self.profiles.get(name)
    }

    pub fn profiles(&self) -> impl Iterator<Item = &ServiceProfile> {
        self.profiles.values()
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    pub fn ticks(&self) -> u64 {
        self.tick
    }

    /// Adopt replica counts reported by the orchestrator.
    ///
    /// Services the orchestrator cannot report keep their configured count.
    pub async fn sync_replicas(&mut self) {
        let orchestrator = Arc::clone(self.executor.orchestrator());
        for profile in self.profiles.values_mut() {
            match orchestrator.replicas(&profile.name).await {
                Ok(observed) => {
                    if observed != profile.current_replicas {
                        info!(
                            service = %profile.name,
                            configured = profile.current_replicas,
                            observed = observed,
                            "Adopting replica count reported by orchestrator"
                        );
                    }
                    profile.current_replicas = observed;
                    self.metrics.set_replicas(&profile.name, observed);
                }
                Err(e) => {
                    debug!(
                        service = %profile.name,
                        error = %e,
                        "Could not read replica count, keeping configured value"
                    );
                }
            }
        }
        self.status.publish_services(self.service_statuses()).await;
    }

    /// Run one complete sample, decide, apply cycle
    pub async fn run_tick(&mut self, now: DateTime<Utc>) -> TickReport {
        self.tick += 1;
        let tick = self.tick;
        let started = Instant::now();
        let deadline = started + self.settings.tick_budget;
        self.status.begin_tick(now).await;

        let names: Vec<String> = self.profiles.keys().cloned().collect();
        let results = self.sampler.collect(&names, now, deadline).await;

        for name in &names {
            let sample = results
                .samples
                .get(name)
                .copied()
                .unwrap_or_else(|| MetricSample::invalid(now));
            let entry = self.ledger.entry(name.clone()).or_default();
            entry.last_sample_valid = sample.valid;

            if sample.valid {
                self.trends.record(name, sample);
                self.metrics.observe_sample(name, &sample);
            } else {
                self.metrics.inc_sample_failure(name);
                if let Some(error) = results.errors.get(name) {
                    entry.last_error = Some(format!("sampling: {}", error));
                }
            }
        }

        let mut decisions = Vec::with_capacity(names.len());
        let mut outcomes = BTreeMap::new();
        let mut budget_skips = 0;

        for name in &names {
            let sample = results
                .samples
                .get(name)
                .copied()
                .unwrap_or_else(|| MetricSample::invalid(now));
            let Some(profile) = self.profiles.get_mut(name) else {
                continue;
            };

            let decision = if Instant::now() >= deadline {
                budget_skips += 1;
                engine::hold(
                    profile,
                    tick,
                    now,
                    REASON_TICK_BUDGET,
                    TriggerMetrics::from(&sample),
                )
            } else {
                engine::decide(profile, &sample, self.trends.window(name), now, tick)
            };

            let outcome = if decision.is_change() {
                self.logger.log_decision(&decision);
                self.metrics
                    .inc_decision(name, decision.direction.as_str());
                self.executor.apply(profile, &decision, now).await
            } else {
                debug!(service = %name, tick = tick, reason = %decision.reason, "No scaling action");
                ApplyOutcome::NoAction
            };

            let entry = self.ledger.entry(name.clone()).or_default();
            match &outcome {
                ApplyOutcome::Applied { from, to, attempts } => {
                    self.logger.log_scale_applied(name, *from, *to, *attempts);
                    self.metrics.set_replicas(name, *to);
                    entry.last_error = None;
                }
                ApplyOutcome::Simulated { from, to } => {
                    info!(service = %name, from = *from, to = *to, "Dry run: replica count left unchanged");
                    entry.last_error = None;
                }
                ApplyOutcome::Failed { attempts, error } => {
                    self.logger
                        .log_scale_failed(name, decision.target_replicas, *attempts, error);
                    self.metrics.inc_scale_failure(name);
                    entry.last_failed_at = Some(now);
                    entry.last_error = Some(error.clone());
                }
                ApplyOutcome::Rejected { reason } => {
                    warn!(service = %name, tick = tick, reason = %reason, "Scaling decision rejected");
                    entry.last_error = Some(reason.clone());
                }
                ApplyOutcome::Duplicate { .. } | ApplyOutcome::NoAction => {}
            }

            entry.last_decision = Some(decision.clone());
            entry.last_outcome = Some(outcome.clone());
            outcomes.insert(name.clone(), outcome);
            decisions.push(decision);
        }

        if budget_skips > 0 {
            warn!(
                tick = tick,
                skipped = budget_skips,
                budget_ms = self.settings.tick_budget.as_millis() as u64,
                "Tick budget exceeded, holding remaining services"
            );
            self.metrics.inc_budget_skips(budget_skips as u64);
        }

        let duration = started.elapsed();
        self.status.publish(self.service_statuses(), Utc::now()).await;
        self.metrics.observe_tick_duration(duration.as_secs_f64());

        let report = TickReport {
            tick,
            decisions,
            outcomes,
            sample_errors: results.errors,
            budget_skips,
            duration,
        };
        self.logger.log_tick(
            tick,
            duration.as_millis() as u64,
            names.len().saturating_sub(report.sample_errors.len()),
            report.sample_errors.len(),
            report.applied(),
            budget_skips,
        );
        report
    }

    /// Apply a new configuration between ticks.
    ///
    /// On error nothing changes. Existing services keep their replica
    /// count, cooldown and trend history; removed services are forgotten.
    pub async fn reload(&mut self, config: &AutoscalerConfig) -> Result<(), ConfigError> {
        let (settings, profiles) = config.validate()?;

        let mut next = BTreeMap::new();
        for updated in profiles {
            let name = updated.name.clone();
            let profile = match self.profiles.remove(&name) {
                Some(mut existing) => {
                    existing.reconfigure(updated);
                    existing
                }
                None => {
                    info!(service = %name, replicas = updated.current_replicas, "Tracking new service");
                    self.metrics.set_replicas(&name, updated.current_replicas);
                    updated
                }
            };
            next.insert(name, profile);
        }

        for removed in self.profiles.keys() {
            info!(service = %removed, "Service removed from configuration");
            self.metrics.forget_service(removed);
        }
        self.profiles = next;

        let names: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
        self.ledger.retain(|name, _| names.contains(&name.as_str()));
        for name in &names {
            self.ledger.entry(name.to_string()).or_default();
        }

        if settings.trend_window_size != self.settings.trend_window_size
            || settings.trend_min_samples != self.settings.trend_min_samples
        {
            self.trends = TrendStore::new(settings.trend_window_size, settings.trend_min_samples);
        } else {
            self.trends.retain(names.iter().copied());
        }
        self.executor.retain(names.iter().copied());
        self.executor.set_retry_policy(settings.retry.clone());
        self.sampler = Sampler::new(
            Arc::clone(&self.source),
            settings.sample_timeout,
            settings.max_concurrent_samples,
        );
        self.status.set_interval(settings.check_interval).await;
        self.settings = settings;

        self.status.publish_services(self.service_statuses()).await;
        Ok(())
    }

    /// Drive ticks until shutdown
    pub async fn run(
        mut self,
        mut reloads: mpsc::Receiver<AutoscalerConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        info!(
            interval_secs = self.settings.check_interval.as_secs(),
            services = self.profiles.len(),
            "Starting control loop"
        );

        self.status.publish_services(self.service_statuses()).await;
        self.status.set_ready(true).await;

        let mut ticker = tick_interval(Instant::now(), self.settings.check_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_tick(Utc::now()).await;
                }
                Some(config) = reloads.recv() => {
                    let previous = self.settings.check_interval;
                    match self.reload(&config).await {
                        Ok(()) => {
                            self.logger.log_config_reload(self.profiles.len(), true, "");
                            if self.settings.check_interval != previous {
                                let interval = self.settings.check_interval;
                                ticker = tick_interval(Instant::now() + interval, interval);
                            }
                        }
                        Err(e) => {
                            self.logger.log_config_reload(self.profiles.len(), false, &e.to_string());
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down control loop");
                    break;
                }
            }
        }

        self.status.set_ready(false).await;
    }

    fn service_statuses(&self) -> BTreeMap<String, ServiceStatus> {
        self.profiles
            .values()
            .map(|profile| {
                let ledger = self.ledger.get(&profile.name).cloned().unwrap_or_default();
                let status = ServiceStatus {
                    name: profile.name.clone(),
                    replicas: profile.current_replicas,
                    min_replicas: profile.min_replicas,
                    max_replicas: profile.max_replicas,
                    algorithm: profile.algorithm.name().to_string(),
                    last_direction: ledger
                        .last_decision
                        .as_ref()
                        .map(|d| d.direction.as_str().to_string()),
                    last_reason: ledger.last_decision.map(|d| d.reason),
                    last_outcome: ledger.last_outcome.map(|o| o.label().to_string()),
                    last_scaled_at: profile.last_scaled_at,
                    last_failed_at: ledger.last_failed_at,
                    last_error: ledger.last_error,
                    cooldown_until: profile.cooldown_until,
                    last_sample_valid: ledger.last_sample_valid,
                    cpu_average: self.trends.moving_average(&profile.name, MetricKind::Cpu),
                    memory_average: self
                        .trends
                        .moving_average(&profile.name, MetricKind::Memory),
                };
                (profile.name.clone(), status)
            })
            .collect()
    }
}

fn tick_interval(start: Instant, period: Duration) -> tokio::time::Interval {
    let mut ticker = interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}
