//! Observability infrastructure for the autoscaler
//!
//! Provides:
//! - Prometheus metrics (replicas, decisions, failures, per-service load, tick latency)
//! - Structured JSON logging with tracing

use crate::models::{MetricSample, ScalingDecision};
use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, register_int_counter_vec,
    register_int_gauge_vec, GaugeVec, Histogram, IntCounter, IntCounterVec, IntGaugeVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for tick duration (in seconds)
const TICK_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<AutoscalerMetricsInner> = OnceLock::new();

struct AutoscalerMetricsInner {
    replicas: IntGaugeVec,
    decisions: IntCounterVec,
    scale_failures: IntCounterVec,
    sample_failures: IntCounterVec,
    service_load: GaugeVec,
    tick_duration_seconds: Histogram,
    budget_skips: IntCounter,
}

impl AutoscalerMetricsInner {
    fn new() -> Self {
        Self {
            replicas: register_int_gauge_vec!(
                "autoscaler_replicas",
                "Current replica count per service",
                &["service"]
            )
            .expect("Failed to register replicas"),

            decisions: register_int_counter_vec!(
                "autoscaler_decisions_total",
                "Scaling decisions that requested a replica change",
                &["service", "direction"]
            )
            .expect("Failed to register decisions"),

            scale_failures: register_int_counter_vec!(
                "autoscaler_scale_failures_total",
                "Scale commands that failed after all retries",
                &["service"]
            )
            .expect("Failed to register scale_failures"),

            sample_failures: register_int_counter_vec!(
                "autoscaler_sample_failures_total",
                "Metric collections that failed or timed out",
                &["service"]
            )
            .expect("Failed to register sample_failures"),

            service_load: register_gauge_vec!(
                "autoscaler_service_metric",
                "Latest sampled metric value per service",
                &["service", "metric"]
            )
            .expect("Failed to register service_metric"),

            tick_duration_seconds: register_histogram!(
                "autoscaler_tick_duration_seconds",
                "Wall-clock duration of one control loop tick",
                TICK_BUCKETS.to_vec()
            )
            .expect("Failed to register tick_duration_seconds"),

            budget_skips: register_int_counter!(
                "autoscaler_tick_budget_skips_total",
                "Services held because the tick budget ran out"
            )
            .expect("Failed to register tick_budget_skips"),
        }
    }
}

/// Autoscaler metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the
/// same underlying collectors.
#[derive(Clone)]
pub struct AutoscalerMetrics {
    _private: (),
}

impl Default for AutoscalerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AutoscalerMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(AutoscalerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &AutoscalerMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn set_replicas(&self, service: &str, replicas: u32) {
        self.inner()
            .replicas
            .with_label_values(&[service])
            .set(i64::from(replicas));
    }

    pub fn inc_decision(&self, service: &str, direction: &str) {
        self.inner()
            .decisions
            .with_label_values(&[service, direction])
            .inc();
    }

    pub fn inc_scale_failure(&self, service: &str) {
        self.inner().scale_failures.with_label_values(&[service]).inc();
    }

    pub fn inc_sample_failure(&self, service: &str) {
        self.inner().sample_failures.with_label_values(&[service]).inc();
    }

    /// Export the latest valid sample for a service
    pub fn observe_sample(&self, service: &str, sample: &MetricSample) {
        let load = &self.inner().service_load;
        load.with_label_values(&[service, "cpu_percent"])
            .set(sample.cpu_percent);
        load.with_label_values(&[service, "memory_percent"])
            .set(sample.memory_percent);
        load.with_label_values(&[service, "response_time_ms"])
            .set(sample.response_time_ms);
        load.with_label_values(&[service, "error_rate_percent"])
            .set(sample.error_rate_percent);
    }

    pub fn observe_tick_duration(&self, duration_secs: f64) {
        self.inner().tick_duration_seconds.observe(duration_secs);
    }

    pub fn inc_budget_skips(&self, count: u64) {
        self.inner().budget_skips.inc_by(count);
    }

    /// Drop per-service series for a service removed by a reload
    pub fn forget_service(&self, service: &str) {
        let inner = self.inner();
        let _ = inner.replicas.remove_label_values(&[service]);
        for metric in [
            "cpu_percent",
            "memory_percent",
            "response_time_ms",
            "error_rate_percent",
        ] {
            let _ = inner.service_load.remove_label_values(&[service, metric]);
        }
    }
}

/// Structured logger for autoscaler audit events
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    /// Log a decision that requested a replica change
    pub fn log_decision(&self, decision: &ScalingDecision) {
        info!(
            event = "scaling_decision",
            instance = %self.instance,
            service = %decision.service,
            tick = decision.tick,
            direction = decision.direction.as_str(),
            current_replicas = decision.current_replicas,
            target_replicas = decision.target_replicas,
            reason = %decision.reason,
            cpu_percent = decision.trigger.cpu_percent,
            memory_percent = decision.trigger.memory_percent,
            response_time_ms = decision.trigger.response_time_ms,
            error_rate_percent = decision.trigger.error_rate_percent,
            projected = ?decision.trigger.projected,
            "Scaling decision"
        );
    }

    pub fn log_scale_applied(&self, service: &str, from: u32, to: u32, attempts: u32) {
        info!(
            event = "scale_applied",
            instance = %self.instance,
            service = %service,
            from = from,
            to = to,
            attempts = attempts,
            "Service scaled"
        );
    }

    pub fn log_scale_failed(&self, service: &str, target: u32, attempts: u32, error: &str) {
        warn!(
            event = "scale_failed",
            instance = %self.instance,
            service = %service,
            target_replicas = target,
            attempts = attempts,
            error = %error,
            "Scale command failed, keeping current replica count"
        );
    }

    pub fn log_tick(
        &self,
        tick: u64,
        duration_ms: u64,
        valid_samples: usize,
        invalid_samples: usize,
        actions: usize,
        budget_skips: usize,
    ) {
        info!(
            event = "tick_completed",
            instance = %self.instance,
            tick = tick,
            duration_ms = duration_ms,
            valid_samples = valid_samples,
            invalid_samples = invalid_samples,
            actions = actions,
            budget_skips = budget_skips,
            "Control loop tick completed"
        );
    }

    pub fn log_config_reload(&self, services: usize, success: bool, detail: &str) {
        if success {
            info!(
                event = "config_reloaded",
                instance = %self.instance,
                services = services,
                "Configuration reloaded"
            );
        } else {
            warn!(
                event = "config_reload_rejected",
                instance = %self.instance,
                error = %detail,
                "Configuration reload rejected, keeping previous configuration"
            );
        }
    }

    pub fn log_startup(&self, version: &str, services: usize, dry_run: bool) {
        info!(
            event = "autoscaler_started",
            instance = %self.instance,
            version = %version,
            services = services,
            dry_run = dry_run,
            "Autoscaler started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "autoscaler_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Autoscaler shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_autoscaler_metrics_creation() {
        let metrics = AutoscalerMetrics::new();
        let clone = metrics.clone();

        metrics.set_replicas("api", 3);
        metrics.inc_decision("api", "up");
        clone.inc_scale_failure("api");
        clone.inc_sample_failure("redis");
        metrics.observe_sample(
            "api",
            &MetricSample::invalid(Utc::now()),
        );
        metrics.observe_tick_duration(0.02);
        metrics.inc_budget_skips(2);
        metrics.forget_service("api");
    }

    #[test]
    fn test_metrics_are_gathered() {
        let metrics = AutoscalerMetrics::new();
        metrics.set_replicas("gathered", 4);

        let families = prometheus::gather();
        assert!(families.iter().any(|f| f.get_name() == "autoscaler_replicas"));
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("test-instance");
        assert_eq!(logger.instance, "test-instance");
    }
}
