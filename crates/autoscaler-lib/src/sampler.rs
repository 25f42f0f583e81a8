//! Concurrent metric sampling
//!
//! Fans one metric request per service out over a bounded number of
//! concurrent calls. Each call has its own timeout, capped by the tick
//! deadline. A failed or late call yields an invalid sample for that service
//! and never fails the whole collection.

use crate::models::{MetricReading, MetricSample};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

/// Source of point-in-time metrics for a service
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Fetch the current reading for a service
    async fn sample(&self, service: &str) -> Result<MetricReading>;
}

/// Results from one sampling round
#[derive(Debug, Default)]
pub struct CollectionResults {
    /// One sample per requested service, possibly invalid
    pub samples: HashMap<String, MetricSample>,
    /// Failure reason for every invalid sample
    pub errors: HashMap<String, String>,
}

impl CollectionResults {
    pub fn success_count(&self) -> usize {
        self.samples.values().filter(|s| s.valid).count()
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }
}

/// Parallel sampler with per-call timeout and a concurrency cap
pub struct Sampler {
    source: Arc<dyn MetricSource>,
    timeout: Duration,
    limit: Arc<Semaphore>,
}

impl Sampler {
    pub fn new(source: Arc<dyn MetricSource>, timeout: Duration, max_concurrent: usize) -> Self {
        Self {
            source,
            timeout,
            limit: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Sample every service, stamping results with `now`.
    ///
    /// Calls still running at `deadline` are abandoned and reported invalid.
    pub async fn collect(
        &self,
        services: &[String],
        now: DateTime<Utc>,
        deadline: Instant,
    ) -> CollectionResults {
        let mut results = CollectionResults::default();
        for name in services {
            results
                .samples
                .insert(name.clone(), MetricSample::invalid(now));
            results
                .errors
                .insert(name.clone(), "collection did not complete".to_string());
        }

        let mut tasks = JoinSet::new();
        for name in services {
            let source = Arc::clone(&self.source);
            let limit = Arc::clone(&self.limit);
            let per_call = self.timeout;
            let name = name.clone();

            tasks.spawn(async move {
                let outcome = sample_one(source, limit, &name, per_call, deadline).await;
                (name, outcome)
            });
        }

        loop {
            let joined = match timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(joined)) => joined,
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        pending = tasks.len(),
                        "Tick deadline reached during sampling, abandoning pending calls"
                    );
                    tasks.abort_all();
                    break;
                }
            };

            match joined {
                Ok((name, Ok(reading))) => {
                    results
                        .samples
                        .insert(name.clone(), MetricSample::from_reading(now, reading));
                    results.errors.remove(&name);
                }
                Ok((name, Err(e))) => {
                    debug!(service = %name, error = %e, "Failed to sample service");
                    results.errors.insert(name, e.to_string());
                }
                Err(e) => {
                    warn!(error = %e, "Sampling task panicked");
                }
            }
        }

        results
    }
}

async fn sample_one(
    source: Arc<dyn MetricSource>,
    limit: Arc<Semaphore>,
    service: &str,
    per_call: Duration,
    deadline: Instant,
) -> Result<MetricReading> {
    let _permit = match timeout_at(deadline, limit.acquire_owned()).await {
        Ok(Ok(permit)) => permit,
        Ok(Err(_)) => return Err(anyhow!("sampler closed")),
        Err(_) => return Err(anyhow!("no sampling slot before tick deadline")),
    };

    let started = Instant::now();
    let call_deadline = started
        .checked_add(per_call)
        .map_or(deadline, |limit| limit.min(deadline));
    let reading = match timeout_at(call_deadline, source.sample(service)).await {
        Ok(result) => result?,
        Err(_) => {
            return Err(anyhow!(
                "timed out after {}ms",
                call_deadline.saturating_duration_since(started).as_millis()
            ))
        }
    };

    validate_reading(&reading)?;
    Ok(reading)
}

fn validate_reading(reading: &MetricReading) -> Result<()> {
    let values = [
        ("cpu_percent", reading.cpu_percent),
        ("memory_percent", reading.memory_percent),
        ("response_time_ms", reading.response_time_ms),
        ("error_rate_percent", reading.error_rate_percent),
    ];
    for (name, value) in values {
        if !value.is_finite() || value < 0.0 {
            return Err(anyhow!("malformed reading: {} = {}", name, value));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Mock source with per-service delay and failure behavior
    struct MockSource {
        delays: HashMap<String, Duration>,
        failing: Vec<String>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl MockSource {
        fn new() -> Self {
            Self {
                delays: HashMap::new(),
                failing: Vec::new(),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }

        fn delay(mut self, service: &str, delay: Duration) -> Self {
            self.delays.insert(service.to_string(), delay);
            self
        }

        fn failing(mut self, service: &str) -> Self {
            self.failing.push(service.to_string());
            self
        }
    }

    #[async_trait]
    impl MetricSource for MockSource {
        async fn sample(&self, service: &str) -> Result<MetricReading> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);

            if let Some(delay) = self.delays.get(service) {
                tokio::time::sleep(*delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.failing.iter().any(|s| s == service) {
                return Err(anyhow!("connection refused"));
            }
            if service == "garbage" {
                return Ok(MetricReading {
                    cpu_percent: f64::NAN,
                    memory_percent: 10.0,
                    response_time_ms: 0.0,
                    error_rate_percent: 0.0,
                });
            }

            Ok(MetricReading {
                cpu_percent: 42.0,
                memory_percent: 55.0,
                response_time_ms: 120.0,
                error_rate_percent: 0.5,
            })
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(10)
    }

    #[tokio::test]
    async fn test_collect_all_services() {
        let sampler = Sampler::new(Arc::new(MockSource::new()), Duration::from_secs(1), 4);
        let now = Utc::now();
        let results = sampler
            .collect(&names(&["api", "redis", "postgres"]), now, far_deadline())
            .await;

        assert_eq!(results.success_count(), 3);
        assert_eq!(results.error_count(), 0);
        let api = results.samples["api"];
        assert!(api.valid);
        assert_eq!(api.timestamp, now);
        assert_eq!(api.cpu_percent, 42.0);
    }

    #[tokio::test]
    async fn test_timeout_marks_only_slow_service_invalid() {
        let source = MockSource::new().delay("redis", Duration::from_millis(500));
        let sampler = Sampler::new(Arc::new(source), Duration::from_millis(50), 4);

        let results = sampler
            .collect(&names(&["api", "redis", "postgres"]), Utc::now(), far_deadline())
            .await;

        assert!(results.samples["api"].valid);
        assert!(results.samples["postgres"].valid);
        assert!(!results.samples["redis"].valid);
        assert!(results.errors["redis"].contains("timed out"));
    }

    #[tokio::test]
    async fn test_error_marks_service_invalid() {
        let source = MockSource::new().failing("postgres");
        let sampler = Sampler::new(Arc::new(source), Duration::from_secs(1), 4);

        let results = sampler
            .collect(&names(&["api", "postgres"]), Utc::now(), far_deadline())
            .await;

        assert_eq!(results.success_count(), 1);
        assert!(!results.samples["postgres"].valid);
        assert!(results.errors["postgres"].contains("connection refused"));
    }

    #[tokio::test]
    async fn test_malformed_reading_is_invalid() {
        let sampler = Sampler::new(Arc::new(MockSource::new()), Duration::from_secs(1), 4);
        let results = sampler
            .collect(&names(&["garbage"]), Utc::now(), far_deadline())
            .await;

        assert!(!results.samples["garbage"].valid);
        assert!(results.errors["garbage"].contains("malformed"));
    }

    #[tokio::test]
    async fn test_concurrency_is_capped() {
        let mut source = MockSource::new();
        for name in ["a", "b", "c", "d", "e", "f"] {
            source = source.delay(name, Duration::from_millis(20));
        }
        let source = Arc::new(source);
        let sampler = Sampler::new(source.clone(), Duration::from_secs(1), 2);

        let results = sampler
            .collect(&names(&["a", "b", "c", "d", "e", "f"]), Utc::now(), far_deadline())
            .await;

        assert_eq!(results.success_count(), 6);
        assert!(source.max_in_flight.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_tick_deadline_bounds_collection() {
        let source = MockSource::new().delay("slow", Duration::from_secs(5));
        let sampler = Sampler::new(Arc::new(source), Duration::from_secs(10), 4);

        let started = Instant::now();
        let results = sampler
            .collect(
                &names(&["slow", "fast"]),
                Utc::now(),
                Instant::now() + Duration::from_millis(100),
            )
            .await;

        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(results.samples["fast"].valid);
        assert!(!results.samples["slow"].valid);
    }
}
