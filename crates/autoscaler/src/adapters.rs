//! HTTP adapters for the metric source and orchestrator seams

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use autoscaler_lib::{MetricReading, MetricSource, Orchestrator};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};
use url::Url;

/// Payload served by a service's metrics endpoint
#[derive(Debug, Deserialize)]
struct MetricsPayload {
    cpu_percent: f64,
    memory_percent: f64,
    #[serde(default)]
    response_time_ms: Option<f64>,
    #[serde(default)]
    error_rate_percent: Option<f64>,
}

/// Reads per-service metrics from JSON endpoints
pub struct HttpMetricSource {
    client: Client,
    endpoints: RwLock<HashMap<String, Url>>,
    timeout: RwLock<Duration>,
}

impl HttpMetricSource {
    /// The sampler enforces its own per-call timeout; `timeout` is a
    /// per-request backstop and follows reloads through [`Self::set_timeout`]
    pub fn new(endpoints: HashMap<String, Url>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            endpoints: RwLock::new(endpoints),
            timeout: RwLock::new(timeout),
        })
    }

    pub fn set_timeout(&self, timeout: Duration) {
        match self.timeout.write() {
            Ok(mut current) => *current = timeout,
            Err(poisoned) => *poisoned.into_inner() = timeout,
        }
    }

    fn timeout(&self) -> Duration {
        match self.timeout.read() {
            Ok(timeout) => *timeout,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Swap in endpoints from a reloaded configuration
    pub fn set_endpoints(&self, endpoints: HashMap<String, Url>) {
        match self.endpoints.write() {
            Ok(mut current) => *current = endpoints,
            Err(poisoned) => *poisoned.into_inner() = endpoints,
        }
    }

    fn endpoint(&self, service: &str) -> Option<Url> {
        match self.endpoints.read() {
            Ok(endpoints) => endpoints.get(service).cloned(),
            Err(poisoned) => poisoned.into_inner().get(service).cloned(),
        }
    }
}

#[async_trait]
impl MetricSource for HttpMetricSource {
    async fn sample(&self, service: &str) -> Result<MetricReading> {
        let url = self
            .endpoint(service)
            .ok_or_else(|| anyhow!("No metrics endpoint for {}", service))?;

        let started = Instant::now();
        let response = self
            .client
            .get(url)
            .timeout(self.timeout())
            .send()
            .await
            .context("Failed to reach metrics endpoint")?;
        // Request latency stands in for response time when the service
        // does not report one
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        if !response.status().is_success() {
            anyhow::bail!("Metrics endpoint returned {}", response.status());
        }

        let payload: MetricsPayload = response
            .json()
            .await
            .context("Failed to parse metrics payload")?;

        Ok(MetricReading {
            cpu_percent: payload.cpu_percent,
            memory_percent: payload.memory_percent,
            response_time_ms: payload.response_time_ms.unwrap_or(latency_ms),
            error_rate_percent: payload.error_rate_percent.unwrap_or(0.0),
        })
    }
}

#[derive(Debug, Serialize)]
struct ScaleRequest {
    replicas: u32,
}

#[derive(Debug, Deserialize)]
struct ServiceState {
    replicas: u32,
}

/// Sets replica counts through the orchestrator's HTTP API
pub struct HttpOrchestrator {
    client: Client,
    base_url: Url,
}

impl HttpOrchestrator {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let mut base_url = Url::parse(base_url).context("Invalid orchestrator URL")?;
        // Keep any path prefix when joining relative paths
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self { client, base_url })
    }

    fn service_url(&self, service: &str, suffix: &str) -> Result<Url> {
        self.base_url
            .join(&format!("services/{}{}", service, suffix))
            .context("Invalid service path")
    }
}

#[async_trait]
impl Orchestrator for HttpOrchestrator {
    async fn scale(&self, service: &str, replicas: u32) -> Result<()> {
        let url = self.service_url(service, "/replicas")?;

        let response = self
            .client
            .put(url)
            .json(&ScaleRequest { replicas })
            .send()
            .await
            .context("Failed to send scale request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Orchestrator error ({}): {}", status, body);
        }

        Ok(())
    }

    async fn replicas(&self, service: &str) -> Result<u32> {
        let url = self.service_url(service, "")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to query service")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Orchestrator error ({}): {}", status, body);
        }

        let state: ServiceState = response
            .json()
            .await
            .context("Failed to parse service state")?;
        Ok(state.replicas)
    }
}
