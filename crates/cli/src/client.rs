//! API client for the autoscaler status endpoints

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// API client for the autoscaler daemon
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// GET a JSON resource, failing on any non-success status
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let (status, body) = self.get_with_status(path).await?;
        if !status.is_success() {
            let message = serde_json::from_slice::<ErrorResponse>(&body)
                .map(|e| e.error)
                .unwrap_or_else(|_| String::from_utf8_lossy(&body).into_owned());
            anyhow::bail!("API error ({}): {}", status, message);
        }

        serde_json::from_slice(&body).context("Failed to parse response")
    }

    /// GET a JSON resource whose body is meaningful regardless of status
    pub async fn get_any<T: DeserializeOwned>(&self, path: &str) -> Result<(StatusCode, T)> {
        let (status, body) = self.get_with_status(path).await?;
        let parsed = serde_json::from_slice(&body).context("Failed to parse response")?;
        Ok((status, parsed))
    }

    async fn get_with_status(&self, path: &str) -> Result<(StatusCode, Vec<u8>)> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .context("Failed to read response body")?;
        Ok((status, body.to_vec()))
    }
}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopStatus {
    pub ticks_completed: u64,
    #[serde(default)]
    pub last_tick_started: Option<String>,
    #[serde(default)]
    pub last_tick_completed: Option<String>,
    pub tick_in_progress: bool,
    pub stalled: bool,
    pub interval_secs: u64,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub name: String,
    pub replicas: u32,
    pub min_replicas: u32,
    pub max_replicas: u32,
    pub algorithm: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_direction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_outcome: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_scaled_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_failed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_until: Option<String>,
    pub last_sample_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_average: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_average: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    #[serde(rename = "loop")]
    pub loop_status: LoopStatus,
    pub services: BTreeMap<String, ServiceStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_tick_completed: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_parses_service_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/status/api")
            .with_status(200)
            .with_body(
                r#"{"name":"api","replicas":4,"min_replicas":2,"max_replicas":10,
                    "algorithm":"linear","last_sample_valid":true,"cpu_average":71.5}"#,
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let status: ServiceStatus = client.get("status/api").await.unwrap();

        assert_eq!(status.replicas, 4);
        assert_eq!(status.cpu_average, Some(71.5));
        assert!(status.last_error.is_none());
    }

    #[tokio::test]
    async fn test_get_reports_api_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/status/mongo")
            .with_status(404)
            .with_body(r#"{"error":"unknown service 'mongo'"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client
            .get::<ServiceStatus>("status/mongo")
            .await
            .unwrap_err();

        assert!(err.to_string().contains("unknown service 'mongo'"));
    }

    #[tokio::test]
    async fn test_get_any_keeps_degraded_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/healthz")
            .with_status(503)
            .with_body(r#"{"status":"degraded","message":"no tick completed since startup"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let (status, health): (StatusCode, HealthResponse) =
            client.get_any("healthz").await.unwrap();

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(health.status, "degraded");
    }
}
