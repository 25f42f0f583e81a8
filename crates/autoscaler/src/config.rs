//! Daemon configuration
//!
//! Layers a TOML file (path from `AUTOSCALER_CONFIG`, default
//! `autoscaler.toml`) under `AUTOSCALER__*` environment variables, e.g.
//! `AUTOSCALER__API_PORT=9000` or `AUTOSCALER__SCALING__CHECK_INTERVAL_SECS=15`.

use anyhow::{bail, Context, Result};
use autoscaler_lib::AutoscalerConfig;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use url::Url;

pub const CONFIG_PATH_ENV: &str = "AUTOSCALER_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "autoscaler.toml";

/// Daemon configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    /// Name reported in structured logs
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    /// Port for health, status and metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Log scale commands instead of sending them
    #[serde(default)]
    pub dry_run: bool,

    /// Base URL of the orchestrator API; without it the daemon runs dry
    #[serde(default)]
    pub orchestrator_url: Option<String>,

    /// Timeout for orchestrator requests in milliseconds
    #[serde(default = "default_orchestrator_timeout")]
    pub orchestrator_timeout_ms: u64,

    /// Metrics URL per service
    #[serde(default)]
    pub metrics_endpoints: HashMap<String, String>,

    /// Control loop settings and services
    #[serde(default)]
    pub scaling: AutoscalerConfig,
}

fn default_instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "autoscaler".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_orchestrator_timeout() -> u64 {
    10_000
}

impl DaemonConfig {
    /// Path of the configuration file for this process
    pub fn path() -> PathBuf {
        std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    /// Load from the configured file and environment
    pub fn load() -> Result<Self> {
        let explicit = std::env::var(CONFIG_PATH_ENV).is_ok();
        Self::load_from(&Self::path(), explicit)
    }

    /// Load from a file, layering environment overrides on top.
    ///
    /// A missing file is an error only when `required` is set.
    pub fn load_from(path: &Path, required: bool) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(required))
            .add_source(
                config::Environment::with_prefix("AUTOSCALER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path.display()))?;

        let config: DaemonConfig = settings
            .try_deserialize()
            .context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that need more than the scaling configuration
    pub fn validate(&self) -> Result<()> {
        self.scaling
            .validate()
            .context("Invalid scaling configuration")?;

        for service in &self.scaling.services {
            match self.metrics_endpoints.get(&service.name) {
                Some(endpoint) => {
                    Url::parse(endpoint).with_context(|| {
                        format!("Invalid metrics endpoint for {}: {}", service.name, endpoint)
                    })?;
                }
                None => bail!("No metrics endpoint configured for service {}", service.name),
            }
        }

        if let Some(url) = &self.orchestrator_url {
            Url::parse(url).with_context(|| format!("Invalid orchestrator URL: {}", url))?;
        }
        if self.orchestrator_timeout_ms == 0 {
            bail!("orchestrator_timeout_ms must be greater than zero");
        }

        Ok(())
    }

    /// Dry run if requested or if there is no orchestrator to talk to
    pub fn effective_dry_run(&self) -> bool {
        self.dry_run || self.orchestrator_url.is_none()
    }

    /// Parsed metrics endpoints; call after `validate`
    pub fn endpoints(&self) -> Result<HashMap<String, Url>> {
        self.metrics_endpoints
            .iter()
            .map(|(service, endpoint)| {
                let url = Url::parse(endpoint)
                    .with_context(|| format!("Invalid metrics endpoint for {}", service))?;
                Ok((service.clone(), url))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
api_port = 9100
orchestrator_url = "http://orchestrator:2375"

[metrics_endpoints]
api = "http://api:3000/metrics"
redis = "http://redis-exporter:9121/metrics"

[scaling]
check_interval_secs = 15

[[scaling.services]]
name = "api"
min_replicas = 2
max_replicas = 10
algorithm = "predictive"

[[scaling.services]]
name = "redis"
min_replicas = 1
max_replicas = 2
cooldown_secs = 300
"#;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_from_file() {
        let file = write_config(SAMPLE);
        let config = DaemonConfig::load_from(file.path(), true).unwrap();

        assert_eq!(config.api_port, 9100);
        assert!(!config.effective_dry_run());
        assert_eq!(config.scaling.check_interval_secs, 15);
        assert_eq!(config.scaling.services.len(), 2);
        assert_eq!(config.scaling.services[1].cooldown_secs, 300);
        assert_eq!(
            config.endpoints().unwrap()["redis"].as_str(),
            "http://redis-exporter:9121/metrics"
        );
    }

    #[test]
    fn test_missing_endpoint_rejected() {
        let file = write_config(
            r#"
[[scaling.services]]
name = "api"
"#,
        );
        let err = DaemonConfig::load_from(file.path(), true).unwrap_err();
        assert!(err.to_string().contains("No metrics endpoint"));
    }

    #[test]
    fn test_invalid_scaling_config_rejected() {
        let file = write_config(
            r#"
[metrics_endpoints]
api = "http://api:3000/metrics"

[[scaling.services]]
name = "api"
min_replicas = 5
max_replicas = 3
"#,
        );
        let err = DaemonConfig::load_from(file.path(), true).unwrap_err();
        assert!(format!("{:#}", err).contains("min_replicas"));
    }

    #[test]
    fn test_missing_orchestrator_means_dry_run() {
        let file = write_config(
            r#"
[metrics_endpoints]
api = "http://api:3000/metrics"

[[scaling.services]]
name = "api"
"#,
        );
        let config = DaemonConfig::load_from(file.path(), true).unwrap();
        assert!(config.orchestrator_url.is_none());
        assert!(config.effective_dry_run());
    }

    #[test]
    fn test_shipped_sample_config_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/autoscaler.toml");
        let config = DaemonConfig::load_from(&path, true).unwrap();

        let (settings, profiles) = config.scaling.validate().unwrap();
        assert_eq!(settings.check_interval.as_secs(), 30);
        assert_eq!(profiles.len(), 3);
        assert_eq!(config.endpoints().unwrap().len(), 3);
    }

    #[test]
    fn test_required_file_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(DaemonConfig::load_from(&missing, true).is_err());
    }
}
