//! Tier autoscaler daemon
//!
//! Samples each configured service on a fixed interval and adjusts its
//! replica count through the orchestrator, serving health, status and
//! Prometheus metrics over HTTP.

use anyhow::{Context, Result};
use autoscaler::{
    adapters::{HttpMetricSource, HttpOrchestrator},
    api,
    config::DaemonConfig,
};
use autoscaler_lib::{
    AutoscalerConfig, ControlLoop, DryRunOrchestrator, Orchestrator, StatusReporter,
    StructuredLogger,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const AUTOSCALER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting autoscaler");

    let config = DaemonConfig::load().context("Failed to load configuration")?;
    let settings = config.scaling.settings()?;
    let dry_run = config.effective_dry_run();
    if dry_run && !config.dry_run {
        warn!("No orchestrator_url configured, running in monitoring-only mode");
    }
    info!(
        instance = %config.instance_name,
        path = %DaemonConfig::path().display(),
        services = config.scaling.services.len(),
        "Autoscaler configured"
    );

    let source = Arc::new(HttpMetricSource::new(
        config.endpoints()?,
        settings.sample_timeout,
    )?);
    let orchestrator: Arc<dyn Orchestrator> = match &config.orchestrator_url {
        Some(url) if !dry_run => Arc::new(HttpOrchestrator::new(
            url,
            Duration::from_millis(config.orchestrator_timeout_ms),
        )?),
        _ => Arc::new(DryRunOrchestrator),
    };

    let status = StatusReporter::new(settings.check_interval, dry_run);
    let logger = StructuredLogger::new(&config.instance_name);

    let mut control = ControlLoop::new(
        &config.scaling,
        source.clone(),
        orchestrator,
        status.clone(),
    )?
    .with_logger(logger.clone());
    if !dry_run {
        control.sync_replicas().await;
    }

    logger.log_startup(AUTOSCALER_VERSION, config.scaling.services.len(), dry_run);

    let (shutdown_tx, _) = broadcast::channel(1);
    let (reload_tx, reload_rx) = mpsc::channel(4);

    let app_state = Arc::new(api::AppState::new(status));
    let api_handle = tokio::spawn(api::serve(
        config.api_port,
        app_state,
        shutdown_tx.subscribe(),
    ));
    let loop_handle = tokio::spawn(control.run(reload_rx, shutdown_tx.subscribe()));
    let reload_handle = tokio::spawn(watch_reloads(source, reload_tx, shutdown_tx.subscribe()));

    let reason = wait_for_shutdown().await?;
    logger.log_shutdown(reason);
    info!("Shutting down");

    let _ = shutdown_tx.send(());
    if let Err(e) = loop_handle.await {
        warn!(error = %e, "Control loop task failed");
    }
    let _ = reload_handle.await;
    match api_handle.await {
        Ok(Err(e)) => warn!(error = %e, "API server exited with error"),
        Err(e) => warn!(error = %e, "API server task failed"),
        Ok(Ok(())) => {}
    }

    Ok(())
}

/// Re-read the configuration file on SIGHUP and hand it to the loop
#[cfg(unix)]
async fn watch_reloads(
    source: Arc<HttpMetricSource>,
    reloads: mpsc::Sender<AutoscalerConfig>,
    mut shutdown: broadcast::Receiver<()>,
) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(hangup) => hangup,
        Err(e) => {
            warn!(error = %e, "Failed to install SIGHUP handler, reload disabled");
            return;
        }
    };

    loop {
        tokio::select! {
            _ = hangup.recv() => {
                info!(path = %DaemonConfig::path().display(), "SIGHUP received, reloading configuration");
                let config = match DaemonConfig::load() {
                    Ok(config) => config,
                    Err(e) => {
                        warn!(error = %format!("{:#}", e), "Configuration reload rejected, keeping previous configuration");
                        continue;
                    }
                };
                match config.endpoints() {
                    Ok(endpoints) => {
                        source.set_endpoints(endpoints);
                        source.set_timeout(Duration::from_millis(config.scaling.sample_timeout_ms));
                    }
                    Err(e) => {
                        warn!(error = %format!("{:#}", e), "Configuration reload rejected, keeping previous configuration");
                        continue;
                    }
                }
                if reloads.send(config.scaling).await.is_err() {
                    break;
                }
            }
            _ = shutdown.recv() => break,
        }
    }
}

#[cfg(not(unix))]
async fn watch_reloads(
    _source: Arc<HttpMetricSource>,
    _reloads: mpsc::Sender<AutoscalerConfig>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let _ = shutdown.recv().await;
}

#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            Ok("SIGINT received")
        }
        _ = terminate.recv() => Ok("SIGTERM received"),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("SIGINT received")
}
