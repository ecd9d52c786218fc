//! Daemon assembly — wires the store, adapters, controller, loop and API.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{error, info};

use switchyard_core::SwitchyardConfig;
use switchyard_cutover::{ControllerSettings, LifecycleController, ReconciliationLoop};
use switchyard_remote::{HttpWorkflowClient, SmsWebhookNotifier};
use switchyard_state::StateStore;

/// Load, resolve and validate a config file. Any problem is fatal.
pub fn load_config(path: &Path) -> anyhow::Result<SwitchyardConfig> {
    let mut config = SwitchyardConfig::from_file(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    config
        .resolve_env()
        .with_context(|| format!("failed to resolve config {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(config)
}

pub async fn run(config: SwitchyardConfig) -> anyhow::Result<()> {
    info!("Switchyard daemon starting");

    // Ensure data directory exists.
    std::fs::create_dir_all(&config.server.data_dir)
        .with_context(|| format!("failed to create {}", config.server.data_dir.display()))?;
    let db_path = config.server.data_dir.join("switchyard.redb");

    // ── Initialize subsystems ──────────────────────────────────

    let store = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    let workflows = Arc::new(HttpWorkflowClient::from_config(&config.workflows)?);
    let notifier = Arc::new(SmsWebhookNotifier::from_config(&config.notify)?);
    info!("remote adapters initialized");

    let settings = ControllerSettings::from_config(&config);
    let controller = Arc::new(LifecycleController::new(
        store,
        workflows,
        notifier,
        settings,
    ));
    let reconciler = ReconciliationLoop::new(controller.clone());
    info!(
        interval_secs = config.monitor.interval_secs,
        lookback_minutes = config.monitor.lookback_minutes,
        "cutover controller initialized"
    );

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start background tasks ─────────────────────────────────

    let interval = config.monitor.interval();
    let reconcile_handle = tokio::spawn(async move {
        reconciler.run(interval, shutdown_rx).await;
    });

    // ── Start API server ───────────────────────────────────────

    let router = switchyard_api::build_router(controller);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    // Graceful shutdown on Ctrl-C.
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for shutdown signal");
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    // Wait for the loop to finish its current tick.
    let _ = reconcile_handle.await;

    info!("Switchyard daemon stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn load_config_accepts_complete_file() {
        let file = write_config(
            r#"
[workflows]
base_url = "https://wf.example/api"
api_token = "static"

[notify]
url = "https://sms.example/send"
destination = "+15550100"

[monitor]
interval_secs = 60
"#,
        );
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.monitor.interval_secs, 60);
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn load_config_rejects_missing_notify_settings() {
        let file = write_config(
            r#"
[workflows]
base_url = "https://wf.example/api"
"#,
        );
        let err = load_config(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("notify.url"));
    }

    #[test]
    fn load_config_reports_unreadable_file() {
        let err = load_config(Path::new("/nonexistent/switchyard.toml")).unwrap_err();
        assert!(err.to_string().contains("failed to read config"));
    }
}
