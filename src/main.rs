//! CaseLink Sync: headless admin sync daemon
//!
//! Restores the stored admin session, keeps the hub connection alive (or
//! polls when it cannot), and logs every change event until shut down.

use tracing_subscriber::{EnvFilter, fmt};

use caselink_core::config::AppConfig;
use caselink_core::error::AppError;
use caselink_core::events::EventKind;
use caselink_realtime::SyncEngine;

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!(kind = %e.kind, "Sync daemon error: {}", e.message);
        std::process::exit(1);
    }
}

/// Load configuration from file, environment overlay, and environment
fn load_configuration() -> Result<AppConfig, AppError> {
    let config_path =
        std::env::var("CASELINK_CONFIG").unwrap_or_else(|_| "config/default.toml".to_string());

    match std::env::var("CASELINK_ENV") {
        Ok(env) => AppConfig::load_with_env(&config_path, &env),
        Err(_) => AppConfig::load(&config_path),
    }
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Run the engine until a shutdown signal or the session ends
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting CaseLink Sync v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        hub = %config.realtime.hub_url,
        store = %config.session.store.backend,
        "Configuration loaded"
    );

    let engine = SyncEngine::from_config(config)?;

    for kind in EventKind::ALL {
        engine.dispatcher().on(kind, move |event| {
            match serde_json::to_string(event) {
                Ok(json) => tracing::info!(%kind, event = %json, "Change received"),
                Err(e) => tracing::warn!(%kind, error = %e, "Unprintable change event"),
            }
            Ok(())
        });
    }

    if !engine.init().await? {
        return Err(AppError::session_expired(
            "No stored admin session; sign in with `caselink login` first",
        ));
    }

    let mut session = engine.session().subscribe();
    tokio::select! {
        _ = shutdown_signal() => {
            tracing::info!("Shutdown signal received");
        }
        _ = session.wait_for(|s| *s == caselink_auth::SessionSignal::Cleared) => {
            tracing::warn!("Session ended, stopping");
        }
    }

    engine.dispose().await;
    tracing::info!("CaseLink Sync stopped");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
