use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use tradedesk::api::{create_router, AppState};
use tradedesk::config::{ApiConfig, LoggingConfig};
use tradedesk::coordinator::MainCoordinator;
use tradedesk::error::Result;

/// Install the global subscriber. RUST_LOG wins over the configured level.
/// When TRADEDESK_LOG_DIR is set and writable, logs also go to a daily file;
/// the returned guard must live as long as the process.
pub fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::Layer;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    // `rolling::daily` panics if it cannot create the file, so check writability first
    let mut guard = None;
    let file_layer = std::env::var("TRADEDESK_LOG_DIR").ok().and_then(|log_dir| {
        let writable = std::fs::create_dir_all(&log_dir).is_ok() && {
            let write_check = std::path::Path::new(&log_dir).join(".tradedesk_write_test");
            let ok = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&write_check)
                .is_ok();
            let _ = std::fs::remove_file(&write_check);
            ok
        };
        if !writable {
            eprintln!(
                "Warning: Could not write to log directory {}, file logging disabled",
                log_dir
            );
            return None;
        }

        let file_appender = tracing_appender::rolling::daily(&log_dir, "tradedesk.log");
        let (non_blocking, worker) = tracing_appender::non_blocking(file_appender);
        guard = Some(worker);
        eprintln!("Logging to: {}/tradedesk.log", log_dir);
        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true),
        )
    });

    let console_layer = if config.json {
        tracing_subscriber::fmt::layer().json().with_target(true).boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    guard
}

pub fn init_logging_simple() {
    // Minimal logging for one-shot commands
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}

/// Serve the HTTP API until the listener fails
pub async fn serve_api(config: &ApiConfig, coordinator: Arc<MainCoordinator>) -> Result<()> {
    let app = create_router(AppState::new(coordinator));
    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
