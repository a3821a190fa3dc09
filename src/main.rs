use clap::Parser;
use tracing::{error, info, warn};

use tradedesk::cli::{Cli, Commands};
use tradedesk::config::AppConfig;
use tradedesk::coordinator::{DeskAdapters, MainCoordinator};
use tradedesk::error::{DeskError, Result};

mod main_runtime;

use main_runtime::{init_logging, init_logging_simple, serve_api, shutdown_signal};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::load_from(&cli.config_dir)?;

    match cli.command.unwrap_or(Commands::Run {
        port: None,
        no_api: false,
    }) {
        Commands::Run { port, no_api } => {
            let _guard = init_logging(&config.logging);
            if let Some(port) = port {
                config.api.port = port;
            }
            if no_api {
                config.api.enabled = false;
            }
            run_desk(config).await
        }
        Commands::Cycle => {
            let _guard = init_logging(&config.logging);
            run_single_cycle(config).await
        }
        Commands::Config { check } => {
            init_logging_simple();
            print_config(&config, check)
        }
    }
}

fn validated(config: &AppConfig) -> Result<()> {
    config.validate().map_err(|errors| {
        for e in &errors {
            error!("Invalid configuration: {}", e);
        }
        DeskError::InvalidConfig(errors.join("; "))
    })
}

async fn run_desk(config: AppConfig) -> Result<()> {
    validated(&config)?;

    let coordinator = MainCoordinator::from_config(&config, DeskAdapters::default()).await;
    coordinator.initialize().await?;
    coordinator.start().await?;

    let server = config.api.enabled.then(|| {
        let api = config.api.clone();
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            if let Err(e) = serve_api(&api, coordinator).await {
                error!("API server error: {}", e);
            }
        })
    });

    info!("Trading desk running. Press Ctrl+C to stop.");
    shutdown_signal().await;

    info!("Shutdown signal received");
    if let Some(server) = server {
        server.abort();
    }
    coordinator.stop().await?;
    info!("Shutdown complete");
    Ok(())
}

async fn run_single_cycle(mut config: AppConfig) -> Result<()> {
    validated(&config)?;
    config.coordinator.auto_start_cycle = false;

    let coordinator = MainCoordinator::from_config(&config, DeskAdapters::default()).await;
    coordinator.initialize().await?;
    coordinator.start().await?;

    let result = coordinator.run_daily_cycle().await;
    if !result.success {
        warn!("Daily cycle failed: {:?}", result.error_message);
    }
    println!("{}", serde_json::to_string_pretty(&result)?);

    coordinator.stop().await?;
    Ok(())
}

fn print_config(config: &AppConfig, check: bool) -> Result<()> {
    let rendered = config
        .to_toml()
        .map_err(|e| DeskError::Internal(format!("render config: {}", e)))?;
    println!("{}", rendered);
    if check {
        validated(config)?;
        println!("# configuration is valid");
    }
    Ok(())
}
