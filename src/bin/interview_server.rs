//! Interview Server
//!
//! Serves the HTTP control surface and runs one live voice interview at a
//! time against the remote model.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use live_interviewer::{
    audio::{device::list_devices, CpalBackend},
    config::AppConfig,
    feedback::KeywordEvaluator,
    network::GeminiLiveConnector,
    session::SessionController,
    ui::WebServer,
};

/// How long shutdown waits for a running session to tear down
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Interview Server");

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref()).context("loading configuration")?;
    config.validate()?;
    let config = Arc::new(config);

    println!("\n=== Available Audio Devices ===");
    for device in list_devices() {
        let device_type = match (device.is_input, device.is_output) {
            (true, true) => "Input/Output",
            (true, false) => "Input",
            (false, true) => "Output",
            _ => "Unknown",
        };
        let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
        println!("  {} ({}){}", device.name, device_type, default_marker);
        println!("    Sample rates: {:?}", device.sample_rates);
    }
    println!();

    let connector = GeminiLiveConnector::from_config(&config.remote)?;
    let evaluator = Arc::new(KeywordEvaluator::new());
    let controller = SessionController::new(
        Arc::new(connector),
        Arc::new(CpalBackend::new()),
        evaluator.clone(),
        config.clone(),
    );

    let server = WebServer::new(config.ui.clone(), controller.clone(), Some(evaluator));
    server
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutdown requested");
        })
        .await?;

    if controller.stop().is_ok() {
        tracing::info!("Waiting for the running session to finish");
        let idle =
            tokio::task::spawn_blocking(move || controller.wait_until_idle(SHUTDOWN_TIMEOUT))
                .await?;
        if !idle {
            tracing::warn!("Session did not stop within {:?}", SHUTDOWN_TIMEOUT);
        }
    }

    tracing::info!("Interview Server stopped");
    Ok(())
}
