pub mod command;
pub mod config;
pub mod controller;
pub mod drive;
pub mod link;

use crate::config::AppConfig;
use crate::controller::ControllerHandle;
use crate::drive::DriveController;
use crate::link::CommandLink;
use color_eyre::{eyre::eyre, Result};
use tokio::sync::oneshot;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config_path = AppConfig::default_path()?;
    let written = AppConfig::ensure_default(&config_path).await?;
    let config = AppConfig::load(&config_path).await?;

    setup_logging(config.logging.level()?);
    if written {
        info!("Default configuration written to {}", config_path.display());
    }
    info!("Loaded configuration from {}", config_path.display());
    for warning in config.warnings() {
        warn!("{}", warning);
    }

    let link = CommandLink::open(&config.link)
        .await
        .map_err(|e| eyre!("Failed to open command link: {}", e))?;

    info!("Command link open ({}): {}", link.kind(), link.describe());

    let controller = ControllerHandle::spawn(Some(config.controller.clone()))
        .map_err(|e| eyre!("Failed to spawn controller: {}", e))?;

    let driver = DriveController::create(controller.subscribe(), link, config.drive.clone()).start();

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Ctrl+C received"),
            Err(e) => {
                error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        }
        let _ = shutdown_tx.send(());
    });

    let stopped = driver.run_until_shutdown(shutdown_rx).await;
    let stats = stopped.into_stats();
    info!(
        "Vehicle stopped after {} frames: {} commands sent, {} failed",
        stats.frames, stats.sent, stats.failed
    );

    if !controller.is_running() {
        warn!("Controller pipeline had already stopped");
    }

    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    Ok(())
}

fn setup_logging(level: Level) {
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
