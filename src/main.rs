//! deskcast server binary: captures the primary display and streams it to
//! WebSocket viewers, injecting any remote input they send back.

use anyhow::Context;
use log::{info, warn};
use parking_lot::Mutex;
use std::sync::Arc;

use deskcast::app::{ServerController, StartOutcome};
use deskcast::capture::ScrapSource;
use deskcast::constants::{APP_NAME, DEFAULT_SERVER_PORT};
use deskcast::engine;
use deskcast::input::EnigoInjector;
use deskcast::network::SessionContext;
use deskcast::ports::Ports;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    info!("Starting {}", APP_NAME);

    let port = std::env::var("DESKCAST_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(DEFAULT_SERVER_PORT);

    let source = Arc::new(ScrapSource::new().context("failed to open the screen capturer")?);
    engine::initialize(source).context("failed to initialize the capture engine")?;

    let ctx = SessionContext {
        ports: Ports::default(),
        injector: Arc::new(Mutex::new(EnigoInjector::new())),
    };
    let controller = ServerController::new(ctx, port);

    match controller
        .start("0.0.0.0")
        .await
        .context("failed to start the server")?
    {
        StartOutcome::Started { url } => {
            info!("Viewers connect over ws at {}/ws", url);
            // Bound to the wildcard address; advertise something reachable.
            match local_ip_address::local_ip() {
                Ok(ip) => info!("Reachable on the network at http://{}:{}", ip, port),
                Err(e) => warn!("Could not determine network IP: {}", e),
            }
        }
        StartOutcome::AlreadyRunning => {}
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    info!("Shutting down");
    controller.stop().await;
    engine::shutdown();

    Ok(())
}
