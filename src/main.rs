use lego_pf_remote::domain::settings::{Settings, SettingsService};
use lego_pf_remote::infrastructure;
use lego_pf_remote::infrastructure::bluetooth::Transport;
use lego_pf_remote::infrastructure::logging::init_logger;
use lego_pf_remote::presentation::console;
use lego_pf_remote::session::Session;
use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing::info;

fn main() -> anyhow::Result<()> {
    let settings_path = std::env::args_os().nth(1).map(PathBuf::from);
    let settings_service = SettingsService::load(settings_path.as_deref())?;

    let _logging_guard = init_logger(&settings_service.get().log_settings)?;
    info!("Starting LEGO Power Functions remote");
    match settings_service.source() {
        Some(path) => info!("Settings loaded from {}", path.display()),
        None => info!("Using default settings"),
    }

    // Everything runs on one thread, ticks and input handling never preempt
    // each other.
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    rt.block_on(run(settings_service.get().clone()))
}

async fn run(settings: Settings) -> anyhow::Result<()> {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (command_tx, command_rx) = mpsc::unbounded_channel();

    let session = Session::new(create_transport(), event_tx, &settings);

    let status = tokio::spawn(console::show_status(event_rx, std::io::stdout()));
    let input = tokio::spawn(console::read_input(
        BufReader::new(tokio::io::stdin()),
        command_tx,
    ));

    session.run(command_rx).await;

    input.abort();
    status.await.context("Status display task failed")?;
    Ok(())
}

#[cfg(windows)]
fn create_transport() -> Arc<dyn Transport> {
    Arc::new(infrastructure::bluetooth::rfduino::RfduinoTransport::new())
}

#[cfg(not(windows))]
fn create_transport() -> Arc<dyn Transport> {
    tracing::warn!("No BLE backend on this platform, frames go to the loopback transport");
    Arc::new(infrastructure::bluetooth::loopback::LoopbackTransport::new())
}
