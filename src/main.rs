use catching_drone::panel::ScriptedPanel;
use catching_drone::tasks::{Shutdown, World};
use catching_drone::telemetry::{Encoding, UdpTelemetry};
use catching_drone::{Result, SimConfig};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Ball-catching quadcopter simulation on a periodic task executive.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// JSON configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address of the visualisation server.
    #[arg(long)]
    telemetry: Option<String>,

    /// Telemetry wire encoding.
    #[arg(long, value_enum)]
    encoding: Option<Encoding>,

    /// Run workers under the fixed-priority FIFO policy.
    #[arg(long)]
    realtime: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "fatal error");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => SimConfig::load(path)?,
        None => SimConfig::default(),
    };
    if let Some(address) = args.telemetry {
        config.telemetry.address = address;
    }
    if let Some(encoding) = args.encoding {
        config.telemetry.encoding = encoding;
    }
    config.realtime |= args.realtime;

    let telemetry = UdpTelemetry::connect(config.telemetry.address.as_str(), config.telemetry.encoding)?;
    info!(
        address = %config.telemetry.address,
        encoding = ?config.telemetry.encoding,
        "telemetry ready"
    );

    let panel = ScriptedPanel::new(config.script.clone());
    let (world, shutdown) = World::new(&config, Box::new(telemetry), Box::new(panel));
    world.start()?;

    let reason = shutdown.recv().unwrap_or(Shutdown::PanelClosed);
    info!(?reason, "shutting down");
    world.shutdown();

    match reason {
        Shutdown::PanelClosed => Ok(()),
        Shutdown::Fatal(err) => Err(err),
    }
}
