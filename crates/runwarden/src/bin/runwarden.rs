use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use runwarden::console::Console;
use runwarden::{
    ChannelEventSink, ConfigLoader, DEFAULT_CONFIG_FILE, FanoutEventSink, LoadStatus,
    PlatformSupervisor, TracingEventSink, telemetry,
};
use tokio::io::BufReader;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "runwarden", version, about = "Start, stop and watch a configured set of programs")]
struct Cli {
    /// Path of the JSON configuration document
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Log filter directive, overrides RUST_LOG (e.g. "debug" or "runwarden=trace")
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let loader = ConfigLoader::new(&cli.config);
    let load = loader.load();
    let log_file = telemetry::init(&load.config.settings.log_directory, cli.log_level.as_deref())?;
    info!(log_file = %log_file.display(), config = %loader.path().display(), "runwarden starting");

    match &load.status {
        LoadStatus::Loaded => {}
        LoadStatus::CreatedDefault => println!(
            "No configuration found; wrote a template to {}. Edit it and type 'reload'.",
            loader.path().display()
        ),
        LoadStatus::Invalid(e) => {
            warn!(error = %e, "Continuing with default settings and no programs");
            println!("Configuration error: {e}");
        }
    }

    let (channel, events) = ChannelEventSink::new();
    let sink = FanoutEventSink::new()
        .with(Arc::new(TracingEventSink))
        .with(Arc::new(channel));
    let supervisor = Arc::new(PlatformSupervisor::native(Arc::new(sink)));

    let settings = load.config.settings;
    for descriptor in load.config.programs {
        supervisor.register(descriptor).await;
    }

    Console::new(supervisor, loader, settings, std::io::stdout())
        .with_events(events)
        .run(BufReader::new(tokio::io::stdin()))
        .await?;

    info!("runwarden stopped");
    Ok(())
}
