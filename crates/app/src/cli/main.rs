//! AutoAudio CLI Application

mod console;
mod control;

use anyhow::Context;
use autoaudio_core::domain::audio::DeviceCatalog;
use autoaudio_core::domain::config::RouterConfig;
use autoaudio_core::domain::events::{event_channel, EventReceiver, EventSender};
use autoaudio_core::domain::protocol::ControlIntent;
use autoaudio_core::domain::routing::{EngineOptions, RoutingEngine};
use autoaudio_infra::audio::{watch_outputs, CpalBackend, CpalCatalog};
use autoaudio_infra::ipc::{serve, ControlListener};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "autoaudio")]
#[command(about = "Route a virtual cable to the best available output device", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (default: <config dir>/autoaudio/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the engine with a console control surface on stdin/stdout
    Run(EngineArgs),

    /// Run the engine behind the local control endpoint
    Engine(EngineArgs),

    /// Attach a console to a running engine
    Ctl,

    /// List audio devices
    Devices,
}

#[derive(Args, Default)]
struct EngineArgs {
    /// Start with the gain stage enabled
    #[arg(long)]
    boost: bool,

    /// Input device filter
    #[arg(long)]
    input: Option<String>,

    /// Primary output device filter
    #[arg(long)]
    primary: Option<String>,

    /// Fallback output device filter
    #[arg(long)]
    fallback: Option<String>,
}

impl EngineArgs {
    fn apply(&self, config: &mut RouterConfig) {
        if self.boost {
            config.engine.boost = true;
        }
        if let Some(input) = &self.input {
            config.filters.input = input.clone();
        }
        if let Some(primary) = &self.primary {
            config.filters.primary = primary.clone();
        }
        if let Some(fallback) = &self.fallback {
            config.filters.fallback = fallback.clone();
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    // Logs go to stderr; stdout carries snapshots in console mode.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn load_config(path: Option<&PathBuf>) -> anyhow::Result<RouterConfig> {
    match path {
        Some(path) => RouterConfig::load_from_file(path)
            .await
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => {
            let path = RouterConfig::default_path()?;
            Ok(RouterConfig::load_or_default(&path).await)
        }
    }
}

/// Ctrl-C becomes a shutdown intent
async fn forward_ctrl_c(events: EventSender) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("Interrupted, shutting down");
            events.control(ControlIntent::Shutdown);
        }
        Err(e) => error!(error = %e, "Failed to listen for Ctrl-C"),
    }
}

type Engine = RoutingEngine<CpalCatalog, CpalBackend>;

/// Tasks living as long as the engine; aborted on drop
#[derive(Default)]
struct Background(Vec<JoinHandle<()>>);

impl Background {
    fn spawn<F>(&mut self, task: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.0.push(tokio::spawn(task));
    }
}

impl Drop for Background {
    fn drop(&mut self) {
        for task in &self.0 {
            task.abort();
        }
    }
}

/// Enumerate the host devices on a blocking worker
///
/// A failure is not fatal: the watcher keeps retrying and reports the
/// devices once enumeration works.
async fn scan_devices(catalog: &CpalCatalog) -> anyhow::Result<()> {
    let scan = catalog.clone();
    if let Err(e) = tokio::task::spawn_blocking(move || scan.refresh()).await? {
        warn!(error = %e, "Initial device enumeration failed");
    }
    Ok(())
}

/// Build the engine over the host devices and start the output watcher and
/// the Ctrl-C handler
async fn start_engine(
    config: &RouterConfig,
) -> anyhow::Result<(Engine, EventSender, EventReceiver, Background)> {
    let catalog = CpalCatalog::new();
    scan_devices(&catalog).await?;
    let backend = catalog.backend(config.audio.output_queue_blocks);
    let (events, rx) = event_channel();

    let engine = RoutingEngine::new(
        catalog.clone(),
        backend,
        events.clone(),
        config.filter_set(),
        EngineOptions::from(config),
    );

    let mut background = Background::default();
    background.spawn(watch_outputs(
        catalog,
        config.engine.poll_interval(),
        events.clone(),
    ));
    background.spawn(forward_ctrl_c(events.clone()));

    Ok((engine, events, rx, background))
}

async fn run_console(config: RouterConfig) -> anyhow::Result<()> {
    let (engine, events, rx, mut background) = start_engine(&config).await?;

    let printer = tokio::spawn(console::print_snapshots(
        engine.subscribe(),
        tokio::io::stdout(),
    ));
    background.spawn(async move {
        console::forward_lines(console::stdin_lines(), &events).await;
    });

    // Streams are not Send, so the engine runs on this task.
    engine.run(rx).await;
    drop(background);

    printer.await?.context("Failed to write snapshots")?;
    Ok(())
}

async fn run_engine(config: RouterConfig) -> anyhow::Result<()> {
    let listener = ControlListener::bind(&config.ipc.endpoint)
        .with_context(|| format!("Failed to bind control endpoint '{}'", config.ipc.endpoint))?;
    let (engine, events, rx, mut background) = start_engine(&config).await?;

    let feed = engine.snapshot_feed();
    background.spawn(async move {
        if let Err(e) = serve(listener, events.clone(), feed).await {
            error!(error = %e, "Control endpoint failed");
            events.control(ControlIntent::Shutdown);
        }
    });

    engine.run(rx).await;
    Ok(())
}

fn list_devices() -> anyhow::Result<()> {
    let catalog = CpalCatalog::new();
    catalog.refresh().context("Failed to enumerate audio devices")?;
    let inputs = catalog.list_inputs().context("Failed to list input devices")?;
    let outputs = catalog.list_outputs().context("Failed to list output devices")?;

    for device in inputs.iter().chain(outputs.iter()) {
        println!("{}\t{}\t{}", device.direction, device.id, device.description);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let command = cli.command.unwrap_or(Command::Run(EngineArgs::default()));
    match command {
        Command::Run(args) => {
            let mut config = load_config(cli.config.as_ref()).await?;
            args.apply(&mut config);
            config.validate()?;
            info!("AutoAudio starting (console)");
            run_console(config).await
        }
        Command::Engine(args) => {
            let mut config = load_config(cli.config.as_ref()).await?;
            args.apply(&mut config);
            config.validate()?;
            info!("AutoAudio starting (engine)");
            run_engine(config).await
        }
        Command::Ctl => {
            let config = load_config(cli.config.as_ref()).await?;
            control::attach(&config.ipc.endpoint).await
        }
        Command::Devices => list_devices(),
    }
}
