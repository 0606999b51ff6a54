use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use wot_gateway::api::binder;
use wot_gateway::{Config, Device, ServerBuilder, SimulatedDevice, ThingDescription};

/// WoT Gateway - HTTP and WebSocket binding for Web of Things devices
#[derive(Parser)]
#[command(name = "wot-gateway", version, about)]
struct Cli {
    /// Config file (defaults to ~/.config/wot-gateway/config.toml)
    #[arg(short, long, env = "WOT_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on, overriding the config
    #[arg(long)]
    port: Option<u16>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve every configured thing with a simulated device (default)
    Serve,
    /// Print the route table a description binds to
    Routes {
        /// Thing description JSON file
        #[arg(short, long)]
        description: PathBuf,
        /// Base path to mount the thing under
        #[arg(short, long, default_value = "/")]
        base: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,wot_gateway=info",
        1 => "info,wot_gateway=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Some(Command::Routes { description, base }) => print_routes(&description, &base),
        Some(Command::Serve) | None => serve(cli.config.as_deref(), cli.port).await,
    }
}

fn print_routes(description: &Path, base: &str) -> anyhow::Result<()> {
    let td = ThingDescription::load(description)
        .with_context(|| format!("loading {}", description.display()))?;
    let table = binder::routes(base, &td);
    binder::check(&table)?;
    print!("{}", binder::render(&table));
    Ok(())
}

async fn serve(config_path: Option<&Path>, port: Option<u16>) -> anyhow::Result<()> {
    let mut config = Config::load(config_path)?;
    if let Some(port) = port {
        config.server.port = port;
    }
    tracing::debug!(?config, "loaded configuration");

    if config.things.is_empty() {
        tracing::warn!("no things configured, serving health endpoint only");
    }

    let mut builder = ServerBuilder::from_config(&config.server);
    let mut emitters = Vec::new();

    for thing in &config.things {
        let td = ThingDescription::load(&thing.description)
            .with_context(|| format!("loading {}", thing.description.display()))?;
        tracing::info!(
            base = %thing.base_path,
            thing = %td.name,
            properties = td.properties.len(),
            actions = td.actions.len(),
            events = td.events.len(),
            "mounting simulated thing"
        );

        let device = Arc::new(
            SimulatedDevice::new(td).with_action_delay(config.simulation.action_delay),
        );
        if let Some(period) = config.simulation.event_interval {
            emitters.push(Arc::clone(&device).spawn_emitter(period));
        }
        builder = builder.thing(&thing.base_path, device as Arc<dyn Device>);
    }

    let server = builder.build()?;
    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        things = server.things().len(),
        "starting wot gateway"
    );

    let result = server.run().await;
    for emitter in emitters {
        emitter.abort();
    }
    result?;

    tracing::info!("wot gateway stopped");
    Ok(())
}
