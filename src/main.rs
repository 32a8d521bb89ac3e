use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use coffee_bridge::bridge::CoffeeBridge;
use coffee_bridge::config::Config;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "coffee-bridge")]
#[command(version)]
#[command(about = "A Slack bot for a cloud-connected coffee maker")]
struct CliArgs {
    /// Path to config file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Generate example config and exit
    #[arg(long)]
    generate_config: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, Default)]
enum Command {
    /// Run the bot (default)
    #[default]
    Run,
    /// Query the coffee maker once and print the status reply
    Status,
    /// List the channels visible to the bot
    Channels,
}

const EXAMPLE_CONFIG: &str = include_str!("../example-config.yaml");

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{:#}", err);
            eprintln!("Error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    if args.generate_config {
        println!("{}", EXAMPLE_CONFIG);
        return Ok(());
    }

    let config_path = args.config.to_string_lossy().to_string();
    let config = Config::load(&config_path).with_context(|| {
        format!(
            "Failed to load config at '{}'; use --generate-config to print a template",
            config_path
        )
    })?;

    init_logging(&config.logging.min_level);

    let bridge = CoffeeBridge::new(config)?;

    match args.command.unwrap_or_default() {
        Command::Status => {
            println!("{}", bridge.status_once().await?);
            Ok(())
        }
        Command::Channels => {
            for channel in bridge.channels().await? {
                println!("{}\t{}", channel.id, channel.name);
            }
            Ok(())
        }
        Command::Run => {
            info!("Starting coffee bridge v{}", env!("CARGO_PKG_VERSION"));
            tokio::select! {
                result = bridge.start() => result,
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    Ok(())
                }
            }
        }
    }
}

fn init_logging(min_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(min_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
