//! cachet CLI entrypoint.

use clap::{ArgAction, Parser};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod handlers;

use commands::{Commands, ConfigCommands};
use config::CliConfig;

#[derive(Parser)]
#[command(name = "cachet")]
#[command(author, version, about = "Inspect and manage cachet S3 cache locations", long_about = None)]
struct Cli {
    /// Increase logging and backend verbosity (-v, -vv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

fn init_logging(verbose: u8) {
    let default_filter = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = CliConfig::load().unwrap_or_default();
    tracing::debug!(config = ?config, "Loaded CLI config");
    let registry = handlers::registry(&config);
    let verbose = u32::from(cli.verbose);

    match cli.command {
        Commands::Ls { location, json } => {
            handlers::list(&registry, &location, json, verbose).await?
        }
        Commands::Exists { location } => {
            if !handlers::exists(&registry, &location, verbose).await? {
                std::process::exit(1);
            }
        }
        Commands::Cat { location } => handlers::cat(&registry, &location, verbose).await?,
        Commands::Put { location, file } => {
            handlers::put(&registry, &location, file.as_deref(), verbose).await?
        }
        Commands::Mv { src, dst } => handlers::move_item(&registry, &src, &dst, verbose).await?,
        Commands::Clear { location } => handlers::clear(&registry, &location, verbose).await?,
        Commands::Config { command } => match command {
            ConfigCommands::Show => handlers::show_config(&config)?,
            ConfigCommands::Set { key, value } => handlers::set_config(&key, &value)?,
        },
    }

    Ok(())
}
