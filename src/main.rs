use clap::{Parser, Subcommand};
use std::path::Path;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use worldconquest::cli::commands;
use worldconquest::config::server::{LogFormat, ServerConfig};
use worldconquest::config::Config;

#[derive(Parser)]
#[command(name = "worldconquest")]
#[command(about = "Authoritative server for a real-time territory strategy game on a geodesic sphere")]
#[command(version)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the world and serve the game over WebSocket
    Serve,

    /// Generate a world and print its terrain summary
    Generate,

    /// Print one tile of the configured world
    Inspect {
        /// Tile ID to inspect
        #[arg(short, long)]
        tile: u32,
    },
}

/// Missing config files fall back to defaults so `generate` works out of the box.
fn load_config(path: &str) -> Config {
    let path = Path::new(path);
    if !path.exists() {
        eprintln!("{} not found, using defaults", path.display());
        return Config::default();
    }
    match Config::from_file(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            std::process::exit(1);
        }
    }
}

fn init_tracing(server: &ServerConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&server.log_level));
    let registry = tracing_subscriber::registry().with(env_filter);
    match server.log_format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Text => registry.with(fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load_config(&cli.config);
    init_tracing(&config.server);

    let result = match cli.command {
        Commands::Serve => commands::run_server(&config).await,
        Commands::Generate => commands::generate(&config),
        Commands::Inspect { tile } => commands::inspect(&config, tile),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
