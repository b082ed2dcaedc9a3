mod cmd;
mod output;

use clap::{Parser, Subcommand};
use cmd::{config::ConfigSubcommand, history::HistorySubcommand};
use releasegate_core::config::DEFAULT_CONFIG_FILE;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "releasegate",
    about = "Promote commits to release branches behind signed-identity admission",
    version,
    propagate_version = true
)]
struct Cli {
    /// Config file (missing file means built-in defaults)
    #[arg(long, global = true, env = "RELEASEGATE_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP gateway
    Serve {
        /// Port to listen on
        #[arg(long, env = "PORT", default_value = "8787")]
        port: u16,
    },

    /// Inspect the configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Read or clear the local deploy history
    History {
        #[command(subcommand)]
        subcommand: HistorySubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let result = match cli.command {
        Commands::Serve { port } => cmd::serve::run(&cli.config, port),
        Commands::Config { subcommand } => cmd::config::run(&cli.config, subcommand, cli.json),
        Commands::History { subcommand } => cmd::history::run(&cli.config, subcommand, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
