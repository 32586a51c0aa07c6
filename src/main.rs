use anyhow::Result;
use clap::{Parser, Subcommand};
use valutatrade::core::log::init_logging;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    #[command(flatten)]
    App(valutatrade::AppCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    // A broken config is reported by the command itself
    let logs_dir = valutatrade::load_config(cli.config_path.as_deref())
        .and_then(|config| config.logs_dir())
        .ok();
    let _log_guards = init_logging(cli.verbose, logs_dir.as_deref());

    let result = match cli.command {
        Some(Commands::Setup) => valutatrade::cli::setup::setup(),
        Some(Commands::App(cmd)) => valutatrade::run_command(cmd, cli.config_path.as_deref()).await,
        // No command starts the interactive shell
        None => {
            valutatrade::run_command(valutatrade::AppCommand::Shell, cli.config_path.as_deref())
                .await
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
