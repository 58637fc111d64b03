//! ralph CLI entry point.

use clap::Parser;

use ralph::cli::commands::{refinery, resume, run, status};
use ralph::cli::{Cli, Commands, RefineryCommands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    let result = match cli.command {
        Commands::Run => run::handle_run(config_path, cli.json).await,
        Commands::Resume => resume::handle_resume(config_path, cli.json).await,
        Commands::Status => status::handle_status(config_path, cli.json).await,
        Commands::Refinery(RefineryCommands::Status) => refinery::handle_status(config_path, cli.json).await,
        Commands::Refinery(RefineryCommands::List) => refinery::handle_list(config_path, cli.json).await,
        Commands::Refinery(RefineryCommands::MergeNext) => refinery::handle_merge_next(config_path, cli.json).await,
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
