// src/main.rs — goodquestion entry point

use clap::Parser;

use goodquestion::cli::{Cli, Commands, PlayArgs};
use goodquestion::infra::config::Config;
use goodquestion::infra::{logger, paths};
use goodquestion::memory;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // RUST_LOG overrides
    logger::init_logging(if cli.verbose { "debug" } else { "warn" });

    if let Err(e) = run(cli).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match cli.config {
        Some(ref path) => Config::load_from(std::path::Path::new(path))?,
        None => Config::load()?,
    };

    if let Some(Commands::Migrate { status, rollback }) = cli.command {
        return goodquestion::cli::migrate::run_migrate(status, rollback);
    }

    let store = if cli.ephemeral {
        memory::in_memory()?
    } else {
        paths::ensure_dirs().await?;
        memory::open(&paths::db_path())?
    };
    tracing::debug!(ephemeral = cli.ephemeral, "Store ready");

    match cli.command {
        None => goodquestion::cli::play::run_play(PlayArgs::default(), config, store).await,
        Some(Commands::Play(args)) => goodquestion::cli::play::run_play(args, config, store).await,
        Some(Commands::Stats) => goodquestion::cli::stats::show_stats(&store, &config),
        Some(Commands::History { limit }) => goodquestion::cli::stats::show_history(&store, limit),
        Some(Commands::Notes) => goodquestion::cli::stats::show_notes(&store),
        Some(Commands::Reset { yes }) => goodquestion::cli::stats::run_reset(&store, yes),
        Some(Commands::Migrate { .. }) => Ok(()),
    }
}
