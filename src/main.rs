//! Kolosal Search - Main Entry Point

use clap::Parser;
use kolosal_search::cli::{cmd_check, cmd_models, cmd_search, Cli, Commands};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kolosal_search=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Search {
            data,
            config,
            objective,
            max_iterations,
            max_time,
            max_batches,
            n_jobs,
            strategy,
            seed,
            patience,
            checkpoint,
            describe,
        } => {
            cmd_search(
                &data,
                config.as_deref(),
                objective.as_deref(),
                max_iterations,
                max_time,
                max_batches,
                n_jobs,
                strategy.as_deref(),
                seed,
                patience,
                checkpoint.as_deref(),
                describe,
            )?;
        }
        Commands::Check { data } => {
            cmd_check(&data)?;
        }
        Commands::Models { problem } => {
            cmd_models(problem.as_deref())?;
        }
    }

    Ok(())
}
