//! Colloquy CLI - resumable classroom discussions between AI roles
//!
//! Main entry point for the colloquy command-line tool.

use anyhow::Context;
use clap::Parser;
use colloquy_cli::commands;
use colloquy_cli::logging::init_logging;
use colloquy_cli::{Cli, Commands};
use colloquy_roles::{CheckpointBackend, ConfigLoader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::new()
        .with_explicit_path(cli.config.clone())
        .load()
        .await
        .context("failed to load configuration")?;
    init_logging(&config.logging);
    if config.checkpoint.backend == CheckpointBackend::Memory
        && matches!(cli.command, Commands::Resume { .. } | Commands::State { .. })
    {
        tracing::warn!("Memory checkpoint store selected; threads do not outlive this process");
    }

    let graph = commands::build_graph(&config, cli.corpus.as_deref()).await?;
    let mut out = std::io::stdout().lock();

    match cli.command {
        Commands::Run {
            thread,
            query,
            stream,
        } => commands::handle_run(&graph, &mut out, &thread, &query, stream).await,
        Commands::Resume {
            thread,
            point,
            case,
            explore,
            stream,
        } => {
            let input = commands::resume_input(point, case, explore);
            commands::handle_resume(&graph, &mut out, &thread, input, stream).await
        }
        Commands::State { thread } => commands::handle_state(&graph, &mut out, &thread).await,
        Commands::Clear { thread } => commands::handle_clear(&graph, &mut out, &thread).await,
        Commands::Threads => commands::handle_threads(&graph, &mut out).await,
        Commands::Graph { format } => commands::handle_graph(&graph, &mut out, format),
    }
}
