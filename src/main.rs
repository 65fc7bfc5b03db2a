// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 bookflow contributors

//! bookflow - pipeline orchestration with data quality gates

use clap::Parser;
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bookflow::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "bookflow=debug"
    } else {
        "bookflow=info"
    };

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    if !bookflow::utils::should_use_colors() {
        colored::control::set_override(false);
    }

    // Change to specified directory if provided
    if let Some(ref dir) = cli.directory {
        std::env::set_current_dir(dir).map_err(|e| {
            miette::miette!("Failed to change to directory '{}': {}", dir.display(), e)
        })?;
    }

    // Dispatch to command handlers
    match cli.command {
        Commands::Run {
            pipeline,
            params,
            dry_run,
            no_fail_fast,
        } => {
            bookflow::cli::run::run(
                cli.project,
                pipeline,
                params,
                dry_run,
                no_fail_fast,
                cli.verbose,
            )
            .await
        }
        Commands::Validate { pipeline } => {
            bookflow::cli::validate::run(cli.project, pipeline, cli.verbose).await
        }
        Commands::Graph { pipeline, format } => {
            bookflow::cli::graph::run(cli.project, pipeline, format, cli.verbose).await
        }
        Commands::List => bookflow::cli::list::run(cli.project, cli.verbose).await,
        Commands::Check { json } => bookflow::cli::check::run(json, cli.verbose).await,
    }
}
