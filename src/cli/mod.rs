// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 bookflow contributors

//! CLI command definitions and handlers
//!
//! Defines the command-line interface for bookflow.

pub mod check;
pub mod graph;
pub mod list;
pub mod run;
pub mod validate;

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use crate::config::{Project, PROJECT_FILE};
use crate::errors::BookflowError;

/// Book catalog pipeline orchestrator
///
/// Runs task graphs, gates them on data quality checks, and chains
/// pipelines together.
#[derive(Parser, Debug)]
#[clap(
    name = "bookflow",
    version,
    about = "Pipeline orchestration with data quality gates",
    long_about = None,
    after_help = "Examples:\n\
        bookflow list                          List pipelines in the project\n\
        bookflow validate                      Validate every pipeline\n\
        bookflow run scrapy_to_postgres        Run a pipeline\n\
        bookflow graph data_validation -f dot  Render a pipeline graph\n\
        bookflow check '[[\"3\"], \"abc\", 0]'     Evaluate a check result\n\n\
        See 'bookflow <command> --help' for more information on a specific command."
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[clap(short, long, global = true)]
    pub verbose: bool,

    /// Change to directory before executing
    #[clap(short = 'C', long, global = true, value_name = "DIR")]
    pub directory: Option<PathBuf>,

    /// Project file (defaults to bookflow.yaml)
    #[clap(long, global = true, value_name = "FILE", env = "BOOKFLOW_PROJECT")]
    pub project: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a pipeline
    Run {
        /// Pipeline id
        pipeline: String,

        /// Run parameter (KEY=VALUE, value parsed as JSON when possible)
        #[clap(short, long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,

        /// Dry run (skip every task, still notify)
        #[clap(long)]
        dry_run: bool,

        /// Keep running independent tasks after a failure
        #[clap(long)]
        no_fail_fast: bool,
    },

    /// Validate one pipeline, or all of them
    Validate {
        /// Pipeline id
        pipeline: Option<String>,
    },

    /// Show pipeline as a graph
    Graph {
        /// Pipeline id
        pipeline: String,

        /// Output format
        #[clap(short, long, value_enum, default_value_t = GraphFormat::Text)]
        format: GraphFormat,
    },

    /// List pipelines in the project
    List,

    /// Evaluate a JSON check result the way a quality gate does
    Check {
        /// Check result as JSON, e.g. '[["3"], "abc", 0]'
        json: String,
    },
}

/// Graph output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum GraphFormat {
    Text,
    Dot,
    Mermaid,
}

/// Load the project named on the command line, or bookflow.yaml
pub fn load_project(path: Option<PathBuf>) -> miette::Result<Project> {
    let path = path.unwrap_or_else(|| PathBuf::from(PROJECT_FILE));
    Project::load(&path).map_err(report)
}

/// Print recovery steps for an error, then turn it into a report
pub fn report(error: BookflowError) -> miette::Report {
    if let Some(suggestion) = error.recovery() {
        eprintln!();
        eprintln!("{}", "How to fix:".yellow().bold());
        eprintln!("{}", suggestion);
    }
    miette::Report::new(error)
}
