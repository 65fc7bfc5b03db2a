// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 bookflow contributors

//! List command - show pipelines in the project

use colored::Colorize;
use miette::Result;
use std::path::PathBuf;

use crate::pipeline::{PipelineGraph, TaskKind};
use crate::utils::print_header;

/// Run the list command
pub async fn run(project: Option<PathBuf>, verbose: bool) -> Result<()> {
    let project = super::load_project(project)?;

    print_header("Pipelines");

    if project.pipelines.is_empty() {
        println!("  {}", "No pipeline files matched the project globs".dimmed());
        return Ok(());
    }

    for (file, def) in &project.pipelines {
        let tasks = PipelineGraph::from_definition(def, &project.config.settings)
            .map(|g| g.len().to_string())
            .unwrap_or_else(|_| "invalid".to_string());

        let triggers: Vec<&str> = def
            .tasks
            .iter()
            .filter_map(|t| match &t.kind {
                TaskKind::TriggerPipeline { pipeline, .. } => Some(pipeline.as_str()),
                _ => None,
            })
            .collect();

        println!(
            "  {} {} ({} tasks)",
            "•".blue(),
            def.name.bold(),
            tasks
        );

        if let Some(description) = &def.description {
            println!("      {}", description.dimmed());
        }
        if !triggers.is_empty() {
            println!("      {} {}", "triggers:".dimmed(), triggers.join(", "));
        }
        if verbose {
            println!("      {} {}", "file:".dimmed(), file.display());
        }
    }

    Ok(())
}
