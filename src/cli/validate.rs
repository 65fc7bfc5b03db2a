// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 bookflow contributors

//! Validate command - check pipeline definitions

use colored::Colorize;
use miette::Result;
use std::path::PathBuf;

use crate::pipeline::{PipelineGraph, PipelineValidator};

/// Run the validate command
pub async fn run(project: Option<PathBuf>, pipeline: Option<String>, verbose: bool) -> Result<()> {
    println!("{}", "Validating pipelines...".bold());
    println!();

    let project = super::load_project(project)?;
    println!(
        "  {} Project file is valid ({} pipelines)",
        "✓".green(),
        project.pipelines.len()
    );

    let known = project.pipeline_ids();
    let selected: Vec<_> = match &pipeline {
        Some(name) => vec![project.pipeline(name).map_err(super::report)?],
        None => project.pipelines.iter().map(|(_, d)| d).collect(),
    };

    let mut failed = 0;
    let mut warned = 0;

    for def in selected {
        let validation = PipelineValidator::validate(def, &project.config.settings, &known);

        println!();
        if validation.is_valid() {
            println!("  {} {}", "✓".green(), def.name.bold());
        } else {
            failed += 1;
            println!("  {} {}", "✗".red(), def.name.bold());
        }

        for error in &validation.errors {
            println!("      {} {}", "✗".red(), error);
        }
        if validation.has_warnings() {
            warned += 1;
            for warning in &validation.warnings {
                println!("      {} {}", "⚠".yellow(), warning);
            }
        }

        if verbose && validation.is_valid() {
            if let Ok(graph) = PipelineGraph::from_definition(def, &project.config.settings) {
                for task in graph.tasks() {
                    let deps = if task.dependencies.is_empty() {
                        String::new()
                    } else {
                        format!(" [depends: {}]", task.dependencies.join(", "))
                    };
                    println!("      - {} ({}){}", task.id, task.kind.label(), deps.dimmed());
                }
            }
        }
    }

    println!();

    if failed > 0 {
        Err(miette::miette!("{} pipeline(s) failed validation", failed))
    } else if warned > 0 {
        println!("{}", "Pipelines are valid but have warnings.".yellow().bold());
        Ok(())
    } else {
        println!("{}", "All pipelines are valid!".green().bold());
        Ok(())
    }
}
