// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 bookflow contributors

//! Run command - execute a pipeline

use colored::Colorize;
use miette::Result;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::notify::Notifier;
use crate::pipeline::{
    join_triggered, ExecutionOptions, PipelineExecutor, PipelineGraph, PipelineValidator, Run,
    TaskState,
};
use crate::utils::{print_section, state_symbol};

/// Run a pipeline
pub async fn run(
    project: Option<PathBuf>,
    pipeline: String,
    params: Vec<String>,
    dry_run: bool,
    no_fail_fast: bool,
    verbose: bool,
) -> Result<()> {
    let project = super::load_project(project)?;
    let params = parse_params(&params)?;

    let def = project.pipeline(&pipeline).map_err(super::report)?;
    let validation =
        PipelineValidator::validate(def, &project.config.settings, &project.pipeline_ids());

    if !validation.is_valid() {
        eprintln!("{}", "Pipeline validation failed:".red().bold());
        for error in &validation.errors {
            eprintln!("  {} {}", "✗".red(), error);
        }
        return Err(miette::miette!("Pipeline configuration is invalid"));
    }

    if validation.has_warnings() && verbose {
        eprintln!("{}", "Pipeline warnings:".yellow().bold());
        for warning in &validation.warnings {
            eprintln!("  {} {}", "⚠".yellow(), warning);
        }
        eprintln!();
    }

    let registry = project.registry().map_err(super::report)?;
    let executor = PipelineExecutor::new(Arc::new(registry))
        .with_default_delegates()
        .with_settings(project.config.settings.clone())
        .with_notifier(Notifier::from_config(&project.config.notifications))
        .with_options(ExecutionOptions {
            fail_fast: !no_fail_fast,
            dry_run,
            working_dir: project.root.clone(),
            ..ExecutionOptions::default()
        });

    let graph = executor.graph(&pipeline).map_err(super::report)?;
    executor
        .check_delegates(&graph)
        .await
        .map_err(super::report)?;

    println!("{}", format!("Execution plan for '{}':", pipeline).bold());
    for line in graph.to_text().lines() {
        println!("  {}", line);
    }
    println!();

    let mut run = executor.run(&graph, params).await;
    print_run(&run, &graph, verbose);

    let triggered = join_triggered(&mut run).await;
    if !triggered.is_empty() {
        print_section("Triggered runs");
        for child in &triggered {
            match child {
                Ok(child) => {
                    let symbol = if child.is_success() {
                        "✓".green()
                    } else {
                        "✗".red()
                    };
                    println!(
                        "  {} {} {} ({})",
                        symbol,
                        child.pipeline.bold(),
                        child.outcome(),
                        child.run_id.to_string().dimmed()
                    );
                    if let (Some(task), Some(detail)) = (child.failing_task(), child.failure_detail()) {
                        println!("      {} {}: {}", "→".blue(), task, detail.dimmed());
                    }
                }
                Err(e) => println!("  {} {}", "✗".red(), e),
            }
        }
    }

    println!();
    let elapsed = run
        .finished_at
        .map(|end| (end - run.started_at).num_milliseconds() as f64 / 1000.0)
        .unwrap_or_default();

    if run.is_success() {
        println!(
            "{}",
            format!("Pipeline completed successfully in {:.2}s", elapsed).green()
        );
        Ok(())
    } else {
        println!("{}", format!("Pipeline failed after {:.2}s", elapsed).red());
        Err(miette::miette!(
            "Task '{}' failed: {}",
            run.failing_task().unwrap_or("unknown"),
            run.failure_detail().unwrap_or("no detail")
        ))
    }
}

/// Per-task outcome in completion order
fn print_run(run: &Run, graph: &PipelineGraph, verbose: bool) {
    for id in run.completed() {
        let Some(record) = run.record(id) else { continue };
        let mut line = format!("  {} {}", state_symbol(record.state), id.bold());

        if record.state != TaskState::Skipped {
            if let Some(duration) = record.duration {
                line.push_str(&format!(" ({:.2}s)", duration.as_secs_f64()));
            }
        }
        if record.attempts > 1 {
            line.push_str(&format!(" [{} attempts]", record.attempts));
        }
        println!("{}", line);

        match record.state {
            TaskState::Failed => {
                if let Some(detail) = &record.detail {
                    eprintln!("      {}", detail.dimmed());
                }
            }
            TaskState::Skipped if verbose => {
                if let Some(detail) = &record.detail {
                    println!("      {}", detail.dimmed());
                }
            }
            _ => {}
        }
    }

    if let Some(summary) = graph.summary() {
        if let Some(value) = run.value(&summary.task) {
            println!();
            println!("  {}: {}", summary.label.bold(), value);
        }
    }
}

/// Parse KEY=VALUE pairs; values are JSON when they parse, strings otherwise
pub fn parse_params(raw: &[String]) -> Result<BTreeMap<String, serde_json::Value>> {
    let mut params = BTreeMap::new();

    for pair in raw {
        let (key, value) = pair.split_once('=').ok_or_else(|| {
            miette::miette!("Invalid parameter '{}': expected KEY=VALUE", pair)
        })?;

        let key = key.trim();
        if key.is_empty() {
            return Err(miette::miette!("Invalid parameter '{}': empty key", pair));
        }

        let value = serde_json::from_str(value)
            .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
        params.insert(key.to_string(), value);
    }

    Ok(params)
}
