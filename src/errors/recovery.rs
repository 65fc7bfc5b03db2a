// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 bookflow contributors

//! Error recovery suggestions
//!
//! Provides actionable suggestions for recovering from errors.

use crate::quality::Count;

/// A recovery suggestion with concrete steps
#[derive(Debug, Clone)]
pub struct RecoverySuggestion {
    /// Brief description of what to do
    pub action: String,
    /// Detailed steps
    pub steps: Vec<String>,
    /// Commands to run
    pub commands: Vec<String>,
}

impl RecoverySuggestion {
    /// Suggest fixing a circular dependency
    pub fn fix_circular_dependency(tasks: &[String]) -> Self {
        Self {
            action: "Remove circular dependency".into(),
            steps: vec![
                format!("Detected cycle: {}", tasks.join(" → ")),
                "Review the depends_on lists of these tasks".into(),
                "A quality gate implicitly depends on its upstream task".into(),
            ],
            commands: vec![
                "# Visualize your pipeline:".into(),
                "bookflow graph <pipeline> --format mermaid".into(),
            ],
        }
    }

    /// Suggest fixing a reference to an undefined task
    pub fn fix_unknown_dependency(task: &str, dependency: &str) -> Self {
        Self {
            action: format!("Define '{}' or remove it from '{}'", dependency, task),
            steps: vec![
                format!("Task '{}' lists '{}' in depends_on", task, dependency),
                "Fan-out tasks are referenced by their un-expanded id".into(),
            ],
            commands: vec!["bookflow validate".into()],
        }
    }

    /// Suggest inspecting a failed data quality check
    pub fn inspect_quality_check(upstream: &str, count: &Count) -> Self {
        Self {
            action: "Inspect the rows flagged by the quality check".into(),
            steps: vec![
                format!("'{}' reported {} violation(s)", upstream, count),
                "Re-run the check query by hand to list the offending rows".into(),
                "Fix the data or the upstream transform, then re-run the pipeline".into(),
            ],
            commands: vec![],
        }
    }

    /// Suggest registering a pipeline that a trigger refers to
    pub fn register_pipeline(pipeline: &str) -> Self {
        Self {
            action: format!("Add a definition for pipeline '{}'", pipeline),
            steps: vec![
                "Pipeline files are discovered through the `pipelines` globs of bookflow.yaml"
                    .into(),
            ],
            commands: vec!["bookflow list".into()],
        }
    }

    /// Suggest configuring Telegram credentials
    pub fn configure_telegram(token_env: &str, chat_id_env: &str) -> Self {
        Self {
            action: "Configure Telegram credentials".into(),
            steps: vec![
                "Notifications fall back to the log until both variables are set".into(),
            ],
            commands: vec![
                format!("export {}=<bot token>", token_env),
                format!("export {}=<chat id>", chat_id_env),
            ],
        }
    }
}

impl std::fmt::Display for RecoverySuggestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "→ {}", self.action)?;

        for step in &self.steps {
            writeln!(f, "  • {}", step)?;
        }

        if !self.commands.is_empty() {
            writeln!(f)?;
            for cmd in &self.commands {
                writeln!(f, "  {}", cmd)?;
            }
        }

        Ok(())
    }
}
