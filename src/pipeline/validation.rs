// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 bookflow contributors

//! Pipeline validation
//!
//! Validates pipeline definitions before execution.

use std::collections::HashSet;

use crate::config::Settings;
use crate::errors::BookflowError;
use crate::pipeline::{
    PipelineDefinition, PipelineGraph, TaskDefinition, TaskKind, TriggerRule,
};

/// Pipeline validator
pub struct PipelineValidator;

impl PipelineValidator {
    /// Validate a definition against the settings it will be expanded with
    /// and the ids of the pipelines it may trigger
    pub fn validate(
        def: &PipelineDefinition,
        settings: &Settings,
        known_pipelines: &[String],
    ) -> ValidationResult {
        let mut result = ValidationResult::new();

        if def.tasks.is_empty() {
            result.add_error("Pipeline has no tasks defined");
        }

        let mut seen = HashSet::new();
        let mut has_duplicates = false;
        for task in &def.tasks {
            if !seen.insert(task.id.as_str()) {
                has_duplicates = true;
                result.add_error(&format!("Duplicate task id: '{}'", task.id));
            }
        }

        if let Some(retry) = &def.default_retry {
            if retry.max_attempts == 0 {
                result.add_error("default_retry.max_attempts must be at least 1");
            }
        }

        for task in &def.tasks {
            Self::validate_task(task, def, settings, known_pipelines, &mut result);
        }

        match PipelineGraph::from_definition(def, settings) {
            Ok(graph) => {
                if let Some(summary) = &def.summary {
                    if graph.task(&summary.task).is_none() {
                        result.add_warning(&format!(
                            "Summary task '{}' does not exist; success messages will omit it",
                            summary.task
                        ));
                    }
                }
            }
            Err(BookflowError::DuplicateTask { .. }) if has_duplicates => {}
            Err(BookflowError::CircularDependency { tasks }) => {
                result.add_error(&format!("Circular dependency: {}", tasks.join(" → ")));
            }
            Err(BookflowError::UnknownDependency { task, dependency }) => {
                result.add_error(&format!(
                    "Task '{}' depends on unknown task '{}'",
                    task, dependency
                ));
            }
            Err(e) => {
                result.add_error(&format!("Graph error: {}", e));
            }
        }

        result
    }

    /// Validate a single task
    fn validate_task(
        task: &TaskDefinition,
        def: &PipelineDefinition,
        settings: &Settings,
        known_pipelines: &[String],
        result: &mut ValidationResult,
    ) {
        if let Some(retry) = &task.retry {
            if retry.max_attempts == 0 {
                result.add_error(&format!(
                    "Task '{}': retry.max_attempts must be at least 1",
                    task.id
                ));
            }
        }

        if task.for_each.is_some() && settings.sources.is_empty() {
            result.add_warning(&format!(
                "Task '{}': fans out over sources, but no sources are configured. \
                 It expands to nothing.",
                task.id
            ));
        }

        match &task.kind {
            TaskKind::Work {
                operator, command, ..
            } => {
                if operator == "shell" && command.as_deref().map_or(true, |c| c.trim().is_empty()) {
                    result.add_error(&format!("Task '{}': Shell command is empty", task.id));
                }
            }
            TaskKind::QualityGate { upstream } => {
                if def.get_task(upstream).is_none() {
                    result.add_error(&format!(
                        "Task '{}': Quality gate checks unknown task '{}'",
                        task.id, upstream
                    ));
                } else if !task.depends_on.contains(upstream) {
                    result.add_warning(&format!(
                        "Task '{}': Checks '{}' but doesn't declare dependency. \
                         This will be added implicitly.",
                        task.id, upstream
                    ));
                }

                if task.trigger_rule == TriggerRule::AllDone {
                    result.add_warning(&format!(
                        "Task '{}': Quality gate under all_done will fail when '{}' produced no value",
                        task.id, upstream
                    ));
                }
            }
            TaskKind::TriggerPipeline { pipeline, .. } => {
                if pipeline == &def.name {
                    result.add_error(&format!(
                        "Task '{}': Pipeline '{}' triggers itself",
                        task.id, pipeline
                    ));
                } else if !known_pipelines.contains(pipeline) {
                    result.add_error(&format!(
                        "Task '{}': Triggers unknown pipeline '{}'",
                        task.id, pipeline
                    ));
                }
            }
        }
    }
}

/// Result of pipeline validation
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }

    pub fn add_warning(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validate(yaml: &str, sources: &[&str]) -> ValidationResult {
        let def = PipelineDefinition::from_yaml(yaml).unwrap();
        let settings = Settings {
            sources: sources.iter().map(|s| s.to_string()).collect(),
            ..Settings::default()
        };
        PipelineValidator::validate(&def, &settings, &["clean_data_pipeline".to_string()])
    }

    #[test]
    fn test_validate_empty_pipeline() {
        let result = validate("name: empty\ntasks: []\n", &[]);
        assert!(!result.is_valid());
        assert!(result.errors[0].contains("no tasks"));
    }

    #[test]
    fn test_validate_duplicate_ids() {
        let result = validate(
            r#"
name: p
tasks:
  - id: dup
    kind: { type: work, command: "true" }
  - id: dup
    kind: { type: work, command: "true" }
"#,
            &[],
        );
        assert!(!result.is_valid());
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("Duplicate"));
    }

    #[test]
    fn test_validate_gate_without_dependency() {
        let result = validate(
            r#"
name: p
tasks:
  - id: validate_raw_quality
    kind: { type: work, operator: sql, capture: json }
  - id: check_raw_results
    kind: { type: quality_gate, upstream: validate_raw_quality }
"#,
            &[],
        );
        assert!(result.is_valid());
        assert!(result.warnings.iter().any(|w| w.contains("implicitly")));
    }

    #[test]
    fn test_validate_triggers_and_retries() {
        let result = validate(
            r#"
name: p
tasks:
  - id: to_self
    kind: { type: trigger_pipeline, pipeline: p }
  - id: to_unknown
    kind: { type: trigger_pipeline, pipeline: nowhere }
  - id: to_known
    retry: { max_attempts: 0 }
    kind: { type: trigger_pipeline, pipeline: clean_data_pipeline }
"#,
            &[],
        );
        assert_eq!(result.errors.len(), 3);
        assert!(result.errors.iter().any(|e| e.contains("triggers itself")));
        assert!(result.errors.iter().any(|e| e.contains("unknown pipeline 'nowhere'")));
        assert!(result.errors.iter().any(|e| e.contains("max_attempts")));
    }

    #[test]
    fn test_validate_cycle_and_empty_fan_out() {
        let result = validate(
            r#"
name: p
tasks:
  - id: scrape
    for_each: sources
    kind: { type: work, command: "scrapy crawl {source}" }
  - id: a
    depends_on: [b]
    kind: { type: work, command: "true" }
  - id: b
    depends_on: [a]
    kind: { type: work, command: "true" }
"#,
            &[],
        );
        assert!(result.errors.iter().any(|e| e.contains("Circular dependency")));
        assert!(result.warnings.iter().any(|w| w.contains("expands to nothing")));
    }
}
