// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 bookflow contributors

//! Error types for bookflow
//!
//! Every failure the engine can observe, from graph construction to
//! notification delivery, is expressed as a [`BookflowError`]. Task-local
//! errors never escape the executor; they are folded into the run outcome.

mod recovery;

pub use recovery::RecoverySuggestion;

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

use crate::quality::Count;

/// Result type for bookflow operations
pub type BookflowResult<T> = Result<T, BookflowError>;

/// Main error type for bookflow
#[derive(Error, Debug, Diagnostic)]
pub enum BookflowError {
    // ─────────────────────────────────────────────────────────────────────────
    // Graph Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Circular dependency detected: {}", tasks.join(" → "))]
    #[diagnostic(
        code(bookflow::circular_dependency),
        help("Review your task dependencies to remove the cycle")
    )]
    CircularDependency { tasks: Vec<String> },

    #[error("Task '{task}' depends on unknown task '{dependency}'")]
    #[diagnostic(
        code(bookflow::unknown_dependency),
        help("Check that '{dependency}' is defined in your pipeline")
    )]
    UnknownDependency { task: String, dependency: String },

    #[error("Task id '{task}' is defined more than once")]
    #[diagnostic(code(bookflow::duplicate_task))]
    DuplicateTask { task: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Task Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Task '{task}' failed: {message}")]
    #[diagnostic(code(bookflow::task_execution))]
    TaskExecution { task: String, message: String },

    #[error("Task '{task}' already produced a result in this run")]
    #[diagnostic(code(bookflow::duplicate_result))]
    DuplicateResult { task: String },

    #[error("No delegate registered for operator '{operator}'")]
    #[diagnostic(code(bookflow::delegate_not_found), help("Built-in operators: shell"))]
    DelegateNotFound { operator: String },

    #[error("Delegate for operator '{operator}' is not available")]
    #[diagnostic(
        code(bookflow::delegate_unavailable),
        help("Install the tool behind '{operator}' or fix its configuration")
    )]
    DelegateUnavailable { operator: String },

    #[error("Task '{task}' found no result from upstream task '{upstream}'")]
    #[diagnostic(
        code(bookflow::missing_upstream_value),
        help("The upstream task must succeed and produce a value (set `capture` on work tasks)")
    )]
    MissingUpstreamValue { task: String, upstream: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Quality Gate Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Data quality check failed: {count} issues found in '{upstream}'")]
    #[diagnostic(code(bookflow::quality_gate_failed))]
    QualityGateFailed { upstream: String, count: Count },

    #[error("No numeric result found in the output of '{upstream}'")]
    #[diagnostic(code(bookflow::no_numeric_result))]
    NoNumericResult { upstream: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Cross-Pipeline Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Pipeline '{pipeline}' is not registered")]
    #[diagnostic(
        code(bookflow::pipeline_not_found),
        help("Run 'bookflow list' to see the pipelines of this project")
    )]
    PipelineNotFound { pipeline: String },

    #[error("Could not start pipeline '{pipeline}': {reason}")]
    #[diagnostic(code(bookflow::trigger_start))]
    TriggerStart { pipeline: String, reason: String },

    #[error(
        "Triggered pipeline '{pipeline}' failed{}",
        failing_task.as_ref().map(|t| format!(" at task '{}'", t)).unwrap_or_default()
    )]
    #[diagnostic(code(bookflow::triggered_run_failed))]
    TriggeredRunFailed {
        pipeline: String,
        failing_task: Option<String>,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Notification Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Notification transport error: {message}")]
    #[diagnostic(code(bookflow::transport))]
    Transport { message: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Project Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Project file not found: {path}")]
    #[diagnostic(
        code(bookflow::project_not_found),
        help("Create a bookflow.yaml or pass --project")
    )]
    ProjectNotFound { path: PathBuf },

    #[error("Invalid pipeline configuration: {reason}")]
    #[diagnostic(code(bookflow::invalid_pipeline))]
    InvalidPipeline {
        reason: String,
        #[help]
        help: Option<String>,
    },

    #[error("Failed to read file '{path}': {error}")]
    #[diagnostic(code(bookflow::file_read_error))]
    FileReadError { path: PathBuf, error: String },

    // ─────────────────────────────────────────────────────────────────────────
    // IO/System Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("IO error: {message}")]
    #[diagnostic(code(bookflow::io_error))]
    Io { message: String },

    #[error("YAML parsing error: {message}")]
    #[diagnostic(code(bookflow::yaml_error))]
    Yaml { message: String },

    #[error("JSON parsing error: {message}")]
    #[diagnostic(code(bookflow::json_error))]
    Json { message: String },

    #[error("Glob pattern error: {message}")]
    #[diagnostic(code(bookflow::glob_error))]
    GlobPattern { message: String },
}

impl From<std::io::Error> for BookflowError {
    fn from(e: std::io::Error) -> Self {
        Self::Io { message: e.to_string() }
    }
}

impl From<serde_yaml::Error> for BookflowError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Yaml { message: e.to_string() }
    }
}

impl From<serde_json::Error> for BookflowError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json { message: e.to_string() }
    }
}

impl From<glob::PatternError> for BookflowError {
    fn from(e: glob::PatternError) -> Self {
        Self::GlobPattern { message: e.to_string() }
    }
}

impl From<reqwest::Error> for BookflowError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport { message: e.to_string() }
    }
}

impl BookflowError {
    /// Whether another attempt of the same task may succeed.
    ///
    /// Only delegate failures are transient. A quality gate verdict is a
    /// signal, and trigger failures would re-run a whole pipeline.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TaskExecution { .. })
    }

    /// Shorthand for a delegate failure
    pub fn task_failed(task: &str, message: impl Into<String>) -> Self {
        Self::TaskExecution {
            task: task.to_string(),
            message: message.into(),
        }
    }

    /// Recovery steps for errors that have a known remedy
    pub fn recovery(&self) -> Option<RecoverySuggestion> {
        match self {
            Self::CircularDependency { tasks } => {
                Some(RecoverySuggestion::fix_circular_dependency(tasks))
            }
            Self::UnknownDependency { task, dependency } => {
                Some(RecoverySuggestion::fix_unknown_dependency(task, dependency))
            }
            Self::QualityGateFailed { upstream, count } => {
                Some(RecoverySuggestion::inspect_quality_check(upstream, count))
            }
            Self::PipelineNotFound { pipeline } => {
                Some(RecoverySuggestion::register_pipeline(pipeline))
            }
            _ => None,
        }
    }
}
