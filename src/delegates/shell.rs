// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 bookflow contributors

//! Shell delegate
//!
//! Runs a task's command through a shell with the run's context exported as
//! environment variables.

use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::process::Command;
use tracing::debug;

use super::WorkDelegate;
use crate::errors::BookflowError;
use crate::pipeline::{CaptureMode, RunContext, Task, TaskKind};
use crate::quality::TaskValue;

/// Lines of stderr kept in the error of a failed command
const STDERR_TAIL_LINES: usize = 10;

/// Shell delegate
pub struct ShellDelegate {
    shell: String,
}

impl ShellDelegate {
    /// Delegate running commands with `bash -c`
    pub fn new() -> Self {
        Self::with_shell("bash")
    }

    pub fn with_shell(shell: &str) -> Self {
        Self {
            shell: shell.to_string(),
        }
    }

    fn command_of(task: &Task) -> Result<(&str, CaptureMode), BookflowError> {
        match &task.kind {
            TaskKind::Work {
                command: Some(command),
                capture,
                ..
            } if !command.trim().is_empty() => Ok((command.as_str(), *capture)),
            TaskKind::Work { .. } => Err(BookflowError::InvalidPipeline {
                reason: format!("Task '{}' has no command", task.id),
                help: Some("Set `command` on shell work tasks".into()),
            }),
            other => Err(BookflowError::InvalidPipeline {
                reason: format!("Task '{}' is not work ({})", task.id, other.label()),
                help: None,
            }),
        }
    }

    /// Variables exported to the command, later entries winning
    fn environment(task: &Task, ctx: &RunContext<'_>) -> BTreeMap<String, String> {
        let mut env: BTreeMap<String, String> = ctx.settings.to_env().into_iter().collect();
        env.extend(task.env.clone());

        for (key, value) in ctx.params {
            let rendered = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            env.insert(format!("BOOKFLOW_PARAM_{}", key.to_uppercase()), rendered);
        }

        env.insert("BOOKFLOW_RUN_ID".into(), ctx.run_id.to_string());
        env.insert("BOOKFLOW_PIPELINE".into(), ctx.pipeline.to_string());
        env.insert("BOOKFLOW_TASK".into(), task.id.clone());
        env
    }
}

impl Default for ShellDelegate {
    fn default() -> Self {
        Self::new()
    }
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.trim_end().lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}

#[async_trait]
impl WorkDelegate for ShellDelegate {
    async fn execute(
        &self,
        task: &Task,
        ctx: &RunContext<'_>,
    ) -> Result<Option<TaskValue>, BookflowError> {
        let (command, capture) = Self::command_of(task)?;
        debug!(task = %task.id, command, "Running shell command");

        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c").arg(command);
        cmd.current_dir(ctx.working_dir);
        cmd.envs(Self::environment(task, ctx));

        let output = cmd
            .output()
            .await
            .map_err(|e| BookflowError::task_failed(&task.id, format!("{}: {}", self.shell, e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".into());
            let detail = tail(&stderr, STDERR_TAIL_LINES);
            let message = if detail.is_empty() {
                format!("exit code {}", code)
            } else {
                format!("exit code {}: {}", code, detail)
            };
            return Err(BookflowError::task_failed(&task.id, message));
        }

        match capture {
            CaptureMode::None => Ok(None),
            CaptureMode::Text => Ok(Some(TaskValue::Text(stdout.trim().to_string()))),
            CaptureMode::Json => TaskValue::from_json_str(stdout.trim())
                .map(Some)
                .map_err(|e| {
                    BookflowError::task_failed(&task.id, format!("stdout is not JSON: {}", e))
                }),
        }
    }

    async fn check_available(&self) -> Result<bool, BookflowError> {
        let status = Command::new(&self.shell)
            .arg("-c")
            .arg("true")
            .status()
            .await;
        Ok(status.map(|s| s.success()).unwrap_or(false))
    }

    fn validate_task(&self, task: &Task) -> Result<(), BookflowError> {
        Self::command_of(task).map(|_| ())
    }
}
