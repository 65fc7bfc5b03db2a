// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 bookflow contributors

//! Run state
//!
//! One execution of a pipeline graph: per-task lifecycle records, the
//! write-once store of propagated values, and the run outcome. Only the
//! executor mutates a run; delegates see it through [`RunContext`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

use crate::config::Settings;
use crate::errors::BookflowError;
use crate::pipeline::{PipelineGraph, TriggerHandle};
use crate::quality::TaskValue;

/// Lifecycle state of a task within a run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
}

impl TaskState {
    /// Success, Failed and Skipped are terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Skipped)
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// Outcome of a whole run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    Pending,
    Success,
    Failed,
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// What happened to one task
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRecord {
    pub state: TaskState,
    /// Invocations of the task's work, retries included
    pub attempts: u32,
    /// Error text of the last failed attempt, or why the task was skipped
    pub detail: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration: Option<Duration>,
}

impl TaskRecord {
    fn pending() -> Self {
        Self {
            state: TaskState::Pending,
            attempts: 0,
            detail: None,
            started_at: None,
            finished_at: None,
            duration: None,
        }
    }
}

/// Write-once store of values propagated between tasks
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueStore {
    values: HashMap<String, TaskValue>,
}

impl ValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the value produced by `task`. A second write for the same
    /// task is rejected.
    pub fn insert(&mut self, task: &str, value: TaskValue) -> Result<(), BookflowError> {
        if self.values.contains_key(task) {
            return Err(BookflowError::DuplicateResult {
                task: task.to_string(),
            });
        }
        self.values.insert(task.to_string(), value);
        Ok(())
    }

    pub fn get(&self, task: &str) -> Option<&TaskValue> {
        self.values.get(task)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Result of driving one task, applied to the run by the executor
#[derive(Debug)]
pub(crate) struct TaskOutcome {
    pub state: TaskState,
    pub attempts: u32,
    pub value: Option<TaskValue>,
    pub error: Option<BookflowError>,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub trigger: Option<TriggerHandle>,
}

/// One execution of a pipeline graph
#[derive(Debug)]
pub struct Run {
    pub run_id: Uuid,
    pub pipeline: String,
    pub params: BTreeMap<String, serde_json::Value>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    records: HashMap<String, TaskRecord>,
    /// Task ids in the order they reached a terminal state
    completed: Vec<String>,
    values: ValueStore,
    outcome: RunOutcome,
    failing_task: Option<String>,
    failure_detail: Option<String>,
    triggered: Vec<TriggerHandle>,
}

impl Run {
    pub fn new(
        run_id: Uuid,
        graph: &PipelineGraph,
        params: BTreeMap<String, serde_json::Value>,
    ) -> Self {
        let records = graph
            .tasks()
            .iter()
            .map(|t| (t.id.clone(), TaskRecord::pending()))
            .collect();

        Self {
            run_id,
            pipeline: graph.name().to_string(),
            params,
            started_at: Utc::now(),
            finished_at: None,
            records,
            completed: Vec::new(),
            values: ValueStore::new(),
            outcome: RunOutcome::Pending,
            failing_task: None,
            failure_detail: None,
            triggered: Vec::new(),
        }
    }

    pub fn outcome(&self) -> RunOutcome {
        self.outcome
    }

    pub fn is_success(&self) -> bool {
        self.outcome == RunOutcome::Success
    }

    /// First task that failed, if any
    pub fn failing_task(&self) -> Option<&str> {
        self.failing_task.as_deref()
    }

    /// Error text of the first failure
    pub fn failure_detail(&self) -> Option<&str> {
        self.failure_detail.as_deref()
    }

    /// State of a task; unknown ids read as Pending
    pub fn state(&self, task: &str) -> TaskState {
        self.records
            .get(task)
            .map(|r| r.state)
            .unwrap_or(TaskState::Pending)
    }

    pub fn record(&self, task: &str) -> Option<&TaskRecord> {
        self.records.get(task)
    }

    pub fn attempts(&self, task: &str) -> u32 {
        self.records.get(task).map(|r| r.attempts).unwrap_or(0)
    }

    /// Propagated value of a task that succeeded
    pub fn value(&self, task: &str) -> Option<&TaskValue> {
        self.values.get(task)
    }

    pub fn values(&self) -> &ValueStore {
        &self.values
    }

    /// Task ids in completion order
    pub fn completed(&self) -> &[String] {
        &self.completed
    }

    /// Task ids currently in `state`, in completion order where terminal
    pub fn tasks_in_state(&self, state: TaskState) -> Vec<&str> {
        if state.is_terminal() {
            return self
                .completed
                .iter()
                .filter(|id| self.state(id) == state)
                .map(String::as_str)
                .collect();
        }

        let mut ids: Vec<&str> = self
            .records
            .iter()
            .filter(|(_, r)| r.state == state)
            .map(|(id, _)| id.as_str())
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Runs started by cross-pipeline triggers
    pub fn triggered(&self) -> &[TriggerHandle] {
        &self.triggered
    }

    /// Take ownership of the trigger handles, e.g. to await detached runs
    pub fn take_triggered(&mut self) -> Vec<TriggerHandle> {
        std::mem::take(&mut self.triggered)
    }

    pub(crate) fn mark_running(&mut self, task: &str) {
        if let Some(record) = self.records.get_mut(task) {
            record.state = TaskState::Running;
            record.started_at = Some(Utc::now());
        }
    }

    pub(crate) fn skip(&mut self, task: &str, reason: &str) {
        if let Some(record) = self.records.get_mut(task) {
            if record.state.is_terminal() {
                return;
            }
            record.state = TaskState::Skipped;
            record.detail = Some(reason.to_string());
            record.finished_at = Some(Utc::now());
            self.completed.push(task.to_string());
        }
    }

    pub(crate) fn apply(&mut self, task: &str, outcome: TaskOutcome) {
        let mut state = outcome.state;
        let mut error = outcome.error;

        if state == TaskState::Success {
            if let Some(value) = outcome.value {
                if let Err(e) = self.values.insert(task, value) {
                    state = TaskState::Failed;
                    error = Some(e);
                }
            }
        }

        if let Some(handle) = outcome.trigger {
            self.triggered.push(handle);
        }

        let detail = error.as_ref().map(ToString::to_string);

        if state == TaskState::Failed {
            self.outcome = RunOutcome::Failed;
            if self.failing_task.is_none() {
                self.failing_task = Some(task.to_string());
                self.failure_detail = detail.clone();
            }
        }

        if let Some(record) = self.records.get_mut(task) {
            record.state = state;
            record.attempts = outcome.attempts;
            record.detail = detail;
            record.started_at = Some(outcome.started_at);
            record.finished_at = Some(Utc::now());
            record.duration = Some(outcome.duration);
        }

        self.completed.push(task.to_string());
    }

    /// Close the run: anything never reached is Skipped, and the outcome is
    /// Success unless a task failed.
    pub(crate) fn finish(&mut self) {
        let mut unreached: Vec<String> = self
            .records
            .iter()
            .filter(|(_, r)| !r.state.is_terminal())
            .map(|(id, _)| id.clone())
            .collect();
        unreached.sort_unstable();

        for id in unreached {
            self.skip(&id, "run short-circuited after failure");
        }

        if self.outcome != RunOutcome::Failed {
            self.outcome = RunOutcome::Success;
        }
        self.finished_at = Some(Utc::now());
    }
}

/// Read-only view of a run handed to work delegates
#[derive(Debug, Clone, Copy)]
pub struct RunContext<'a> {
    pub run_id: Uuid,
    pub pipeline: &'a str,
    pub params: &'a BTreeMap<String, serde_json::Value>,
    pub settings: &'a Settings,
    pub values: &'a ValueStore,
    pub working_dir: &'a Path,
}
