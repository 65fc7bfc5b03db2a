// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 bookflow contributors

//! Cross-pipeline triggering
//!
//! The registry resolves pipeline ids to definitions; a [`TriggerHandle`]
//! tracks a run started by a trigger task.

use std::collections::BTreeMap;
use tokio::task::JoinHandle;
use tracing::warn;
use uuid::Uuid;

use crate::errors::BookflowError;
use crate::pipeline::{PipelineDefinition, Run, RunOutcome};

/// Resolves pipeline ids for cross-pipeline triggers
pub trait PipelineRegistry: Send + Sync {
    /// Definition registered under `pipeline`
    fn lookup(&self, pipeline: &str) -> Result<PipelineDefinition, BookflowError>;

    /// All registered ids, sorted
    fn pipeline_ids(&self) -> Vec<String>;
}

/// Registry holding definitions in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryRegistry {
    pipelines: BTreeMap<String, PipelineDefinition>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition under its name. Names must be unique.
    pub fn register(&mut self, def: PipelineDefinition) -> Result<(), BookflowError> {
        if self.pipelines.contains_key(&def.name) {
            return Err(BookflowError::InvalidPipeline {
                reason: format!("Pipeline '{}' is defined more than once", def.name),
                help: Some("Pipeline names must be unique across the project".into()),
            });
        }
        self.pipelines.insert(def.name.clone(), def);
        Ok(())
    }

    pub fn with_pipeline(mut self, def: PipelineDefinition) -> Result<Self, BookflowError> {
        self.register(def)?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }
}

impl PipelineRegistry for InMemoryRegistry {
    fn lookup(&self, pipeline: &str) -> Result<PipelineDefinition, BookflowError> {
        self.pipelines
            .get(pipeline)
            .cloned()
            .ok_or_else(|| BookflowError::PipelineNotFound {
                pipeline: pipeline.to_string(),
            })
    }

    fn pipeline_ids(&self) -> Vec<String> {
        self.pipelines.keys().cloned().collect()
    }
}

#[derive(Debug)]
enum HandleState {
    Finished(Box<Run>),
    Running(JoinHandle<Run>),
}

/// A run started by a trigger task
#[derive(Debug)]
pub struct TriggerHandle {
    /// Id of the triggered pipeline
    pub pipeline: String,
    /// Id of the triggered run
    pub run_id: Uuid,
    /// Whether the trigger task blocked on the run
    pub waited: bool,
    state: HandleState,
}

impl TriggerHandle {
    pub(crate) fn finished(run: Run) -> Self {
        Self {
            pipeline: run.pipeline.clone(),
            run_id: run.run_id,
            waited: true,
            state: HandleState::Finished(Box::new(run)),
        }
    }

    pub(crate) fn detached(pipeline: &str, run_id: Uuid, handle: JoinHandle<Run>) -> Self {
        Self {
            pipeline: pipeline.to_string(),
            run_id,
            waited: false,
            state: HandleState::Running(handle),
        }
    }

    /// Outcome if the run is known to be finished
    pub fn outcome(&self) -> Option<RunOutcome> {
        match &self.state {
            HandleState::Finished(run) => Some(run.outcome()),
            HandleState::Running(_) => None,
        }
    }

    /// The run, if the trigger waited for it
    pub fn run(&self) -> Option<&Run> {
        match &self.state {
            HandleState::Finished(run) => Some(run),
            HandleState::Running(_) => None,
        }
    }

    /// Wait for the triggered run to terminate
    pub async fn join(self) -> Result<Run, BookflowError> {
        match self.state {
            HandleState::Finished(run) => Ok(*run),
            HandleState::Running(handle) => handle.await.map_err(|e| {
                warn!(pipeline = %self.pipeline, run_id = %self.run_id, error = %e, "Triggered run aborted");
                BookflowError::TriggeredRunFailed {
                    pipeline: self.pipeline.clone(),
                    failing_task: None,
                }
            }),
        }
    }
}

/// Wait for every run transitively started from `run`, in start order.
///
/// Runs that were already awaited by their trigger are included as well.
pub async fn join_triggered(run: &mut Run) -> Vec<Result<Run, BookflowError>> {
    let mut pending: std::collections::VecDeque<TriggerHandle> = run.take_triggered().into();
    let mut finished = Vec::new();

    while let Some(handle) = pending.pop_front() {
        match handle.join().await {
            Ok(mut child) => {
                pending.extend(child.take_triggered());
                finished.push(Ok(child));
            }
            Err(e) => finished.push(Err(e)),
        }
    }

    finished
}
