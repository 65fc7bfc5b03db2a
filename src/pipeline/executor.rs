// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 bookflow contributors

//! Pipeline executor
//!
//! Drives a run of a pipeline graph layer by layer. Tasks of a layer run
//! concurrently; their outcomes are applied to the run once the whole layer
//! has finished.

use futures::future::{join_all, BoxFuture};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::Settings;
use crate::delegates::{create_default_delegates, WorkDelegate};
use crate::errors::BookflowError;
use crate::notify::{EventSummary, Notifier, RunEvent};
use crate::pipeline::run::TaskOutcome;
use crate::pipeline::{
    PipelineGraph, PipelineRegistry, Run, RunContext, RunOutcome, Task, TaskKind, TaskState,
    TriggerHandle, TriggerRule,
};
use crate::quality::{QualityGate, TaskValue};

/// Pipeline execution options
#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    /// Skip remaining tasks once the run has failed, unless an all_done
    /// task is still pending
    pub fail_fast: bool,
    /// Deepest chain of runs started by cross-pipeline triggers
    pub max_trigger_depth: usize,
    /// Mark every task skipped without invoking anything
    pub dry_run: bool,
    /// Directory work delegates run in
    pub working_dir: PathBuf,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            fail_fast: true,
            max_trigger_depth: 5,
            dry_run: false,
            working_dir: PathBuf::from("."),
        }
    }
}

/// Pipeline executor
#[derive(Clone)]
pub struct PipelineExecutor {
    /// Registered delegates by operator name
    delegates: HashMap<String, Arc<dyn WorkDelegate>>,
    registry: Arc<dyn PipelineRegistry>,
    notifier: Arc<Notifier>,
    settings: Arc<Settings>,
    options: ExecutionOptions,
}

impl PipelineExecutor {
    /// Executor with no delegates and log-only notifications
    pub fn new(registry: Arc<dyn PipelineRegistry>) -> Self {
        Self {
            delegates: HashMap::new(),
            registry,
            notifier: Arc::new(Notifier::log_only()),
            settings: Arc::new(Settings::default()),
            options: ExecutionOptions::default(),
        }
    }

    /// Register the built-in delegates
    pub fn with_default_delegates(mut self) -> Self {
        self.delegates.extend(create_default_delegates());
        self
    }

    /// Register a delegate for an operator
    pub fn register_delegate(&mut self, operator: &str, delegate: Arc<dyn WorkDelegate>) {
        self.delegates.insert(operator.to_string(), delegate);
    }

    pub fn with_delegate(mut self, operator: &str, delegate: Arc<dyn WorkDelegate>) -> Self {
        self.register_delegate(operator, delegate);
        self
    }

    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = Arc::new(notifier);
        self
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = Arc::new(settings);
        self
    }

    pub fn with_options(mut self, options: ExecutionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn options(&self) -> &ExecutionOptions {
        &self.options
    }

    /// Build the graph of a registered pipeline
    pub fn graph(&self, pipeline: &str) -> Result<PipelineGraph, BookflowError> {
        let def = self.registry.lookup(pipeline)?;
        PipelineGraph::from_definition(&def, &self.settings)
    }

    /// Run a registered pipeline
    pub async fn run_pipeline(
        &self,
        pipeline: &str,
        params: BTreeMap<String, serde_json::Value>,
    ) -> Result<Run, BookflowError> {
        let graph = self.graph(pipeline)?;
        Ok(self.run(&graph, params).await)
    }

    /// Run a graph to a terminal outcome. Task errors never escape; they
    /// end up in the returned run.
    pub async fn run(
        &self,
        graph: &PipelineGraph,
        params: BTreeMap<String, serde_json::Value>,
    ) -> Run {
        self.run_at_depth(Uuid::new_v4(), graph, params, 0).await
    }

    /// Check every work task has an available delegate that accepts it
    pub async fn check_delegates(&self, graph: &PipelineGraph) -> Result<(), BookflowError> {
        let mut checked: Vec<&str> = Vec::new();

        for task in graph.tasks() {
            if let TaskKind::Work { operator, .. } = &task.kind {
                let delegate = self.delegates.get(operator).ok_or_else(|| {
                    BookflowError::DelegateNotFound {
                        operator: operator.clone(),
                    }
                })?;

                if !checked.contains(&operator.as_str()) {
                    if !delegate.check_available().await.unwrap_or(false) {
                        return Err(BookflowError::DelegateUnavailable {
                            operator: operator.clone(),
                        });
                    }
                    checked.push(operator);
                }

                delegate.validate_task(task)?;
            }
        }
        Ok(())
    }

    fn run_at_depth<'a>(
        &'a self,
        run_id: Uuid,
        graph: &'a PipelineGraph,
        params: BTreeMap<String, serde_json::Value>,
        depth: usize,
    ) -> BoxFuture<'a, Run> {
        Box::pin(async move {
            let mut run = Run::new(run_id, graph, params);
            info!(
                pipeline = graph.name(),
                run_id = %run_id,
                tasks = graph.len(),
                depth,
                "Starting run"
            );

            for layer in graph.topological_layers() {
                let mut runnable: Vec<&Task> = Vec::new();

                for id in layer {
                    let Some(task) = graph.task(id) else { continue };

                    if self.options.dry_run {
                        run.skip(id, "dry run");
                        continue;
                    }

                    if self.should_short_circuit(graph, &run) {
                        debug!(task = id, "Short-circuiting after failure");
                        run.skip(id, "run short-circuited after failure");
                        continue;
                    }

                    let states = task.dependencies.iter().map(|d| run.state(d));
                    if !task.trigger_rule.is_satisfied(states) {
                        info!(task = id, rule = %task.trigger_rule, "Trigger rule not met, skipping");
                        run.skip(id, &format!("trigger rule {} not met", task.trigger_rule));
                        continue;
                    }

                    runnable.push(task);
                }

                for task in &runnable {
                    run.mark_running(&task.id);
                }

                let outcomes = {
                    let ctx = RunContext {
                        run_id,
                        pipeline: graph.name(),
                        params: &run.params,
                        settings: &self.settings,
                        values: run.values(),
                        working_dir: &self.options.working_dir,
                    };
                    join_all(runnable.iter().map(|task| self.execute_task(task, &ctx, depth)))
                        .await
                };

                for (task, outcome) in runnable.into_iter().zip(outcomes) {
                    match outcome.state {
                        TaskState::Success => info!(
                            task = %task.id,
                            attempts = outcome.attempts,
                            elapsed_ms = outcome.duration.as_millis() as u64,
                            "Task succeeded"
                        ),
                        _ => error!(
                            task = %task.id,
                            attempts = outcome.attempts,
                            error = outcome.error.as_ref().map(ToString::to_string).as_deref().unwrap_or("-"),
                            "Task failed"
                        ),
                    }
                    run.apply(&task.id, outcome);
                }
            }

            run.finish();
            info!(
                pipeline = graph.name(),
                run_id = %run_id,
                outcome = %run.outcome(),
                "Run finished"
            );

            self.notify(graph, &run).await;
            run
        })
    }

    /// A failed run stops early unless an all_done task still has to run
    fn should_short_circuit(&self, graph: &PipelineGraph, run: &Run) -> bool {
        self.options.fail_fast
            && run.outcome() == RunOutcome::Failed
            && !graph.tasks().iter().any(|t| {
                t.trigger_rule == TriggerRule::AllDone && !run.state(&t.id).is_terminal()
            })
    }

    async fn notify(&self, graph: &PipelineGraph, run: &Run) {
        let failed = run.outcome() == RunOutcome::Failed;

        let summary = graph
            .summary()
            .filter(|_| !failed)
            .and_then(|s| {
                run.value(&s.task).map(|v| EventSummary {
                    label: s.label.clone(),
                    value: v.to_string(),
                })
            });

        let event = RunEvent {
            pipeline_id: run.pipeline.clone(),
            run_id: run.run_id,
            outcome: run.outcome(),
            failing_task_id: if failed {
                run.failing_task().map(String::from)
            } else {
                None
            },
            timestamp: run.finished_at.unwrap_or_else(Utc::now),
            detail: if failed {
                run.failure_detail().map(String::from)
            } else {
                None
            },
            summary,
        };

        self.notifier.notify(&event).await;
    }

    /// Drive one task to a terminal state
    async fn execute_task(&self, task: &Task, ctx: &RunContext<'_>, depth: usize) -> TaskOutcome {
        let started_at = Utc::now();
        let start = Instant::now();

        if let TaskKind::TriggerPipeline {
            pipeline,
            wait,
            params,
        } = &task.kind
        {
            let (result, trigger) = self
                .trigger(pipeline, params.clone(), *wait, ctx, depth)
                .await;
            let (state, value, error) = match result {
                Ok(run_id) => (
                    TaskState::Success,
                    Some(TaskValue::Text(run_id.to_string())),
                    None,
                ),
                Err(e) => (TaskState::Failed, None, Some(e)),
            };
            return TaskOutcome {
                state,
                attempts: 1,
                value,
                error,
                started_at,
                duration: start.elapsed(),
                trigger,
            };
        }

        let max_attempts = task.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(task = %task.id, attempt, max_attempts, "Attempting task");

            match self.attempt(task, ctx).await {
                Ok(value) => {
                    return TaskOutcome {
                        state: TaskState::Success,
                        attempts: attempt,
                        value,
                        error: None,
                        started_at,
                        duration: start.elapsed(),
                        trigger: None,
                    };
                }
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    warn!(
                        task = %task.id,
                        attempt,
                        max_attempts,
                        error = %e,
                        "Attempt failed, retrying"
                    );
                    tokio::time::sleep(task.retry.delay()).await;
                }
                Err(e) => {
                    return TaskOutcome {
                        state: TaskState::Failed,
                        attempts: attempt,
                        value: None,
                        error: Some(e),
                        started_at,
                        duration: start.elapsed(),
                        trigger: None,
                    };
                }
            }
        }
    }

    /// One invocation of a work task or quality gate
    async fn attempt(
        &self,
        task: &Task,
        ctx: &RunContext<'_>,
    ) -> Result<Option<TaskValue>, BookflowError> {
        match &task.kind {
            TaskKind::Work { operator, .. } => {
                let delegate = self.delegates.get(operator).ok_or_else(|| {
                    BookflowError::DelegateNotFound {
                        operator: operator.clone(),
                    }
                })?;
                delegate.execute(task, ctx).await
            }
            TaskKind::QualityGate { upstream } => {
                let count = QualityGate::evaluate(ctx.values, &task.id, upstream)?;
                Ok(Some(count.into()))
            }
            TaskKind::TriggerPipeline { pipeline, .. } => Err(BookflowError::TriggerStart {
                pipeline: pipeline.clone(),
                reason: "trigger tasks are not retried as work".into(),
            }),
        }
    }

    /// Start a fresh run of `pipeline`.
    ///
    /// With `wait` the result mirrors the started run's outcome; without it
    /// the trigger succeeds once the run is spawned.
    async fn trigger(
        &self,
        pipeline: &str,
        params: BTreeMap<String, serde_json::Value>,
        wait: bool,
        ctx: &RunContext<'_>,
        depth: usize,
    ) -> (Result<Uuid, BookflowError>, Option<TriggerHandle>) {
        let start_error = |reason: String| BookflowError::TriggerStart {
            pipeline: pipeline.to_string(),
            reason,
        };

        if depth >= self.options.max_trigger_depth {
            return (
                Err(start_error(format!(
                    "trigger depth limit of {} reached",
                    self.options.max_trigger_depth
                ))),
                None,
            );
        }

        let graph = match self
            .registry
            .lookup(pipeline)
            .and_then(|def| PipelineGraph::from_definition(&def, &self.settings))
        {
            Ok(graph) => graph,
            Err(e) => return (Err(start_error(e.to_string())), None),
        };

        let run_id = Uuid::new_v4();
        info!(
            parent = ctx.pipeline,
            pipeline,
            run_id = %run_id,
            wait,
            "Triggering pipeline"
        );

        if wait {
            let child = self.run_at_depth(run_id, &graph, params, depth + 1).await;
            let result = if child.is_success() {
                Ok(run_id)
            } else {
                Err(BookflowError::TriggeredRunFailed {
                    pipeline: pipeline.to_string(),
                    failing_task: child.failing_task().map(String::from),
                })
            };
            return (result, Some(TriggerHandle::finished(child)));
        }

        let executor = self.clone();
        let handle = tokio::spawn(async move {
            executor
                .run_at_depth(run_id, &graph, params, depth + 1)
                .await
        });

        (Ok(run_id), Some(TriggerHandle::detached(pipeline, run_id, handle)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::CollectingTransport;
    use crate::pipeline::{InMemoryRegistry, RetryPolicy};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Fails the first `failures` calls, then returns `value`
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
        value: Option<TaskValue>,
    }

    #[async_trait]
    impl WorkDelegate for Flaky {
        async fn execute(
            &self,
            task: &Task,
            _ctx: &RunContext<'_>,
        ) -> Result<Option<TaskValue>, BookflowError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(BookflowError::task_failed(&task.id, "transient"))
            } else {
                Ok(self.value.clone())
            }
        }
    }

    struct Missing;

    #[async_trait]
    impl WorkDelegate for Missing {
        async fn execute(
            &self,
            _task: &Task,
            _ctx: &RunContext<'_>,
        ) -> Result<Option<TaskValue>, BookflowError> {
            Ok(None)
        }

        async fn check_available(&self) -> Result<bool, BookflowError> {
            Ok(false)
        }
    }

    fn flaky(failures: u32, value: Option<TaskValue>) -> Arc<dyn WorkDelegate> {
        Arc::new(Flaky {
            failures,
            calls: AtomicU32::new(0),
            value,
        })
    }

    fn executor() -> (PipelineExecutor, CollectingTransport) {
        let collect = CollectingTransport::new();
        let executor = PipelineExecutor::new(Arc::new(InMemoryRegistry::new()))
            .with_delegate("ok", flaky(0, None))
            .with_delegate("fail", flaky(u32::MAX, None))
            .with_notifier(Notifier::new().with_transport(Arc::new(collect.clone())));
        (executor, collect)
    }

    #[tokio::test]
    async fn test_linear_success() {
        let (executor, collect) = executor();
        let graph = PipelineGraph::build(
            "p",
            vec![
                Task::new("a", TaskKind::work("ok")),
                Task::new("b", TaskKind::work("ok")).depends_on(["a"]),
            ],
        )
        .unwrap();

        let run = executor.run(&graph, BTreeMap::new()).await;
        assert!(run.is_success());
        assert_eq!(run.completed(), ["a", "b"]);
        assert_eq!(collect.events().len(), 1);
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let (executor, _) = executor();
        let executor = executor.with_delegate("flaky", flaky(2, Some(TaskValue::Int(7))));
        let graph = PipelineGraph::build(
            "p",
            vec![Task::new("a", TaskKind::work("flaky"))
                .with_retry(RetryPolicy::new(3, Duration::from_millis(1)))],
        )
        .unwrap();

        let run = executor.run(&graph, BTreeMap::new()).await;
        assert_eq!(run.state("a"), TaskState::Success);
        assert_eq!(run.attempts("a"), 3);
        assert_eq!(run.value("a"), Some(&TaskValue::Int(7)));
    }

    #[tokio::test]
    async fn test_unknown_operator_is_not_retried() {
        let (executor, _) = executor();
        let graph = PipelineGraph::build(
            "p",
            vec![Task::new("a", TaskKind::work("missing"))
                .with_retry(RetryPolicy::new(3, Duration::ZERO))],
        )
        .unwrap();

        assert!(matches!(
            executor.check_delegates(&graph).await,
            Err(BookflowError::DelegateNotFound { .. })
        ));
        let run = executor.run(&graph, BTreeMap::new()).await;
        assert_eq!(run.state("a"), TaskState::Failed);
        assert_eq!(run.attempts("a"), 1);
    }

    #[tokio::test]
    async fn test_check_delegates_reports_unavailable_tool() {
        let (executor, _) = executor();
        let executor = executor.with_delegate("sql", Arc::new(Missing));
        let graph = PipelineGraph::build(
            "p",
            vec![
                Task::new("a", TaskKind::work("ok")),
                Task::new("b", TaskKind::work("sql")).depends_on(["a"]),
            ],
        )
        .unwrap();

        let err = executor.check_delegates(&graph).await.unwrap_err();
        assert!(matches!(err, BookflowError::DelegateUnavailable { operator } if operator == "sql"));

        let ok = PipelineGraph::build("q", vec![Task::new("a", TaskKind::work("ok"))]).unwrap();
        assert!(executor.check_delegates(&ok).await.is_ok());
    }

    #[tokio::test]
    async fn test_fail_fast_skips_independent_branch() {
        let (executor, _) = executor();
        let graph = PipelineGraph::build(
            "p",
            vec![
                Task::new("broken", TaskKind::work("fail")),
                Task::new("other", TaskKind::work("ok")),
                Task::new("later", TaskKind::work("ok")).depends_on(["other"]),
            ],
        )
        .unwrap();

        let run = executor.run(&graph, BTreeMap::new()).await;
        assert_eq!(run.state("other"), TaskState::Success);
        assert_eq!(run.state("later"), TaskState::Skipped);

        let executor = executor.with_options(ExecutionOptions {
            fail_fast: false,
            ..ExecutionOptions::default()
        });
        let run = executor.run(&graph, BTreeMap::new()).await;
        assert_eq!(run.state("later"), TaskState::Success);
        assert_eq!(run.outcome(), RunOutcome::Failed);
    }

    #[tokio::test]
    async fn test_trigger_depth_limit() {
        let def = crate::pipeline::PipelineDefinition::from_yaml(
            "name: loop\ntasks:\n  - id: again\n    kind: { type: trigger_pipeline, pipeline: loop, wait: true }\n",
        )
        .unwrap();
        let registry = InMemoryRegistry::new().with_pipeline(def).unwrap();
        let executor = PipelineExecutor::new(Arc::new(registry)).with_options(ExecutionOptions {
            max_trigger_depth: 2,
            ..ExecutionOptions::default()
        });

        let run = executor.run_pipeline("loop", BTreeMap::new()).await.unwrap();
        assert_eq!(run.outcome(), RunOutcome::Failed);
        assert_eq!(run.failing_task(), Some("again"));
    }

    #[tokio::test]
    async fn test_dry_run_skips_everything_and_notifies() {
        let (executor, collect) = executor();
        let executor = executor.with_options(ExecutionOptions {
            dry_run: true,
            ..ExecutionOptions::default()
        });
        let graph = PipelineGraph::build("p", vec![Task::new("a", TaskKind::work("fail"))]).unwrap();

        let run = executor.run(&graph, BTreeMap::new()).await;
        assert_eq!(run.state("a"), TaskState::Skipped);
        assert!(run.is_success());
        assert_eq!(collect.events().len(), 1);
    }
}
