// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 bookflow contributors

//! Pipeline definition structures
//!
//! Defines the schema for pipeline files and the runtime [`Task`] each
//! definition expands into once project settings are known.

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use crate::config::Settings;
use crate::errors::BookflowError;
use crate::pipeline::TaskState;

/// Pipeline definition from a pipeline YAML file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDefinition {
    /// Definition version (for future compatibility)
    #[serde(default = "default_version")]
    pub version: String,

    /// Pipeline id, unique within a project
    pub name: String,

    /// Pipeline description
    #[serde(default)]
    pub description: Option<String>,

    /// Retry policy for tasks that declare none
    #[serde(default)]
    pub default_retry: Option<RetryPolicy>,

    /// Environment shared by every task
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Task whose value is reported in the success notification
    #[serde(default)]
    pub summary: Option<SummaryConfig>,

    /// Tasks of the pipeline
    pub tasks: Vec<TaskDefinition>,
}

fn default_version() -> String {
    "1".to_string()
}

impl PipelineDefinition {
    /// Load a definition from a YAML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, BookflowError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| BookflowError::FileReadError {
                path: path.to_path_buf(),
                error: e.to_string(),
            })?;

        Self::from_yaml(&content)
    }

    /// Parse a definition from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, BookflowError> {
        serde_yaml::from_str(yaml).map_err(Into::into)
    }

    /// Get a task definition by id
    pub fn get_task(&self, id: &str) -> Option<&TaskDefinition> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Expand the definition into runtime tasks.
    ///
    /// Fan-out tasks become one task per configured source, dependencies on
    /// a fan-out id are rewritten to all of its expansions, and placeholders
    /// in commands and environment values are filled from `settings`.
    pub fn expand(&self, settings: &Settings) -> Result<Vec<Task>, BookflowError> {
        let fan_outs: HashMap<&str, Vec<String>> = self
            .tasks
            .iter()
            .filter(|t| t.for_each.is_some())
            .map(|t| {
                let ids = settings
                    .sources
                    .iter()
                    .map(|source| format!("{}_{}", t.id, source_slug(source)))
                    .collect();
                (t.id.as_str(), ids)
            })
            .collect();

        let template = Template::new(settings);
        let mut tasks = Vec::new();

        for def in &self.tasks {
            let retry = def
                .retry
                .clone()
                .or_else(|| self.default_retry.clone())
                .unwrap_or_default();

            let mut dependencies = Vec::new();
            for dep in &def.depends_on {
                match fan_outs.get(dep.as_str()) {
                    Some(expanded) => dependencies.extend(expanded.iter().cloned()),
                    None => dependencies.push(dep.clone()),
                }
            }

            let mut env = self.env.clone();
            env.extend(def.env.clone());

            match def.for_each {
                None => {
                    if let TaskKind::QualityGate { upstream } = &def.kind {
                        if fan_outs.contains_key(upstream.as_str()) {
                            return Err(BookflowError::InvalidPipeline {
                                reason: format!(
                                    "Quality gate '{}' checks fan-out task '{}'",
                                    def.id, upstream
                                ),
                                help: Some(format!(
                                    "Add `for_each: sources` to '{}' to gate each source",
                                    def.id
                                )),
                            });
                        }
                    }

                    tasks.push(Task {
                        id: def.id.clone(),
                        description: def.description.clone(),
                        dependencies,
                        trigger_rule: def.trigger_rule,
                        retry,
                        kind: template.render_kind(&def.kind, None),
                        env: template.render_env(&env, None),
                    });
                }
                Some(FanOut::Sources) => {
                    for source in &settings.sources {
                        let slug = source_slug(source);
                        let mut kind = template.render_kind(&def.kind, Some(source));

                        if let TaskKind::QualityGate { upstream } = &mut kind {
                            if fan_outs.contains_key(upstream.as_str()) {
                                *upstream = format!("{}_{}", upstream, slug);
                            }
                        }

                        tasks.push(Task {
                            id: format!("{}_{}", def.id, slug),
                            description: def.description.clone(),
                            dependencies: dependencies.clone(),
                            trigger_rule: def.trigger_rule,
                            retry: retry.clone(),
                            kind,
                            env: template.render_env(&env, Some(source)),
                        });
                    }
                }
            }
        }

        Ok(tasks)
    }
}

/// Id suffix for a fanned-out source
pub fn source_slug(source: &str) -> String {
    source.trim().to_lowercase().replace(' ', "_")
}

/// A task as written in a pipeline file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDefinition {
    /// Task id (must be unique within pipeline)
    pub id: String,

    /// Task description
    #[serde(default)]
    pub description: Option<String>,

    /// Task dependencies (other task ids)
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// When the task runs given the outcome of its dependencies
    #[serde(default)]
    pub trigger_rule: TriggerRule,

    /// Retry policy, overriding the pipeline default
    #[serde(default)]
    pub retry: Option<RetryPolicy>,

    /// Expand into one task per configured item
    #[serde(default)]
    pub for_each: Option<FanOut>,

    /// Environment variables for this task
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// What the task does
    pub kind: TaskKind,
}

/// Fan-out source for a task definition
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FanOut {
    /// One task per entry of `settings.sources`
    Sources,
}

/// Policy deciding whether a task runs once its dependencies terminated
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TriggerRule {
    /// Every dependency succeeded
    #[default]
    AllSuccess,
    /// Every dependency terminated, whatever the outcome
    AllDone,
}

impl TriggerRule {
    /// Evaluate the rule against the states of a task's dependencies
    pub fn is_satisfied<I>(&self, dependency_states: I) -> bool
    where
        I: IntoIterator<Item = TaskState>,
    {
        let mut states = dependency_states.into_iter();
        match self {
            Self::AllSuccess => states.all(|s| s == TaskState::Success),
            Self::AllDone => states.all(|s| s.is_terminal()),
        }
    }
}

impl std::fmt::Display for TriggerRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AllSuccess => write!(f, "all_success"),
            Self::AllDone => write!(f, "all_done"),
        }
    }
}

/// Bounded local retry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Pause between attempts
    #[serde(default)]
    pub delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    1
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: 0,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay_ms: delay.as_millis() as u64,
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Task kinds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskKind {
    /// Work delegated to an external collaborator
    Work {
        /// Delegate to run the work with
        #[serde(default = "default_operator")]
        operator: String,

        /// Command handed to the delegate
        #[serde(default)]
        command: Option<String>,

        /// What to keep from the delegate's output
        #[serde(default)]
        capture: CaptureMode,
    },

    /// Fails the run when the upstream check reports violations
    QualityGate {
        /// Task whose propagated value holds the check result
        upstream: String,
    },

    /// Starts another pipeline
    TriggerPipeline {
        /// Id of the pipeline to start
        pipeline: String,

        /// Block until the started run terminates
        #[serde(default)]
        wait: bool,

        /// Opaque context handed to the started run
        #[serde(default)]
        params: BTreeMap<String, serde_json::Value>,
    },
}

fn default_operator() -> String {
    "shell".to_string()
}

impl TaskKind {
    /// Shell work running `command`
    pub fn shell(command: &str) -> Self {
        Self::Work {
            operator: default_operator(),
            command: Some(command.to_string()),
            capture: CaptureMode::None,
        }
    }

    /// Work handled by the delegate registered as `operator`
    pub fn work(operator: &str) -> Self {
        Self::Work {
            operator: operator.to_string(),
            command: None,
            capture: CaptureMode::None,
        }
    }

    pub fn quality_gate(upstream: &str) -> Self {
        Self::QualityGate {
            upstream: upstream.to_string(),
        }
    }

    pub fn trigger(pipeline: &str, wait: bool) -> Self {
        Self::TriggerPipeline {
            pipeline: pipeline.to_string(),
            wait,
            params: BTreeMap::new(),
        }
    }

    /// Short label used in plans and graphs
    pub fn label(&self) -> String {
        match self {
            Self::Work { operator, .. } => operator.clone(),
            Self::QualityGate { .. } => "quality_gate".to_string(),
            Self::TriggerPipeline { pipeline, wait, .. } => {
                if *wait {
                    format!("trigger {} (wait)", pipeline)
                } else {
                    format!("trigger {}", pipeline)
                }
            }
        }
    }
}

/// Output capture for work tasks
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    /// Propagate nothing
    #[default]
    None,
    /// Propagate trimmed stdout as text
    Text,
    /// Parse stdout as JSON
    Json,
}

/// Value reported in the success notification
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SummaryConfig {
    /// Task whose propagated value is reported
    pub task: String,

    /// Label shown next to the value
    #[serde(default = "default_summary_label")]
    pub label: String,
}

fn default_summary_label() -> String {
    "Result".to_string()
}

/// A task of a constructed pipeline graph
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: String,
    pub description: Option<String>,
    pub dependencies: Vec<String>,
    pub trigger_rule: TriggerRule,
    pub retry: RetryPolicy,
    pub kind: TaskKind,
    pub env: HashMap<String, String>,
}

impl Task {
    pub fn new(id: &str, kind: TaskKind) -> Self {
        Self {
            id: id.to_string(),
            description: None,
            dependencies: Vec::new(),
            trigger_rule: TriggerRule::default(),
            retry: RetryPolicy::default(),
            kind,
            env: HashMap::new(),
        }
    }

    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(deps.into_iter().map(Into::into));
        self
    }

    pub fn with_trigger_rule(mut self, rule: TriggerRule) -> Self {
        self.trigger_rule = rule;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Placeholder substitution for commands and environment values.
///
/// Recognised: `{source}`, `{storage_target}` and `{conn.<name>}`. Anything
/// else is left untouched.
struct Template<'a> {
    settings: &'a Settings,
    pattern: Regex,
}

impl<'a> Template<'a> {
    fn new(settings: &'a Settings) -> Self {
        Self {
            settings,
            pattern: Regex::new(r"\{(source|storage_target|conn\.[A-Za-z0-9_]+)\}")
                .expect("placeholder pattern is valid"),
        }
    }

    fn render(&self, text: &str, source: Option<&str>) -> String {
        self.pattern
            .replace_all(text, |caps: &Captures| {
                let key = &caps[1];
                let value = match key {
                    "source" => source.map(str::to_string),
                    "storage_target" => self.settings.storage_target.clone(),
                    _ => key
                        .strip_prefix("conn.")
                        .and_then(|name| self.settings.connections.get(name).cloned()),
                };
                value.unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }

    fn render_kind(&self, kind: &TaskKind, source: Option<&str>) -> TaskKind {
        match kind {
            TaskKind::Work {
                operator,
                command,
                capture,
            } => TaskKind::Work {
                operator: operator.clone(),
                command: command.as_deref().map(|c| self.render(c, source)),
                capture: *capture,
            },
            other => other.clone(),
        }
    }

    fn render_env(
        &self,
        env: &HashMap<String, String>,
        source: Option<&str>,
    ) -> HashMap<String, String> {
        env.iter()
            .map(|(k, v)| (k.clone(), self.render(v, source)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        let mut settings = Settings {
            sources: vec!["laguna".into(), "Mikro K".into()],
            storage_target: Some("books-raw".into()),
            ..Settings::default()
        };
        settings
            .connections
            .insert("postgres".into(), "postgres_default".into());
        settings
    }

    #[test]
    fn test_parse_pipeline() {
        let yaml = r#"
name: data_validation
default_retry:
  max_attempts: 1
tasks:
  - id: validate_raw_quality
    kind:
      type: work
      command: psql -f raw_data_checks.sql
      capture: json
  - id: check_raw_results
    depends_on: [validate_raw_quality]
    kind:
      type: quality_gate
      upstream: validate_raw_quality
  - id: trigger_next
    depends_on: [check_raw_results]
    trigger_rule: all_done
    retry:
      max_attempts: 3
      delay_ms: 100
    kind:
      type: trigger_pipeline
      pipeline: other
      wait: true
      params:
        dataset_version: "1.0"
"#;

        let pipeline = PipelineDefinition::from_yaml(yaml).unwrap();
        assert_eq!(pipeline.name, "data_validation");
        assert_eq!(pipeline.tasks.len(), 3);

        match &pipeline.tasks[0].kind {
            TaskKind::Work {
                operator, capture, ..
            } => {
                assert_eq!(operator, "shell");
                assert_eq!(*capture, CaptureMode::Json);
            }
            other => panic!("Expected work task, got {other:?}"),
        }

        assert_eq!(pipeline.tasks[1].trigger_rule, TriggerRule::AllSuccess);
        assert_eq!(pipeline.tasks[2].trigger_rule, TriggerRule::AllDone);
        assert_eq!(
            pipeline.tasks[2].retry,
            Some(RetryPolicy::new(3, Duration::from_millis(100)))
        );

        match &pipeline.tasks[2].kind {
            TaskKind::TriggerPipeline {
                pipeline, wait, params,
            } => {
                assert_eq!(pipeline, "other");
                assert!(*wait);
                assert_eq!(params["dataset_version"], serde_json::json!("1.0"));
            }
            other => panic!("Expected trigger task, got {other:?}"),
        }
    }

    #[test]
    fn test_expand_fan_out_and_dependencies() {
        let yaml = r#"
name: ingest
default_retry:
  max_attempts: 2
  delay_ms: 5
tasks:
  - id: create_schema
    kind: { type: work, command: "psql {conn.postgres}" }
  - id: scrape
    for_each: sources
    depends_on: [create_schema]
    env:
      TARGET: "{storage_target}/{source}"
    kind: { type: work, command: "scrapy crawl {source}" }
  - id: validate_s3
    depends_on: [scrape]
    kind: { type: work, command: "check {unknown}" }
"#;
        let tasks = PipelineDefinition::from_yaml(yaml)
            .unwrap()
            .expand(&settings())
            .unwrap();

        let ids: Vec<_> = tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["create_schema", "scrape_laguna", "scrape_mikro_k", "validate_s3"]
        );

        assert_eq!(tasks[0].kind, TaskKind::shell("psql postgres_default"));
        assert_eq!(tasks[2].kind, TaskKind::shell("scrapy crawl Mikro K"));
        assert_eq!(tasks[1].env["TARGET"], "books-raw/laguna");
        assert_eq!(tasks[1].dependencies, vec!["create_schema"]);
        assert_eq!(tasks[3].dependencies, vec!["scrape_laguna", "scrape_mikro_k"]);
        assert_eq!(tasks[3].kind, TaskKind::shell("check {unknown}"));
        assert_eq!(tasks[3].retry.max_attempts, 2);
    }

    #[test]
    fn test_fan_out_gate_follows_its_source() {
        let yaml = r#"
name: per_source
tasks:
  - id: count_rows
    for_each: sources
    kind: { type: work, command: "count {source}", capture: text }
  - id: gate
    for_each: sources
    kind: { type: quality_gate, upstream: count_rows }
"#;
        let tasks = PipelineDefinition::from_yaml(yaml)
            .unwrap()
            .expand(&settings())
            .unwrap();

        assert_eq!(tasks[2].id, "gate_laguna");
        assert_eq!(tasks[2].kind, TaskKind::quality_gate("count_rows_laguna"));
    }

    #[test]
    fn test_single_gate_on_fan_out_is_rejected() {
        let yaml = r#"
name: per_source
tasks:
  - id: count_rows
    for_each: sources
    kind: { type: work, command: "count {source}" }
  - id: gate
    kind: { type: quality_gate, upstream: count_rows }
"#;
        let result = PipelineDefinition::from_yaml(yaml)
            .unwrap()
            .expand(&settings());
        assert!(matches!(result, Err(BookflowError::InvalidPipeline { .. })));
    }

    #[test]
    fn test_trigger_rules() {
        use TaskState::*;

        assert!(TriggerRule::AllSuccess.is_satisfied([Success, Success]));
        assert!(!TriggerRule::AllSuccess.is_satisfied([Success, Failed]));
        assert!(!TriggerRule::AllSuccess.is_satisfied([Skipped]));
        assert!(TriggerRule::AllDone.is_satisfied([Success, Failed, Skipped]));
        assert!(!TriggerRule::AllDone.is_satisfied([Success, Pending]));
        assert!(TriggerRule::AllSuccess.is_satisfied(Vec::<TaskState>::new()));
    }
}
