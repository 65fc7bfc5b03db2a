// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 bookflow contributors

//! Project configuration
//!
//! Defines the schema for bookflow.yaml: the settings handed to every
//! pipeline, where notifications go, and where pipeline files live.

mod project;

pub use project::{Project, PROJECT_FILE};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Environment variable overriding `settings.sources` (JSON list)
pub const SOURCES_ENV: &str = "BOOKFLOW_SOURCES";

/// Environment variable overriding `settings.storage_target`
pub const STORAGE_TARGET_ENV: &str = "BOOKFLOW_STORAGE_TARGET";

/// Project file from bookflow.yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Config version (for future compatibility)
    #[serde(default = "default_version")]
    pub version: String,

    /// Settings passed explicitly into graph construction and delegates
    #[serde(default)]
    pub settings: Settings,

    /// Notification routing
    #[serde(default)]
    pub notifications: NotificationConfig,

    /// Glob patterns of pipeline definition files, relative to the project
    #[serde(default = "default_pipeline_globs")]
    pub pipelines: Vec<String>,
}

fn default_version() -> String {
    "1".to_string()
}

fn default_pipeline_globs() -> Vec<String> {
    vec!["pipelines/*.yaml".to_string()]
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            settings: Settings::default(),
            notifications: NotificationConfig::default(),
            pipelines: default_pipeline_globs(),
        }
    }
}

impl ProjectConfig {
    /// Parse a project config from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self, crate::BookflowError> {
        serde_yaml::from_str(yaml).map_err(Into::into)
    }
}

/// Values that used to live in a global variable store
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Settings {
    /// Source sites to ingest from; drives `for_each: sources` fan-out
    #[serde(default)]
    pub sources: Vec<String>,

    /// Object storage location raw extracts are staged in
    #[serde(default)]
    pub storage_target: Option<String>,

    /// Named connection references handed to delegates
    #[serde(default)]
    pub connections: BTreeMap<String, String>,
}

impl Settings {
    /// Apply overrides from the process environment
    pub fn with_env_overrides(self) -> Result<Self, crate::BookflowError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, crate::BookflowError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(SOURCES_ENV) {
            self.sources = serde_json::from_str(&raw).map_err(|e| {
                crate::BookflowError::InvalidPipeline {
                    reason: format!("{} is not a JSON list of strings: {}", SOURCES_ENV, e),
                    help: Some(format!(
                        "Example: {}='[\"laguna\", \"mikrok\"]'",
                        SOURCES_ENV
                    )),
                }
            })?;
        }

        if let Some(target) = lookup(STORAGE_TARGET_ENV) {
            self.storage_target = Some(target);
        }

        Ok(self)
    }

    /// Environment variables exported to delegates, in the format
    /// [`Settings::with_overrides`] reads back
    pub fn to_env(&self) -> Vec<(String, String)> {
        let sources = serde_json::Value::from(self.sources.clone()).to_string();
        let mut env = vec![(SOURCES_ENV.to_string(), sources)];

        if let Some(ref target) = self.storage_target {
            env.push((STORAGE_TARGET_ENV.to_string(), target.clone()));
        }

        for (name, reference) in &self.connections {
            env.push((
                format!("BOOKFLOW_CONN_{}", name.to_uppercase()),
                reference.clone(),
            ));
        }

        env
    }
}

/// Where run outcomes are reported
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Offset from UTC used for timestamps in messages
    #[serde(default = "default_utc_offset")]
    pub utc_offset_hours: i32,

    /// Telegram bot delivery
    #[serde(default)]
    pub telegram: Option<TelegramConfig>,
}

fn default_utc_offset() -> i32 {
    1
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            utc_offset_hours: default_utc_offset(),
            telegram: None,
        }
    }
}

/// Telegram bot settings; secrets are read from the environment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default = "default_token_env")]
    pub token_env: String,

    #[serde(default = "default_chat_id_env")]
    pub chat_id_env: String,

    #[serde(default = "default_api_base")]
    pub api_base: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_token_env() -> String {
    "TELEGRAM_BOT_TOKEN".to_string()
}

fn default_chat_id_env() -> String {
    "TELEGRAM_CHAT_ID".to_string()
}

fn default_api_base() -> String {
    "https://api.telegram.org".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}
