// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 bookflow contributors

//! Run notifications
//!
//! The executor reports every finished run exactly once. Delivery is best
//! effort: a transport error is logged and never reaches the run.

mod message;
mod telegram;

pub use message::{render_markdown, utc_label};
pub use telegram::TelegramTransport;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::NotificationConfig;
use crate::errors::{BookflowError, RecoverySuggestion};
use crate::pipeline::RunOutcome;

/// Terminal outcome of a run, as reported to transports
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RunEvent {
    pub pipeline_id: String,
    pub run_id: Uuid,
    pub outcome: RunOutcome,
    /// Set if and only if the run failed
    pub failing_task_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Error text of the failing task
    pub detail: Option<String>,
    /// Value the pipeline asked to report on success
    pub summary: Option<EventSummary>,
}

/// Labelled value shown in success messages
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EventSummary {
    pub label: String,
    pub value: String,
}

/// Outbound channel for run events
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, event: &RunEvent) -> Result<(), BookflowError>;
}

/// Fans run events out to transports
#[derive(Clone, Default)]
pub struct Notifier {
    transports: Vec<Arc<dyn NotificationTransport>>,
}

impl Notifier {
    /// Notifier without transports
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifier that only logs
    pub fn log_only() -> Self {
        Self::new().with_transport(Arc::new(LogTransport))
    }

    pub fn with_transport(mut self, transport: Arc<dyn NotificationTransport>) -> Self {
        self.transports.push(transport);
        self
    }

    /// Transports from project configuration, secrets from the environment
    pub fn from_config(config: &NotificationConfig) -> Self {
        Self::from_config_with(config, |key| std::env::var(key).ok())
    }

    /// Like [`Notifier::from_config`] with an arbitrary variable lookup.
    ///
    /// Missing Telegram credentials fall back to log-only delivery.
    pub fn from_config_with<F>(config: &NotificationConfig, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let notifier = Self::log_only();

        let Some(telegram) = &config.telegram else {
            return notifier;
        };

        let token = lookup(&telegram.token_env).filter(|v| !v.is_empty());
        let chat_id = lookup(&telegram.chat_id_env).filter(|v| !v.is_empty());

        match (token, chat_id) {
            (Some(token), Some(chat_id)) => {
                match TelegramTransport::new(telegram, token, chat_id, config.utc_offset_hours) {
                    Ok(transport) => notifier.with_transport(Arc::new(transport)),
                    Err(e) => {
                        error!(error = %e, "Telegram transport unavailable, notifications are log-only");
                        notifier
                    }
                }
            }
            _ => {
                let suggestion =
                    RecoverySuggestion::configure_telegram(&telegram.token_env, &telegram.chat_id_env);
                error!(
                    token_env = %telegram.token_env,
                    chat_id_env = %telegram.chat_id_env,
                    "Telegram credentials not set, notifications are log-only\n{}",
                    suggestion
                );
                notifier
            }
        }
    }

    pub fn transport_names(&self) -> Vec<&str> {
        self.transports.iter().map(|t| t.name()).collect()
    }

    /// Deliver an event to every transport, logging failures
    pub async fn notify(&self, event: &RunEvent) {
        for transport in &self.transports {
            if let Err(e) = transport.send(event).await {
                error!(
                    transport = transport.name(),
                    pipeline = %event.pipeline_id,
                    run_id = %event.run_id,
                    error = %e,
                    "Failed to deliver notification"
                );
            }
        }
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("transports", &self.transport_names())
            .finish()
    }
}

/// Writes events to the log
pub struct LogTransport;

#[async_trait]
impl NotificationTransport for LogTransport {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, event: &RunEvent) -> Result<(), BookflowError> {
        match event.outcome {
            RunOutcome::Failed => warn!(
                pipeline = %event.pipeline_id,
                run_id = %event.run_id,
                task = event.failing_task_id.as_deref().unwrap_or("-"),
                detail = event.detail.as_deref().unwrap_or("-"),
                "Pipeline failed"
            ),
            _ => info!(
                pipeline = %event.pipeline_id,
                run_id = %event.run_id,
                summary = event.summary.as_ref().map(|s| format!("{}: {}", s.label, s.value)).as_deref().unwrap_or("-"),
                "Pipeline succeeded"
            ),
        }
        Ok(())
    }
}

/// Keeps events in memory
#[derive(Clone, Default)]
pub struct CollectingTransport {
    events: Arc<Mutex<Vec<RunEvent>>>,
}

impl CollectingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events received so far
    pub fn events(&self) -> Vec<RunEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl NotificationTransport for CollectingTransport {
    fn name(&self) -> &str {
        "collect"
    }

    async fn send(&self, event: &RunEvent) -> Result<(), BookflowError> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event.clone());
        Ok(())
    }
}
