// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 bookflow contributors

//! Telegram Bot API transport

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use super::{render_markdown, NotificationTransport, RunEvent};
use crate::config::TelegramConfig;
use crate::errors::BookflowError;

/// Sends events with the Bot API `sendMessage` method
pub struct TelegramTransport {
    client: reqwest::Client,
    endpoint: String,
    chat_id: String,
    utc_offset_hours: i32,
}

impl TelegramTransport {
    pub fn new(
        config: &TelegramConfig,
        token: String,
        chat_id: String,
        utc_offset_hours: i32,
    ) -> Result<Self, BookflowError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/bot{}/sendMessage",
                config.api_base.trim_end_matches('/'),
                token
            ),
            chat_id,
            utc_offset_hours,
        })
    }
}

#[async_trait]
impl NotificationTransport for TelegramTransport {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, event: &RunEvent) -> Result<(), BookflowError> {
        let text = render_markdown(event, self.utc_offset_hours);
        let form = [
            ("chat_id", self.chat_id.as_str()),
            ("text", text.as_str()),
            ("parse_mode", "Markdown"),
        ];

        self.client
            .post(&self.endpoint)
            .form(&form)
            .send()
            .await?
            .error_for_status()?;

        debug!(pipeline = %event.pipeline_id, "Telegram notification sent");
        Ok(())
    }
}
