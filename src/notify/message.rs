// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 bookflow contributors

//! Message rendering for chat transports

use chrono::{FixedOffset, Offset, Utc};

use super::RunEvent;
use crate::pipeline::RunOutcome;

/// "UTC+1", "UTC-3", "UTC+0"
pub fn utc_label(offset_hours: i32) -> String {
    format!("UTC{:+}", offset_hours)
}

fn local_offset(offset_hours: i32) -> FixedOffset {
    offset_hours
        .checked_mul(3600)
        .and_then(FixedOffset::east_opt)
        .unwrap_or_else(|| Utc.fix())
}

/// Markdown text for an event, times shown at `offset_hours` from UTC
pub fn render_markdown(event: &RunEvent, offset_hours: i32) -> String {
    let time = event
        .timestamp
        .with_timezone(&local_offset(offset_hours))
        .format("%Y-%m-%d %H:%M:%S");
    let zone = utc_label(offset_hours);

    match event.outcome {
        RunOutcome::Failed => format!(
            "🚨 *Pipeline Failed: {}*\n- *Failed Task*: {}\n- *Time ({})*: {}\n- *Reason*: {}\n",
            event.pipeline_id,
            event.failing_task_id.as_deref().unwrap_or("unknown"),
            zone,
            time,
            event
                .detail
                .as_deref()
                .unwrap_or("Review the run logs for more information."),
        ),
        _ => {
            let mut text = format!(
                "✅ *Pipeline Success: {}*\n- *Time ({})*: {}\n",
                event.pipeline_id, zone, time
            );
            if let Some(summary) = &event.summary {
                text.push_str(&format!("- *{}*: {}\n", summary.label, summary.value));
            }
            text
        }
    }
}
