// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 bookflow contributors

//! Quality gate evaluation
//!
//! A check query reports how many rows violate a rule. The result arrives in
//! whatever shape the database client produced (a bare number, a string, rows
//! of columns), so the gate digs out the first numeric leaf and turns it into
//! a verdict.

use tracing::{debug, warn};

use super::{Count, TaskValue};
use crate::errors::BookflowError;
use crate::pipeline::ValueStore;

/// Depth-first search for the first leaf convertible to a number.
///
/// Strings containing a `.` are read as floats, other strings as integers.
/// Booleans count as 1 and 0.
/// Leaves that do not convert are skipped with a warning. Later numeric
/// leaves are never looked at.
pub fn extract_count(value: &TaskValue) -> Option<Count> {
    match value {
        TaskValue::Int(n) => Some(Count::Int(*n)),
        TaskValue::Float(n) => Some(Count::Float(*n)),
        TaskValue::Text(s) => {
            let parsed = parse_numeric(s);
            if parsed.is_none() {
                warn!(value = %s, "Ignoring non-numeric string in check result");
            }
            parsed
        }
        TaskValue::List(items) => items.iter().find_map(extract_count),
        TaskValue::Other(serde_json::Value::Bool(b)) => Some(Count::Int(i64::from(*b))),
        TaskValue::Other(other) => {
            warn!(value = %other, "Ignoring non-numeric value in check result");
            None
        }
    }
}

fn parse_numeric(s: &str) -> Option<Count> {
    let trimmed = s.trim();
    if trimmed.contains('.') {
        trimmed.parse::<f64>().ok().map(Count::Float)
    } else {
        trimmed.parse::<i64>().ok().map(Count::Int)
    }
}

/// Turns an upstream check result into pass or fail
pub struct QualityGate;

impl QualityGate {
    /// Evaluate the value `upstream` propagated in the current run.
    ///
    /// Zero passes, and so does any negative count; only a positive count
    /// is treated as violations found.
    pub fn evaluate(
        values: &ValueStore,
        task: &str,
        upstream: &str,
    ) -> Result<Count, BookflowError> {
        let value = values
            .get(upstream)
            .ok_or_else(|| BookflowError::MissingUpstreamValue {
                task: task.to_string(),
                upstream: upstream.to_string(),
            })?;

        Self::verdict(value, upstream)
    }

    /// Verdict for a bare value, without a run around it
    pub fn verdict(value: &TaskValue, upstream: &str) -> Result<Count, BookflowError> {
        let count = extract_count(value).ok_or_else(|| BookflowError::NoNumericResult {
            upstream: upstream.to_string(),
        })?;

        if count.is_positive() {
            return Err(BookflowError::QualityGateFailed {
                upstream: upstream.to_string(),
                count,
            });
        }

        debug!(upstream, %count, "Quality gate passed");
        Ok(count)
    }
}
