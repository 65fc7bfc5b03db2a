// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 bookflow contributors

//! Work delegates
//!
//! The engine never knows what a work task does. It hands the task to the
//! delegate registered under the task's operator name and records whatever
//! value comes back.

mod shell;

pub use shell::ShellDelegate;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::BookflowError;
use crate::pipeline::{RunContext, Task};
use crate::quality::TaskValue;

/// External logic behind a work task
#[async_trait]
pub trait WorkDelegate: Send + Sync {
    /// Run the task's work once.
    ///
    /// An `Err` counts as one failed attempt. Only
    /// [`BookflowError::TaskExecution`] is retried.
    async fn execute(
        &self,
        task: &Task,
        ctx: &RunContext<'_>,
    ) -> Result<Option<TaskValue>, BookflowError>;

    /// Check whatever the delegate needs is present
    async fn check_available(&self) -> Result<bool, BookflowError> {
        Ok(true)
    }

    /// Static checks on a task before any run
    fn validate_task(&self, _task: &Task) -> Result<(), BookflowError> {
        Ok(())
    }
}

/// Built-in delegates keyed by operator name
pub fn create_default_delegates() -> HashMap<String, Arc<dyn WorkDelegate>> {
    let mut delegates: HashMap<String, Arc<dyn WorkDelegate>> = HashMap::new();
    delegates.insert("shell".to_string(), Arc::new(ShellDelegate::new()));
    delegates
}
