// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 bookflow contributors

//! Pipelines
//!
//! Definitions as written in pipeline files, the task graph built from them,
//! run state, and the executor that drives runs.

mod dag;
mod definition;
mod executor;
mod run;
mod trigger;
mod validation;

pub use dag::{PipelineGraph, TopologicalLayers};
pub use definition::*;
pub use executor::{ExecutionOptions, PipelineExecutor};
pub use run::{Run, RunContext, RunOutcome, TaskRecord, TaskState, ValueStore};
pub use trigger::{join_triggered, InMemoryRegistry, PipelineRegistry, TriggerHandle};
pub use validation::{PipelineValidator, ValidationResult};
