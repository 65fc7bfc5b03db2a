// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 bookflow contributors

//! # bookflow - pipeline orchestration with data quality gates
//!
//! `bookflow` runs the book catalog pipelines: task graphs with trigger
//! rules and retries, quality gates over check results, cross-pipeline
//! triggers, and run notifications.
//!
//! ## Features
//!
//! - **Task graphs** - Acyclic dependency graphs with `all_success` / `all_done` rules
//! - **Quality gates** - Fail a run when a check reports violations
//! - **Cross-pipeline triggers** - Start another pipeline, blocking or fire-and-forget
//! - **Notifications** - One message per run, delivered best effort
//!
//! ## Quick Start
//!
//! ```bash
//! # List pipelines of the project in the current directory
//! bookflow list
//!
//! # Run the ingestion pipeline
//! bookflow run scrapy_to_postgres
//!
//! # Try the quality gate on a check result
//! bookflow check '[["3"], "abc", 0]'
//! ```

pub mod cli;
pub mod config;
pub mod delegates;
pub mod errors;
pub mod notify;
pub mod pipeline;
pub mod quality;
pub mod utils;

// Re-export commonly used types
pub use errors::{BookflowError, BookflowResult};
pub use pipeline::{PipelineDefinition, PipelineExecutor, PipelineGraph, Run, Task};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
