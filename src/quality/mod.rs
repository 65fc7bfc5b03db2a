// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 bookflow contributors

//! Data quality gating
//!
//! Values propagated between tasks and the gate that turns a check result
//! into a pass/fail outcome.

mod gate;
mod value;

pub use gate::{extract_count, QualityGate};
pub use value::{Count, TaskValue};
