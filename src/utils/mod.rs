// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 bookflow contributors

//! Utility modules
//!
//! Common utilities for the bookflow CLI.

pub mod colors;

pub use colors::*;
