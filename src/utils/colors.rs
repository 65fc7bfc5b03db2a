// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 bookflow contributors

//! Terminal color utilities
//!
//! Provides consistent color schemes across the CLI.

use colored::{ColoredString, Colorize};

use crate::pipeline::TaskState;

/// Check if colors should be disabled
pub fn should_use_colors() -> bool {
    // Respect NO_COLOR environment variable
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }

    std::env::var("TERM").map(|t| t != "dumb").unwrap_or(false)
}

/// Symbol for a task state
pub fn state_symbol(state: TaskState) -> ColoredString {
    match state {
        TaskState::Success => "✓".green(),
        TaskState::Failed => "✗".red(),
        TaskState::Skipped => "○".dimmed(),
        TaskState::Running => "→".blue(),
        TaskState::Pending => "·".dimmed(),
    }
}

/// Print a styled header
pub fn print_header(title: &str) {
    println!("{}", title.bold());
    println!("{}", "═".repeat(title.len().max(40)));
}

/// Print a styled section
pub fn print_section(title: &str) {
    println!();
    println!("{}:", title.bold());
}
