// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 bookflow contributors

//! Check command - evaluate a check result like a quality gate

use colored::Colorize;
use miette::Result;

use crate::errors::BookflowError;
use crate::quality::{extract_count, QualityGate, TaskValue};

/// Run the check command
pub async fn run(json: String, verbose: bool) -> Result<()> {
    let value = TaskValue::from_json_str(&json).map_err(|e| {
        miette::miette!("Input is not valid JSON: {}", e)
    })?;

    if verbose {
        let found = extract_count(&value)
            .map(|c| c.to_string())
            .unwrap_or_else(|| "none".to_string());
        println!("  {} first numeric value: {}", "→".blue(), found);
    }

    match QualityGate::verdict(&value, "input") {
        Ok(count) => {
            println!("  {} Check passed (count {})", "✓".green(), count);
            Ok(())
        }
        Err(e @ BookflowError::QualityGateFailed { .. }) => {
            println!("  {} {}", "✗".red(), e);
            Err(super::report(e))
        }
        Err(e) => {
            println!("  {} {}", "✗".red(), e);
            Err(e.into())
        }
    }
}
