// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 bookflow contributors

//! Graph command - visualize pipeline as a graph

use miette::Result;
use std::path::PathBuf;

use super::GraphFormat;
use crate::pipeline::PipelineGraph;

/// Run the graph command
pub async fn run(
    project: Option<PathBuf>,
    pipeline: String,
    format: GraphFormat,
    _verbose: bool,
) -> Result<()> {
    let project = super::load_project(project)?;
    let def = project.pipeline(&pipeline).map_err(super::report)?;

    let graph =
        PipelineGraph::from_definition(def, &project.config.settings).map_err(super::report)?;

    let output = match format {
        GraphFormat::Text => graph.to_text(),
        GraphFormat::Dot => graph.to_dot(),
        GraphFormat::Mermaid => graph.to_mermaid(),
    };

    println!("{}", output);

    Ok(())
}
