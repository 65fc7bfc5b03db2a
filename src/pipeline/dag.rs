// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 bookflow contributors

//! Pipeline graph
//!
//! Builds and validates the task dependency graph, detects cycles, and
//! yields execution order as topological layers.

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{HashMap, HashSet};

use crate::config::Settings;
use crate::errors::BookflowError;
use crate::pipeline::{PipelineDefinition, SummaryConfig, Task, TaskKind};

/// An acyclic graph of tasks. Edges point from a dependency to its dependent.
#[derive(Debug, Clone)]
pub struct PipelineGraph {
    name: String,
    graph: DiGraph<usize, ()>,
    name_to_index: HashMap<String, NodeIndex>,
    tasks: Vec<Task>,
    summary: Option<SummaryConfig>,
}

impl PipelineGraph {
    /// Build a graph from tasks.
    ///
    /// A quality gate depends on its upstream even when not declared.
    pub fn build(name: &str, tasks: Vec<Task>) -> Result<Self, BookflowError> {
        let mut graph = DiGraph::new();
        let mut name_to_index = HashMap::new();
        let mut tasks = tasks;

        for (idx, task) in tasks.iter().enumerate() {
            if name_to_index.contains_key(&task.id) {
                return Err(BookflowError::DuplicateTask {
                    task: task.id.clone(),
                });
            }
            let node = graph.add_node(idx);
            name_to_index.insert(task.id.clone(), node);
        }

        for task in &mut tasks {
            if let TaskKind::QualityGate { upstream } = &task.kind {
                if !task.dependencies.contains(upstream) {
                    task.dependencies.push(upstream.clone());
                }
            }

            let mut seen = HashSet::new();
            task.dependencies.retain(|d| seen.insert(d.clone()));

            let node = name_to_index[&task.id];
            for dep in &task.dependencies {
                let dep_node = name_to_index.get(dep).ok_or_else(|| {
                    BookflowError::UnknownDependency {
                        task: task.id.clone(),
                        dependency: dep.clone(),
                    }
                })?;
                graph.add_edge(*dep_node, node, ());
            }
        }

        let built = Self {
            name: name.to_string(),
            graph,
            name_to_index,
            tasks,
            summary: None,
        };

        if let Some(cycle) = built.find_cycle() {
            return Err(BookflowError::CircularDependency { tasks: cycle });
        }

        Ok(built)
    }

    /// Expand a definition against settings and build its graph
    pub fn from_definition(
        def: &PipelineDefinition,
        settings: &Settings,
    ) -> Result<Self, BookflowError> {
        let tasks = def.expand(settings)?;
        let mut graph = Self::build(&def.name, tasks)?;
        graph.summary = def.summary.clone();
        Ok(graph)
    }

    /// Depth-first search with a recursion stack. Returns the cycle as a
    /// path that starts and ends on the same task.
    fn find_cycle(&self) -> Option<Vec<String>> {
        let mut visited = HashSet::new();
        let mut stack = Vec::new();
        let mut on_stack = HashSet::new();

        for node in self.graph.node_indices() {
            if !visited.contains(&node) {
                if let Some(cycle) = self.visit(node, &mut visited, &mut stack, &mut on_stack) {
                    return Some(cycle);
                }
            }
        }
        None
    }

    fn visit(
        &self,
        node: NodeIndex,
        visited: &mut HashSet<NodeIndex>,
        stack: &mut Vec<NodeIndex>,
        on_stack: &mut HashSet<NodeIndex>,
    ) -> Option<Vec<String>> {
        visited.insert(node);
        stack.push(node);
        on_stack.insert(node);

        let mut next: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(node, Direction::Outgoing)
            .collect();
        next.sort_unstable();

        for succ in next {
            if on_stack.contains(&succ) {
                let start = stack.iter().position(|n| *n == succ).unwrap_or(0);
                let mut cycle: Vec<String> = stack[start..]
                    .iter()
                    .map(|n| self.id_of(*n).to_string())
                    .collect();
                cycle.push(self.id_of(succ).to_string());
                return Some(cycle);
            }
            if !visited.contains(&succ) {
                if let Some(cycle) = self.visit(succ, visited, stack, on_stack) {
                    return Some(cycle);
                }
            }
        }

        stack.pop();
        on_stack.remove(&node);
        None
    }

    fn id_of(&self, node: NodeIndex) -> &str {
        &self.tasks[self.graph[node]].id
    }

    /// Pipeline id
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Task reported in the success notification
    pub fn summary(&self) -> Option<&SummaryConfig> {
        self.summary.as_ref()
    }

    pub fn with_summary(mut self, summary: SummaryConfig) -> Self {
        self.summary = Some(summary);
        self
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.name_to_index
            .get(id)
            .map(|node| &self.tasks[self.graph[*node]])
    }

    /// Tasks in insertion order
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Lazy sequence of layers. Every task in layer k depends only on tasks
    /// in earlier layers. Within a layer, tasks come in insertion order.
    pub fn topological_layers(&self) -> TopologicalLayers<'_> {
        let mut remaining: HashMap<NodeIndex, usize> = HashMap::new();
        let mut frontier = Vec::new();

        for node in self.graph.node_indices() {
            let incoming = self
                .graph
                .neighbors_directed(node, Direction::Incoming)
                .count();
            if incoming == 0 {
                frontier.push(node);
            } else {
                remaining.insert(node, incoming);
            }
        }

        TopologicalLayers {
            graph: self,
            remaining,
            frontier,
        }
    }

    /// Direct dependencies of a task
    pub fn dependencies(&self, id: &str) -> Option<Vec<String>> {
        self.task(id).map(|t| t.dependencies.clone())
    }

    /// Tasks that directly depend on a task
    pub fn dependents(&self, id: &str) -> Option<Vec<String>> {
        let node = self.name_to_index.get(id)?;
        let mut nodes: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(*node, Direction::Outgoing)
            .collect();
        nodes.sort_unstable();
        Some(nodes.into_iter().map(|n| self.id_of(n).to_string()).collect())
    }

    /// Whether task `a` depends on task `b`, directly or transitively
    pub fn depends_on(&self, a: &str, b: &str) -> bool {
        let (Some(node_a), Some(node_b)) = (self.name_to_index.get(a), self.name_to_index.get(b))
        else {
            return false;
        };
        node_a != node_b && petgraph::algo::has_path_connecting(&self.graph, *node_b, *node_a, None)
    }

    /// Mermaid flowchart
    pub fn to_mermaid(&self) -> String {
        let mut out = String::from("graph TD\n");

        for task in &self.tasks {
            out.push_str(&format!("    {}[\"{}\"]\n", task.id, task.kind.label()));
        }

        for task in &self.tasks {
            for dep in &task.dependencies {
                out.push_str(&format!("    {} --> {}\n", dep, task.id));
            }
        }

        out
    }

    /// Graphviz DOT
    pub fn to_dot(&self) -> String {
        let mut out = format!("digraph \"{}\" {{\n", self.name);
        out.push_str("    rankdir=TB;\n");
        out.push_str("    node [shape=box, style=rounded];\n\n");

        for task in &self.tasks {
            let shape = match task.kind {
                TaskKind::Work { .. } => "box",
                TaskKind::QualityGate { .. } => "diamond",
                TaskKind::TriggerPipeline { .. } => "cds",
            };
            out.push_str(&format!("    \"{}\" [shape={}];\n", task.id, shape));
        }
        out.push('\n');

        for task in &self.tasks {
            for dep in &task.dependencies {
                let style = if task.trigger_rule == crate::pipeline::TriggerRule::AllDone {
                    " [style=dashed]"
                } else {
                    ""
                };
                out.push_str(&format!("    \"{}\" -> \"{}\"{};\n", dep, task.id, style));
            }
        }

        out.push_str("}\n");
        out
    }

    /// Numbered execution plan, one line per task
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let mut n = 1;

        for (layer_no, layer) in self.topological_layers().enumerate() {
            for id in layer {
                let Some(task) = self.task(id) else { continue };
                out.push_str(&format!(
                    "{}. [{}] {} ({})",
                    n,
                    layer_no + 1,
                    task.id,
                    task.kind.label()
                ));

                if !task.dependencies.is_empty() {
                    out.push_str(&format!(" [depends: {}]", task.dependencies.join(", ")));
                }
                if task.trigger_rule != crate::pipeline::TriggerRule::AllSuccess {
                    out.push_str(&format!(" [{}]", task.trigger_rule));
                }

                out.push('\n');
                n += 1;
            }
        }

        out
    }
}

/// Iterator over the layers of a [`PipelineGraph`]
pub struct TopologicalLayers<'a> {
    graph: &'a PipelineGraph,
    remaining: HashMap<NodeIndex, usize>,
    frontier: Vec<NodeIndex>,
}

impl<'a> Iterator for TopologicalLayers<'a> {
    type Item = Vec<&'a str>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.frontier.is_empty() {
            return None;
        }

        let mut layer = std::mem::take(&mut self.frontier);
        layer.sort_by_key(|n| self.graph.graph[*n]);

        for node in &layer {
            for succ in self
                .graph
                .graph
                .neighbors_directed(*node, Direction::Outgoing)
            {
                if let Some(count) = self.remaining.get_mut(&succ) {
                    *count -= 1;
                    if *count == 0 {
                        self.remaining.remove(&succ);
                        self.frontier.push(succ);
                    }
                }
            }
        }

        Some(layer.into_iter().map(|n| self.graph.id_of(n)).collect())
    }
}
