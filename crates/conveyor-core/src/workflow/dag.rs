//! Workflow DAG validation and dependent-closure computation.
//!
//! Uses `petgraph` to model step dependencies as a directed graph.
//! Topological sort detects cycles at definition time; the transitive
//! dependent closure drives skip propagation when a step fails.

use std::collections::{HashMap, HashSet};

use conveyor_types::error::WorkflowError;
use conveyor_types::workflow::WorkflowStep;
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate that steps form a usable DAG: at least one step, unique step
/// keys, every dependency resolvable, and no cycles.
pub fn validate(steps: &[WorkflowStep]) -> Result<(), WorkflowError> {
    if steps.is_empty() {
        return Err(WorkflowError::EmptyWorkflow);
    }

    let mut key_to_idx: HashMap<&str, usize> = HashMap::with_capacity(steps.len());
    for (i, step) in steps.iter().enumerate() {
        if key_to_idx.insert(step.step_key.as_str(), i).is_some() {
            return Err(WorkflowError::DuplicateStep(step.step_key.clone()));
        }
    }

    // Build directed graph: edge from dependency -> dependent
    let mut graph = DiGraph::<&str, ()>::new();
    let node_indices: Vec<_> = steps
        .iter()
        .map(|s| graph.add_node(s.step_key.as_str()))
        .collect();

    for step in steps {
        let to_idx = key_to_idx[step.step_key.as_str()];
        for dep in &step.depends_on {
            let from_idx =
                key_to_idx
                    .get(dep.as_str())
                    .ok_or_else(|| WorkflowError::UnknownDependency {
                        step: step.step_key.clone(),
                        dependency: dep.clone(),
                    })?;
            graph.add_edge(node_indices[*from_idx], node_indices[to_idx], ());
        }
    }

    toposort(&graph, None).map_err(|cycle| {
        let step_key = graph[cycle.node_id()];
        WorkflowError::CycleDetected(step_key.to_string())
    })?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Transitive dependent closure
// ---------------------------------------------------------------------------

/// Every step that transitively depends on one of `roots`. The roots
/// themselves are not included. Steps are described by `(step_key,
/// depends_on)` pairs so both definition steps and step runs can feed it.
pub fn transitive_dependents<'a, I>(roots: &HashSet<&str>, steps: I) -> HashSet<String>
where
    I: IntoIterator<Item = (&'a str, &'a [String])> + Clone,
{
    let mut closure: HashSet<String> = HashSet::new();
    // Iterate to a fixed point; step count is small enough that the
    // quadratic worst case does not matter.
    loop {
        let mut grew = false;
        for (key, depends_on) in steps.clone() {
            if closure.contains(key) {
                continue;
            }
            let blocked = depends_on
                .iter()
                .any(|dep| roots.contains(dep.as_str()) || closure.contains(dep.as_str()));
            if blocked {
                closure.insert(key.to_string());
                grew = true;
            }
        }
        if !grew {
            break;
        }
    }
    closure
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
