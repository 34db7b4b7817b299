//! Tool-call batch ordering.
//!
//! A batch of tool calls from the model is ordered so that higher-priority
//! tools run earlier and declared dependencies run before their dependents.
//! Dependencies referring to tools absent from the batch are ignored for
//! ordering. A dependency cycle is reported as an error; the caller falls
//! back to arrival order.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use axon_core::error::EngineError;
use axon_core::message::ToolCall;
use axon_core::tool::Tool;

/// Order `calls` by priority (descending) and dependency graph.
///
/// Duplicate calls to the same tool are kept, grouped at the point the tool
/// is first scheduled, preserving their arrival order within the group.
pub(crate) fn sort_by_dependencies(
    calls: &[ToolCall],
    tools_by_name: &HashMap<String, Arc<dyn Tool>>,
) -> Result<Vec<ToolCall>, EngineError> {
    if calls.len() <= 1 {
        return Ok(calls.to_vec());
    }

    let mut graph: HashMap<String, Vec<String>> = HashMap::new();
    let mut priorities: HashMap<String, i32> = HashMap::new();
    let mut calls_for: HashMap<String, Vec<ToolCall>> = HashMap::new();
    let mut arrival: Vec<String> = Vec::new();

    for call in calls {
        let name = call.function.name.clone();
        if !calls_for.contains_key(&name) {
            arrival.push(name.clone());
            if let Some(tool) = tools_by_name.get(&name) {
                let metadata = tool.metadata();
                priorities.insert(name.clone(), metadata.priority);
                if !metadata.dependencies.is_empty() {
                    graph.insert(name.clone(), metadata.dependencies);
                }
            } else {
                priorities.insert(name.clone(), 0);
            }
        }
        calls_for.entry(name).or_default().push(call.clone());
    }

    detect_cycles(&graph)?;

    // Priority descending; stable sort keeps arrival order among equals
    let mut order = arrival;
    order.sort_by_key(|name| std::cmp::Reverse(priorities.get(name).copied().unwrap_or(0)));

    let mut sorted = Vec::with_capacity(calls.len());
    let mut visited = HashSet::new();
    let mut in_progress = HashSet::new();
    for name in &order {
        visit(
            name,
            &graph,
            &calls_for,
            &mut visited,
            &mut in_progress,
            &mut sorted,
        )?;
    }

    Ok(sorted)
}

fn visit(
    name: &str,
    graph: &HashMap<String, Vec<String>>,
    calls_for: &HashMap<String, Vec<ToolCall>>,
    visited: &mut HashSet<String>,
    in_progress: &mut HashSet<String>,
    sorted: &mut Vec<ToolCall>,
) -> Result<(), EngineError> {
    if in_progress.contains(name) {
        return Err(EngineError::CircularDependency(name.to_string()));
    }
    if visited.contains(name) {
        return Ok(());
    }

    in_progress.insert(name.to_string());
    if let Some(deps) = graph.get(name) {
        for dep in deps {
            if calls_for.contains_key(dep) {
                visit(dep, graph, calls_for, visited, in_progress, sorted)?;
            }
        }
    }
    in_progress.remove(name);
    visited.insert(name.to_string());

    if let Some(batch) = calls_for.get(name) {
        sorted.extend(batch.iter().cloned());
    }
    Ok(())
}

/// DFS with a recursion stack over the declared dependency edges.
fn detect_cycles(graph: &HashMap<String, Vec<String>>) -> Result<(), EngineError> {
    let mut visited = HashSet::new();
    let mut stack = HashSet::new();

    fn has_cycle(
        name: &str,
        graph: &HashMap<String, Vec<String>>,
        visited: &mut HashSet<String>,
        stack: &mut HashSet<String>,
    ) -> bool {
        visited.insert(name.to_string());
        stack.insert(name.to_string());

        if let Some(deps) = graph.get(name) {
            for dep in deps {
                if !visited.contains(dep) {
                    if has_cycle(dep, graph, visited, stack) {
                        return true;
                    }
                } else if stack.contains(dep) {
                    return true;
                }
            }
        }

        stack.remove(name);
        false
    }

    for name in graph.keys() {
        if !visited.contains(name) && has_cycle(name, graph, &mut visited, &mut stack) {
            return Err(EngineError::CircularDependency(name.clone()));
        }
    }
    Ok(())
}
