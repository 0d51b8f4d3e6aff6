//! Dependency graph builder.
//!
//! Converts the flat task list from the external store into a layered DAG
//! with readiness, depth and critical-path annotations. The build is a
//! pure function of its input: nothing is cached, and rebuilding on every
//! supervisor poll is cheap relative to the polling interval.

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::core::task::{Assignment, TaskSpec, TaskStatus};
use crate::{Error, Result};

/// One task in a built graph.
#[derive(Debug, Clone, Serialize)]
pub struct TaskNode {
    pub id: String,
    pub title: String,
    pub status: TaskStatus,
    /// Tasks that must complete before this one (as given by the store).
    pub blocked_by: Vec<String>,
    /// Exact transpose of `blocked_by` across the graph (derived).
    pub blocks: Vec<String>,
    /// Distance from a root: 0 for roots, else 1 + max over present blockers.
    pub depth: usize,
    pub on_critical_path: bool,
    pub assignment: Option<Assignment>,
}

/// A blocker edge: `from` must complete before `to` can start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
    pub on_critical_path: bool,
}

/// A built dependency graph.
#[derive(Debug, Clone, Serialize)]
pub struct TaskGraph {
    pub nodes: HashMap<String, TaskNode>,
    pub edges: Vec<GraphEdge>,
    /// Tasks with no blockers at all.
    pub roots: Vec<String>,
    /// Tasks nothing depends on.
    pub leaves: Vec<String>,
    /// The longest chain of currently-incomplete tasks, in dependency order.
    pub critical_path: Vec<String>,
    pub max_depth: usize,
}

impl TaskGraph {
    /// Build a graph from the flat task list.
    ///
    /// A blocker id that does not appear in the input is tolerated: it
    /// stays listed in `blocked_by`, contributes nothing to depth (it has
    /// none to contribute), and keeps its dependent `blocked` since the
    /// dependency can never resolve.
    ///
    /// # Errors
    ///
    /// Returns `Error::Cycle` naming a task on the cycle if the input is
    /// not acyclic.
    pub fn build(tasks: &[TaskSpec]) -> Result<TaskGraph> {
        let mut nodes: HashMap<String, TaskNode> = HashMap::new();
        let mut order: Vec<String> = Vec::new();
        for spec in tasks {
            if nodes.contains_key(&spec.id) {
                continue;
            }
            order.push(spec.id.clone());
            nodes.insert(
                spec.id.clone(),
                TaskNode {
                    id: spec.id.clone(),
                    title: spec.title.clone(),
                    status: spec.status,
                    blocked_by: spec.blocked_by.clone(),
                    blocks: Vec::new(),
                    depth: 0,
                    on_critical_path: false,
                    assignment: spec.assignment.clone(),
                },
            );
        }

        // Transpose: every (blocked, blocker) pair with a present blocker
        // also appears in the blocker's `blocks` list.
        for id in &order {
            let blockers = nodes[id].blocked_by.clone();
            for blocker in blockers {
                if blocker == *id {
                    return Err(Error::Cycle(id.clone()));
                }
                if let Some(node) = nodes.get_mut(&blocker) {
                    node.blocks.push(id.clone());
                }
            }
        }

        // Mirror the present nodes and present-blocker edges into petgraph
        // for cycle detection and topological ordering.
        let mut graph: DiGraph<String, ()> = DiGraph::new();
        let mut index: HashMap<String, NodeIndex> = HashMap::new();
        for id in &order {
            index.insert(id.clone(), graph.add_node(id.clone()));
        }
        let mut edges: Vec<GraphEdge> = Vec::new();
        for id in &order {
            for blocker in &nodes[id].blocked_by {
                if let Some(&from) = index.get(blocker) {
                    graph.add_edge(from, index[id], ());
                    edges.push(GraphEdge {
                        from: blocker.clone(),
                        to: id.clone(),
                        on_critical_path: false,
                    });
                }
            }
        }

        let sorted =
            toposort(&graph, None).map_err(|cycle| Error::Cycle(graph[cycle.node_id()].clone()))?;
        let topo_ids: Vec<String> = sorted.iter().map(|&idx| graph[idx].clone()).collect();

        // Depth by layered propagation: topological order guarantees every
        // present blocker is computed before its dependents.
        for id in &topo_ids {
            let depth = nodes[id]
                .blocked_by
                .iter()
                .filter_map(|b| nodes.get(b).map(|n| n.depth + 1))
                .max()
                .unwrap_or(0);
            if let Some(node) = nodes.get_mut(id) {
                node.depth = depth;
            }
        }
        let max_depth = nodes.values().map(|n| n.depth).max().unwrap_or(0);

        // Readiness: externally owned statuses pass through; the rest are
        // ready iff every blocker resolves to a complete node.
        let complete: HashSet<&str> = tasks
            .iter()
            .filter(|t| t.status.is_complete())
            .map(|t| t.id.as_str())
            .collect();
        for id in &order {
            let node = &nodes[id];
            if node.status.is_externally_owned() {
                continue;
            }
            let ready = node
                .blocked_by
                .iter()
                .all(|b| complete.contains(b.as_str()));
            let status = if ready {
                TaskStatus::Ready
            } else {
                TaskStatus::Blocked
            };
            if let Some(node) = nodes.get_mut(id) {
                node.status = status;
            }
        }

        let roots: Vec<String> = order
            .iter()
            .filter(|id| nodes[*id].blocked_by.is_empty())
            .cloned()
            .collect();
        let leaves: Vec<String> = order
            .iter()
            .filter(|id| nodes[*id].blocks.is_empty())
            .cloned()
            .collect();

        let critical_path = compute_critical_path(&topo_ids, &nodes, &complete);
        for id in &critical_path {
            if let Some(node) = nodes.get_mut(id) {
                node.on_critical_path = true;
            }
        }
        for pair in critical_path.windows(2) {
            for edge in edges.iter_mut() {
                if edge.from == pair[0] && edge.to == pair[1] {
                    edge.on_critical_path = true;
                }
            }
        }

        Ok(TaskGraph {
            nodes,
            edges,
            roots,
            leaves,
            critical_path,
            max_depth,
        })
    }

    pub fn get(&self, id: &str) -> Option<&TaskNode> {
        self.nodes.get(id)
    }

    /// Ids of tasks currently eligible for dispatch.
    pub fn ready_ids(&self) -> Vec<&str> {
        let mut ready: Vec<&str> = self
            .nodes
            .values()
            .filter(|n| n.status == TaskStatus::Ready)
            .map(|n| n.id.as_str())
            .collect();
        ready.sort();
        ready
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Longest chain of currently-incomplete tasks ending at a leaf.
///
/// Dynamic programming over reverse topological order: the longest
/// remaining path from a node is 1 plus the best over its incomplete
/// dependents. The chain is then walked forward from the best start.
fn compute_critical_path(
    topo_ids: &[String],
    nodes: &HashMap<String, TaskNode>,
    complete: &HashSet<&str>,
) -> Vec<String> {
    let incomplete = |id: &str| !complete.contains(id);

    let mut remaining: HashMap<&str, usize> = HashMap::new();
    for id in topo_ids.iter().rev() {
        if !incomplete(id) {
            continue;
        }
        let best_successor = nodes[id]
            .blocks
            .iter()
            .filter(|m| incomplete(m))
            .filter_map(|m| remaining.get(m.as_str()))
            .max()
            .copied()
            .unwrap_or(0);
        remaining.insert(id.as_str(), 1 + best_successor);
    }

    // Deterministic start: first node in topological order with the
    // maximal remaining length.
    let Some(best) = remaining.values().max().copied() else {
        return Vec::new();
    };
    let Some(start) = topo_ids
        .iter()
        .find(|id| remaining.get(id.as_str()) == Some(&best))
    else {
        return Vec::new();
    };

    let mut path = vec![start.clone()];
    let mut current = start.as_str();
    while remaining[current] > 1 {
        let target = remaining[current] - 1;
        let Some(next) = nodes[current]
            .blocks
            .iter()
            .find(|m| remaining.get(m.as_str()) == Some(&target))
        else {
            break;
        };
        path.push(next.clone());
        current = next.as_str();
    }
    path
}
