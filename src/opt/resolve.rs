//! Original-value resolution.
//!
//! Read-only queries that see through phi/proxy indirection. The fast
//! path follows single-valued wrappers; when a phi is ambiguous on the
//! way, an exhaustive breadth-first search decides whether one unique
//! concrete value reaches the query through every path. Two distinct
//! candidates mean there is no original value, which callers treat as
//! "cannot simplify further", not as an error.

use std::collections::VecDeque;

use crate::ir::arena::BitSet;
use crate::ir::graph::Graph;
use crate::ir::node::{NodeId, NodeKind, SingleValue};

/// Follow proxy wrappers to the first non-proxy value.
pub fn unproxify(graph: &Graph, value: NodeId) -> NodeId {
    let mut current = value;
    while matches!(graph.node(current).kind, NodeKind::Proxy { .. }) {
        current = graph.node(current).inputs[0];
    }
    current
}

/// Resolve the value behind chains of proxies and unambiguous phis.
/// Returns `None` when different values reach the query through
/// different paths.
pub fn original_value(graph: &Graph, node: NodeId) -> Option<NodeId> {
    let mut current = node;
    loop {
        match &graph.node(current).kind {
            NodeKind::Proxy { .. } => current = graph.node(current).inputs[0],
            NodeKind::Phi { .. } => match graph.phi_single_value(current) {
                SingleValue::Unique(value) => current = value,
                SingleValue::None | SingleValue::Multiple => {
                    return exhaustive_search(graph, node);
                }
            },
            _ => return Some(current),
        }
    }
}

/// Worklist search for the single concrete value reachable through
/// phi/proxy indirection, when the linear walk gave up. Every phi slot
/// and wrapped value is traversed; any other node is a candidate answer,
/// and a second distinct candidate concludes the search with no result.
fn exhaustive_search(graph: &Graph, start: NodeId) -> Option<NodeId> {
    let mut visited = BitSet::with_capacity(graph.len());
    let mut worklist = VecDeque::new();
    let mut result: Option<NodeId> = None;

    visited.insert(start.index());
    worklist.push_back(start);

    while let Some(node) = worklist.pop_front() {
        match &graph.node(node).kind {
            NodeKind::Proxy { .. } => {
                let wrapped = graph.node(node).inputs[0];
                if wrapped.is_valid()
                    && graph.is_alive(wrapped)
                    && visited.insert(wrapped.index())
                {
                    worklist.push_back(wrapped);
                }
            }
            NodeKind::Phi { .. } => {
                for slot in graph.node(node).valid_inputs() {
                    if graph.is_alive(slot) && visited.insert(slot.index()) {
                        worklist.push_back(slot);
                    }
                }
            }
            _ => {
                if graph.is_alive(node) {
                    match result {
                        None => result = Some(node),
                        Some(existing) if existing != node => return None,
                        _ => {}
                    }
                }
            }
        }
    }
    result
}

// =============================================================================
// Tests
// =============================================================================
