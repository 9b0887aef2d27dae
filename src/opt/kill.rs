//! Control-flow kill and death propagation.
//!
//! Killing is recursive and order-sensitive: successors die before their
//! predecessor is detached, ends are detached from their merge before
//! anything else happens (the merge may need to be reduced or torn down),
//! and floating inputs die the moment their last usage is severed. The
//! cascade is depth-first on purpose — each deletion can expose dead
//! nodes only reachable through the edge that was just removed, which a
//! fixed-point sweep would miss.

use tracing::{debug, trace};

use crate::ir::graph::Graph;
use crate::ir::node::{NodeId, NodeKind};

use super::{NoSimplifier, SimplifierTool};

/// Kill an unreachable node and everything that dies with it.
pub fn kill_cfg(graph: &mut Graph, node: NodeId) {
    kill_cfg_with(graph, node, &mut NoSimplifier);
}

/// [`kill_cfg`] with a callback receiving the phi usages exposed by any
/// merge reduction triggered along the way.
///
/// Successor slots are iterated in place, without a snapshot: recursive
/// kills on one branch may clear sibling slots of a node currently being
/// iterated, and those edits must be visible. The contract is that the
/// slot list never changes length mid-iteration — slots are cleared, not
/// removed — which the graph guarantees structurally and this function
/// re-checks in debug builds.
pub fn kill_cfg_with(graph: &mut Graph, node: NodeId, tool: &mut dyn SimplifierTool) {
    assert!(graph.is_alive(node), "killing dead node {node}");
    trace!(%node, "killing control flow");

    if graph.node(node).kind.is_end() {
        // A control path terminating into a merge: detach it there first,
        // reducing or tearing down the merge as needed.
        kill_end(graph, node, tool);
    } else if graph.node(node).is_fixed() {
        let slots = graph.node(node).successors.len();
        for index in 0..slots {
            debug_assert_eq!(
                graph.node(node).successors.len(),
                slots,
                "successor slot count of {node} changed during kill"
            );
            let succ = graph.node(node).successors[index];
            if succ.is_valid() && graph.is_alive(succ) {
                kill_cfg_with(graph, succ, tool);
            }
        }
    }

    graph.replace_at_predecessor(node, NodeId::INVALID);
    propagate_kill(graph, node);
}

/// Sever a branch from its predecessor and kill it.
pub fn delete_branch(graph: &mut Graph, branch: NodeId, tool: &mut dyn SimplifierTool) {
    graph.replace_at_predecessor(branch, NodeId::INVALID);
    kill_cfg_with(graph, branch, tool);
}

/// Detach a dying end from its merge, handling the structural fallout:
/// a loop header that lost its last entry is torn down, one that lost its
/// last back edge is reduced, a merge left with a single edge is reduced.
fn kill_end(graph: &mut Graph, end: NodeId, tool: &mut dyn SimplifierTool) {
    let merge = match &graph.node(end).kind {
        NodeKind::End { merge } => *merge,
        NodeKind::LoopEnd { begin } => *begin,
        _ => unreachable!("{end} is not an end"),
    };
    if !merge.is_valid() || !graph.is_alive(merge) {
        return;
    }

    graph.remove_end(merge, end);

    let is_loop = matches!(graph.node(merge).kind, NodeKind::LoopBegin(..));
    if is_loop && graph.forward_end_count(merge) == 0 {
        // The loop can no longer be entered. Phis die before the back
        // edges are severed, so severing cannot resurrect an input that
        // was already processed.
        debug!(%merge, "tearing down dead loop");
        for phi in graph.merge_phis(merge).to_vec() {
            propagate_kill(graph, phi);
        }
        for loop_end in graph.loop_ends(merge).to_vec() {
            graph.remove_end(merge, loop_end);
            graph.replace_at_predecessor(loop_end, NodeId::INVALID);
            graph.safe_delete(loop_end);
        }
        graph.remove_exits(merge);
        let body = graph.node(merge).successors[0];
        if body.is_valid() && graph.is_alive(body) {
            // For tiny infinite loops the body is a loop end and already
            // died while the back edges were severed.
            kill_cfg_with(graph, body, tool);
        }
        let state: Vec<NodeId> = graph.node(merge).valid_inputs().collect();
        graph.safe_delete(merge);
        for value in state {
            if graph.is_alive(value) {
                try_kill_unused(graph, value);
            }
        }
    } else if is_loop && graph.loop_ends(merge).is_empty() {
        // The last back edge went away: not a loop anymore.
        notify_phi_usages(graph, merge, tool);
        graph.reduce_degenerate_loop_begin(merge);
    } else if graph.edge_count(merge) == 1 {
        // Not a merge anymore.
        notify_phi_usages(graph, merge, tool);
        graph.reduce_trivial_merge(merge);
    }
}

fn notify_phi_usages(graph: &Graph, merge: NodeId, tool: &mut dyn SimplifierTool) {
    for &phi in graph.merge_phis(merge) {
        for &usage in graph.usages(phi) {
            tool.add_to_work_list(usage);
        }
    }
}

/// Mark a node dead and cascade: inputs lose a usage (floating inputs
/// that become unused die), floating usages become structurally invalid
/// and die — a phi usage only once it has no valid slot left. Structural
/// dependents (a dying merge's phis, a dying exit's proxies) go the same
/// way.
fn propagate_kill(graph: &mut Graph, node: NodeId) {
    if !node.is_valid() || !graph.is_alive(node) {
        return;
    }
    trace!(%node, "propagating death");
    graph.mark_deleted(node);

    let inputs: Vec<NodeId> = graph.node(node).valid_inputs().collect();
    for input in inputs {
        if !graph.is_alive(input) {
            continue;
        }
        graph.remove_usage(input, node);
        if graph.has_no_usages(input) && graph.node(input).is_floating() {
            kill_with_unused_floating_inputs(graph, input);
        }
    }

    if graph.node(node).kind.is_merge() {
        graph.orphan_merge_edges(node);
        for phi in graph.merge_phis(node).to_vec() {
            propagate_kill(graph, phi);
        }
    } else if matches!(graph.node(node).kind, NodeKind::LoopExit { .. }) {
        for proxy in graph.proxies(node).to_vec() {
            propagate_kill(graph, proxy);
        }
    }

    let to_kill: Vec<NodeId> = graph
        .usages(node)
        .iter()
        .copied()
        .filter(|&usage| graph.is_alive(usage) && graph.node(usage).is_floating())
        .collect();
    for usage in to_kill {
        if !graph.is_alive(usage) {
            continue;
        }
        if graph.node(usage).is_phi() {
            graph.replace_first_input(usage, node, NodeId::INVALID);
            if !graph.phi_has_valid_input(usage) {
                propagate_kill(graph, usage);
            }
        } else {
            propagate_kill(graph, usage);
        }
    }
}

/// Delete an already-detached floating node and, recursively, each of its
/// inputs that the deletion leaves unused. A phi input counts as unused
/// when every one of its usages is the phi itself.
pub fn kill_with_unused_floating_inputs(graph: &mut Graph, node: NodeId) {
    let inputs: Vec<NodeId> = graph.node(node).valid_inputs().collect();
    graph.safe_delete(node);
    for input in inputs {
        if !graph.is_alive(input) || !graph.node(input).is_floating() {
            continue;
        }
        if graph.has_no_usages(input) {
            kill_with_unused_floating_inputs(graph, input);
        } else if graph.node(input).is_phi() && graph.usages(input).iter().all(|&u| u == input) {
            graph.replace_at_usages(input, NodeId::INVALID);
            kill_with_unused_floating_inputs(graph, input);
        }
    }
}

/// Kill a floating node if nothing uses it. Returns whether it was
/// killed.
pub fn try_kill_unused(graph: &mut Graph, node: NodeId) -> bool {
    if graph.is_alive(node) && graph.node(node).is_floating() && graph.has_no_usages(node) {
        kill_with_unused_floating_inputs(graph, node);
        return true;
    }
    false
}

// =============================================================================
// Tests
// =============================================================================
