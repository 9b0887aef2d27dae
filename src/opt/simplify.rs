//! Phi and proxy collapsing.
//!
//! A phi whose slots all agree (or refer back to the phi itself) selects
//! nothing; a proxy whose wrapped value matches what the loop header
//! already carries across the forward edge proxies nothing. Both collapse
//! onto their underlying value, and the phis/proxies that used them are
//! re-examined, since a collapse can make its users redundant in turn.
//! The usage frontier is snapshotted before rewiring; the recursion
//! reaches a fixed point because every step deletes a node.

use tracing::trace;

use crate::ir::graph::Graph;
use crate::ir::node::{NodeId, NodeKind, SingleValue};

/// Collapse `phi` if its value is statically determinable. Safe to call
/// on a dead node. Returns whether the graph changed.
pub fn simplify_phi(graph: &mut Graph, phi: NodeId) -> bool {
    if !phi.is_valid() || !graph.is_alive(phi) {
        return false;
    }
    debug_assert!(graph.node(phi).is_phi());
    if graph.node(phi).inputs.len() == 1 {
        // Single-slot phis belong to trivial merges and are collapsed by
        // the merge reduction instead.
        return false;
    }

    let replacement = match graph.phi_single_value(phi) {
        SingleValue::Multiple => return false,
        SingleValue::Unique(value) => value,
        SingleValue::None => NodeId::INVALID,
    };
    trace!(%phi, %replacement, "collapsing redundant phi");
    replace_and_requeue(graph, phi, replacement);
    true
}

/// Collapse `proxy` if the value it wraps did not actually change across
/// the loop it exits. Safe to call on a dead node. Returns whether the
/// graph changed.
pub fn simplify_proxy(graph: &mut Graph, proxy: NodeId) -> bool {
    if !proxy.is_valid() || !graph.is_alive(proxy) {
        return false;
    }
    debug_assert!(graph.node(proxy).is_proxy());

    let exit = match &graph.node(proxy).kind {
        NodeKind::Proxy { exit } => *exit,
        _ => unreachable!(),
    };
    if !exit.is_valid() || !graph.is_alive(exit) {
        return false;
    }
    let begin = match &graph.node(exit).kind {
        NodeKind::LoopExit { begin, .. } => *begin,
        _ => return false,
    };
    if !begin.is_valid() || !graph.is_alive(begin) {
        return false;
    }

    let value = graph.node(proxy).inputs[0];
    // Scan the header state; a header phi contributes the value it
    // carries along the loop's single forward edge. First match wins,
    // compared by identity.
    let state: Vec<NodeId> = graph.node(begin).valid_inputs().collect();
    for entry in state {
        let mut candidate = entry;
        if graph.is_phi_at_merge(candidate, begin) {
            debug_assert_eq!(graph.forward_end_count(begin), 1);
            candidate = graph.phi_value_at(candidate, 0);
        }
        if value.is_valid() && value == candidate {
            trace!(%proxy, %value, "collapsing redundant proxy");
            replace_and_requeue(graph, proxy, value);
            return true;
        }
    }
    false
}

/// Rewire every usage of `node` to `replacement`, delete `node`, and
/// re-examine the phi/proxy usages that were just rewired.
fn replace_and_requeue(graph: &mut Graph, node: NodeId, replacement: NodeId) {
    let phi_usages: Vec<NodeId> = graph
        .usages(node)
        .iter()
        .copied()
        .filter(|&u| graph.node(u).is_phi())
        .collect();
    let proxy_usages: Vec<NodeId> = graph
        .usages(node)
        .iter()
        .copied()
        .filter(|&u| graph.node(u).is_proxy())
        .collect();

    graph.replace_at_usages(node, replacement);
    graph.safe_delete(node);

    for phi in phi_usages {
        simplify_phi(graph, phi);
    }
    for proxy in proxy_usages {
        simplify_proxy(graph, proxy);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::node::BinOp;

    fn merge_of_two(graph: &mut Graph) -> NodeId {
        let e1 = graph.add_end();
        let e2 = graph.add_end();
        graph.add_merge(&[e1, e2])
    }

    #[test]
    fn phi_with_agreeing_slots_collapses() {
        let mut g = Graph::new();
        let merge = merge_of_two(&mut g);
        let x = g.add_const_int(42);
        let phi = g.add_phi(merge, &[x, x]);
        let ret = g.add_return(phi);

        assert!(simplify_phi(&mut g, phi));

        assert!(!g.is_alive(phi));
        assert_eq!(g.node(ret).inputs[0], x);
        assert!(g.merge_phis(merge).is_empty());
        g.verify().unwrap();
    }

    #[test]
    fn phi_with_disagreeing_slots_stays() {
        let mut g = Graph::new();
        let merge = merge_of_two(&mut g);
        let x = g.add_const_int(1);
        let y = g.add_const_int(2);
        let phi = g.add_phi(merge, &[x, y]);

        assert!(!simplify_phi(&mut g, phi));
        assert!(g.is_alive(phi));
        g.verify().unwrap();
    }

    #[test]
    fn simplify_phi_is_idempotent() {
        let mut g = Graph::new();
        let merge = merge_of_two(&mut g);
        let x = g.add_const_int(42);
        let phi = g.add_phi(merge, &[x, x]);
        let _ret = g.add_return(phi);

        assert!(simplify_phi(&mut g, phi));
        let live_after_first = g.live_count();
        assert!(!simplify_phi(&mut g, phi));
        assert_eq!(g.live_count(), live_after_first);
        g.verify().unwrap();
    }

    #[test]
    fn self_references_do_not_block_collapse() {
        let mut g = Graph::new();
        let merge = merge_of_two(&mut g);
        let x = g.add_const_int(7);
        let phi = g.add_phi(merge, &[NodeId::INVALID, NodeId::INVALID]);
        g.set_phi_value(phi, 0, x);
        g.set_phi_value(phi, 1, phi);
        let ret = g.add_return(phi);

        assert!(simplify_phi(&mut g, phi));
        assert_eq!(g.node(ret).inputs[0], x);
        g.verify().unwrap();
    }

    #[test]
    fn collapse_cascades_through_phi_users() {
        let mut g = Graph::new();
        let inner = merge_of_two(&mut g);
        let outer = merge_of_two(&mut g);
        let x = g.add_const_int(3);
        let inner_phi = g.add_phi(inner, &[x, x]);
        // outer phi becomes redundant only once inner collapses
        let outer_phi = g.add_phi(outer, &[inner_phi, x]);
        let ret = g.add_return(outer_phi);

        assert!(simplify_phi(&mut g, inner_phi));

        assert!(!g.is_alive(inner_phi));
        assert!(!g.is_alive(outer_phi));
        assert_eq!(g.node(ret).inputs[0], x);
        g.verify().unwrap();
    }

    #[test]
    fn redundant_proxy_collapses_through_header_phi() {
        let mut g = Graph::new();
        // Loop whose carried value never changes: phi(init, phi).
        let fwd = g.add_end();
        g.set_next(g.start, fwd);
        let begin = g.add_loop_begin(fwd);
        let _le = g.add_loop_end(begin);
        let init = g.add_const_int(5);
        let phi = g.add_phi(begin, &[init, NodeId::INVALID]);
        g.set_phi_value(phi, 1, phi);
        g.set_loop_state(begin, &[phi]);

        let exit = g.add_loop_exit(begin);
        let proxy = g.add_proxy(exit, init);
        let ret = g.add_return(proxy);
        g.set_next(exit, ret);

        // The proxy wraps `init`, which is exactly what the header phi
        // carries in over the forward edge.
        assert!(simplify_proxy(&mut g, proxy));

        assert!(!g.is_alive(proxy));
        assert_eq!(g.node(ret).inputs[0], init);
        assert!(g.proxies(exit).is_empty());
        g.verify().unwrap();
    }

    #[test]
    fn proxy_of_changing_value_stays() {
        let mut g = Graph::new();
        let fwd = g.add_end();
        g.set_next(g.start, fwd);
        let begin = g.add_loop_begin(fwd);
        let _le = g.add_loop_end(begin);
        let init = g.add_const_int(0);
        let one = g.add_const_int(1);
        let phi = g.add_phi(begin, &[init, NodeId::INVALID]);
        let next = g.add_binary(BinOp::Add, phi, one);
        g.set_phi_value(phi, 1, next);
        g.set_loop_state(begin, &[phi]);

        let exit = g.add_loop_exit(begin);
        // Wraps the loop-carried sum, which does change per iteration.
        let proxy = g.add_proxy(exit, next);
        let _ret = g.add_return(proxy);

        assert!(!simplify_proxy(&mut g, proxy));
        assert!(g.is_alive(proxy));
        g.verify().unwrap();
    }

    #[test]
    fn simplify_on_dead_nodes_is_noop() {
        let mut g = Graph::new();
        let merge = merge_of_two(&mut g);
        let x = g.add_const_int(1);
        let phi = g.add_phi(merge, &[x, x]);
        assert!(simplify_phi(&mut g, phi));
        // second call sees a dead phi
        assert!(!simplify_phi(&mut g, phi));
        assert!(!simplify_proxy(&mut g, NodeId::INVALID));
    }
}
