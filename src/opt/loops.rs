//! Loop normalization.
//!
//! A loop header can lose all of its back edges without any pass noticing
//! — a body whose only path is an unconditional early exit, for example.
//! Such a header no longer loops and is reduced to sequential control.
//! Headers that still loop get their phis and exit proxies re-examined,
//! since upstream changes may have made them redundant.

use tracing::debug;

use crate::ir::graph::Graph;
use crate::ir::node::NodeId;

use super::{simplify_phi, simplify_proxy, OptimizationPass};

/// Whole-graph cleanup of degenerate loop headers. Returns whether any
/// loop was removed.
pub fn normalize_loops(graph: &mut Graph) -> bool {
    normalize(graph).0
}

/// Returns `(loop_removed, simplified)`.
fn normalize(graph: &mut Graph) -> (bool, bool) {
    let mut loop_removed = false;
    let mut simplified = false;
    for begin in graph.loop_begins() {
        if !graph.is_alive(begin) {
            continue;
        }
        if graph.loop_ends(begin).is_empty() {
            assert_eq!(
                graph.forward_end_count(begin),
                1,
                "degenerate loop {begin} with multiple entries"
            );
            graph.reduce_degenerate_loop_begin(begin);
            loop_removed = true;
        } else {
            simplified |= normalize_loop_begin(graph, begin);
        }
    }

    if loop_removed {
        // Removing a degenerate loop can make phi functions elsewhere
        // unnecessary, so every remaining phi is re-checked.
        debug!("degenerate loop removed, re-checking all phis");
        for phi in graph.phis() {
            simplified |= simplify_phi(graph, phi);
        }
    }
    (loop_removed, simplified)
}

/// Re-examine the phis and exit proxies of a live loop header.
fn normalize_loop_begin(graph: &mut Graph, begin: NodeId) -> bool {
    let mut changed = false;
    for phi in graph.merge_phis(begin).to_vec() {
        changed |= simplify_phi(graph, phi);
    }
    for exit in graph.loop_exits(begin).to_vec() {
        if !graph.is_alive(exit) {
            continue;
        }
        for proxy in graph.proxies(exit).to_vec() {
            changed |= simplify_proxy(graph, proxy);
        }
    }
    changed
}

/// [`normalize_loops`] packaged as a pass.
pub struct NormalizeLoops;

impl OptimizationPass for NormalizeLoops {
    fn name(&self) -> &'static str {
        "NormalizeLoops"
    }

    fn run(&mut self, graph: &mut Graph) -> bool {
        let (loop_removed, simplified) = normalize(graph);
        loop_removed || simplified
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::node::NodeKind;

    #[test]
    fn degenerate_loop_is_reduced() {
        let mut g = Graph::new();
        // Loop header that never had a back edge: for (;;) { break; }
        let fwd = g.add_end();
        g.set_next(g.start, fwd);
        let begin = g.add_loop_begin(fwd);
        let x = g.add_const_int(9);
        let phi = g.add_phi(begin, &[x]);
        let ret = g.add_return(phi);
        g.set_next(begin, ret);

        assert!(normalize_loops(&mut g));

        assert!(!g.is_alive(begin));
        assert!(!g.is_alive(phi));
        assert!(!g.is_alive(fwd));
        assert_eq!(g.node(ret).inputs[0], x);
        // start now flows straight into the return
        assert_eq!(g.node(g.start).successors[0], ret);
        assert!(g.loop_begins().is_empty());
        g.verify().unwrap();
    }

    #[test]
    fn healthy_loop_keeps_header_but_sheds_redundant_phi() {
        let mut g = Graph::new();
        let fwd = g.add_end();
        g.set_next(g.start, fwd);
        let begin = g.add_loop_begin(fwd);
        let _le = g.add_loop_end(begin);
        let x = g.add_const_int(4);
        // carries the same value around the loop
        let phi = g.add_phi(begin, &[x, NodeId::INVALID]);
        g.set_phi_value(phi, 1, phi);
        let ret = g.add_return(phi);

        assert!(!normalize_loops(&mut g));

        assert!(g.is_alive(begin), "loop with a back edge survives");
        assert!(!g.is_alive(phi), "self-carried phi collapses");
        assert_eq!(g.node(ret).inputs[0], x);
        g.verify().unwrap();
    }

    #[test]
    fn exit_proxies_are_checked() {
        let mut g = Graph::new();
        let fwd = g.add_end();
        g.set_next(g.start, fwd);
        let begin = g.add_loop_begin(fwd);
        let _le = g.add_loop_end(begin);
        let init = g.add_const_int(2);
        let phi = g.add_phi(begin, &[init, NodeId::INVALID]);
        g.set_phi_value(phi, 1, phi);
        g.set_loop_state(begin, &[phi]);

        let exit = g.add_loop_exit(begin);
        let proxy = g.add_proxy(exit, init);
        let ret = g.add_return(proxy);
        g.set_next(exit, ret);

        normalize_loops(&mut g);

        assert!(!g.is_alive(proxy), "proxy of unchanged value collapses");
        assert_eq!(g.node(ret).inputs[0], init);
        g.verify().unwrap();
    }

    #[test]
    fn pass_wrapper_reports_changes() {
        let mut g = Graph::new();
        let fwd = g.add_end();
        g.set_next(g.start, fwd);
        let begin = g.add_loop_begin(fwd);
        let next = g.add_begin();
        g.set_next(begin, next);

        let mut pass = NormalizeLoops;
        assert_eq!(pass.name(), "NormalizeLoops");
        assert!(pass.run(&mut g));
        assert!(!pass.run(&mut g), "second run reaches a fixed point");
        assert!(!g
            .live_nodes()
            .any(|(_, n)| matches!(n.kind, NodeKind::LoopBegin(..))));
        g.verify().unwrap();
    }
}
