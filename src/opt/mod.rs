//! Graph maintenance passes.
//!
//! Everything here mutates a [`Graph`] through its edge-maintenance API
//! and leaves it consistent on return:
//!
//! - **Kill** (`kill.rs`): remove unreachable control flow and everything
//!   that dies with it.
//! - **Simplify** (`simplify.rs`): collapse phis and proxies whose value
//!   is statically determinable.
//! - **Loops** (`loops.rs`): reduce degenerate loop headers.
//! - **Resolve** (`resolve.rs`): read-only lookup of the value behind
//!   phi/proxy indirection.

pub mod kill;
pub mod loops;
pub mod resolve;
pub mod simplify;

pub use kill::{
    delete_branch, kill_cfg, kill_cfg_with, kill_with_unused_floating_inputs, try_kill_unused,
};
pub use loops::{normalize_loops, NormalizeLoops};
pub use resolve::{original_value, unproxify};
pub use simplify::{simplify_phi, simplify_proxy};

use crate::ir::graph::Graph;
use crate::ir::node::NodeId;

// =============================================================================
// Simplifier callback
// =============================================================================

/// Receiver for re-examination notifications emitted while control flow
/// is killed: when a merge is about to be reduced, the usages of its phis
/// are reported so the calling pass can revisit them.
pub trait SimplifierTool {
    fn add_to_work_list(&mut self, node: NodeId);
}

/// Callback that drops all notifications.
pub struct NoSimplifier;

impl SimplifierTool for NoSimplifier {
    fn add_to_work_list(&mut self, _node: NodeId) {}
}

/// Callback that collects notified nodes for the caller to drain.
#[derive(Debug, Default)]
pub struct WorkListSimplifier {
    pub work_list: Vec<NodeId>,
}

impl SimplifierTool for WorkListSimplifier {
    fn add_to_work_list(&mut self, node: NodeId) {
        self.work_list.push(node);
    }
}

// =============================================================================
// Pass trait
// =============================================================================

/// A single maintenance pass over the graph.
pub trait OptimizationPass {
    /// The name of this pass (for debugging/logging).
    fn name(&self) -> &'static str;

    /// Run the pass. Returns true if the graph was modified.
    fn run(&mut self, graph: &mut Graph) -> bool;
}

// =============================================================================
// Cleanup entry point
// =============================================================================

/// Configuration for [`cleanup`].
#[derive(Debug, Clone)]
pub struct CleanupConfig {
    /// Reduce degenerate loop headers.
    pub normalize_loops: bool,
    /// Check graph consistency after the passes ran. A violation is a
    /// fatal programming error.
    pub verify: bool,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        CleanupConfig {
            normalize_loops: true,
            verify: cfg!(debug_assertions),
        }
    }
}

/// Statistics from a [`cleanup`] run.
#[derive(Debug, Clone, Default)]
pub struct CleanupStats {
    /// Live nodes before the run.
    pub live_before: usize,
    /// Live nodes after the run.
    pub live_after: usize,
    /// Whether a degenerate loop was removed.
    pub loop_removed: bool,
}

/// Whole-graph cleanup after a pass that may have produced degenerate
/// loops or trivial merges.
pub fn cleanup(graph: &mut Graph, config: &CleanupConfig) -> CleanupStats {
    let mut stats = CleanupStats {
        live_before: graph.live_count(),
        ..CleanupStats::default()
    };

    if config.normalize_loops {
        stats.loop_removed = normalize_loops(graph);
    }
    if config.verify {
        if let Err(err) = graph.verify() {
            panic!("graph inconsistent after cleanup: {err}");
        }
    }

    stats.live_after = graph.live_count();
    stats
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_normalizes() {
        let config = CleanupConfig::default();
        assert!(config.normalize_loops);
    }

    #[test]
    fn cleanup_empty_graph() {
        let mut graph = Graph::new();
        let stats = cleanup(&mut graph, &CleanupConfig::default());
        assert_eq!(stats.live_before, stats.live_after);
        assert!(!stats.loop_removed);
    }

    #[test]
    fn work_list_simplifier_collects() {
        let mut tool = WorkListSimplifier::default();
        tool.add_to_work_list(NodeId::new(3));
        tool.add_to_work_list(NodeId::new(5));
        assert_eq!(tool.work_list, vec![NodeId::new(3), NodeId::new(5)]);
    }
}
