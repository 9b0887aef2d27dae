//! IR node definitions.
//!
//! Both data flow and control flow are edges between nodes:
//!
//! - **Fixed nodes** occupy a position in control flow. Each has one
//!   predecessor and a fixed number of positional successor slots.
//! - **Floating nodes** ([`NodeKind::Value`], [`NodeKind::Phi`],
//!   [`NodeKind::Proxy`]) have no control position and stay alive only
//!   while used.
//! - **Merges** aggregate incoming control through their forward-end list
//!   rather than a predecessor; a loop-begin additionally aggregates
//!   loop-end back edges and owns its loop-exits.
//!
//! Structural behavior dispatches exhaustively on [`NodeKind`]; the
//! kill/simplify rules in `crate::opt` match on it directly.

use smallvec::SmallVec;

use super::arena::Id;

/// Unique identifier for a node in the graph.
pub type NodeId = Id<Node>;

/// Ordered edge-slot list. Most nodes carry at most two edges inline.
pub type EdgeList = SmallVec<[NodeId; 2]>;

/// Bytecode offset meaning "no position recorded".
pub const UNKNOWN_BCI: u32 = u32::MAX;

// =============================================================================
// Node Kinds
// =============================================================================

/// Payload shared by merges and loop-begins.
#[derive(Debug, Clone, Default)]
pub struct MergeData {
    /// Incoming forward ends, in edge order.
    pub ends: Vec<NodeId>,
    /// Phis defined at this merge.
    pub phis: Vec<NodeId>,
}

/// Loop-begin payload beyond the plain merge part.
#[derive(Debug, Clone, Default)]
pub struct LoopData {
    /// Back edges, ordered after the forward ends for phi slot purposes.
    pub loop_ends: Vec<NodeId>,
    /// Exit points of this loop.
    pub exits: Vec<NodeId>,
}

/// Floating data operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueOp {
    ConstInt(i64),
    ConstBool(bool),
    Parameter(u16),
    Binary(BinOp),
}

/// Binary arithmetic operator for [`ValueOp::Binary`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
}

/// Closed variant set for every node in the graph.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Control entry. One successor, never a predecessor.
    Start,
    /// Plain sequential control node.
    Begin,
    /// Two-way control split; condition is input 0, successors are
    /// `[true_target, false_target]`.
    If,
    /// Control sink; optional return value is input 0.
    Return,
    /// Forward control edge terminating into a merge.
    End {
        /// The merge this end feeds, `INVALID` while unattached.
        merge: NodeId,
    },
    /// Back edge terminating into a loop-begin.
    LoopEnd { begin: NodeId },
    /// Exit edge of a loop; owns the proxies crossing it.
    LoopExit { begin: NodeId, proxies: Vec<NodeId> },
    /// Control join over two or more forward ends.
    Merge(MergeData),
    /// Merge that additionally aggregates back edges. Its inputs are the
    /// header-state values consulted by proxy simplification.
    LoopBegin(MergeData, LoopData),
    /// Value selector at a merge; value slots are the node's inputs, one
    /// per incoming edge of the merge, in edge order.
    Phi { merge: NodeId },
    /// Wrapper marking a value that crosses a loop-exit boundary; the
    /// wrapped value is input 0.
    Proxy { exit: NodeId },
    /// Floating data computation.
    Value(ValueOp),
}

impl NodeKind {
    /// Fixed nodes occupy a control-flow position.
    #[inline]
    pub fn is_fixed(&self) -> bool {
        !self.is_floating()
    }

    /// Floating nodes are data-only and die when unused.
    #[inline]
    pub fn is_floating(&self) -> bool {
        matches!(
            self,
            NodeKind::Phi { .. } | NodeKind::Proxy { .. } | NodeKind::Value(_)
        )
    }

    /// Ends terminate a control path into a merge: forward ends and
    /// loop-end back edges alike.
    #[inline]
    pub fn is_end(&self) -> bool {
        matches!(self, NodeKind::End { .. } | NodeKind::LoopEnd { .. })
    }

    #[inline]
    pub fn is_merge(&self) -> bool {
        matches!(self, NodeKind::Merge(_) | NodeKind::LoopBegin(..))
    }

    #[inline]
    pub fn is_phi(&self) -> bool {
        matches!(self, NodeKind::Phi { .. })
    }

    #[inline]
    pub fn is_proxy(&self) -> bool {
        matches!(self, NodeKind::Proxy { .. })
    }

    /// Number of positional successor slots this kind carries.
    pub fn successor_slots(&self) -> usize {
        match self {
            NodeKind::If => 2,
            NodeKind::Start
            | NodeKind::Begin
            | NodeKind::LoopExit { .. }
            | NodeKind::Merge(_)
            | NodeKind::LoopBegin(..) => 1,
            NodeKind::Return
            | NodeKind::End { .. }
            | NodeKind::LoopEnd { .. }
            | NodeKind::Phi { .. }
            | NodeKind::Proxy { .. }
            | NodeKind::Value(_) => 0,
        }
    }

    /// Shared view of the merge payload for both merge kinds.
    #[inline]
    pub fn merge_data(&self) -> Option<&MergeData> {
        match self {
            NodeKind::Merge(m) | NodeKind::LoopBegin(m, _) => Some(m),
            _ => None,
        }
    }

    #[inline]
    pub fn merge_data_mut(&mut self) -> Option<&mut MergeData> {
        match self {
            NodeKind::Merge(m) | NodeKind::LoopBegin(m, _) => Some(m),
            _ => None,
        }
    }

    #[inline]
    pub fn loop_data(&self) -> Option<&LoopData> {
        match self {
            NodeKind::LoopBegin(_, l) => Some(l),
            _ => None,
        }
    }
}

// =============================================================================
// Node Flags
// =============================================================================

bitflags::bitflags! {
    /// Per-node state bits.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct NodeFlags: u8 {
        /// Node has been deleted from the graph.
        const DEAD = 0b0000_0001;
    }
}

// =============================================================================
// Node
// =============================================================================

/// A single IR operation or value.
///
/// Edge symmetry is maintained by [`crate::ir::Graph`]; nothing outside
/// that type mutates edge slots directly.
#[derive(Debug, Clone)]
pub struct Node {
    /// Variant discriminator plus variant-specific payload.
    pub kind: NodeKind,

    /// Ordered data inputs; a cleared slot is `NodeId::INVALID`.
    pub inputs: EdgeList,

    /// Positional control successor slots; cleared to `INVALID`, never
    /// resized after creation.
    pub successors: EdgeList,

    /// Control parent for fixed nodes, `INVALID` otherwise.
    pub predecessor: NodeId,

    /// State bits.
    pub flags: NodeFlags,

    /// Bytecode offset for diagnostics, [`UNKNOWN_BCI`] if not recorded.
    pub bc: u32,
}

impl Node {
    /// Create a node with all successor slots cleared.
    pub fn new(kind: NodeKind, inputs: EdgeList) -> Self {
        let slots = kind.successor_slots();
        Node {
            kind,
            inputs,
            successors: (0..slots).map(|_| NodeId::INVALID).collect(),
            predecessor: NodeId::INVALID,
            flags: NodeFlags::empty(),
            bc: UNKNOWN_BCI,
        }
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        !self.flags.contains(NodeFlags::DEAD)
    }

    #[inline]
    pub fn is_fixed(&self) -> bool {
        self.kind.is_fixed()
    }

    #[inline]
    pub fn is_floating(&self) -> bool {
        self.kind.is_floating()
    }

    #[inline]
    pub fn is_phi(&self) -> bool {
        self.kind.is_phi()
    }

    #[inline]
    pub fn is_proxy(&self) -> bool {
        self.kind.is_proxy()
    }

    /// Valid (non-cleared) inputs in slot order.
    #[inline]
    pub fn valid_inputs(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.inputs.iter().copied().filter(|id| id.is_valid())
    }
}

// =============================================================================
// Phi single-value query
// =============================================================================

/// Result of asking a phi for its statically-determined value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SingleValue {
    /// Every slot is either cleared or the phi itself; the phi selects
    /// nothing.
    None,
    /// All live slots agree on one value (self-references ignored).
    Unique(NodeId),
    /// Slots disagree.
    Multiple,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_classification() {
        assert!(NodeKind::Start.is_fixed());
        assert!(NodeKind::Merge(MergeData::default()).is_merge());
        assert!(NodeKind::LoopBegin(MergeData::default(), LoopData::default()).is_merge());
        assert!(NodeKind::End {
            merge: NodeId::INVALID
        }
        .is_end());
        assert!(NodeKind::LoopEnd {
            begin: NodeId::INVALID
        }
        .is_end());
        assert!(NodeKind::Phi {
            merge: NodeId::INVALID
        }
        .is_floating());
        assert!(NodeKind::Value(ValueOp::ConstInt(0)).is_floating());
    }

    #[test]
    fn successor_slot_arity() {
        assert_eq!(NodeKind::If.successor_slots(), 2);
        assert_eq!(NodeKind::Begin.successor_slots(), 1);
        assert_eq!(NodeKind::Return.successor_slots(), 0);
        assert_eq!(
            NodeKind::LoopEnd {
                begin: NodeId::INVALID
            }
            .successor_slots(),
            0
        );
    }

    #[test]
    fn new_node_slots_cleared() {
        let node = Node::new(NodeKind::If, EdgeList::new());
        assert_eq!(node.successors.len(), 2);
        assert!(node.successors.iter().all(|s| !s.is_valid()));
        assert!(node.is_alive());
        assert_eq!(node.bc, UNKNOWN_BCI);
    }

    #[test]
    fn valid_inputs_skips_cleared_slots() {
        let mut node = Node::new(
            NodeKind::Phi {
                merge: NodeId::INVALID,
            },
            EdgeList::from_slice(&[NodeId::new(1), NodeId::INVALID, NodeId::new(3)]),
        );
        let live: Vec<_> = node.valid_inputs().collect();
        assert_eq!(live, vec![NodeId::new(1), NodeId::new(3)]);

        node.flags.insert(NodeFlags::DEAD);
        assert!(!node.is_alive());
    }
}
