//! Graph structure and edge maintenance.
//!
//! The graph owns every node of one compilation unit and is the only
//! place edges are mutated. Each mutation keeps the two edge relations
//! symmetric at all times:
//!
//! - data edges: `user.inputs` contains `def` iff `usages(def)` contains
//!   `user`, once per slot;
//! - control edges: `pred.successors` contains `node` iff
//!   `node.predecessor == pred`.
//!
//! Merges are entered through their end lists instead of a predecessor,
//! and phis/proxies/exits are reachable from their owning merge or exit.
//! [`Graph::verify`] checks all of it.
//!
//! Preconditions documented as "must" are programming-error assertions:
//! violating one panics, there is no recovery path.

use rustc_hash::FxHashMap;
use tracing::debug;

use super::arena::{Arena, SecondaryMap};
use super::node::{
    EdgeList, LoopData, MergeData, Node, NodeFlags, NodeId, NodeKind, SingleValue, ValueOp,
    UNKNOWN_BCI,
};

// =============================================================================
// Errors
// =============================================================================

/// Consistency violation reported by [`Graph::verify`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("usage edge {user} -> {def} has no matching input slot")]
    AsymmetricUsage { def: NodeId, user: NodeId },

    #[error("input slot {user} -> {def} has no matching usage entry")]
    AsymmetricInput { def: NodeId, user: NodeId },

    #[error("control link {pred} -> {succ} is not mutual")]
    BrokenControlLink { pred: NodeId, succ: NodeId },

    #[error("live node {node} references dead node {referenced}")]
    DeadReference { node: NodeId, referenced: NodeId },

    #[error("{phi} has {slots} value slots but its merge {merge} has {edges} incoming edges")]
    PhiArityMismatch {
        phi: NodeId,
        merge: NodeId,
        slots: usize,
        edges: usize,
    },

    #[error("{node} is not registered with its owner {owner}")]
    UnregisteredMember { node: NodeId, owner: NodeId },
}

// =============================================================================
// Graph
// =============================================================================

/// Owner of all nodes for one compilation unit.
pub struct Graph {
    nodes: Arena<Node>,
    /// Usage multiset: one entry per input slot referencing the node.
    usages: SecondaryMap<Node, Vec<NodeId>>,
    /// Control entry.
    pub start: NodeId,
    /// Bytecode offset stamped on newly created nodes.
    current_bc: u32,
}

impl Graph {
    pub fn new() -> Self {
        let mut nodes = Arena::with_capacity(64);
        let start = nodes.alloc(Node::new(NodeKind::Start, EdgeList::new()));
        Graph {
            nodes,
            usages: SecondaryMap::new(),
            start,
            current_bc: UNKNOWN_BCI,
        }
    }

    // =========================================================================
    // Node access
    // =========================================================================

    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    #[inline]
    pub fn is_alive(&self, id: NodeId) -> bool {
        self.nodes[id].is_alive()
    }

    /// Total slots ever allocated, dead ones included.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn live_count(&self) -> usize {
        self.nodes.iter().filter(|(_, n)| n.is_alive()).count()
    }

    /// All live nodes in allocation order.
    pub fn live_nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().filter(|(_, n)| n.is_alive())
    }

    /// Snapshot of the live loop-begins.
    pub fn loop_begins(&self) -> Vec<NodeId> {
        self.live_nodes()
            .filter(|(_, n)| matches!(n.kind, NodeKind::LoopBegin(..)))
            .map(|(id, _)| id)
            .collect()
    }

    /// Snapshot of the live phis.
    pub fn phis(&self) -> Vec<NodeId> {
        self.live_nodes()
            .filter(|(_, n)| n.is_phi())
            .map(|(id, _)| id)
            .collect()
    }

    // =========================================================================
    // Node creation
    // =========================================================================

    /// Bytecode offset stamped on nodes created from here on.
    pub fn set_bc(&mut self, bc: u32) {
        self.current_bc = bc;
    }

    fn add_node(&mut self, kind: NodeKind, inputs: EdgeList) -> NodeId {
        let mut node = Node::new(kind, inputs.clone());
        node.bc = self.current_bc;
        let id = self.nodes.alloc(node);
        for input in inputs.into_iter().filter(|i| i.is_valid()) {
            self.add_usage(input, id);
        }
        id
    }

    pub fn add_const_int(&mut self, value: i64) -> NodeId {
        self.add_node(NodeKind::Value(ValueOp::ConstInt(value)), EdgeList::new())
    }

    pub fn add_const_bool(&mut self, value: bool) -> NodeId {
        self.add_node(NodeKind::Value(ValueOp::ConstBool(value)), EdgeList::new())
    }

    pub fn add_parameter(&mut self, index: u16) -> NodeId {
        self.add_node(NodeKind::Value(ValueOp::Parameter(index)), EdgeList::new())
    }

    pub fn add_binary(&mut self, op: super::node::BinOp, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.add_node(
            NodeKind::Value(ValueOp::Binary(op)),
            EdgeList::from_slice(&[lhs, rhs]),
        )
    }

    pub fn add_begin(&mut self) -> NodeId {
        self.add_node(NodeKind::Begin, EdgeList::new())
    }

    pub fn add_if(&mut self, condition: NodeId) -> NodeId {
        self.add_node(NodeKind::If, EdgeList::from_slice(&[condition]))
    }

    /// `value` may be `INVALID` for a void return.
    pub fn add_return(&mut self, value: NodeId) -> NodeId {
        self.add_node(NodeKind::Return, EdgeList::from_slice(&[value]))
    }

    pub fn add_end(&mut self) -> NodeId {
        self.add_node(
            NodeKind::End {
                merge: NodeId::INVALID,
            },
            EdgeList::new(),
        )
    }

    /// Create a merge over the given forward ends. The ends must not yet
    /// belong to another merge.
    pub fn add_merge(&mut self, ends: &[NodeId]) -> NodeId {
        let merge = self.add_node(
            NodeKind::Merge(MergeData {
                ends: ends.to_vec(),
                phis: Vec::new(),
            }),
            EdgeList::new(),
        );
        for &end in ends {
            self.attach_end(end, merge);
        }
        merge
    }

    /// Create a loop header entered through `forward_end`. Back edges are
    /// registered afterwards with [`Graph::add_loop_end`].
    pub fn add_loop_begin(&mut self, forward_end: NodeId) -> NodeId {
        let begin = self.add_node(
            NodeKind::LoopBegin(
                MergeData {
                    ends: vec![forward_end],
                    phis: Vec::new(),
                },
                LoopData::default(),
            ),
            EdgeList::new(),
        );
        self.attach_end(forward_end, begin);
        begin
    }

    fn attach_end(&mut self, end: NodeId, merge: NodeId) {
        match &mut self.nodes[end].kind {
            NodeKind::End { merge: slot } if !slot.is_valid() => *slot = merge,
            _ => panic!("{end} cannot be attached to {merge}"),
        }
    }

    /// Register an additional forward end. Must happen before phis are
    /// created, so value slots stay aligned with edge order.
    pub fn add_forward_end(&mut self, merge: NodeId, end: NodeId) {
        let m = self.nodes[merge]
            .kind
            .merge_data_mut()
            .expect("not a merge");
        debug_assert!(m.phis.is_empty(), "ends must be added before phis");
        m.ends.push(end);
        self.attach_end(end, merge);
    }

    /// Create a back edge into `begin`. Must happen before phis are
    /// created.
    pub fn add_loop_end(&mut self, begin: NodeId) -> NodeId {
        let end = self.add_node(NodeKind::LoopEnd { begin }, EdgeList::new());
        match &mut self.nodes[begin].kind {
            NodeKind::LoopBegin(m, l) => {
                debug_assert!(m.phis.is_empty(), "ends must be added before phis");
                l.loop_ends.push(end);
            }
            _ => panic!("{begin} is not a loop begin"),
        }
        end
    }

    /// Create an exit point for `begin`.
    pub fn add_loop_exit(&mut self, begin: NodeId) -> NodeId {
        let exit = self.add_node(
            NodeKind::LoopExit {
                begin,
                proxies: Vec::new(),
            },
            EdgeList::new(),
        );
        match &mut self.nodes[begin].kind {
            NodeKind::LoopBegin(_, l) => l.exits.push(exit),
            _ => panic!("{begin} is not a loop begin"),
        }
        exit
    }

    /// Create a phi at `merge` with one value slot per incoming edge, in
    /// edge order. Slots may be `INVALID` placeholders filled in later
    /// with [`Graph::set_phi_value`] (needed for loop-carried phis that
    /// reference themselves).
    pub fn add_phi(&mut self, merge: NodeId, values: &[NodeId]) -> NodeId {
        assert_eq!(
            values.len(),
            self.edge_count(merge),
            "one phi slot per incoming edge of {merge}"
        );
        let phi = self.add_node(
            NodeKind::Phi { merge },
            EdgeList::from_slice(values),
        );
        self.nodes[merge]
            .kind
            .merge_data_mut()
            .expect("not a merge")
            .phis
            .push(phi);
        phi
    }

    /// Fill a placeholder phi slot.
    pub fn set_phi_value(&mut self, phi: NodeId, index: usize, value: NodeId) {
        debug_assert!(self.nodes[phi].is_phi());
        assert!(
            !self.nodes[phi].inputs[index].is_valid(),
            "slot {index} of {phi} already set"
        );
        self.nodes[phi].inputs[index] = value;
        self.add_usage(value, phi);
    }

    /// Wrap `value` as crossing `exit`.
    pub fn add_proxy(&mut self, exit: NodeId, value: NodeId) -> NodeId {
        let proxy = self.add_node(NodeKind::Proxy { exit }, EdgeList::from_slice(&[value]));
        match &mut self.nodes[exit].kind {
            NodeKind::LoopExit { proxies, .. } => proxies.push(proxy),
            _ => panic!("{exit} is not a loop exit"),
        }
        proxy
    }

    /// Record the header state of a loop: the values live at the header
    /// that proxy simplification scans. One-shot.
    pub fn set_loop_state(&mut self, begin: NodeId, values: &[NodeId]) {
        assert!(
            matches!(self.nodes[begin].kind, NodeKind::LoopBegin(..)),
            "{begin} is not a loop begin"
        );
        assert!(self.nodes[begin].inputs.is_empty(), "state already set");
        self.nodes[begin].inputs = EdgeList::from_slice(values);
        for &v in values.iter().filter(|v| v.is_valid()) {
            self.add_usage(v, begin);
        }
    }

    // =========================================================================
    // Usage edges
    // =========================================================================

    /// Nodes using `id`, one entry per input slot.
    pub fn usages(&self, id: NodeId) -> &[NodeId] {
        self.usages.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    #[inline]
    pub fn has_no_usages(&self, id: NodeId) -> bool {
        self.usages(id).is_empty()
    }

    fn add_usage(&mut self, def: NodeId, user: NodeId) {
        self.usages.entry(def).push(user);
    }

    pub(crate) fn remove_usage(&mut self, def: NodeId, user: NodeId) {
        let list = self.usages.entry(def);
        let pos = list
            .iter()
            .position(|&u| u == user)
            .unwrap_or_else(|| panic!("no usage edge {user} -> {def}"));
        list.swap_remove(pos);
    }

    // =========================================================================
    // Data edge mutation
    // =========================================================================

    /// Replace the first input slot of `user` equal to `old` with `new`
    /// (`INVALID` clears the slot). The slot must exist.
    pub fn replace_first_input(&mut self, user: NodeId, old: NodeId, new: NodeId) {
        let pos = self.nodes[user]
            .inputs
            .iter()
            .position(|&i| i == old)
            .unwrap_or_else(|| panic!("{old} is not an input of {user}"));
        self.nodes[user].inputs[pos] = new;
        self.remove_usage(old, user);
        if new.is_valid() {
            self.add_usage(new, user);
        }
    }

    /// Rewire every usage of `old` to `new` (`INVALID` clears the slots)
    /// and leave `old` unused.
    pub fn replace_at_usages(&mut self, old: NodeId, new: NodeId) {
        debug_assert_ne!(old, new);
        let users = std::mem::take(self.usages.entry(old));
        for &user in &users {
            let pos = self.nodes[user]
                .inputs
                .iter()
                .position(|&i| i == old)
                .unwrap_or_else(|| panic!("usage edge {user} -> {old} without input slot"));
            self.nodes[user].inputs[pos] = new;
            if new.is_valid() {
                self.add_usage(new, user);
            }
        }
    }

    // =========================================================================
    // Control edge mutation
    // =========================================================================

    fn link_predecessor(&mut self, pred: NodeId, succ: NodeId) {
        assert!(
            succ.is_valid() && self.nodes[succ].is_fixed() && !self.nodes[succ].kind.is_merge(),
            "{succ} cannot take a control predecessor"
        );
        assert!(
            !self.nodes[succ].predecessor.is_valid(),
            "{succ} already has a predecessor"
        );
        self.nodes[succ].predecessor = pred;
    }

    /// Fill successor slot `index` of `pred` with `succ`.
    pub fn set_successor(&mut self, pred: NodeId, index: usize, succ: NodeId) {
        assert!(
            !self.nodes[pred].successors[index].is_valid(),
            "successor slot {index} of {pred} is occupied"
        );
        self.link_predecessor(pred, succ);
        self.nodes[pred].successors[index] = succ;
    }

    /// Link the single successor of a sequential control node.
    pub fn set_next(&mut self, pred: NodeId, succ: NodeId) {
        debug_assert_eq!(self.nodes[pred].successors.len(), 1);
        self.set_successor(pred, 0, succ);
    }

    /// Link both targets of an `If`.
    pub fn set_branches(&mut self, cond: NodeId, true_target: NodeId, false_target: NodeId) {
        self.set_successor(cond, 0, true_target);
        self.set_successor(cond, 1, false_target);
    }

    /// Clear successor slot `index` of `pred`, unlinking the successor's
    /// predecessor edge.
    pub fn disconnect_successor(&mut self, pred: NodeId, index: usize) {
        let succ = self.nodes[pred].successors[index];
        debug_assert!(succ.is_valid());
        self.nodes[pred].successors[index] = NodeId::INVALID;
        self.nodes[succ].predecessor = NodeId::INVALID;
    }

    /// Swap `old` for `new` in the successor slot of `pred` holding it
    /// (`INVALID` clears the slot). `old` must be a successor of `pred`.
    pub fn replace_first_successor(&mut self, pred: NodeId, old: NodeId, new: NodeId) {
        let pos = self.nodes[pred]
            .successors
            .iter()
            .position(|&s| s == old)
            .unwrap_or_else(|| panic!("{old} is not a successor of {pred}"));
        self.nodes[old].predecessor = NodeId::INVALID;
        if new.is_valid() {
            self.link_predecessor(pred, new);
        }
        self.nodes[pred].successors[pos] = new;
    }

    /// Detach `node` from its predecessor, putting `replacement` in the
    /// vacated slot (`INVALID` leaves it empty). No-op for nodes without
    /// a predecessor.
    pub fn replace_at_predecessor(&mut self, node: NodeId, replacement: NodeId) {
        let pred = self.nodes[node].predecessor;
        if pred.is_valid() {
            self.replace_first_successor(pred, node, replacement);
        }
    }

    /// Give `new` the control position of `old` (predecessor and single
    /// successor). `old` is left fully detached; deleting it is the
    /// caller's business.
    pub fn replace_fixed_with_fixed(&mut self, old: NodeId, new: NodeId) {
        debug_assert_eq!(self.nodes[old].successors.len(), 1);
        debug_assert_eq!(self.nodes[new].successors.len(), 1);
        let next = self.nodes[old].successors[0];
        if next.is_valid() {
            self.disconnect_successor(old, 0);
            self.set_successor(new, 0, next);
        }
        self.replace_at_predecessor(old, new);
    }

    // =========================================================================
    // Merge structure
    // =========================================================================

    pub fn merge_ends(&self, merge: NodeId) -> &[NodeId] {
        self.nodes[merge]
            .kind
            .merge_data()
            .map(|m| m.ends.as_slice())
            .unwrap_or(&[])
    }

    pub fn merge_phis(&self, merge: NodeId) -> &[NodeId] {
        self.nodes[merge]
            .kind
            .merge_data()
            .map(|m| m.phis.as_slice())
            .unwrap_or(&[])
    }

    pub fn loop_ends(&self, begin: NodeId) -> &[NodeId] {
        self.nodes[begin]
            .kind
            .loop_data()
            .map(|l| l.loop_ends.as_slice())
            .unwrap_or(&[])
    }

    pub fn loop_exits(&self, begin: NodeId) -> &[NodeId] {
        self.nodes[begin]
            .kind
            .loop_data()
            .map(|l| l.exits.as_slice())
            .unwrap_or(&[])
    }

    pub fn proxies(&self, exit: NodeId) -> &[NodeId] {
        match &self.nodes[exit].kind {
            NodeKind::LoopExit { proxies, .. } => proxies.as_slice(),
            _ => &[],
        }
    }

    /// Incoming control edges of a merge: forward ends plus back edges.
    pub fn edge_count(&self, merge: NodeId) -> usize {
        self.merge_ends(merge).len() + self.loop_ends(merge).len()
    }

    pub fn forward_end_count(&self, merge: NodeId) -> usize {
        self.merge_ends(merge).len()
    }

    /// Phi slot index of an incoming edge: forward ends first, then back
    /// edges, both in list order.
    fn phi_index_of_end(&self, merge: NodeId, end: NodeId) -> Option<usize> {
        let ends = self.merge_ends(merge);
        if let Some(pos) = ends.iter().position(|&e| e == end) {
            return Some(pos);
        }
        self.loop_ends(merge)
            .iter()
            .position(|&e| e == end)
            .map(|pos| ends.len() + pos)
    }

    /// Detach `end` from `merge`, dropping the corresponding value slot
    /// of every phi. `end` must belong to `merge`.
    pub fn remove_end(&mut self, merge: NodeId, end: NodeId) {
        let index = self
            .phi_index_of_end(merge, end)
            .unwrap_or_else(|| panic!("{end} does not belong to {merge}"));

        let is_forward = matches!(self.nodes[end].kind, NodeKind::End { .. });
        match &mut self.nodes[merge].kind {
            NodeKind::Merge(m) => {
                m.ends.retain(|&e| e != end);
            }
            NodeKind::LoopBegin(m, l) => {
                if is_forward {
                    m.ends.retain(|&e| e != end);
                } else {
                    l.loop_ends.retain(|&e| e != end);
                }
            }
            _ => panic!("{merge} is not a merge"),
        }
        match &mut self.nodes[end].kind {
            NodeKind::End { merge: slot } => *slot = NodeId::INVALID,
            NodeKind::LoopEnd { begin } => *begin = NodeId::INVALID,
            _ => unreachable!(),
        }

        let phis = self.merge_phis(merge).to_vec();
        for phi in phis {
            let slot = self.nodes[phi].inputs.remove(index);
            if slot.is_valid() {
                self.remove_usage(slot, phi);
            }
        }
    }

    /// True if `value` is a phi defined at `merge`.
    pub fn is_phi_at_merge(&self, value: NodeId, merge: NodeId) -> bool {
        value.is_valid()
            && self.nodes[value].is_alive()
            && matches!(self.nodes[value].kind, NodeKind::Phi { merge: m } if m == merge)
    }

    /// Value slot of `phi` for edge `index`.
    pub fn phi_value_at(&self, phi: NodeId, index: usize) -> NodeId {
        debug_assert!(self.nodes[phi].is_phi());
        self.nodes[phi].inputs[index]
    }

    /// Whether any value slot of `phi` still holds a node.
    pub fn phi_has_valid_input(&self, phi: NodeId) -> bool {
        self.nodes[phi].inputs.iter().any(|i| i.is_valid())
    }

    /// The statically-determined value of `phi`, if any. Self-references
    /// and cleared slots select nothing.
    pub fn phi_single_value(&self, phi: NodeId) -> SingleValue {
        debug_assert!(self.nodes[phi].is_phi());
        let mut single = SingleValue::None;
        for slot in self.nodes[phi].valid_inputs() {
            if slot == phi {
                continue;
            }
            match single {
                SingleValue::None => single = SingleValue::Unique(slot),
                SingleValue::Unique(v) if v != slot => return SingleValue::Multiple,
                _ => {}
            }
        }
        single
    }

    // =========================================================================
    // Deletion
    // =========================================================================

    /// Delete a node that is no longer referenced: no usages, no control
    /// predecessor, no live successors. Input usage edges are severed;
    /// ownership lists (merge phis, exit proxies, loop exits) are updated.
    pub fn safe_delete(&mut self, id: NodeId) {
        let node = &self.nodes[id];
        assert!(node.is_alive(), "deleting dead node {id}");
        assert!(
            self.has_no_usages(id),
            "deleting {id} while it still has usages"
        );
        assert!(
            !node.predecessor.is_valid(),
            "deleting {id} while linked to predecessor {}",
            node.predecessor
        );
        debug_assert!(
            node.successors.iter().all(|s| !s.is_valid()),
            "deleting {id} with live successors"
        );

        let inputs: EdgeList = node.inputs.clone();
        for input in inputs.into_iter().filter(|i| i.is_valid()) {
            if self.nodes[input].is_alive() {
                self.remove_usage(input, id);
            }
        }
        self.unlink_owner(id);
        self.nodes[id].flags.insert(NodeFlags::DEAD);
    }

    /// Mark a node dead without edge checks; the kill cascade severs the
    /// remaining edges itself.
    pub(crate) fn mark_deleted(&mut self, id: NodeId) {
        debug_assert!(self.nodes[id].is_alive());
        self.unlink_owner(id);
        self.nodes[id].flags.insert(NodeFlags::DEAD);
    }

    /// Remove a dying node from the list of whatever owns it.
    fn unlink_owner(&mut self, id: NodeId) {
        enum Owner {
            MergeOfPhi(NodeId),
            ExitOfProxy(NodeId),
            BeginOfExit(NodeId),
        }
        let owner = match &self.nodes[id].kind {
            NodeKind::Phi { merge } => Owner::MergeOfPhi(*merge),
            NodeKind::Proxy { exit } => Owner::ExitOfProxy(*exit),
            NodeKind::LoopExit { begin, .. } => Owner::BeginOfExit(*begin),
            NodeKind::End { merge } => {
                debug_assert!(
                    !merge.is_valid(),
                    "{id} deleted while still attached to {merge}"
                );
                return;
            }
            NodeKind::LoopEnd { begin } => {
                debug_assert!(
                    !begin.is_valid(),
                    "{id} deleted while still attached to {begin}"
                );
                return;
            }
            _ => return,
        };
        match owner {
            Owner::MergeOfPhi(merge) => {
                if merge.is_valid() && self.nodes[merge].is_alive() {
                    if let Some(m) = self.nodes[merge].kind.merge_data_mut() {
                        m.phis.retain(|&p| p != id);
                    }
                }
            }
            Owner::ExitOfProxy(exit) => {
                if exit.is_valid() && self.nodes[exit].is_alive() {
                    if let NodeKind::LoopExit { proxies, .. } = &mut self.nodes[exit].kind {
                        proxies.retain(|&p| p != id);
                    }
                }
            }
            Owner::BeginOfExit(begin) => {
                if begin.is_valid() && self.nodes[begin].is_alive() {
                    if let NodeKind::LoopBegin(_, l) = &mut self.nodes[begin].kind {
                        l.exits.retain(|&e| e != id);
                    }
                }
            }
        }
    }

    /// Clear the back-references of everything still pointing at a dying
    /// merge: its ends, back edges, and exits survive it structurally and
    /// are torn down by control-flow kill on their own paths.
    pub(crate) fn orphan_merge_edges(&mut self, merge: NodeId) {
        let Some(m) = self.nodes[merge].kind.merge_data() else {
            return;
        };
        let mut attached: Vec<NodeId> = m.ends.clone();
        if let Some(l) = self.nodes[merge].kind.loop_data() {
            attached.extend_from_slice(&l.loop_ends);
            attached.extend_from_slice(&l.exits);
        }
        for node in attached {
            if !self.nodes[node].is_alive() {
                continue;
            }
            match &mut self.nodes[node].kind {
                NodeKind::End { merge: slot } => *slot = NodeId::INVALID,
                NodeKind::LoopEnd { begin } | NodeKind::LoopExit { begin, .. } => {
                    *begin = NodeId::INVALID
                }
                _ => unreachable!(),
            }
        }
    }

    // =========================================================================
    // Reductions
    // =========================================================================

    /// Reduce a merge with exactly one incoming edge: each phi collapses
    /// to its single slot, the merge is spliced out of control flow, and
    /// merge and end are deleted.
    pub fn reduce_trivial_merge(&mut self, merge: NodeId) {
        assert_eq!(
            self.forward_end_count(merge),
            1,
            "{merge} still has multiple forward ends"
        );
        assert!(
            self.loop_ends(merge).is_empty(),
            "{merge} still has back edges"
        );
        debug!(%merge, "reducing trivial merge");

        for phi in self.merge_phis(merge).to_vec() {
            assert_eq!(self.nodes[phi].inputs.len(), 1);
            let value = self.nodes[phi].inputs[0];
            let replacement = if value == phi { NodeId::INVALID } else { value };
            self.replace_at_usages(phi, replacement);
            self.safe_delete(phi);
        }

        let is_loop = matches!(self.nodes[merge].kind, NodeKind::LoopBegin(..));
        let state: Vec<NodeId> = if is_loop {
            self.remove_exits(merge);
            self.nodes[merge].valid_inputs().collect()
        } else {
            Vec::new()
        };

        let end = self.merge_ends(merge)[0];
        let next = self.nodes[merge].successors[0];
        if next.is_valid() {
            self.disconnect_successor(merge, 0);
        }
        self.remove_end(merge, end);
        self.replace_at_predecessor(end, next);
        self.safe_delete(end);
        self.safe_delete(merge);

        for value in state {
            if self.nodes[value].is_alive() {
                crate::opt::kill::try_kill_unused(self, value);
            }
        }
    }

    /// Reduce a loop header that has lost all its back edges. With a
    /// single forward end the whole merge goes away; with several it is
    /// re-kinded in place to a plain merge, keeping its id stable for the
    /// phis that reference it.
    pub fn reduce_degenerate_loop_begin(&mut self, begin: NodeId) {
        assert!(
            matches!(self.nodes[begin].kind, NodeKind::LoopBegin(..)),
            "{begin} is not a loop begin"
        );
        assert!(
            self.loop_ends(begin).is_empty(),
            "{begin} still has back edges"
        );
        debug!(%begin, "reducing degenerate loop begin");

        if self.forward_end_count(begin) == 1 {
            self.reduce_trivial_merge(begin);
            return;
        }

        self.remove_exits(begin);
        let state: Vec<NodeId> = self.nodes[begin].valid_inputs().collect();
        for &value in &state {
            if self.nodes[value].is_alive() {
                self.remove_usage(value, begin);
            }
        }
        self.nodes[begin].inputs.clear();

        let kind = std::mem::replace(&mut self.nodes[begin].kind, NodeKind::Begin);
        match kind {
            NodeKind::LoopBegin(m, l) => {
                debug_assert!(l.loop_ends.is_empty() && l.exits.is_empty());
                self.nodes[begin].kind = NodeKind::Merge(m);
            }
            _ => unreachable!(),
        }

        for value in state {
            if self.nodes[value].is_alive() {
                crate::opt::kill::try_kill_unused(self, value);
            }
        }
    }

    /// Remove every exit of a loop: proxies become transparent (usages
    /// rewired to the wrapped value) and each exit is replaced in the
    /// control chain by a plain begin.
    pub fn remove_exits(&mut self, begin: NodeId) {
        for exit in self.loop_exits(begin).to_vec() {
            if !self.nodes[exit].is_alive() {
                continue;
            }
            for proxy in self.proxies(exit).to_vec() {
                if !self.nodes[proxy].is_alive() {
                    continue;
                }
                let value = self.nodes[proxy].inputs[0];
                self.replace_at_usages(proxy, value);
                self.safe_delete(proxy);
            }
            let replacement = self.add_begin();
            self.nodes[replacement].bc = self.nodes[exit].bc;
            self.replace_fixed_with_fixed(exit, replacement);
            self.safe_delete(exit);
        }
        debug_assert!(self.loop_exits(begin).is_empty());
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    /// The node followed by its control predecessors up to the entry.
    pub fn predecessor_iter(&self, start: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let mut current = start.is_valid().then_some(start);
        std::iter::from_fn(move || {
            let id = current?;
            let pred = self.nodes[id].predecessor;
            current = pred.is_valid().then_some(pred);
            Some(id)
        })
    }

    /// Nearest recorded bytecode offset at or upstream of `node`.
    pub fn approx_bc(&self, node: NodeId) -> Option<u32> {
        self.predecessor_iter(node)
            .map(|id| self.nodes[id].bc)
            .find(|&bc| bc != UNKNOWN_BCI)
    }

    // =========================================================================
    // Verification
    // =========================================================================

    /// Check edge symmetry and structural ownership over the live graph.
    pub fn verify(&self) -> Result<(), GraphError> {
        // Data edges: every input slot of a live node must be matched by
        // exactly one usage entry, and vice versa.
        let mut edges: FxHashMap<(NodeId, NodeId), isize> = FxHashMap::default();
        for (id, node) in self.live_nodes() {
            for input in node.valid_inputs() {
                if !self.nodes[input].is_alive() {
                    return Err(GraphError::DeadReference {
                        node: id,
                        referenced: input,
                    });
                }
                *edges.entry((input, id)).or_insert(0) += 1;
            }
        }
        for (id, _) in self.live_nodes() {
            for &user in self.usages(id) {
                if !self.nodes[user].is_alive() {
                    return Err(GraphError::AsymmetricUsage { def: id, user });
                }
                match edges.get_mut(&(id, user)) {
                    Some(count) if *count > 0 => *count -= 1,
                    _ => return Err(GraphError::AsymmetricUsage { def: id, user }),
                }
            }
        }
        if let Some(((def, user), _)) = edges.iter().find(|(_, &count)| count != 0) {
            return Err(GraphError::AsymmetricInput {
                def: *def,
                user: *user,
            });
        }

        // Control edges.
        for (id, node) in self.live_nodes() {
            for &succ in node.successors.iter().filter(|s| s.is_valid()) {
                if !self.nodes[succ].is_alive() {
                    return Err(GraphError::DeadReference {
                        node: id,
                        referenced: succ,
                    });
                }
                if self.nodes[succ].predecessor != id {
                    return Err(GraphError::BrokenControlLink { pred: id, succ });
                }
            }
            let pred = node.predecessor;
            if pred.is_valid() {
                let mutual = self.nodes[pred].is_alive()
                    && self.nodes[pred].successors.iter().filter(|&&s| s == id).count() == 1;
                if !mutual {
                    return Err(GraphError::BrokenControlLink { pred, succ: id });
                }
            }
        }

        // Merge structure and ownership lists.
        for (id, node) in self.live_nodes() {
            match &node.kind {
                NodeKind::Merge(_) | NodeKind::LoopBegin(..) => {
                    let edge_count = self.edge_count(id);
                    for &end in self.merge_ends(id) {
                        let attached =
                            matches!(self.nodes[end].kind, NodeKind::End { merge } if merge == id);
                        if !self.nodes[end].is_alive() || !attached {
                            return Err(GraphError::UnregisteredMember {
                                node: end,
                                owner: id,
                            });
                        }
                    }
                    for &le in self.loop_ends(id) {
                        let attached =
                            matches!(self.nodes[le].kind, NodeKind::LoopEnd { begin } if begin == id);
                        if !self.nodes[le].is_alive() || !attached {
                            return Err(GraphError::UnregisteredMember { node: le, owner: id });
                        }
                    }
                    for &phi in self.merge_phis(id) {
                        if !self.is_phi_at_merge(phi, id) {
                            return Err(GraphError::UnregisteredMember {
                                node: phi,
                                owner: id,
                            });
                        }
                        let slots = self.nodes[phi].inputs.len();
                        if slots != edge_count {
                            return Err(GraphError::PhiArityMismatch {
                                phi,
                                merge: id,
                                slots,
                                edges: edge_count,
                            });
                        }
                    }
                }
                NodeKind::Phi { merge } => {
                    let owned = merge.is_valid()
                        && self.nodes[*merge].is_alive()
                        && self.merge_phis(*merge).contains(&id);
                    if !owned {
                        return Err(GraphError::UnregisteredMember {
                            node: id,
                            owner: *merge,
                        });
                    }
                }
                NodeKind::Proxy { exit } => {
                    let owned = exit.is_valid()
                        && self.nodes[*exit].is_alive()
                        && self.proxies(*exit).contains(&id);
                    if !owned {
                        return Err(GraphError::UnregisteredMember {
                            node: id,
                            owner: *exit,
                        });
                    }
                }
                _ => {}
            }
        }

        Ok(())
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Graph ({} live / {} total):", self.live_count(), self.len())?;
        for (id, node) in self.live_nodes() {
            writeln!(f, "  {id}: {:?} {:?}", node.kind, node.inputs)?;
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
