//! IR data model.
//!
//! - **Arena** (`arena.rs`): typed-index storage, secondary maps, bit sets
//! - **Node** (`node.rs`): the closed node variant set and edge slots
//! - **Graph** (`graph.rs`): ownership, edge symmetry, merge reductions
//!
//! All edge mutation goes through [`Graph`]; nodes are addressed by
//! [`NodeId`] and never by reference, so the whole graph stays freely
//! mutable during recursive maintenance passes.

pub mod arena;
pub mod graph;
pub mod node;

pub use arena::{Arena, BitSet, Id, SecondaryMap};
pub use graph::{Graph, GraphError};
pub use node::{
    BinOp, EdgeList, LoopData, MergeData, Node, NodeFlags, NodeId, NodeKind, SingleValue, ValueOp,
    UNKNOWN_BCI,
};
