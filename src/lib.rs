//! Sea-of-Nodes IR graph maintenance.
//!
//! This crate keeps a compiler's data-flow/control-flow graph consistent
//! while optimization passes delete, simplify, and restructure code:
//!
//! - **Kill propagation**: removing unreachable control flow takes its
//!   data dependencies, phis, and proxies with it — recursively, without
//!   ever leaving a dangling edge.
//! - **Phi/proxy simplification**: value selectors and loop-boundary
//!   wrappers whose value is statically determinable collapse onto it.
//! - **Loop normalization**: loop headers that lost their back edges are
//!   reduced to sequential control.
//! - **Original-value resolution**: read-only lookup through arbitrary
//!   phi/proxy indirection, with an exhaustive search when the linear
//!   walk is ambiguous.
//!
//! The graph engine is a library; passes that own a driver, a file
//! format, or a CLI sit on top of it. It is single-threaded by design:
//! one pass owns the [`ir::Graph`] exclusively while mutating it.
//!
//! ```
//! use coral_ir::ir::Graph;
//! use coral_ir::opt::simplify_phi;
//!
//! let mut graph = Graph::new();
//! let e1 = graph.add_end();
//! let e2 = graph.add_end();
//! let merge = graph.add_merge(&[e1, e2]);
//! let x = graph.add_const_int(42);
//! let phi = graph.add_phi(merge, &[x, x]);
//!
//! // Both slots agree, so the phi collapses onto the constant.
//! assert!(simplify_phi(&mut graph, phi));
//! assert!(!graph.is_alive(phi));
//! graph.verify().unwrap();
//! ```

#![deny(unsafe_op_in_unsafe_fn)]

pub mod ir;
pub mod opt;
