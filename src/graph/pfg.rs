// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! `PointerFlowGraph` (spec.md §4.4). A directed multigraph over `Pointer`s with
//! deduplicated edges and a monotone inclusion invariant: once `p -> q` exists it is
//! never removed, so `pt(q)` only ever grows to match `pt(p)`.
//!
//! Per spec.md §4.7/§9, the taint engine's `InfoFlowGraph` needs exactly this same
//! shape -- a deduplicated directed graph used only for edge membership and successor
//! iteration -- so `FlowGraph<N>` is generic over its node type and both `Pfg` and
//! `Ifg` (in `taint`) are thin aliases over it, rather than a node-metadata-carrying
//! graph this crate has no use for.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// A deduplicated directed graph whose only operations are "add an edge, telling the
/// caller whether it was new" and "iterate successors". `N` is `Pointer` for the PFG and
/// `Pointer` again (but routed through a separate instance) for the IFG.
#[derive(Debug)]
pub struct FlowGraph<N: Copy + Eq + Hash> {
    succs: HashMap<N, HashSet<N>>,
}

impl<N: Copy + Eq + Hash> FlowGraph<N> {
    pub fn new() -> Self {
        FlowGraph { succs: HashMap::new() }
    }

    /// Adds an edge `src -> dst`. Returns `true` iff the edge did not already exist.
    /// Self-loops are permitted and are simply no-ops on every later propagation, since
    /// they never add anything to `pt(src)` that wasn't already there.
    pub fn add_edge(&mut self, src: N, dst: N) -> bool {
        self.succs.entry(src).or_default().insert(dst)
    }

    pub fn succs(&self, src: N) -> impl Iterator<Item = N> + '_ {
        self.succs.get(&src).into_iter().flatten().copied()
    }

    pub fn has_edge(&self, src: N, dst: N) -> bool {
        self.succs.get(&src).map_or(false, |s| s.contains(&dst))
    }
}

impl<N: Copy + Eq + Hash> Default for FlowGraph<N> {
    fn default() -> Self {
        Self::new()
    }
}

pub type Pfg = FlowGraph<crate::cs::Pointer>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cs::{CSVarId, Pointer};

    #[test]
    fn duplicate_edges_are_not_new() {
        let mut g: FlowGraph<Pointer> = FlowGraph::new();
        let a = Pointer::Var(CSVarId::new(0));
        let b = Pointer::Var(CSVarId::new(1));
        assert!(g.add_edge(a, b));
        assert!(!g.add_edge(a, b));
        assert_eq!(g.succs(a).collect::<Vec<_>>(), vec![b]);
    }

    #[test]
    fn self_loop_is_a_harmless_no_op_edge() {
        let mut g: FlowGraph<Pointer> = FlowGraph::new();
        let a = Pointer::Var(CSVarId::new(0));
        assert!(g.add_edge(a, a));
        assert_eq!(g.succs(a).collect::<Vec<_>>(), vec![a]);
    }
}
