// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! `ICPSolver` (spec.md §4.8): a generic interprocedural worklist fixed-point solver
//! over an `Icfg`, parameterized by an `IcpAnalysis`. The only analysis this crate
//! ships is `transfer::ConstPropTransfer` (spec.md §4.9), but the solver itself knows
//! nothing about constant propagation -- it only calls back into `A` for every
//! node/edge transfer, exactly the split spec.md §4.8 describes.

pub mod transfer;

use std::collections::{HashMap, VecDeque};

use log::debug;

use crate::icfg::{Edge, Icfg};
use crate::ir::StmtId;

pub use transfer::{ConstPropTransfer, Value};

/// Lets a `transfer_node` implementation ask the solver to re-evaluate nodes its own
/// side effects (updating the global static/instance/array-field maps) invalidated,
/// beyond the `Icfg` successors the solver already re-enqueues on its own (spec.md
/// §4.8 "the solver also exposes `addToWorkList`/`addAllToWorkList`").
#[derive(Default)]
pub struct ExtraWork {
    pending: Vec<StmtId>,
}

impl ExtraWork {
    pub fn add_to_work_list(&mut self, node: StmtId) {
        self.pending.push(node);
    }

    pub fn add_all_to_work_list(&mut self, nodes: impl IntoIterator<Item = StmtId>) {
        self.pending.extend(nodes);
    }
}

/// The hooks spec.md §4.8 lists: `newInitialFact`, `newBoundaryFact`, `meetInto`,
/// `transferNode` (split into call/non-call in spec.md's prose, unified here behind
/// one method since `Icfg` already tags call nodes structurally) and `transferEdge`.
pub trait IcpAnalysis {
    type Fact: Clone + PartialEq;

    fn new_initial_fact(&self) -> Self::Fact;
    fn new_boundary_fact(&self, icfg: &Icfg, entry: StmtId) -> Self::Fact;
    /// Merges `from` into `target`, returning `true` iff `target` changed.
    fn meet_into(&self, from: &Self::Fact, target: &mut Self::Fact) -> bool;
    /// Returns `true` iff `out` changed.
    fn transfer_node(&mut self, icfg: &Icfg, node: StmtId, in_fact: &Self::Fact, out: &mut Self::Fact, extra: &mut ExtraWork) -> bool;
    fn transfer_edge(&self, edge: &Edge, out_of_source: &Self::Fact) -> Self::Fact;
}

pub struct Solver<'g, A: IcpAnalysis> {
    icfg: &'g Icfg,
    analysis: A,
    in_facts: HashMap<StmtId, A::Fact>,
    out_facts: HashMap<StmtId, A::Fact>,
}

impl<'g, A: IcpAnalysis> Solver<'g, A> {
    pub fn new(icfg: &'g Icfg, analysis: A) -> Self {
        Solver {
            icfg,
            analysis,
            in_facts: HashMap::new(),
            out_facts: HashMap::new(),
        }
    }

    pub fn in_fact(&self, node: StmtId) -> &A::Fact {
        &self.in_facts[&node]
    }

    pub fn out_fact(&self, node: StmtId) -> &A::Fact {
        &self.out_facts[&node]
    }

    pub fn analysis(&self) -> &A {
        &self.analysis
    }

    /// Runs the fixed-point loop to completion (spec.md §4.8 `analyze`).
    pub fn solve(&mut self) {
        let mut worklist: VecDeque<StmtId> = VecDeque::new();
        for node in self.icfg.nodes() {
            self.in_facts.insert(node, self.analysis.new_initial_fact());
            self.out_facts.insert(node, self.analysis.new_initial_fact());
            worklist.push_back(node);
        }
        let entry = self.icfg.entry_node();
        let boundary = self.analysis.new_boundary_fact(self.icfg, entry);
        self.in_facts.insert(entry, boundary.clone());
        self.out_facts.insert(entry, boundary);

        let mut in_worklist: std::collections::HashSet<StmtId> = worklist.iter().copied().collect();
        let mut extra = ExtraWork::default();
        while let Some(node) = worklist.pop_front() {
            in_worklist.remove(&node);
            let in_fact = self.compute_in(node);
            self.in_facts.insert(node, in_fact.clone());
            let mut out_fact = self.out_facts[&node].clone();
            let changed = self.analysis.transfer_node(self.icfg, node, &in_fact, &mut out_fact, &mut extra);
            if changed {
                self.out_facts.insert(node, out_fact);
                debug!("icp: node {:?} OUT changed, re-enqueueing successors", node);
                for succ in self.icfg.successors(node) {
                    if in_worklist.insert(succ) {
                        worklist.push_back(succ);
                    }
                }
            }
            for pending in extra.pending.drain(..) {
                if in_worklist.insert(pending) {
                    worklist.push_back(pending);
                }
            }
        }
    }

    /// Entry nodes keep their seeded boundary fact forever: spec.md §4.8 sets it once
    /// up front and never recomputes it from (nonexistent, for a true entry method)
    /// in-edges.
    fn compute_in(&self, node: StmtId) -> A::Fact {
        if self.icfg.is_entry_node(node) {
            return self.in_facts[&node].clone();
        }
        let mut in_fact = self.analysis.new_initial_fact();
        for edge in self.icfg.in_edges(node) {
            let src_out = &self.out_facts[&edge.source()];
            let incoming = self.analysis.transfer_edge(edge, src_out);
            self.analysis.meet_into(&incoming, &mut in_fact);
        }
        in_fact
    }
}
