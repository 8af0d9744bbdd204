// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! `TaintEngine` (spec.md §4.7): taint propagation piggy-backs on the pointer analysis's
//! points-to sets but is kept in its own `InfoFlowGraph` so ordinary points-to
//! propagation is never contaminated by taint-only routing. Per the mutual-recursion
//! design note in spec.md §9, the engine never holds a back-pointer into the solver;
//! every operation that needs to push work takes the solver's `Worklist`/`CSManager` by
//! `&mut` reference instead, so "the taint engine pushes, the solver drains" is message
//! passing through borrowed state rather than reentrant calls.

pub mod config;

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::context::ContextId;
use crate::cs::{CSCallSiteId, CSManager, CSMethodId, CSObjId, CSVarId, Pointer};
use crate::graph::FlowGraph;
use crate::heap::Obj;
use crate::ir::{InvokeStmt, Program, Stmt, StmtId};
use crate::pts_set::{HashPointsToSet, PointsToSet};
use crate::worklist::Worklist;

pub use config::{TaintConfig, TaintConfigDoc};

pub type Ifg = FlowGraph<Pointer>;

/// One confirmed flow from a tainting call site to a sink argument (spec.md §4.7
/// `onFinish`, §6 "Taint flows (produced)"). Ordered so the result set is a
/// deterministic, totally-ordered, deduplicated `BTreeSet`.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct TaintFlow {
    pub source_call_site: StmtId,
    pub sink_call_site: StmtId,
    pub sink_arg_index: i32,
}

pub struct TaintEngine {
    config: TaintConfig,
    ifg: Ifg,
    taint_objs: HashSet<CSObjId>,
    empty_ctx: ContextId,
}

impl TaintEngine {
    pub fn new(config: TaintConfig, empty_ctx: ContextId) -> Self {
        TaintEngine {
            config,
            ifg: Ifg::new(),
            taint_objs: HashSet::new(),
            empty_ctx,
        }
    }

    pub fn is_taint(&self, obj: CSObjId) -> bool {
        self.taint_objs.contains(&obj)
    }

    /// `handleCall(baseVar?, baseObj?, csCallSite, callee)`. `base_obj` is accepted for
    /// interface symmetry with spec.md §4.6's call site but unused: call-site- and
    /// context-sensitivity of transfers/sources is already captured by `call_site`'s own
    /// context, so this crate's transfer policy doesn't need the receiver's identity.
    #[allow(clippy::too_many_arguments)]
    pub fn handle_call(
        &mut self,
        base_var: Option<CSVarId>,
        _base_obj: Option<CSObjId>,
        call_site: CSCallSiteId,
        callee: CSMethodId,
        program: &Program,
        cs_mgr: &mut CSManager,
        worklist: &mut Worklist,
        pt: &HashMap<Pointer, HashPointsToSet<CSObjId>>,
    ) {
        let cs_call_site = *cs_mgr.cs_call_site(call_site);
        let cs_method = *cs_mgr.cs_method(callee);
        let invoke = match program.stmt(cs_call_site.stmt) {
            Stmt::Invoke(invoke) => invoke.clone(),
            _ => panic!("InvariantViolation: call site stmt is not an Invoke"),
        };

        if let Some(transfers) = self.config.transfers_by_method.get(&cs_method.method).cloned() {
            for transfer in transfers {
                let from_ptr = self.resolve_endpoint(transfer.from, base_var, &invoke, cs_call_site.ctx, cs_mgr);
                let to_ptr = self.resolve_endpoint(transfer.to, base_var, &invoke, cs_call_site.ctx, cs_mgr);
                if let (Some(from_ptr), Some(to_ptr)) = (from_ptr, to_ptr) {
                    self.add_ifg_edge(from_ptr, to_ptr, worklist, pt);
                }
            }
        }

        if let Some(sources) = self.config.sources_by_method.get(&cs_method.method) {
            if let Some(lhs) = invoke.lhs {
                let lhs_ptr = Pointer::Var(cs_mgr.get_or_create_cs_var(cs_call_site.ctx, lhs));
                for source in sources {
                    let taint_obj = Obj::Taint(cs_call_site.stmt, source.ty);
                    let cs_obj = cs_mgr.get_or_create_cs_obj(self.empty_ctx, taint_obj);
                    self.taint_objs.insert(cs_obj);
                    worklist.add_entry(lhs_ptr, vec![cs_obj]);
                }
            }
        }
    }

    fn resolve_endpoint(
        &self,
        sentinel: i32,
        base_var: Option<CSVarId>,
        invoke: &InvokeStmt,
        ctx: ContextId,
        cs_mgr: &mut CSManager,
    ) -> Option<Pointer> {
        match sentinel {
            config::BASE => base_var.map(Pointer::Var),
            config::RESULT => invoke.lhs.map(|lhs| Pointer::Var(cs_mgr.get_or_create_cs_var(ctx, lhs))),
            i if i >= 0 => invoke
                .args
                .get(i as usize)
                .map(|&arg| Pointer::Var(cs_mgr.get_or_create_cs_var(ctx, arg))),
            _ => None,
        }
    }

    fn add_ifg_edge(
        &mut self,
        src: Pointer,
        dst: Pointer,
        worklist: &mut Worklist,
        pt: &HashMap<Pointer, HashPointsToSet<CSObjId>>,
    ) {
        if self.ifg.add_edge(src, dst) {
            if let Some(pts) = pt.get(&src) {
                let taint_subset: Vec<CSObjId> = pts.iter().copied().filter(|&o| self.is_taint(o)).collect();
                worklist.add_entry(dst, taint_subset);
            }
        }
    }

    /// `propagate(p, delta)`: pushes the taint-filtered subset of `delta` through every
    /// IFG successor of `p`. Called by the solver right after its own `propagate` so
    /// ordinary and taint flow share one fixed-point loop.
    pub fn propagate(&mut self, p: Pointer, delta: &[CSObjId], worklist: &mut Worklist) {
        let taint_subset: Vec<CSObjId> = delta.iter().copied().filter(|&o| self.is_taint(o)).collect();
        if taint_subset.is_empty() {
            return;
        }
        for succ in self.ifg.succs(p).collect::<Vec<_>>() {
            worklist.add_entry(succ, taint_subset.clone());
        }
    }

    /// `onFinish()`: scans every call-graph edge for a matching configured sink and
    /// reports every taint object reaching that sink's argument.
    pub fn on_finish(
        &self,
        call_graph: &crate::graph::CallGraph,
        program: &Program,
        cs_mgr: &mut CSManager,
        pt: &HashMap<Pointer, HashPointsToSet<CSObjId>>,
    ) -> BTreeSet<TaintFlow> {
        let mut flows = BTreeSet::new();
        for (call_site, _caller, callee, _kind) in call_graph.edges() {
            let cs_method = *cs_mgr.cs_method(callee);
            let sinks = match self.config.sinks_by_method.get(&cs_method.method) {
                Some(sinks) => sinks.clone(),
                None => continue,
            };
            let cs_call_site = *cs_mgr.cs_call_site(call_site);
            let invoke = match program.stmt(cs_call_site.stmt) {
                Stmt::Invoke(invoke) => invoke.clone(),
                _ => continue,
            };
            for sink in sinks {
                let arg_var = match invoke.args.get(sink.arg_index as usize) {
                    Some(&v) => v,
                    None => continue,
                };
                let arg_ptr = Pointer::Var(cs_mgr.get_or_create_cs_var(cs_call_site.ctx, arg_var));
                let pts = match pt.get(&arg_ptr) {
                    Some(pts) => pts,
                    None => continue,
                };
                for &obj in pts.iter() {
                    if !self.is_taint(obj) {
                        continue;
                    }
                    if let Obj::Taint(source_stmt, _) = cs_mgr.cs_obj(obj).obj {
                        flows.insert(TaintFlow {
                            source_call_site: source_stmt,
                            sink_call_site: cs_call_site.stmt,
                            sink_arg_index: sink.arg_index,
                        });
                    }
                }
            }
        }
        flows
    }
}
