// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! `CSPTASolver` (spec.md §4.6): the main Andersen-style, context-sensitive,
//! on-the-fly call graph construction algorithm. Everything else (`taint`, `icp`)
//! hangs off of the points-to sets and call graph this module builds.
//!
//! Built around an `initialize` / `propagate` / `process_call` / `analyze`
//! fixed-point loop, with a `HybridPointsToSet`/`DiffPTData`-style optimized points-to
//! representation swapped for the simpler `pts_set::HashPointsToSet` this crate's
//! program sizes don't need to optimize past.

use std::collections::HashMap;

use log::{debug, info};

use crate::context::ContextId;
use crate::cs::{
    ArrayIndexId, CSManager, CSMethod, CSMethodId, CSObjId, CSVar, CSVarId, ContextSelector, InstanceFieldId,
    Pointer,
};
use crate::graph::{CallGraph, Pfg};
use crate::heap::{HeapModel, Obj};
use crate::ir::{CallKind, ClassId, InvokeStmt, MethodId, Program, Stmt, StmtId, VarId};
use crate::pts_set::{HashPointsToSet, PointsToSet};
use crate::taint::{TaintConfig, TaintEngine, TaintFlow};
use crate::worklist::Worklist;

/// Everything produced by running the solver to its fixed point: the points-to sets,
/// the call graph, the canonicalization tables needed to decode either, and the taint
/// flows found along the way. `results::build_pointer_analysis_result` turns this into
/// the serializable, name-resolved result spec.md §6 calls for.
pub struct SolverOutput {
    pub cs_mgr: CSManager,
    pub pt: HashMap<Pointer, HashPointsToSet<CSObjId>>,
    pub pfg: Pfg,
    pub call_graph: CallGraph,
    pub taint_flows: std::collections::BTreeSet<TaintFlow>,
}

pub struct CSPTASolver<'p, S: ContextSelector, H: HeapModel> {
    program: &'p Program,
    cha: crate::ir::ClassHierarchy<'p>,
    selector: S,
    heap_model: H,
    cs_mgr: CSManager,
    pfg: Pfg,
    call_graph: CallGraph,
    worklist: Worklist,
    pt: HashMap<Pointer, HashPointsToSet<CSObjId>>,
    reachable: std::collections::HashSet<CSMethodId>,
    taint: TaintEngine,
}

impl<'p, S: ContextSelector, H: HeapModel> CSPTASolver<'p, S, H> {
    pub fn new(program: &'p Program, mut selector: S, heap_model: H, taint_config: TaintConfig) -> Self {
        let empty_ctx = selector.empty_context();
        CSPTASolver {
            program,
            cha: crate::ir::ClassHierarchy::new(program),
            selector,
            heap_model,
            cs_mgr: CSManager::new(),
            pfg: Pfg::new(),
            call_graph: CallGraph::new(),
            worklist: Worklist::new(),
            pt: HashMap::new(),
            reachable: std::collections::HashSet::new(),
            taint: TaintEngine::new(taint_config, empty_ctx),
        }
    }

    pub fn solve(mut self) -> SolverOutput {
        info!("starting CS-PTA solve, entry method = {:?}", self.program.entry_method);
        self.initialize();
        self.analyze();
        let taint_flows = self.taint.on_finish(&self.call_graph, self.program, &mut self.cs_mgr, &self.pt);
        info!(
            "CS-PTA solve finished: {} reachable methods, {} taint flows",
            self.reachable.len(),
            taint_flows.len()
        );
        SolverOutput {
            cs_mgr: self.cs_mgr,
            pt: self.pt,
            pfg: self.pfg,
            call_graph: self.call_graph,
            taint_flows,
        }
    }

    fn initialize(&mut self) {
        let empty_ctx = self.selector.empty_context();
        let entry_cs_method = self.cs_mgr.get_or_create_cs_method(empty_ctx, self.program.entry_method);
        self.call_graph.set_entry(entry_cs_method);
        self.add_reachable(entry_cs_method);
    }

    fn add_reachable(&mut self, cs_method: CSMethodId) {
        if !self.reachable.insert(cs_method) {
            return;
        }
        self.call_graph.add_node(cs_method);
        let CSMethod { ctx, method } = *self.cs_mgr.cs_method(cs_method);
        debug!("addReachable: {:?} (method {:?}, ctx {:?})", cs_method, method, ctx);
        let stmts = self.program.method(method).stmts.clone();
        for stmt_id in stmts {
            self.process_stmt(cs_method, ctx, stmt_id);
        }
    }

    fn process_stmt(&mut self, caller_cs_method: CSMethodId, ctx: ContextId, stmt_id: StmtId) {
        match self.program.stmt(stmt_id).clone() {
            Stmt::New { lhs, alloc_class: _ } => {
                let obj = self.heap_model.get_obj(stmt_id);
                let heap_ctx = self.selector.select_heap_context(ctx, obj);
                let cs_obj = self.cs_mgr.get_or_create_cs_obj(heap_ctx, obj);
                let x = Pointer::Var(self.cs_mgr.get_or_create_cs_var(ctx, lhs));
                self.worklist.add_entry(x, vec![cs_obj]);
            }
            Stmt::Copy { lhs, rhs } => {
                let x = Pointer::Var(self.cs_mgr.get_or_create_cs_var(ctx, lhs));
                let y = Pointer::Var(self.cs_mgr.get_or_create_cs_var(ctx, rhs));
                self.add_pfg_edge(y, x);
            }
            Stmt::StoreStaticField { field, rhs } => {
                let y = Pointer::Var(self.cs_mgr.get_or_create_cs_var(ctx, rhs));
                let sf = Pointer::StaticField(self.cs_mgr.get_or_create_static_field(field));
                self.add_pfg_edge(y, sf);
            }
            Stmt::LoadStaticField { lhs, field } => {
                let sf = Pointer::StaticField(self.cs_mgr.get_or_create_static_field(field));
                let x = Pointer::Var(self.cs_mgr.get_or_create_cs_var(ctx, lhs));
                self.add_pfg_edge(sf, x);
            }
            // Instance field/array loads and stores are deferred until the receiver's
            // points-to set actually changes (handled in `process_var_obj`).
            Stmt::StoreInstanceField { .. }
            | Stmt::LoadInstanceField { .. }
            | Stmt::StoreArray { .. }
            | Stmt::LoadArray { .. } => {}
            Stmt::Invoke(invoke) if invoke.kind == CallKind::Static => {
                self.process_static_call(caller_cs_method, ctx, stmt_id, &invoke);
            }
            // Instance calls (Special/Virtual/Interface/Dynamic) are deferred to
            // `process_call`, driven by the receiver variable's points-to set.
            // Arithmetic is `icp::ConstPropTransfer`'s concern, not pointer analysis.
            Stmt::Invoke(_) | Stmt::Return(_) | Stmt::Goto | Stmt::If { .. } | Stmt::DefineInt { .. } => {}
        }
    }

    fn process_static_call(&mut self, caller_cs_method: CSMethodId, ctx: ContextId, stmt_id: StmtId, invoke: &InvokeStmt) {
        let callee_method = match self.cha.resolve_callee(None, invoke) {
            Some(m) => m,
            None => return,
        };
        let cs_call_site = self.cs_mgr.get_or_create_cs_call_site(ctx, stmt_id);
        let css = *self.cs_mgr.cs_call_site(cs_call_site);
        let new_ctx = self.selector.select_context_static(&css, callee_method);
        let callee_cs_method = self.cs_mgr.get_or_create_cs_method(new_ctx, callee_method);

        self.connect_args_and_return(ctx, new_ctx, invoke, callee_method);
        self.taint
            .handle_call(None, None, cs_call_site, callee_cs_method, self.program, &mut self.cs_mgr, &mut self.worklist, &self.pt);

        let is_new = self.call_graph.add_edge(cs_call_site, caller_cs_method, callee_cs_method, CallKind::Static);
        if is_new {
            self.add_reachable(callee_cs_method);
        }
    }

    /// `processCall(recv, o)`: for every `y = r.m(args)` with `r` bound to `recv_cs_var`,
    /// re-dispatches `invoke` from `o`'s runtime type and (if the call-graph edge is new)
    /// wires up parameters/return and marks the callee reachable.
    fn process_call(&mut self, recv_cs_var: CSVarId, o: CSObjId) {
        let CSVar { ctx: recv_ctx, var: recv_var } = *self.cs_mgr.cs_var(recv_cs_var);
        let cs_obj = *self.cs_mgr.cs_obj(o);
        let recv_class = match self.obj_class(cs_obj.obj) {
            Some(c) => c,
            None => return,
        };
        for &stmt_id in self.program.uses_of(recv_var).to_vec().iter() {
            let invoke = match self.program.stmt(stmt_id) {
                Stmt::Invoke(invoke) if invoke.receiver == Some(recv_var) => invoke.clone(),
                _ => continue,
            };
            let callee_method = match self.cha.resolve_callee(Some(recv_class), &invoke) {
                Some(m) => m,
                None => continue,
            };
            let caller_method = self.program.owning_method(stmt_id);
            let caller_cs_method = self.cs_mgr.get_or_create_cs_method(recv_ctx, caller_method);
            let cs_call_site = self.cs_mgr.get_or_create_cs_call_site(recv_ctx, stmt_id);
            let css = *self.cs_mgr.cs_call_site(cs_call_site);
            let new_ctx = self.selector.select_context_instance(&css, &cs_obj, callee_method);
            let callee_cs_method = self.cs_mgr.get_or_create_cs_method(new_ctx, callee_method);

            // Unconditionally bind the receiver object to the callee's `this`, whether
            // or not this is the first time we've seen this call-graph edge.
            let this_var = self
                .program
                .method(callee_method)
                .this_var
                .expect("InvariantViolation: instance method callee has no this_var");
            let this_cs_var = Pointer::Var(self.cs_mgr.get_or_create_cs_var(new_ctx, this_var));
            self.worklist.add_entry(this_cs_var, vec![o]);

            let kind = invoke.kind;
            let is_new = self.call_graph.add_edge(cs_call_site, caller_cs_method, callee_cs_method, kind);
            if is_new {
                self.connect_args_and_return(recv_ctx, new_ctx, &invoke, callee_method);
                self.taint.handle_call(
                    Some(recv_cs_var),
                    Some(o),
                    cs_call_site,
                    callee_cs_method,
                    self.program,
                    &mut self.cs_mgr,
                    &mut self.worklist,
                    &self.pt,
                );
                self.add_reachable(callee_cs_method);
            }
        }
    }

    fn connect_args_and_return(&mut self, caller_ctx: ContextId, callee_ctx: ContextId, invoke: &InvokeStmt, callee_method: MethodId) {
        let program = self.program;
        let method_decl = program.method(callee_method);
        let params = method_decl.params.clone();
        let return_stmts: Vec<VarId> = method_decl
            .stmts
            .iter()
            .filter_map(|&s| match program.stmt(s) {
                Stmt::Return(Some(v)) => Some(*v),
                _ => None,
            })
            .collect();

        for (&arg_var, &param_var) in invoke.args.iter().zip(params.iter()) {
            let arg_ptr = Pointer::Var(self.cs_mgr.get_or_create_cs_var(caller_ctx, arg_var));
            let param_ptr = Pointer::Var(self.cs_mgr.get_or_create_cs_var(callee_ctx, param_var));
            self.add_pfg_edge(arg_ptr, param_ptr);
        }
        if let Some(lhs) = invoke.lhs {
            let lhs_ptr = Pointer::Var(self.cs_mgr.get_or_create_cs_var(caller_ctx, lhs));
            for ret_var in return_stmts {
                let ret_ptr = Pointer::Var(self.cs_mgr.get_or_create_cs_var(callee_ctx, ret_var));
                self.add_pfg_edge(ret_ptr, lhs_ptr);
            }
        }
    }

    fn obj_class(&self, obj: Obj) -> Option<ClassId> {
        match obj {
            Obj::Alloc(stmt) => match self.program.stmt(stmt) {
                Stmt::New { alloc_class, .. } => Some(*alloc_class),
                _ => None,
            },
            Obj::Taint(_, class) => Some(class),
        }
    }

    fn add_pfg_edge(&mut self, src: Pointer, dst: Pointer) {
        if self.pfg.add_edge(src, dst) {
            let diff: Vec<CSObjId> = self.pt.get(&src).map(|s| s.iter().copied().collect()).unwrap_or_default();
            self.worklist.add_entry(dst, diff);
        }
    }

    fn analyze(&mut self) {
        while let Some((p, delta)) = self.worklist.poll_entry() {
            let diff = self.propagate(p, delta);
            if diff.is_empty() {
                continue;
            }
            if let Pointer::Var(cs_var) = p {
                let CSVar { ctx, var } = *self.cs_mgr.cs_var(cs_var);
                for o in diff {
                    self.process_var_obj(cs_var, ctx, var, o);
                }
            }
        }
    }

    fn propagate(&mut self, p: Pointer, delta: Vec<CSObjId>) -> Vec<CSObjId> {
        let mut delta_set = HashPointsToSet::new();
        for o in delta {
            delta_set.insert(o);
        }
        let set = self.pt.entry(p).or_insert_with(HashPointsToSet::new);
        let diff = set.union_diff(&delta_set);
        if diff.is_empty() {
            return diff;
        }
        for succ in self.pfg.succs(p).collect::<Vec<_>>() {
            self.worklist.add_entry(succ, diff.clone());
        }
        self.taint.propagate(p, &diff, &mut self.worklist);
        diff
    }

    fn process_var_obj(&mut self, recv_cs_var: CSVarId, ctx: ContextId, var: VarId, o: CSObjId) {
        for &stmt_id in self.program.uses_of(var).to_vec().iter() {
            match self.program.stmt(stmt_id).clone() {
                Stmt::StoreInstanceField { base, field, rhs } if base == var => {
                    let y = Pointer::Var(self.cs_mgr.get_or_create_cs_var(ctx, rhs));
                    let target = self.instance_field_ptr(o, field);
                    self.add_pfg_edge(y, target);
                }
                Stmt::LoadInstanceField { lhs, base, field } if base == var => {
                    let src = self.instance_field_ptr(o, field);
                    let x = Pointer::Var(self.cs_mgr.get_or_create_cs_var(ctx, lhs));
                    self.add_pfg_edge(src, x);
                }
                Stmt::StoreArray { base, rhs, .. } if base == var => {
                    let y = Pointer::Var(self.cs_mgr.get_or_create_cs_var(ctx, rhs));
                    let target = self.array_index_ptr(o);
                    self.add_pfg_edge(y, target);
                }
                Stmt::LoadArray { lhs, base, .. } if base == var => {
                    let src = self.array_index_ptr(o);
                    let x = Pointer::Var(self.cs_mgr.get_or_create_cs_var(ctx, lhs));
                    self.add_pfg_edge(src, x);
                }
                _ => {}
            }
        }
        if !self.taint.is_taint(o) {
            self.process_call(recv_cs_var, o);
        }
    }

    fn instance_field_ptr(&mut self, base: CSObjId, field: crate::ir::FieldId) -> Pointer {
        let id: InstanceFieldId = self.cs_mgr.get_or_create_instance_field(base, field);
        Pointer::InstanceField(id)
    }

    fn array_index_ptr(&mut self, base: CSObjId) -> Pointer {
        let id: ArrayIndexId = self.cs_mgr.get_or_create_array_index(base);
        Pointer::ArrayIndex(id)
    }
}
