// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! The interprocedural control-flow graph (spec.md §2 "A2", the external-collaborator
//! stand-in `ICPSolver` (`icp::Solver`) walks. One node per statement; ordinary
//! intraprocedural successors become `Edge::Normal`, and every call statement instead
//! gets an `Edge::CallToReturn` to its local successor plus, for every call-graph edge
//! resolved at that site, an `Edge::Call` into the callee's entry and an `Edge::Return`
//! from each of the callee's `Return` statements back to the call's local successor.
//!
//! Context is erased here: the CS-PTA call graph is collapsed down to plain `MethodId`s
//! (spec.md §6 "ICP result" speaks of "per-node IN/OUT facts", one set per statement,
//! not per context), matching the "(may-be-context-collapsed)" wording spec.md §6 uses
//! for the pointer-analysis result ICP queries.

use std::collections::{HashMap, HashSet};

use crate::cs::CSManager;
use crate::graph::CallGraph;
use crate::ir::{MethodId, Program, StmtId};

#[derive(Copy, Clone, Debug)]
pub enum Edge {
    /// Intraprocedural successor, or (for a call node) the local successor the
    /// `CallToReturn`/`Return` edges also target.
    Normal { from: StmtId, to: StmtId },
    /// Caller call-site → callee entry statement.
    Call { call: StmtId, callee_entry: StmtId },
    /// Callee `Return` statement → the call's local successor ("return site"). Keeps
    /// the originating call statement too, so a transfer function can recover the
    /// call's LHS and argument list without re-deriving it from the ICFG.
    Return { call: StmtId, callee_exit: StmtId, return_site: StmtId },
    /// Call site → its own local successor, carrying only the intraprocedural effect
    /// of the call (spec.md §4.9: clearing the call's LHS from the fact).
    CallToReturn { call: StmtId, return_site: StmtId },
}

impl Edge {
    pub fn source(&self) -> StmtId {
        match *self {
            Edge::Normal { from, .. } => from,
            Edge::Call { call, .. } => call,
            Edge::Return { callee_exit, .. } => callee_exit,
            Edge::CallToReturn { call, .. } => call,
        }
    }

    pub fn target(&self) -> StmtId {
        match *self {
            Edge::Normal { to, .. } => to,
            Edge::Call { callee_entry, .. } => callee_entry,
            Edge::Return { return_site, .. } => return_site,
            Edge::CallToReturn { return_site, .. } => return_site,
        }
    }
}

/// The ICFG itself: every reachable method's statements as nodes, wired up per the
/// rules above. Built once, after the CS-PTA solver has finished (`icp::Solver` needs
/// the finished call graph to resolve call edges).
pub struct Icfg {
    nodes: Vec<StmtId>,
    out_edges: HashMap<StmtId, Vec<Edge>>,
    in_edges: HashMap<StmtId, Vec<Edge>>,
    entry_node: StmtId,
}

impl Icfg {
    pub fn nodes(&self) -> impl Iterator<Item = StmtId> + '_ {
        self.nodes.iter().copied()
    }

    pub fn entry_node(&self) -> StmtId {
        self.entry_node
    }

    pub fn is_entry_node(&self, node: StmtId) -> bool {
        node == self.entry_node
    }

    pub fn out_edges(&self, node: StmtId) -> &[Edge] {
        self.out_edges.get(&node).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn in_edges(&self, node: StmtId) -> &[Edge] {
        self.in_edges.get(&node).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn successors(&self, node: StmtId) -> impl Iterator<Item = StmtId> + '_ {
        self.out_edges(node).iter().map(|e| e.target())
    }

    /// Builds the ICFG over every method the CS-PTA call graph found reachable
    /// (context-collapsed to plain `MethodId`s), entered at `program.entry_method`.
    pub fn build(program: &Program, call_graph: &CallGraph, cs_mgr: &CSManager) -> Icfg {
        let reachable: HashSet<MethodId> = call_graph
            .reachable_methods()
            .map(|cm| cs_mgr.cs_method(cm).method)
            .collect();

        let mut nodes = Vec::new();
        let mut out_edges: HashMap<StmtId, Vec<Edge>> = HashMap::new();
        let mut in_edges: HashMap<StmtId, Vec<Edge>> = HashMap::new();
        let mut add_edge = |e: Edge| {
            in_edges.entry(e.target()).or_default().push(e);
            out_edges.entry(e.source()).or_default().push(e);
        };

        for &method_id in &reachable {
            let method = program.method(method_id);
            for &stmt_id in &method.stmts {
                nodes.push(stmt_id);
                let is_call = matches!(program.stmt(stmt_id), crate::ir::Stmt::Invoke(_));
                for &succ in method.successors_of(stmt_id) {
                    if is_call {
                        add_edge(Edge::CallToReturn { call: stmt_id, return_site: succ });
                    } else {
                        add_edge(Edge::Normal { from: stmt_id, to: succ });
                    }
                }
            }
        }

        for (call_site, _caller, callee, _kind) in call_graph.edges() {
            let call_stmt = cs_mgr.cs_call_site(call_site).stmt;
            let callee_method = cs_mgr.cs_method(callee).method;
            let Some(callee_entry) = program.method(callee_method).entry_stmt() else { continue };
            add_edge(Edge::Call { call: call_stmt, callee_entry });
            let caller_method = program.owning_method(call_stmt);
            for &return_site in program.method(caller_method).successors_of(call_stmt) {
                for &stmt_id in &program.method(callee_method).stmts {
                    if matches!(program.stmt(stmt_id), crate::ir::Stmt::Return(_)) {
                        add_edge(Edge::Return { call: call_stmt, callee_exit: stmt_id, return_site });
                    }
                }
            }
        }

        let entry_node = program
            .method(program.entry_method)
            .entry_stmt()
            .expect("InvariantViolation: entry method has no statements");

        Icfg { nodes, out_edges, in_edges, entry_node }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cs::CSManager;
    use crate::graph::CallGraph;
    use crate::ir::{CallKind, Program, ProgramBuilder, Stmt, TypeTag};

    fn tiny_program() -> (Program, MethodId, MethodId, StmtId) {
        let mut b = ProgramBuilder::new();
        let c = b.add_class("C", None, vec![], false, false);
        let caller = b.add_method("caller", "caller()", c, true, false);
        let callee = b.add_method("callee", "callee()", c, true, false);
        let p = b.add_var("p", callee, TypeTag::Int);
        b.add_param(callee, p);
        let ret_stmt = b.add_stmt(callee, Stmt::Return(Some(p)));
        let lhs = b.add_var("x", caller, TypeTag::Int);
        let arg = b.add_var("a", caller, TypeTag::Int);
        let call_stmt = b.add_stmt(
            caller,
            Stmt::Invoke(crate::ir::InvokeStmt {
                kind: CallKind::Static,
                declared_callee: callee,
                receiver: None,
                args: vec![arg],
                lhs: Some(lhs),
            }),
        );
        let after = b.add_var("y", caller, TypeTag::Int);
        let after_stmt = b.add_stmt(caller, Stmt::Copy { lhs: after, rhs: lhs });
        let program = b.finish(caller);
        assert_eq!(program.method(caller).successors_of(call_stmt), &[after_stmt]);
        (program, caller, callee, ret_stmt)
    }

    #[test]
    fn call_site_gets_call_to_return_and_call_and_return_edges() {
        let (program, caller, callee, ret_stmt) = tiny_program();
        let mut cs_mgr = CSManager::new();
        let ctx = crate::context::ContextId::new(0);
        let mut call_graph = CallGraph::new();
        let caller_cs = cs_mgr.get_or_create_cs_method(ctx, caller);
        let callee_cs = cs_mgr.get_or_create_cs_method(ctx, callee);
        call_graph.set_entry(caller_cs);
        let call_stmt = program.method(caller).stmts[1];
        let cs_call_site = cs_mgr.get_or_create_cs_call_site(ctx, call_stmt);
        call_graph.add_edge(cs_call_site, caller_cs, callee_cs, CallKind::Static);

        let icfg = Icfg::build(&program, &call_graph, &cs_mgr);
        let return_site = program.method(caller).successors_of(call_stmt)[0];
        let kinds: Vec<_> = icfg.out_edges(call_stmt).to_vec();
        assert!(kinds.iter().any(|e| matches!(e, Edge::CallToReturn { return_site: rs, .. } if *rs == return_site)));
        assert!(kinds.iter().any(|e| matches!(e, Edge::Call { callee_entry, .. } if *callee_entry == program.method(callee).entry_stmt().unwrap())));
        assert!(icfg
            .in_edges(return_site)
            .iter()
            .any(|e| matches!(e, Edge::Return { callee_exit, .. } if *callee_exit == ret_stmt)));
    }
}
