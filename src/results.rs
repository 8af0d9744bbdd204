// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! The serializable, name-resolved results spec.md §6 describes: `PointerAnalysisResult`,
//! `TaintFlowEntry` and `IcpResult`. These translate the solver's interned ids
//! (`CSObjId`, `Pointer`, `StmtId`, ...) back into the source names a consumer of the
//! JSON output actually wants, keeping "a solver that only knows ids" split from "a
//! dumper that knows how to print them".

use std::collections::BTreeSet;

use serde::Serialize;

use crate::cs::{CSManager, CSMethodId, CSObjId, CSVar, Pointer};
use crate::graph::CallGraph;
use crate::icfg::Icfg;
use crate::icp::{ConstPropTransfer, Solver, Value};
use crate::ir::{MethodId, Program};
use crate::pta::SolverOutput;
use crate::pts_set::PointsToSet;
use crate::taint::TaintFlow;

fn method_label(program: &Program, method: MethodId) -> String {
    let m = program.method(method);
    format!("{}::{}", program.class(m.declaring_class).name, m.subsignature)
}

fn obj_label(program: &Program, cs_mgr: &CSManager, obj: CSObjId) -> String {
    let cs_obj = *cs_mgr.cs_obj(obj);
    match cs_obj.obj {
        crate::heap::Obj::Alloc(stmt) => format!("alloc@{:?}[ctx={:?}]", stmt, cs_obj.heap_ctx),
        crate::heap::Obj::Taint(stmt, class) => {
            format!("taint@{:?}:{}[ctx={:?}]", stmt, program.class(class).name, cs_obj.heap_ctx)
        }
    }
}

fn pointer_label(program: &Program, cs_mgr: &CSManager, ptr: Pointer) -> String {
    match ptr {
        Pointer::Var(cs_var) => {
            let CSVar { ctx, var } = *cs_mgr.cs_var(cs_var);
            format!("{}[ctx={:?}]", program.var(var).name, ctx)
        }
        Pointer::InstanceField(f) => {
            let field = *cs_mgr.instance_field(f);
            format!("{}.{}", obj_label(program, cs_mgr, field.base), program.field(field.field).name)
        }
        Pointer::StaticField(f) => {
            let field = *cs_mgr.static_field(f);
            format!(
                "{}.{}",
                program.class(program.field(field.field).declaring_class).name,
                program.field(field.field).name
            )
        }
        Pointer::ArrayIndex(a) => {
            let idx = *cs_mgr.array_index(a);
            format!("{}[_]", obj_label(program, cs_mgr, idx.array))
        }
    }
}

fn call_site_label(program: &Program, cs_mgr: &CSManager, call_site: crate::cs::CSCallSiteId) -> String {
    let css = *cs_mgr.cs_call_site(call_site);
    format!("{:?}@{}[ctx={:?}]", css.stmt, method_label(program, program.owning_method(css.stmt)), css.ctx)
}

/// Labels a bare, context-free statement id (spec.md §4.7 taint flows are reported in
/// terms of `StmtId`, not a context-carrying `CSCallSiteId` -- one source/sink pair is
/// reported regardless of how many contexts reached it).
fn stmt_label(program: &Program, stmt: crate::ir::StmtId) -> String {
    format!("{:?}@{}", stmt, method_label(program, program.owning_method(stmt)))
}

fn cs_method_label(program: &Program, cs_mgr: &CSManager, cs_method: CSMethodId) -> String {
    let cm = *cs_mgr.cs_method(cs_method);
    format!("{}[ctx={:?}]", method_label(program, cm.method), cm.ctx)
}

#[derive(Serialize)]
pub struct PointsToEntry {
    pub pointer: String,
    pub objects: Vec<String>,
}

#[derive(Serialize)]
pub struct CallGraphEdgeEntry {
    pub call_site: String,
    pub caller: String,
    pub callee: String,
    pub kind: String,
}

#[derive(Serialize)]
pub struct PointerAnalysisResult {
    pub reachable_methods: Vec<String>,
    pub points_to: Vec<PointsToEntry>,
    pub call_graph: Vec<CallGraphEdgeEntry>,
}

pub fn build_pointer_analysis_result(program: &Program, output: &SolverOutput) -> PointerAnalysisResult {
    let mut reachable_methods: Vec<String> = output
        .call_graph
        .reachable_methods()
        .map(|m| cs_method_label(program, &output.cs_mgr, m))
        .collect();
    reachable_methods.sort();

    let mut points_to: Vec<PointsToEntry> = output
        .pt
        .iter()
        .map(|(&ptr, set)| {
            let mut objects: Vec<String> = set.iter().map(|&o| obj_label(program, &output.cs_mgr, o)).collect();
            objects.sort();
            PointsToEntry {
                pointer: pointer_label(program, &output.cs_mgr, ptr),
                objects,
            }
        })
        .collect();
    points_to.sort_by(|a, b| a.pointer.cmp(&b.pointer));

    let mut call_graph: Vec<CallGraphEdgeEntry> = output
        .call_graph
        .edges()
        .map(|(call_site, caller, callee, kind)| CallGraphEdgeEntry {
            call_site: call_site_label(program, &output.cs_mgr, call_site),
            caller: cs_method_label(program, &output.cs_mgr, caller),
            callee: cs_method_label(program, &output.cs_mgr, callee),
            kind: format!("{kind:?}"),
        })
        .collect();
    call_graph.sort_by(|a, b| a.call_site.cmp(&b.call_site).then(a.callee.cmp(&b.callee)));

    PointerAnalysisResult {
        reachable_methods,
        points_to,
        call_graph,
    }
}

#[derive(Serialize)]
pub struct TaintFlowEntry {
    pub source_call_site: String,
    pub sink_call_site: String,
    pub sink_arg_index: i32,
}

pub fn build_taint_flow_entries(program: &Program, flows: &BTreeSet<TaintFlow>) -> Vec<TaintFlowEntry> {
    flows
        .iter()
        .map(|flow| TaintFlowEntry {
            source_call_site: stmt_label(program, flow.source_call_site),
            sink_call_site: stmt_label(program, flow.sink_call_site),
            sink_arg_index: flow.sink_arg_index,
        })
        .collect()
}

fn value_label(v: Value) -> String {
    match v {
        Value::Undef => "UNDEF".to_string(),
        Value::Const(k) => format!("CONST({k})"),
        Value::Nac => "NAC".to_string(),
    }
}

#[derive(Serialize)]
pub struct IcpFact {
    pub var: String,
    pub value: String,
}

#[derive(Serialize)]
pub struct IcpNodeResult {
    pub stmt: usize,
    pub method: String,
    pub in_facts: Vec<IcpFact>,
    pub out_facts: Vec<IcpFact>,
}

#[derive(Serialize)]
pub struct IcpResult {
    pub nodes: Vec<IcpNodeResult>,
}

pub fn build_icp_result(program: &Program, icfg: &Icfg, solver: &Solver<'_, ConstPropTransfer<'_>>) -> IcpResult {
    let mut nodes: Vec<IcpNodeResult> = icfg
        .nodes()
        .map(|node| {
            let method = program.owning_method(node);
            let mut in_facts: Vec<IcpFact> = solver
                .in_fact(node)
                .iter()
                .map(|(var, val)| IcpFact {
                    var: program.var(var).name.clone(),
                    value: value_label(val),
                })
                .collect();
            in_facts.sort_by(|a, b| a.var.cmp(&b.var));
            let mut out_facts: Vec<IcpFact> = solver
                .out_fact(node)
                .iter()
                .map(|(var, val)| IcpFact {
                    var: program.var(var).name.clone(),
                    value: value_label(val),
                })
                .collect();
            out_facts.sort_by(|a, b| a.var.cmp(&b.var));
            IcpNodeResult {
                stmt: node.index(),
                method: method_label(program, method),
                in_facts,
                out_facts,
            }
        })
        .collect();
    nodes.sort_by_key(|n| n.stmt);
    IcpResult { nodes }
}
