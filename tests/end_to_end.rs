// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! End-to-end scenarios, one hand-built `ir::Program` per scenario, exercising the
//! whole pipeline (CS-PTA -> taint -> ICP) end to end rather than mocking intermediate
//! state, one source pattern per test.

use cspta::cs::CallSiteSensitiveSelector;
use cspta::heap::{AllocSiteHeapModel, Obj};
use cspta::icfg::Icfg;
use cspta::icp::{ConstPropTransfer, Solver as IcpSolver, Value};
use cspta::ir::{BinOp, CallKind, IntExpr, InvokeStmt, ProgramBuilder, Stmt, TypeTag};
use cspta::pta::CSPTASolver;
use cspta::taint::config::{SinkEntry, SourceEntry, TransferEntry, BASE, RESULT};
use cspta::taint::{TaintConfig, TaintConfigDoc};

/// Scenario 1: a virtual call through a one-level class hierarchy resolves, via CHA, to
/// exactly one call-graph edge -- the override, never the abstract declaration.
#[test]
fn virtual_dispatch_resolves_to_single_override_edge() {
    let mut b = ProgramBuilder::new();
    let animal = b.add_class("Animal", None, vec![], false, true);
    let dog = b.add_class("Dog", Some(animal), vec![], false, false);
    let animal_speak = b.add_method("speak", "speak()", animal, false, true);
    let dog_speak = b.add_method("speak", "speak()", dog, false, false);
    b.add_stmt(dog_speak, Stmt::Return(None));

    let main = b.add_method("main", "main()", animal, true, false);
    let d = b.add_var("d", main, TypeTag::Ref(dog));
    b.add_stmt(main, Stmt::New { lhs: d, alloc_class: dog });
    b.add_stmt(
        main,
        Stmt::Invoke(InvokeStmt {
            kind: CallKind::Virtual,
            declared_callee: animal_speak,
            receiver: Some(d),
            args: vec![],
            lhs: None,
        }),
    );
    b.add_stmt(main, Stmt::Return(None));

    let program = b.finish(main);
    let selector = CallSiteSensitiveSelector::context_insensitive();
    let solver = CSPTASolver::new(&program, selector, AllocSiteHeapModel, TaintConfig::default());
    let output = solver.solve();

    let edges: Vec<_> = output.call_graph.edges().collect();
    assert_eq!(edges.len(), 1, "expected exactly one call-graph edge, got {edges:?}");
    let (_, _, callee, kind) = edges[0];
    assert_eq!(output.cs_mgr.cs_method(callee).method, dog_speak);
    assert_eq!(kind, CallKind::Virtual);
    assert!(output.call_graph.every_reachable_non_entry_method_has_an_incoming_edge());
}

/// Scenario 2: a value stored to a static field in one method is observed by a load in
/// a different method, purely through the global static-field map (spec.md §4.9).
#[test]
fn static_field_store_is_visible_to_a_later_load_in_another_method() {
    let mut b = ProgramBuilder::new();
    let holder = b.add_class("Holder", None, vec![], false, false);
    let value_field = b.add_field("VALUE", holder, true);

    let store_method = b.add_method("store", "store()", holder, true, false);
    let x = b.add_var("x", store_method, TypeTag::Int);
    b.add_stmt(store_method, Stmt::DefineInt { lhs: x, expr: IntExpr::Const(42) });
    b.add_stmt(store_method, Stmt::StoreStaticField { field: value_field, rhs: x });
    b.add_stmt(store_method, Stmt::Return(None));

    let load_method = b.add_method("load", "load()", holder, true, false);
    let y = b.add_var("y", load_method, TypeTag::Int);
    let load_stmt = b.add_stmt(load_method, Stmt::LoadStaticField { lhs: y, field: value_field });
    b.add_stmt(load_method, Stmt::Return(None));

    let main = b.add_method("main", "main()", holder, true, false);
    b.add_stmt(
        main,
        Stmt::Invoke(InvokeStmt { kind: CallKind::Static, declared_callee: store_method, receiver: None, args: vec![], lhs: None }),
    );
    b.add_stmt(
        main,
        Stmt::Invoke(InvokeStmt { kind: CallKind::Static, declared_callee: load_method, receiver: None, args: vec![], lhs: None }),
    );
    b.add_stmt(main, Stmt::Return(None));

    let program = b.finish(main);
    let selector = CallSiteSensitiveSelector::context_insensitive();
    let solver = CSPTASolver::new(&program, selector, AllocSiteHeapModel, TaintConfig::default());
    let output = solver.solve();

    let icfg = Icfg::build(&program, &output.call_graph, &output.cs_mgr);
    let analysis = ConstPropTransfer::new(&program, &output.cs_mgr, &output.pt);
    let mut icp_solver = IcpSolver::new(&icfg, analysis);
    icp_solver.solve();

    assert_eq!(icp_solver.out_fact(load_stmt).get(y), Value::Const(42));
}

/// Scenario 3: two variables that alias the same heap object see each other's instance
/// field writes even though one writes through `a` and the other reads through `b`.
#[test]
fn instance_field_write_through_one_alias_is_visible_through_another() {
    let mut b = ProgramBuilder::new();
    let boxed = b.add_class("Box", None, vec![], false, false);
    let field = b.add_field("val", boxed, false);

    let main = b.add_method("main", "main()", boxed, true, false);
    let a = b.add_var("a", main, TypeTag::Ref(boxed));
    let bb = b.add_var("b", main, TypeTag::Ref(boxed));
    let v = b.add_var("v", main, TypeTag::Int);
    let y = b.add_var("y", main, TypeTag::Int);

    b.add_stmt(main, Stmt::New { lhs: a, alloc_class: boxed });
    b.add_stmt(main, Stmt::Copy { lhs: bb, rhs: a });
    b.add_stmt(main, Stmt::DefineInt { lhs: v, expr: IntExpr::Const(99) });
    b.add_stmt(main, Stmt::StoreInstanceField { base: a, field, rhs: v });
    let load_stmt = b.add_stmt(main, Stmt::LoadInstanceField { lhs: y, base: bb, field });
    b.add_stmt(main, Stmt::Return(None));

    let program = b.finish(main);
    let selector = CallSiteSensitiveSelector::context_insensitive();
    let solver = CSPTASolver::new(&program, selector, AllocSiteHeapModel, TaintConfig::default());
    let output = solver.solve();

    let icfg = Icfg::build(&program, &output.call_graph, &output.cs_mgr);
    let analysis = ConstPropTransfer::new(&program, &output.cs_mgr, &output.pt);
    let mut icp_solver = IcpSolver::new(&icfg, analysis);
    icp_solver.solve();

    assert_eq!(icp_solver.out_fact(load_stmt).get(y), Value::Const(99));
}

/// Scenario 4: a value returned by a configured source, passed straight to a configured
/// sink's argument, is reported as one taint flow.
#[test]
fn tainted_source_value_reaching_a_sink_argument_is_reported() {
    let mut b = ProgramBuilder::new();
    let c = b.add_class("C", None, vec![], false, false);
    let _tainted_ty = b.add_class("Tainted", None, vec![], false, false);
    let source = b.add_method("source", "source()", c, true, false);
    let sink = b.add_method("sink", "sink(Object)", c, true, false);

    let main = b.add_method("main", "main()", c, true, false);
    let t = b.add_var("t", main, TypeTag::Ref(c));
    let source_call = b.add_stmt(
        main,
        Stmt::Invoke(InvokeStmt { kind: CallKind::Static, declared_callee: source, receiver: None, args: vec![], lhs: Some(t) }),
    );
    let sink_call = b.add_stmt(
        main,
        Stmt::Invoke(InvokeStmt { kind: CallKind::Static, declared_callee: sink, receiver: None, args: vec![t], lhs: None }),
    );
    b.add_stmt(main, Stmt::Return(None));

    let program = b.finish(main);
    let doc = TaintConfigDoc {
        sources: vec![SourceEntry { method: "source".into(), ty: "Tainted".into() }],
        sinks: vec![SinkEntry { method: "sink".into(), arg_index: 0 }],
        transfers: vec![],
    };
    let taint_config = TaintConfig::resolve(&doc, &program);
    let selector = CallSiteSensitiveSelector::context_insensitive();
    let solver = CSPTASolver::new(&program, selector, AllocSiteHeapModel, taint_config);
    let output = solver.solve();

    assert_eq!(output.taint_flows.len(), 1);
    let flow = output.taint_flows.iter().next().unwrap();
    assert_eq!(flow.source_call_site, source_call);
    assert_eq!(flow.sink_call_site, sink_call);
    assert_eq!(flow.sink_arg_index, 0);
}

fn build_transfer_scenario(transfers: Vec<TransferEntry>) -> (cspta::ir::Program, cspta::ir::VarId, TaintConfig) {
    let mut b = ProgramBuilder::new();
    let c = b.add_class("C", None, vec![], false, false);
    let _tainted_ty = b.add_class("Tainted", None, vec![], false, false);
    let source = b.add_method("source", "source()", c, true, false);
    let copy_method = b.add_method("copy", "copy(Object)", c, false, false);
    let this_var = b.add_var("this", copy_method, TypeTag::Ref(c));
    b.set_this_var(copy_method, this_var);
    let arg_var = b.add_var("x", copy_method, TypeTag::Ref(c));
    b.add_param(copy_method, arg_var);
    b.add_stmt(copy_method, Stmt::Return(None));

    let main = b.add_method("main", "main()", c, true, false);
    let recv = b.add_var("recv", main, TypeTag::Ref(c));
    let s = b.add_var("s", main, TypeTag::Ref(c));
    let y = b.add_var("y", main, TypeTag::Ref(c));
    b.add_stmt(main, Stmt::New { lhs: recv, alloc_class: c });
    b.add_stmt(
        main,
        Stmt::Invoke(InvokeStmt { kind: CallKind::Static, declared_callee: source, receiver: None, args: vec![], lhs: Some(s) }),
    );
    b.add_stmt(
        main,
        Stmt::Invoke(InvokeStmt { kind: CallKind::Special, declared_callee: copy_method, receiver: Some(recv), args: vec![s], lhs: Some(y) }),
    );
    b.add_stmt(main, Stmt::Return(None));

    let program = b.finish(main);
    let doc = TaintConfigDoc {
        sources: vec![SourceEntry { method: "source".into(), ty: "Tainted".into() }],
        sinks: vec![],
        transfers,
    };
    let taint_config = TaintConfig::resolve(&doc, &program);
    let _ = tainted_ty;
    (program, y, taint_config)
}

/// Scenario 5a: a transfer rule keyed on the `BASE` sentinel routes from the *receiver*,
/// not from an argument -- an untainted receiver means nothing reaches the result.
#[test]
fn transfer_base_sentinel_reads_the_receiver_not_the_argument() {
    let (program, y, taint_config) = build_transfer_scenario(vec![TransferEntry { method: "copy".into(), from: BASE, to: RESULT }]);
    let selector = CallSiteSensitiveSelector::context_insensitive();
    let solver = CSPTASolver::new(&program, selector, AllocSiteHeapModel, taint_config);
    let output = solver.solve();

    let y_is_tainted = output.pt.iter().any(|(ptr, set)| match ptr {
        cspta::cs::Pointer::Var(v) => {
            output.cs_mgr.cs_var(*v).var == y && set.iter().any(|&o| matches!(output.cs_mgr.cs_obj(o).obj, Obj::Taint(..)))
        }
        _ => false,
    });
    // `BASE` reads the untainted `recv` object, so no taint reaches `y` through this
    // transfer: the receiver is never the tainted value in this scenario.
    assert!(!y_is_tainted);
}

/// Scenario 5b: a transfer rule keyed on an argument-index sentinel routes from that
/// argument, delivering the tainted value into the result.
#[test]
fn transfer_arg_sentinel_reads_the_argument_not_the_receiver() {
    let (program, y, taint_config) = build_transfer_scenario(vec![TransferEntry { method: "copy".into(), from: 0, to: RESULT }]);
    let selector = CallSiteSensitiveSelector::context_insensitive();
    let solver = CSPTASolver::new(&program, selector, AllocSiteHeapModel, taint_config);
    let output = solver.solve();

    let y_is_tainted = output.pt.iter().any(|(ptr, set)| match ptr {
        cspta::cs::Pointer::Var(v) => {
            output.cs_mgr.cs_var(*v).var == y && set.iter().any(|&o| matches!(output.cs_mgr.cs_obj(o).obj, Obj::Taint(..)))
        }
        _ => false,
    });
    assert!(y_is_tainted, "expected y's points-to set to contain the tainted object carried through arg0");
}

/// Scenario 6: array cells are folded per constant index -- two stores at the same
/// index with different values collapse to NAC, but a distinct index keeps its own
/// constant untouched by that collision.
#[test]
fn array_store_folds_per_index_key() {
    let mut b = ProgramBuilder::new();
    let c = b.add_class("C", None, vec![], false, false);
    let main = b.add_method("main", "main()", c, true, false);
    let arr = b.add_var("arr", main, TypeTag::Ref(c));
    let i0 = b.add_var("i0", main, TypeTag::Int);
    let i1 = b.add_var("i1", main, TypeTag::Int);
    let v1 = b.add_var("v1", main, TypeTag::Int);
    let v2 = b.add_var("v2", main, TypeTag::Int);
    let v3 = b.add_var("v3", main, TypeTag::Int);
    let y0 = b.add_var("y0", main, TypeTag::Int);
    let y1 = b.add_var("y1", main, TypeTag::Int);

    b.add_stmt(main, Stmt::New { lhs: arr, alloc_class: c });
    b.add_stmt(main, Stmt::DefineInt { lhs: i0, expr: IntExpr::Const(0) });
    b.add_stmt(main, Stmt::DefineInt { lhs: i1, expr: IntExpr::Const(1) });
    b.add_stmt(main, Stmt::DefineInt { lhs: v1, expr: IntExpr::Const(10) });
    b.add_stmt(main, Stmt::DefineInt { lhs: v2, expr: IntExpr::Const(20) });
    b.add_stmt(main, Stmt::DefineInt { lhs: v3, expr: IntExpr::Const(99) });
    b.add_stmt(main, Stmt::StoreArray { base: arr, index: i0, rhs: v1 });
    b.add_stmt(main, Stmt::StoreArray { base: arr, index: i0, rhs: v3 });
    b.add_stmt(main, Stmt::StoreArray { base: arr, index: i1, rhs: v2 });
    let load_y0 = b.add_stmt(main, Stmt::LoadArray { lhs: y0, base: arr, index: i0 });
    let load_y1 = b.add_stmt(main, Stmt::LoadArray { lhs: y1, base: arr, index: i1 });
    b.add_stmt(main, Stmt::Return(None));

    let program = b.finish(main);
    let selector = CallSiteSensitiveSelector::context_insensitive();
    let solver = CSPTASolver::new(&program, selector, AllocSiteHeapModel, TaintConfig::default());
    let output = solver.solve();

    let icfg = Icfg::build(&program, &output.call_graph, &output.cs_mgr);
    let analysis = ConstPropTransfer::new(&program, &output.cs_mgr, &output.pt);
    let mut icp_solver = IcpSolver::new(&icfg, analysis);
    icp_solver.solve();

    assert_eq!(icp_solver.out_fact(load_y0).get(y0), Value::Nac, "index 0 got two conflicting stores, should fold to NAC");
    assert_eq!(icp_solver.out_fact(load_y1).get(y1), Value::Const(20), "index 1's single store must not be disturbed by index 0's collision");
}

/// A callee whose return variable is never assigned on the path that reaches its
/// `Return` statement carries no concrete constant back to the caller; the caller's
/// LHS must widen straight to NAC rather than staying UNDEF forever (spec.md line 167),
/// since an UNDEF LHS would otherwise look indistinguishable from "call never ran" to
/// any arithmetic computed from it afterwards.
#[test]
fn interprocedural_return_with_no_concrete_value_widens_lhs_to_nac() {
    let mut b = ProgramBuilder::new();
    let c = b.add_class("C", None, vec![], false, false);
    let callee = b.add_method("unset", "unset()", c, true, false);
    let r = b.add_var("r", callee, TypeTag::Int);
    b.add_stmt(callee, Stmt::Return(Some(r)));

    let main = b.add_method("main", "main()", c, true, false);
    let y = b.add_var("y", main, TypeTag::Int);
    b.add_stmt(
        main,
        Stmt::Invoke(InvokeStmt { kind: CallKind::Static, declared_callee: callee, receiver: None, args: vec![], lhs: Some(y) }),
    );
    let after_stmt = b.add_stmt(main, Stmt::Return(None));

    let program = b.finish(main);
    let selector = CallSiteSensitiveSelector::context_insensitive();
    let solver = CSPTASolver::new(&program, selector, AllocSiteHeapModel, TaintConfig::default());
    let output = solver.solve();

    let icfg = Icfg::build(&program, &output.call_graph, &output.cs_mgr);
    let analysis = ConstPropTransfer::new(&program, &output.cs_mgr, &output.pt);
    let mut icp_solver = IcpSolver::new(&icfg, analysis);
    icp_solver.solve();

    assert_eq!(icp_solver.in_fact(after_stmt).get(y), Value::Nac);
}

/// Division and remainder by a constant zero both fold to UNDEF, never to NAC -- an
/// unreachable-in-practice arithmetic fault is modeled as "no useful fact", not as "any
/// value is possible" (spec.md §4.9, §8 division-by-zero property).
#[test]
fn division_and_remainder_by_zero_fold_to_undef_in_a_define_int_statement() {
    let mut b = ProgramBuilder::new();
    let c = b.add_class("C", None, vec![], false, false);
    let main = b.add_method("main", "main()", c, true, false);
    let zero = b.add_var("zero", main, TypeTag::Int);
    let ten = b.add_var("ten", main, TypeTag::Int);
    let q = b.add_var("q", main, TypeTag::Int);

    b.add_stmt(main, Stmt::DefineInt { lhs: zero, expr: IntExpr::Const(0) });
    b.add_stmt(main, Stmt::DefineInt { lhs: ten, expr: IntExpr::Const(10) });
    let div_stmt = b.add_stmt(
        main,
        Stmt::DefineInt { lhs: q, expr: IntExpr::Binary(BinOp::Div, Box::new(IntExpr::Var(ten)), Box::new(IntExpr::Var(zero))) },
    );
    b.add_stmt(main, Stmt::Return(None));

    let program = b.finish(main);
    let selector = CallSiteSensitiveSelector::context_insensitive();
    let solver = CSPTASolver::new(&program, selector, AllocSiteHeapModel, TaintConfig::default());
    let output = solver.solve();

    let icfg = Icfg::build(&program, &output.call_graph, &output.cs_mgr);
    let analysis = ConstPropTransfer::new(&program, &output.cs_mgr, &output.pt);
    let mut icp_solver = IcpSolver::new(&icfg, analysis);
    icp_solver.solve();

    assert_eq!(icp_solver.out_fact(div_stmt).get(q), Value::Undef);
}
