// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! `AnalysisOptions` (spec.md §6 "CLI/Options"): the CLI surface, parsed with
//! `clap::Command` in the builder style, with no rustc-argument passthrough since
//! this crate analyzes its own IR format directly.
//!
//! Also the flat, string-keyed on-disk program schema `load_program` deserializes into
//! an `ir::Program` via `ir::ProgramBuilder`. This is deliberately a separate type from
//! `ir::Program` rather than a direct `#[derive(Deserialize)]` on it: `Method::successors`
//! is a `HashMap<StmtId, _>`, and serde_json requires string map keys, which a derived
//! newtype-index `Serialize` impl doesn't produce.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Arg, Command};
use serde::Deserialize;

use crate::errors::ConfigError;
use crate::ir::{BinOp, CallKind, ClassId, FieldId, IntExpr, InvokeStmt, MethodId, Program, ProgramBuilder, Stmt, TypeTag, VarId};

/// Everything `bin/cspta.rs` needs to drive one run (spec.md §6 CLI flags).
#[derive(Clone, Debug)]
pub struct AnalysisOptions {
    pub program: PathBuf,
    pub taint_config: Option<PathBuf>,
    pub pta: String,
    pub entry: Option<String>,
    pub context_depth: usize,
    pub dump_call_graph: Option<PathBuf>,
    pub dump_pts: Option<PathBuf>,
    pub dump_taint_flows: Option<PathBuf>,
    pub dump_icp: Option<PathBuf>,
}

fn make_options_parser() -> Command<'static> {
    Command::new("cspta")
        .arg(Arg::new("PROGRAM").required(true).help("JSON file describing the program to analyze."))
        .arg(
            Arg::new("taint-config")
                .long("taint-config")
                .takes_value(true)
                .help("JSON file describing taint sources, sinks and transfers."),
        )
        .arg(
            Arg::new("pta")
                .long("pta")
                .takes_value(true)
                .value_parser(["cs", "ci"])
                .default_value("cs")
                .help("The kind of context sensitivity: 'cs' (call-site-sensitive) or 'ci' (context-insensitive)."),
        )
        .arg(
            Arg::new("entry")
                .long("entry")
                .takes_value(true)
                .help("Overrides the program's declared entry method (by subsignature)."),
        )
        .arg(
            Arg::new("context-depth")
                .long("context-depth")
                .takes_value(true)
                .value_parser(clap::value_parser!(usize))
                .default_value("1")
                .help("The k-limit for call-site-sensitive contexts."),
        )
        .arg(Arg::new("dump-call-graph").long("dump-call-graph").takes_value(true).help("Dump the call graph in DOT format."))
        .arg(Arg::new("dump-pts").long("dump-pts").takes_value(true).help("Dump points-to sets as JSON."))
        .arg(Arg::new("dump-taint-flows").long("dump-taint-flows").takes_value(true).help("Dump taint flows as JSON."))
        .arg(Arg::new("dump-icp").long("dump-icp").takes_value(true).help("Dump per-statement constant-propagation facts as JSON."))
}

impl AnalysisOptions {
    pub fn parse_from_args<I, T>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let matches = make_options_parser().try_get_matches_from(args)?;
        Ok(AnalysisOptions {
            program: PathBuf::from(matches.get_one::<String>("PROGRAM").expect("required")),
            taint_config: matches.get_one::<String>("taint-config").map(PathBuf::from),
            pta: matches.get_one::<String>("pta").expect("has default").clone(),
            entry: matches.get_one::<String>("entry").cloned(),
            context_depth: *matches.get_one::<usize>("context-depth").expect("has default"),
            dump_call_graph: matches.get_one::<String>("dump-call-graph").map(PathBuf::from),
            dump_pts: matches.get_one::<String>("dump-pts").map(PathBuf::from),
            dump_taint_flows: matches.get_one::<String>("dump-taint-flows").map(PathBuf::from),
            dump_icp: matches.get_one::<String>("dump-icp").map(PathBuf::from),
        })
    }
}

// -- On-disk program schema -----------------------------------------------------------

#[derive(Deserialize)]
struct ProgramDoc {
    classes: Vec<ClassDoc>,
    methods: Vec<MethodDoc>,
    entry_method: String,
}

#[derive(Deserialize)]
struct ClassDoc {
    name: String,
    #[serde(default)]
    super_class: Option<String>,
    #[serde(default)]
    interfaces: Vec<String>,
    #[serde(default)]
    is_interface: bool,
    #[serde(default)]
    is_abstract: bool,
    #[serde(default)]
    fields: Vec<FieldDoc>,
}

#[derive(Deserialize)]
struct FieldDoc {
    name: String,
    #[serde(default)]
    is_static: bool,
}

#[derive(Deserialize)]
struct MethodDoc {
    class: String,
    name: String,
    subsignature: String,
    #[serde(default)]
    is_static: bool,
    #[serde(default)]
    is_abstract: bool,
    #[serde(default)]
    this_var: Option<String>,
    #[serde(default)]
    params: Vec<String>,
    #[serde(default)]
    vars: Vec<VarDoc>,
    #[serde(default)]
    stmts: Vec<StmtDoc>,
}

#[derive(Deserialize)]
struct VarDoc {
    name: String,
    ty: TypeTagDoc,
}

#[derive(Deserialize)]
#[serde(tag = "kind")]
enum TypeTagDoc {
    Ref { class: String },
    Int,
    Other,
}

#[derive(Deserialize)]
#[serde(tag = "op")]
enum StmtDoc {
    New { lhs: String, class: String },
    Copy { lhs: String, rhs: String },
    StoreStaticField { field: String, field_class: String, rhs: String },
    LoadStaticField { lhs: String, field: String, field_class: String },
    StoreInstanceField { base: String, field: String, field_class: String, rhs: String },
    LoadInstanceField { lhs: String, base: String, field: String, field_class: String },
    StoreArray { base: String, index: String, rhs: String },
    LoadArray { lhs: String, base: String, index: String },
    DefineInt { lhs: String, expr: IntExprDoc },
    Invoke {
        kind: String,
        callee_class: String,
        callee_subsig: String,
        #[serde(default)]
        receiver: Option<String>,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        lhs: Option<String>,
    },
    Return {
        #[serde(default)]
        var: Option<String>,
    },
    Goto { target: usize },
    If { cond: String, targets: Vec<usize> },
}

#[derive(Deserialize)]
#[serde(tag = "op")]
enum IntExprDoc {
    Const { value: i64 },
    Var { name: String },
    Binary { op: String, lhs: Box<IntExprDoc>, rhs: Box<IntExprDoc> },
}

fn parse_bin_op(op: &str) -> Result<BinOp> {
    Ok(match op {
        "add" => BinOp::Add,
        "sub" => BinOp::Sub,
        "mul" => BinOp::Mul,
        "div" => BinOp::Div,
        "rem" => BinOp::Rem,
        "shl" => BinOp::Shl,
        "shr" => BinOp::Shr,
        "ushr" => BinOp::UShr,
        "and" => BinOp::And,
        "or" => BinOp::Or,
        "xor" => BinOp::Xor,
        "eq" => BinOp::Eq,
        "ne" => BinOp::Ne,
        "lt" => BinOp::Lt,
        "le" => BinOp::Le,
        "gt" => BinOp::Gt,
        "ge" => BinOp::Ge,
        other => return Err(anyhow!(ConfigError::MalformedRule(format!("unknown binary op {other:?}")))),
    })
}

fn parse_call_kind(kind: &str) -> Result<CallKind> {
    Ok(match kind {
        "static" => CallKind::Static,
        "special" => CallKind::Special,
        "virtual" => CallKind::Virtual,
        "interface" => CallKind::Interface,
        "dynamic" => CallKind::Dynamic,
        other => return Err(anyhow!(ConfigError::MalformedRule(format!("unknown call kind {other:?}")))),
    })
}

/// Per-method scratch state while translating one `MethodDoc`.
struct MethodCtx {
    id: MethodId,
    vars_by_name: HashMap<String, VarId>,
    stmt_base: usize,
}

fn eval_expr_doc(doc: &IntExprDoc, ctx: &MethodCtx) -> Result<IntExpr> {
    Ok(match doc {
        IntExprDoc::Const { value } => IntExpr::Const(*value),
        IntExprDoc::Var { name } => IntExpr::Var(lookup_var(ctx, name)?),
        IntExprDoc::Binary { op, lhs, rhs } => {
            IntExpr::Binary(parse_bin_op(op)?, Box::new(eval_expr_doc(lhs, ctx)?), Box::new(eval_expr_doc(rhs, ctx)?))
        }
    })
}

fn lookup_var(ctx: &MethodCtx, name: &str) -> Result<VarId> {
    ctx.vars_by_name
        .get(name)
        .copied()
        .ok_or_else(|| anyhow!(ConfigError::UnknownVariable(format!("{name:?} in method {:?}", ctx.id))))
}

fn find_field(builder_fields: &HashMap<(String, String), FieldId>, class: &str, name: &str) -> Result<FieldId> {
    builder_fields
        .get(&(class.to_string(), name.to_string()))
        .copied()
        .ok_or_else(|| anyhow!(ConfigError::UnknownField(format!("{class}.{name}"))))
}

fn find_method(methods_by_sig: &HashMap<(String, String), MethodId>, class: &str, subsig: &str) -> Result<MethodId> {
    methods_by_sig
        .get(&(class.to_string(), subsig.to_string()))
        .copied()
        .ok_or_else(|| anyhow!(ConfigError::UnknownMethod(format!("{class}::{subsig}"))))
}

/// Loads a `Program` from the flat JSON schema this crate's CLI accepts (spec.md §6
/// "IR interface"). Real deployments would instead drive `ProgramBuilder` from a
/// language front end; this loader exists so `bin/cspta.rs` has a concrete input format.
pub fn load_program(path: &Path) -> Result<Program> {
    let text = fs::read_to_string(path).with_context(|| format!("reading program file {}", path.display()))?;
    let doc: ProgramDoc = serde_json::from_str(&text).with_context(|| format!("parsing program file {}", path.display()))?;

    let mut builder = ProgramBuilder::new();
    let mut classes_by_name: HashMap<String, ClassId> = HashMap::new();

    // Pass 1: classes (without resolving super/interfaces yet, so forward refs work).
    for class_doc in &doc.classes {
        let id = builder.add_class(class_doc.name.clone(), None, Vec::new(), class_doc.is_interface, class_doc.is_abstract);
        classes_by_name.insert(class_doc.name.clone(), id);
    }

    let mut fields_by_name: HashMap<(String, String), FieldId> = HashMap::new();
    for class_doc in &doc.classes {
        let class_id = classes_by_name[&class_doc.name];
        for field_doc in &class_doc.fields {
            let field_id = builder.add_field(field_doc.name.clone(), class_id, field_doc.is_static);
            fields_by_name.insert((class_doc.name.clone(), field_doc.name.clone()), field_id);
        }
    }

    // Pass 2: fix up super_class/interfaces now that every class has an id.
    for class_doc in &doc.classes {
        if let Some(super_name) = &class_doc.super_class {
            let super_id = *classes_by_name
                .get(super_name)
                .ok_or_else(|| anyhow!(ConfigError::UnknownClass(format!("unknown superclass {super_name:?}"))))?;
            builder.set_super_class(classes_by_name[&class_doc.name], super_id);
        }
        for iface_name in &class_doc.interfaces {
            let iface_id = *classes_by_name
                .get(iface_name)
                .ok_or_else(|| anyhow!(ConfigError::UnknownClass(format!("unknown interface {iface_name:?}"))))?;
            builder.add_interface(classes_by_name[&class_doc.name], iface_id);
        }
    }

    // Methods: declare all of them first (so call sites can reference methods declared
    // later in the file), then fill in bodies.
    let mut methods_by_sig: HashMap<(String, String), MethodId> = HashMap::new();
    for method_doc in &doc.methods {
        let class_id = *classes_by_name
            .get(&method_doc.class)
            .ok_or_else(|| anyhow!(ConfigError::UnknownClass(format!("{:?}", method_doc.class))))?;
        let id = builder.add_method(method_doc.name.clone(), method_doc.subsignature.clone(), class_id, method_doc.is_static, method_doc.is_abstract);
        methods_by_sig.insert((method_doc.class.clone(), method_doc.subsignature.clone()), id);
    }

    let mut global_stmt_counter = 0usize;
    let mut entry_method = None;
    for method_doc in &doc.methods {
        let method_id = methods_by_sig[&(method_doc.class.clone(), method_doc.subsignature.clone())];
        let mut vars_by_name = HashMap::new();
        for var_doc in &method_doc.vars {
            let ty = match &var_doc.ty {
                TypeTagDoc::Ref { class } => TypeTag::Ref(
                    *classes_by_name
                        .get(class)
                        .ok_or_else(|| anyhow!(ConfigError::UnknownClass(format!("{class:?}"))))?,
                ),
                TypeTagDoc::Int => TypeTag::Int,
                TypeTagDoc::Other => TypeTag::Other,
            };
            let var_id = builder.add_var(var_doc.name.clone(), method_id, ty);
            vars_by_name.insert(var_doc.name.clone(), var_id);
        }
        let ctx = MethodCtx {
            id: method_id,
            vars_by_name,
            stmt_base: global_stmt_counter,
        };

        if let Some(this_name) = &method_doc.this_var {
            builder.set_this_var(method_id, lookup_var(&ctx, this_name)?);
        }
        for param_name in &method_doc.params {
            let param_id = lookup_var(&ctx, param_name)?;
            builder.add_param(method_id, param_id);
        }

        let mut stmt_ids = Vec::with_capacity(method_doc.stmts.len());
        for stmt_doc in &method_doc.stmts {
            let stmt = match stmt_doc {
                StmtDoc::New { lhs, class } => Stmt::New {
                    lhs: lookup_var(&ctx, lhs)?,
                    alloc_class: *classes_by_name
                        .get(class)
                        .ok_or_else(|| anyhow!(ConfigError::UnknownClass(format!("{class:?}"))))?,
                },
                StmtDoc::Copy { lhs, rhs } => Stmt::Copy { lhs: lookup_var(&ctx, lhs)?, rhs: lookup_var(&ctx, rhs)? },
                StmtDoc::StoreStaticField { field, field_class, rhs } => Stmt::StoreStaticField {
                    field: find_field(&fields_by_name, field_class, field)?,
                    rhs: lookup_var(&ctx, rhs)?,
                },
                StmtDoc::LoadStaticField { lhs, field, field_class } => Stmt::LoadStaticField {
                    lhs: lookup_var(&ctx, lhs)?,
                    field: find_field(&fields_by_name, field_class, field)?,
                },
                StmtDoc::StoreInstanceField { base, field, field_class, rhs } => Stmt::StoreInstanceField {
                    base: lookup_var(&ctx, base)?,
                    field: find_field(&fields_by_name, field_class, field)?,
                    rhs: lookup_var(&ctx, rhs)?,
                },
                StmtDoc::LoadInstanceField { lhs, base, field, field_class } => Stmt::LoadInstanceField {
                    lhs: lookup_var(&ctx, lhs)?,
                    base: lookup_var(&ctx, base)?,
                    field: find_field(&fields_by_name, field_class, field)?,
                },
                StmtDoc::StoreArray { base, index, rhs } => Stmt::StoreArray {
                    base: lookup_var(&ctx, base)?,
                    index: lookup_var(&ctx, index)?,
                    rhs: lookup_var(&ctx, rhs)?,
                },
                StmtDoc::LoadArray { lhs, base, index } => Stmt::LoadArray {
                    lhs: lookup_var(&ctx, lhs)?,
                    base: lookup_var(&ctx, base)?,
                    index: lookup_var(&ctx, index)?,
                },
                StmtDoc::DefineInt { lhs, expr } => Stmt::DefineInt { lhs: lookup_var(&ctx, lhs)?, expr: eval_expr_doc(expr, &ctx)? },
                StmtDoc::Invoke { kind, callee_class, callee_subsig, receiver, args, lhs } => Stmt::Invoke(InvokeStmt {
                    kind: parse_call_kind(kind)?,
                    declared_callee: find_method(&methods_by_sig, callee_class, callee_subsig)?,
                    receiver: receiver.as_ref().map(|v| lookup_var(&ctx, v)).transpose()?,
                    args: args.iter().map(|v| lookup_var(&ctx, v)).collect::<Result<_>>()?,
                    lhs: lhs.as_ref().map(|v| lookup_var(&ctx, v)).transpose()?,
                }),
                StmtDoc::Return { var } => Stmt::Return(var.as_ref().map(|v| lookup_var(&ctx, v)).transpose()?),
                StmtDoc::Goto { .. } => Stmt::Goto,
                StmtDoc::If { cond, .. } => Stmt::If { cond: lookup_var(&ctx, cond)? },
            };
            let stmt_id = builder.add_stmt(method_id, stmt);
            stmt_ids.push(stmt_id);
            global_stmt_counter += 1;
        }

        for (local_idx, stmt_doc) in method_doc.stmts.iter().enumerate() {
            match stmt_doc {
                StmtDoc::Goto { target } => {
                    builder.set_successors(method_id, stmt_ids[local_idx], vec![crate::ir::StmtId::new(ctx.stmt_base + target)]);
                }
                StmtDoc::If { targets, .. } => {
                    let succs = targets.iter().map(|&t| crate::ir::StmtId::new(ctx.stmt_base + t)).collect();
                    builder.set_successors(method_id, stmt_ids[local_idx], succs);
                }
                StmtDoc::Return { .. } => {
                    builder.set_successors(method_id, stmt_ids[local_idx], Vec::new());
                }
                _ => {}
            }
        }

        if format!("{}::{}", method_doc.class, method_doc.subsignature) == doc.entry_method || method_doc.subsignature == doc.entry_method {
            entry_method = Some(method_id);
        }
    }

    let entry_method = entry_method.ok_or_else(|| anyhow!(ConfigError::UnknownMethod(format!("entry method {:?} not found", doc.entry_method))))?;
    Ok(builder.finish(entry_method))
}
