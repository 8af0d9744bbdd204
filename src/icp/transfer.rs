// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! `ConstPropTransfer` (spec.md §4.9): the lattice, the per-statement transfer
//! functions, and `evaluate`, the recursive interpreter over `IntExpr`. This is the
//! one `IcpAnalysis` implementation the crate ships; `icp::Solver` is generic so a
//! different analysis could be dropped in without touching the fixed-point engine.
//!
//! Field/array aliasing queries the *collapsed* pointer-analysis result (spec.md §6:
//! "(may-be-context-collapsed) points-to set"): context is erased down to plain `Obj`
//! so one `(Obj, Field)`/`(Obj, index)` cell is shared by every calling context, which
//! is what lets a store under one context be observed by a load under another.

use std::collections::{HashMap, HashSet};

use crate::cs::{CSManager, Pointer};
use crate::cs::{CSObjId, CSVarId};
use crate::heap::Obj;
use crate::icfg::{Edge, Icfg};
use crate::icp::{ExtraWork, IcpAnalysis};
use crate::ir::{BinOp, FieldId, IntExpr, Program, Stmt, StmtId, TypeTag, VarId};
use crate::pts_set::{HashPointsToSet, PointsToSet};

/// The three-point chain `UNDEF ⊑ CONST(k) ⊑ NAC` (spec.md §3).
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Value {
    Undef,
    Const(i64),
    Nac,
}

impl Value {
    pub fn meet(self, other: Value) -> Value {
        match (self, other) {
            (Value::Undef, v) | (v, Value::Undef) => v,
            (Value::Nac, _) | (_, Value::Nac) => Value::Nac,
            (Value::Const(a), Value::Const(b)) => {
                if a == b {
                    Value::Const(a)
                } else {
                    Value::Nac
                }
            }
        }
    }
}

/// `Fact = Var -> Value`; a missing key is `UNDEF` (spec.md §3).
#[derive(Clone, PartialEq, Debug, Default)]
pub struct Fact {
    values: HashMap<VarId, Value>,
}

impl Fact {
    pub fn get(&self, var: VarId) -> Value {
        self.values.get(&var).copied().unwrap_or(Value::Undef)
    }

    /// Returns `true` iff this changed the stored value.
    pub fn set(&mut self, var: VarId, value: Value) -> bool {
        if self.get(var) == value {
            return false;
        }
        self.values.insert(var, value);
        true
    }

    pub fn remove(&mut self, var: VarId) {
        self.values.remove(&var);
    }

    pub fn iter(&self) -> impl Iterator<Item = (VarId, Value)> + '_ {
        self.values.iter().map(|(&v, &val)| (v, val))
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
enum IndexKey {
    Const(i64),
    Nac,
}

impl IndexKey {
    fn from_value(v: Value) -> Option<IndexKey> {
        match v {
            Value::Const(k) => Some(IndexKey::Const(k)),
            Value::Nac => Some(IndexKey::Nac),
            Value::Undef => None,
        }
    }

    fn matches(self, other: Value) -> bool {
        match (self, other) {
            (IndexKey::Nac, _) | (_, Value::Nac) => true,
            (IndexKey::Const(a), Value::Const(b)) => a == b,
            (IndexKey::Const(_), Value::Undef) => false,
        }
    }
}

/// Recursively evaluates `expr` against `fact` (spec.md §4.9 `evaluate`).
pub fn evaluate(expr: &IntExpr, fact: &Fact) -> Value {
    match expr {
        IntExpr::Const(k) => Value::Const(*k),
        IntExpr::Var(v) => fact.get(*v),
        IntExpr::Binary(op, l, r) => eval_binary(*op, evaluate(l, fact), evaluate(r, fact)),
    }
}

fn eval_binary(op: BinOp, l: Value, r: Value) -> Value {
    // Division by zero dominates both UNDEF and NAC.
    if matches!(op, BinOp::Div | BinOp::Rem) && matches!(r, Value::Const(0)) {
        return Value::Undef;
    }
    // An UNDEF operand in an otherwise-defined expression yields UNDEF; otherwise NAC
    // propagates (spec.md §4.9 -- note UNDEF dominates NAC here, the opposite of the
    // usual dataflow convention).
    if matches!(l, Value::Undef) || matches!(r, Value::Undef) {
        return Value::Undef;
    }
    let (Value::Const(a), Value::Const(b)) = (l, r) else {
        return Value::Nac;
    };
    match op {
        BinOp::Add => Value::Const(a.wrapping_add(b)),
        BinOp::Sub => Value::Const(a.wrapping_sub(b)),
        BinOp::Mul => Value::Const(a.wrapping_mul(b)),
        BinOp::Div => Value::Const(a.wrapping_div(b)),
        BinOp::Rem => Value::Const(a.wrapping_rem(b)),
        BinOp::Shl => Value::Const(a.wrapping_shl(b as u32)),
        BinOp::Shr => Value::Const(a.wrapping_shr(b as u32)),
        BinOp::UShr => Value::Const((a as u64).wrapping_shr(b as u32) as i64),
        BinOp::And => Value::Const(a & b),
        BinOp::Or => Value::Const(a | b),
        BinOp::Xor => Value::Const(a ^ b),
        BinOp::Eq => Value::Const((a == b) as i64),
        BinOp::Ne => Value::Const((a != b) as i64),
        BinOp::Lt => Value::Const((a < b) as i64),
        BinOp::Le => Value::Const((a <= b) as i64),
        BinOp::Gt => Value::Const((a > b) as i64),
        BinOp::Ge => Value::Const((a >= b) as i64),
    }
}

/// Field/array transfer rules plus the global, cross-context alias state they read
/// and update (spec.md §4.9: the static-field map, the `(o, f)` instance-field map,
/// and the `(o, index)` array map).
pub struct ConstPropTransfer<'p> {
    program: &'p Program,
    collapsed_pts: HashMap<VarId, HashSet<Obj>>,
    aliases_by_obj: HashMap<Obj, HashSet<VarId>>,
    static_loads_by_field: HashMap<FieldId, Vec<StmtId>>,
    static_field_map: HashMap<FieldId, Value>,
    instance_field_map: HashMap<(Obj, FieldId), Value>,
    array_map: HashMap<Obj, HashMap<IndexKey, Value>>,
}

impl<'p> ConstPropTransfer<'p> {
    /// Builds the collapsed alias index from a finished CS-PTA solve (spec.md §6: the
    /// pointer-analysis result ICP queries for field/array aliasing).
    pub fn new(program: &'p Program, cs_mgr: &CSManager, pt: &HashMap<Pointer, HashPointsToSet<CSObjId>>) -> Self {
        let mut collapsed_pts: HashMap<VarId, HashSet<Obj>> = HashMap::new();
        let mut aliases_by_obj: HashMap<Obj, HashSet<VarId>> = HashMap::new();
        for (ptr, set) in pt {
            let cs_var_id: CSVarId = match ptr {
                Pointer::Var(v) => *v,
                _ => continue,
            };
            let var = cs_mgr.cs_var(cs_var_id).var;
            for o in set.iter() {
                let obj = cs_mgr.cs_obj(*o).obj;
                collapsed_pts.entry(var).or_default().insert(obj);
                aliases_by_obj.entry(obj).or_default().insert(var);
            }
        }

        let mut static_loads_by_field: HashMap<FieldId, Vec<StmtId>> = HashMap::new();
        for i in 0..program.stmts.len() {
            let id = StmtId::new(i);
            if let Stmt::LoadStaticField { field, .. } = program.stmt(id) {
                static_loads_by_field.entry(*field).or_default().push(id);
            }
        }

        ConstPropTransfer {
            program,
            collapsed_pts,
            aliases_by_obj,
            static_loads_by_field,
            static_field_map: HashMap::new(),
            instance_field_map: HashMap::new(),
            array_map: HashMap::new(),
        }
    }

    fn pts_of(&self, var: VarId) -> Vec<Obj> {
        self.collapsed_pts.get(&var).into_iter().flatten().copied().collect()
    }

    fn aliases_of(&self, obj: Obj) -> Vec<VarId> {
        self.aliases_by_obj.get(&obj).into_iter().flatten().copied().collect()
    }

    fn static_field_meet(&mut self, field: FieldId, val: Value) -> bool {
        let entry = self.static_field_map.entry(field).or_insert(Value::Undef);
        let merged = entry.meet(val);
        let changed = *entry != merged;
        *entry = merged;
        changed
    }

    fn instance_field_meet(&mut self, obj: Obj, field: FieldId, val: Value) -> bool {
        let entry = self.instance_field_map.entry((obj, field)).or_insert(Value::Undef);
        let merged = entry.meet(val);
        let changed = *entry != merged;
        *entry = merged;
        changed
    }

    fn array_meet(&mut self, obj: Obj, key: IndexKey, val: Value) -> bool {
        let inner = self.array_map.entry(obj).or_default();
        let entry = inner.entry(key).or_insert(Value::Undef);
        let merged = entry.meet(val);
        let changed = *entry != merged;
        *entry = merged;
        changed
    }

    fn is_int_var(&self, var: VarId) -> bool {
        matches!(self.program.var(var).ty, TypeTag::Int)
    }

    fn enqueue_instance_load_aliases(&self, obj: Obj, field: FieldId, extra: &mut ExtraWork) {
        for alias_var in self.aliases_of(obj) {
            for &stmt in self.program.uses_of(alias_var) {
                if let Stmt::LoadInstanceField { base, field: f, .. } = self.program.stmt(stmt) {
                    if *base == alias_var && *f == field {
                        extra.add_to_work_list(stmt);
                    }
                }
            }
        }
    }

    fn enqueue_array_load_aliases(&self, obj: Obj, extra: &mut ExtraWork) {
        for alias_var in self.aliases_of(obj) {
            for &stmt in self.program.uses_of(alias_var) {
                if let Stmt::LoadArray { base, .. } = self.program.stmt(stmt) {
                    if *base == alias_var {
                        extra.add_to_work_list(stmt);
                    }
                }
            }
        }
    }
}

impl<'p> IcpAnalysis for ConstPropTransfer<'p> {
    type Fact = Fact;

    fn new_initial_fact(&self) -> Fact {
        Fact::default()
    }

    fn new_boundary_fact(&self, _icfg: &Icfg, entry: StmtId) -> Fact {
        let method_id = self.program.owning_method(entry);
        let mut fact = Fact::default();
        for &param in &self.program.method(method_id).params {
            if self.is_int_var(param) {
                fact.set(param, Value::Nac);
            }
        }
        fact
    }

    fn meet_into(&self, from: &Fact, target: &mut Fact) -> bool {
        let mut changed = false;
        for (var, val) in from.iter() {
            let merged = target.get(var).meet(val);
            if target.set(var, merged) {
                changed = true;
            }
        }
        changed
    }

    fn transfer_node(&mut self, _icfg: &Icfg, node: StmtId, in_fact: &Fact, out: &mut Fact, extra: &mut ExtraWork) -> bool {
        let mut new_out = in_fact.clone();
        match self.program.stmt(node).clone() {
            Stmt::DefineInt { lhs, expr } => {
                if self.is_int_var(lhs) {
                    let v = evaluate(&expr, in_fact);
                    new_out.set(lhs, v);
                }
            }
            Stmt::StoreStaticField { field, rhs } => {
                let rhs_val = in_fact.get(rhs);
                if self.static_field_meet(field, rhs_val) {
                    for &stmt in self.static_loads_by_field.get(&field).into_iter().flatten() {
                        extra.add_to_work_list(stmt);
                    }
                }
            }
            Stmt::LoadStaticField { lhs, field } => {
                let v = self.static_field_map.get(&field).copied().unwrap_or(Value::Undef);
                new_out.set(lhs, v);
            }
            Stmt::StoreInstanceField { base, field, rhs } => {
                let rhs_val = in_fact.get(rhs);
                for obj in self.pts_of(base) {
                    if self.instance_field_meet(obj, field, rhs_val) {
                        self.enqueue_instance_load_aliases(obj, field, extra);
                    }
                }
            }
            Stmt::LoadInstanceField { lhs, base, field } => {
                let mut acc = Value::Undef;
                for obj in self.pts_of(base) {
                    let v = self.instance_field_map.get(&(obj, field)).copied().unwrap_or(Value::Undef);
                    acc = acc.meet(v);
                }
                new_out.set(lhs, acc);
            }
            Stmt::StoreArray { base, index, rhs } => {
                let iv = in_fact.get(index);
                if let Some(key) = IndexKey::from_value(iv) {
                    let rhs_val = in_fact.get(rhs);
                    for obj in self.pts_of(base) {
                        if self.array_meet(obj, key, rhs_val) {
                            self.enqueue_array_load_aliases(obj, extra);
                        }
                    }
                }
            }
            Stmt::LoadArray { lhs, base, index } => {
                let iv = in_fact.get(index);
                if !matches!(iv, Value::Undef) {
                    let mut acc = Value::Undef;
                    for obj in self.pts_of(base) {
                        if let Some(inner) = self.array_map.get(&obj) {
                            for (&k, &v) in inner {
                                if k.matches(iv) {
                                    acc = acc.meet(v);
                                }
                            }
                        }
                    }
                    new_out.set(lhs, acc);
                }
            }
            // Copy, Invoke, Return, Goto, If, New: identity (spec.md §4.9 "all other
            // nodes"). `Copy` never carries int semantics here: an int-valued copy is
            // expressed as `DefineInt { expr: IntExpr::Var(y), .. } `.
            _ => {}
        }
        let changed = *out != new_out;
        *out = new_out;
        changed
    }

    fn transfer_edge(&self, edge: &Edge, out_of_source: &Fact) -> Fact {
        match *edge {
            Edge::Normal { .. } => out_of_source.clone(),
            Edge::CallToReturn { call, .. } => {
                let mut f = out_of_source.clone();
                if let Stmt::Invoke(invoke) = self.program.stmt(call) {
                    if let Some(lhs) = invoke.lhs {
                        f.remove(lhs);
                    }
                }
                f
            }
            Edge::Call { call, callee_entry } => {
                let callee_method = self.program.owning_method(callee_entry);
                let params = &self.program.method(callee_method).params;
                let invoke = match self.program.stmt(call) {
                    Stmt::Invoke(invoke) => invoke,
                    _ => panic!("InvariantViolation: CallEdge source is not an Invoke"),
                };
                let mut f = Fact::default();
                for (&param, &arg) in params.iter().zip(invoke.args.iter()) {
                    if self.is_int_var(param) {
                        f.set(param, out_of_source.get(arg));
                    }
                }
                f
            }
            Edge::Return { call, callee_exit, .. } => {
                let invoke = match self.program.stmt(call) {
                    Stmt::Invoke(invoke) => invoke,
                    _ => panic!("InvariantViolation: ReturnEdge target is not a call site"),
                };
                let mut f = Fact::default();
                if let Some(lhs) = invoke.lhs {
                    if self.is_int_var(lhs) {
                        let val = match self.program.stmt(callee_exit) {
                            Stmt::Return(Some(rv)) => out_of_source.get(*rv),
                            _ => Value::Undef,
                        };
                        // spec.md line 167: an int-typed LHS whose return value isn't a
                        // concrete constant widens straight to NAC rather than staying UNDEF.
                        let val = match val {
                            Value::Const(_) => val,
                            _ => Value::Nac,
                        };
                        f.set(lhs, val);
                    }
                }
                f
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meet_is_commutative_and_undef_is_identity() {
        assert_eq!(Value::Undef.meet(Value::Const(5)), Value::Const(5));
        assert_eq!(Value::Const(5).meet(Value::Undef), Value::Const(5));
    }

    #[test]
    fn meet_of_equal_consts_stays_const() {
        assert_eq!(Value::Const(7).meet(Value::Const(7)), Value::Const(7));
    }

    #[test]
    fn meet_of_different_consts_is_nac() {
        assert_eq!(Value::Const(7).meet(Value::Const(8)), Value::Nac);
    }

    #[test]
    fn nac_absorbs_everything() {
        assert_eq!(Value::Nac.meet(Value::Const(1)), Value::Nac);
        assert_eq!(Value::Nac.meet(Value::Undef), Value::Nac);
    }

    #[test]
    fn division_by_zero_yields_undef_not_nac() {
        let fact = Fact::default();
        let expr = IntExpr::Binary(BinOp::Div, Box::new(IntExpr::Const(10)), Box::new(IntExpr::Const(0)));
        assert_eq!(evaluate(&expr, &fact), Value::Undef);
    }

    #[test]
    fn remainder_by_zero_yields_undef() {
        let fact = Fact::default();
        let expr = IntExpr::Binary(BinOp::Rem, Box::new(IntExpr::Const(10)), Box::new(IntExpr::Const(0)));
        assert_eq!(evaluate(&expr, &fact), Value::Undef);
    }

    #[test]
    fn arithmetic_on_two_consts_folds() {
        let fact = Fact::default();
        let expr = IntExpr::Binary(BinOp::Add, Box::new(IntExpr::Const(2)), Box::new(IntExpr::Const(3)));
        assert_eq!(evaluate(&expr, &fact), Value::Const(5));
    }

    #[test]
    fn nac_operand_without_undef_yields_nac() {
        let mut fact = Fact::default();
        fact.set(VarId::new(0), Value::Nac);
        let expr = IntExpr::Binary(BinOp::Add, Box::new(IntExpr::Var(VarId::new(0))), Box::new(IntExpr::Const(3)));
        assert_eq!(evaluate(&expr, &fact), Value::Nac);
    }

    #[test]
    fn undef_operand_dominates_nac() {
        // `fact` has no entry for var 0, so it reads UNDEF -- a still-unreached
        // definition dominates the expression even though `+` could in principle only
        // ever be NAC for an unconstrained variable (spec.md §4.9's explicit carve-out).
        let fact = Fact::default();
        let expr = IntExpr::Binary(BinOp::Add, Box::new(IntExpr::Var(VarId::new(0))), Box::new(IntExpr::Const(3)));
        assert_eq!(evaluate(&expr, &fact), Value::Undef);
    }
}
