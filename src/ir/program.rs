// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

use std::collections::HashMap;

use crate::util::index::newtype_index;

newtype_index! {
    /// Identifies a class (or interface) declared in the analyzed program.
    pub struct ClassId;
}
newtype_index! {
    /// Identifies a field, either instance or static.
    pub struct FieldId;
}
newtype_index! {
    /// Identifies a method. Distinct overrides in distinct classes get distinct ids;
    /// `ClassHierarchy` is what relates them back to each other.
    pub struct MethodId;
}
newtype_index! {
    /// Identifies a local variable (including `this` and formal parameters), scoped to
    /// the method that declares it.
    pub struct VarId;
}
newtype_index! {
    /// Identifies a statement. Ids are unique across the whole program, not just within
    /// a method, so that the ICFG (`icp::Icfg`) can use them directly as node ids.
    pub struct StmtId;
}

/// The type of a variable, to the (coarse) precision the analyses need: is it a
/// reference that pointer analysis should track, a primitive integer that constant
/// propagation should track, or neither.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum TypeTag {
    Ref(ClassId),
    Int,
    Other,
}

/// The arithmetic/bitwise/shift/comparison operators `icp::transfer::evaluate`
/// interprets over the constant-propagation lattice (spec.md §4.9 `evaluate`).
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    UShr,
    And,
    Or,
    Xor,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// The integer-valued expression surface `ConstPropTransfer::evaluate` interprets.
/// Reference-typed expressions don't need this: a `Copy` statement is enough for the
/// pointer analysis, which never evaluates arithmetic.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum IntExpr {
    Const(i64),
    Var(VarId),
    Binary(BinOp, Box<IntExpr>, Box<IntExpr>),
}

#[derive(Clone, Debug)]
pub struct Class {
    pub name: String,
    pub super_class: Option<ClassId>,
    pub interfaces: Vec<ClassId>,
    pub is_interface: bool,
    pub is_abstract: bool,
    pub fields: Vec<FieldId>,
    pub methods: Vec<MethodId>,
}

#[derive(Clone, Debug)]
pub struct Field {
    pub name: String,
    pub declaring_class: ClassId,
    pub is_static: bool,
}

#[derive(Clone, Debug)]
pub struct Var {
    pub name: String,
    pub method: MethodId,
    pub ty: TypeTag,
}

/// The dispatch mechanism through which an `InvokeStmt` selects its callee; mirrors
/// spec.md's `CallKind` on call-graph edges.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum CallKind {
    Static,
    Special,
    Virtual,
    Interface,
    Dynamic,
}

#[derive(Clone, Debug)]
pub struct InvokeStmt {
    pub kind: CallKind,
    /// The statically declared target: for `Static`/`Special` this is the call's
    /// actual callee; for `Virtual`/`Interface` it is the declared method that
    /// `ClassHierarchy::resolve_callee` re-dispatches from the receiver's runtime type.
    pub declared_callee: MethodId,
    pub receiver: Option<VarId>,
    pub args: Vec<VarId>,
    pub lhs: Option<VarId>,
}

#[derive(Clone, Debug)]
pub enum Stmt {
    /// `x = new T`
    New { lhs: VarId, alloc_class: ClassId },
    /// `x = y`
    Copy { lhs: VarId, rhs: VarId },
    /// `C.f = y`
    StoreStaticField { field: FieldId, rhs: VarId },
    /// `x = C.f`
    LoadStaticField { lhs: VarId, field: FieldId },
    /// `base.f = y`
    StoreInstanceField { base: VarId, field: FieldId, rhs: VarId },
    /// `x = base.f`
    LoadInstanceField { lhs: VarId, base: VarId, field: FieldId },
    /// `base[index] = y`. Pointer analysis treats array cells as field-insensitive in
    /// the index dimension; `index` is carried only for `ConstPropTransfer`, which
    /// folds it against the constant-propagation lattice (spec.md §4.9).
    StoreArray { base: VarId, index: VarId, rhs: VarId },
    /// `x = base[index]`
    LoadArray { lhs: VarId, base: VarId, index: VarId },
    /// `v = e`, an arithmetic/bitwise/comparison definition of an integer-holding
    /// local (spec.md §4.9). Kept distinct from `Copy` because `Copy` is also used
    /// for reference-typed assignments the pointer analysis must see.
    DefineInt { lhs: VarId, expr: IntExpr },
    Invoke(InvokeStmt),
    Return(Option<VarId>),
    /// Unconditional control transfer, used only to shape the intraprocedural CFG.
    Goto,
    /// Conditional branch on an integer-valued variable; both successors are reachable
    /// regardless of `cond`'s value (constant propagation narrows `cond` but never
    /// prunes infeasible branches -- no path sensitivity, per spec.md Non-goals).
    If { cond: VarId },
}

#[derive(Clone, Debug)]
pub struct Method {
    pub name: String,
    pub subsignature: String,
    pub declaring_class: ClassId,
    pub is_static: bool,
    pub is_abstract: bool,
    pub this_var: Option<VarId>,
    pub params: Vec<VarId>,
    pub stmts: Vec<StmtId>,
    /// Explicit intraprocedural successor edges, keyed by statement. Defaults to
    /// "next statement in `stmts`" except where `Goto`/`If`/`Return` say otherwise.
    pub successors: HashMap<StmtId, Vec<StmtId>>,
}

impl Method {
    pub fn entry_stmt(&self) -> Option<StmtId> {
        self.stmts.first().copied()
    }

    pub fn successors_of(&self, stmt: StmtId) -> &[StmtId] {
        self.successors.get(&stmt).map(|v| v.as_slice()).unwrap_or(&[])
    }
}

/// A whole analyzed program: its classes, methods, statements, and a designated entry
/// method (spec.md's `mainMethod`).
#[derive(Clone, Debug)]
pub struct Program {
    pub classes: Vec<Class>,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
    pub vars: Vec<Var>,
    pub stmts: Vec<Stmt>,
    pub entry_method: MethodId,
    /// Reverse index from a variable to every statement that uses it as a receiver,
    /// array base, or invoke argument (spec.md §6: "Var exposes ... uses (reverse index
    /// at invoke/load/store-field/load/store-array)"). Built once in `ProgramBuilder::finish`
    /// so the solver never re-derives it by scanning method bodies on every points-to update.
    var_uses: HashMap<VarId, Vec<StmtId>>,
}

impl Program {
    pub fn class(&self, id: ClassId) -> &Class {
        &self.classes[id.index()]
    }
    pub fn field(&self, id: FieldId) -> &Field {
        &self.fields[id.index()]
    }
    pub fn method(&self, id: MethodId) -> &Method {
        &self.methods[id.index()]
    }
    pub fn var(&self, id: VarId) -> &Var {
        &self.vars[id.index()]
    }
    pub fn stmt(&self, id: StmtId) -> &Stmt {
        &self.stmts[id.index()]
    }

    /// Every statement that reads `var` as a receiver, array base, or (for `Invoke`)
    /// an argument -- the handful of places a points-to update to `var` can trigger
    /// re-evaluation. Instance `Copy`/def sites aren't included: those are driven by
    /// the PFG, not by re-scanning on every points-to change.
    pub fn uses_of(&self, var: VarId) -> &[StmtId] {
        self.var_uses.get(&var).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// The method a statement belongs to. Statement ids are global, so this is a
    /// linear scan over methods; fine for the program sizes this crate targets
    /// (callers that need this on a hot path should cache it themselves).
    pub fn owning_method(&self, stmt: StmtId) -> MethodId {
        self.methods
            .iter()
            .position(|m| m.stmts.contains(&stmt))
            .map(MethodId::new)
            .expect("statement id not found in any method")
    }

    /// Walks from `class` through superclasses, returning the first non-abstract
    /// method whose subsignature matches. Used by `ClassHierarchy::dispatch`.
    pub fn dispatch(&self, class: ClassId, subsignature: &str) -> Option<MethodId> {
        let mut cur = Some(class);
        while let Some(c) = cur {
            let class_decl = self.class(c);
            if let Some(&m) = class_decl
                .methods
                .iter()
                .find(|&&m| self.method(m).subsignature == subsignature && !self.method(m).is_abstract)
            {
                return Some(m);
            }
            cur = class_decl.super_class;
        }
        None
    }
}

/// Incrementally assembles a `Program`. Real deployments would drive this from a
/// parser; tests drive it by hand to build the small fixture programs in spec.md §8.
#[derive(Default)]
pub struct ProgramBuilder {
    classes: Vec<Class>,
    fields: Vec<Field>,
    methods: Vec<Method>,
    vars: Vec<Var>,
    stmts: Vec<Stmt>,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_class(
        &mut self,
        name: impl Into<String>,
        super_class: Option<ClassId>,
        interfaces: Vec<ClassId>,
        is_interface: bool,
        is_abstract: bool,
    ) -> ClassId {
        let id = ClassId::new(self.classes.len());
        self.classes.push(Class {
            name: name.into(),
            super_class,
            interfaces,
            is_interface,
            is_abstract,
            fields: Vec::new(),
            methods: Vec::new(),
        });
        id
    }

    /// Fixes up a class's supertype after construction (`config::load_program` declares
    /// every class up front, so forward-referenced supertypes can't be set at `add_class` time).
    pub fn set_super_class(&mut self, class: ClassId, super_class: ClassId) {
        self.classes[class.index()].super_class = Some(super_class);
    }

    pub fn add_interface(&mut self, class: ClassId, interface: ClassId) {
        self.classes[class.index()].interfaces.push(interface);
    }

    pub fn add_field(&mut self, name: impl Into<String>, declaring_class: ClassId, is_static: bool) -> FieldId {
        let id = FieldId::new(self.fields.len());
        self.fields.push(Field {
            name: name.into(),
            declaring_class,
            is_static,
        });
        self.classes[declaring_class.index()].fields.push(id);
        id
    }

    pub fn add_var(&mut self, name: impl Into<String>, method: MethodId, ty: TypeTag) -> VarId {
        let id = VarId::new(self.vars.len());
        self.vars.push(Var {
            name: name.into(),
            method,
            ty,
        });
        id
    }

    pub fn add_method(
        &mut self,
        name: impl Into<String>,
        subsignature: impl Into<String>,
        declaring_class: ClassId,
        is_static: bool,
        is_abstract: bool,
    ) -> MethodId {
        let id = MethodId::new(self.methods.len());
        self.methods.push(Method {
            name: name.into(),
            subsignature: subsignature.into(),
            declaring_class,
            is_static,
            is_abstract,
            this_var: None,
            params: Vec::new(),
            stmts: Vec::new(),
            successors: HashMap::new(),
        });
        self.classes[declaring_class.index()].methods.push(id);
        id
    }

    pub fn set_this_var(&mut self, method: MethodId, var: VarId) {
        self.methods[method.index()].this_var = Some(var);
    }

    pub fn add_param(&mut self, method: MethodId, var: VarId) {
        self.methods[method.index()].params.push(var);
    }

    /// Appends `stmt` to the end of `method`'s statement list, chaining it from the
    /// previous statement unless the previous statement already has explicit
    /// successors (e.g. it was a `Goto`/`If`/`Return`).
    pub fn add_stmt(&mut self, method: MethodId, stmt: Stmt) -> StmtId {
        let id = StmtId::new(self.stmts.len());
        self.stmts.push(stmt);
        let m = &mut self.methods[method.index()];
        if let Some(&prev) = m.stmts.last() {
            m.successors.entry(prev).or_insert_with(|| vec![id]);
        }
        m.stmts.push(id);
        id
    }

    /// Overrides the successor set of `stmt` (for `Goto`/`If` targets that jump
    /// elsewhere than "the next statement").
    pub fn set_successors(&mut self, method: MethodId, stmt: StmtId, succs: Vec<StmtId>) {
        self.methods[method.index()].successors.insert(stmt, succs);
    }

    pub fn finish(self, entry_method: MethodId) -> Program {
        let mut var_uses: HashMap<VarId, Vec<StmtId>> = HashMap::new();
        for (i, stmt) in self.stmts.iter().enumerate() {
            let id = StmtId::new(i);
            let used_vars: Vec<VarId> = match stmt {
                Stmt::StoreInstanceField { base, .. } | Stmt::LoadInstanceField { base, .. } => vec![*base],
                Stmt::StoreArray { base, index, .. } | Stmt::LoadArray { base, index, .. } => vec![*base, *index],
                Stmt::Invoke(invoke) => invoke.receiver.into_iter().chain(invoke.args.iter().copied()).collect(),
                _ => Vec::new(),
            };
            for var in used_vars {
                var_uses.entry(var).or_default().push(id);
            }
        }
        Program {
            classes: self.classes,
            fields: self.fields,
            methods: self.methods,
            vars: self.vars,
            stmts: self.stmts,
            entry_method,
            var_uses,
        }
    }
}
