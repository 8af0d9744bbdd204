// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! The context-sensitive entities of spec.md §3: `CSObj`, `CSVar`, `InstanceField`,
//! `StaticField`, `ArrayIndex`, `CSMethod`, `CSCallSite`, and the `Pointer` tagged union
//! over the first four. Every one of these is a plain, structurally-equal value; it is
//! `CSManager` (`manager.rs`) that canonicalizes them into stable handles so "pointer
//! equality ≡ structural equality" holds the way spec.md §3 requires.

use crate::context::ContextId;
use crate::heap::Obj;
use crate::ir::{FieldId, MethodId, StmtId, VarId};
use crate::util::index::newtype_index;

newtype_index! {
    pub struct CSObjId;
}
newtype_index! {
    pub struct CSVarId;
}
newtype_index! {
    pub struct InstanceFieldId;
}
newtype_index! {
    pub struct StaticFieldId;
}
newtype_index! {
    pub struct ArrayIndexId;
}
newtype_index! {
    pub struct CSMethodId;
}
newtype_index! {
    pub struct CSCallSiteId;
}

/// A heap object paired with the context it was allocated under.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct CSObj {
    pub heap_ctx: ContextId,
    pub obj: Obj,
}

/// A local variable paired with the context of the method it lives in.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct CSVar {
    pub ctx: ContextId,
    pub var: VarId,
}

/// `(o.f)` for a context-sensitive heap object `o` and instance field `f`.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct InstanceField {
    pub base: CSObjId,
    pub field: FieldId,
}

/// `C.f` for a static field `f`. Static fields carry no context of their own.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct StaticField {
    pub field: FieldId,
}

/// `o[_]`, field-insensitive in the index dimension (spec.md §3).
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct ArrayIndex {
    pub array: CSObjId,
}

/// A method paired with the context it is analyzed under.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct CSMethod {
    pub ctx: ContextId,
    pub method: MethodId,
}

/// An `InvokeStmt` paired with the context of its enclosing method.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct CSCallSite {
    pub ctx: ContextId,
    pub stmt: StmtId,
}

/// The tagged union every points-to set and worklist entry is keyed on (spec.md §3).
/// Each variant owns a monotonic points-to set, keyed directly on `Pointer` itself in
/// the solver's `pt: HashMap<Pointer, _>` -- no separate canonicalized id for it.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Pointer {
    Var(CSVarId),
    InstanceField(InstanceFieldId),
    StaticField(StaticFieldId),
    ArrayIndex(ArrayIndexId),
}
