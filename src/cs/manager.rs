// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! `CSManager` (spec.md §4.3): the single canonicalization authority for every entity in
//! `entities.rs`. All creation is lazy (entities spring into existence the first time
//! they're asked for) and immortal (nothing is ever evicted), built on the small
//! `InternTable` helper in `util::index` and generalized to every entity kind.
//!
//! Per spec.md §5, the whole core is single-threaded, so the simplest legal
//! implementation -- a manager owned exclusively by the solver during `solve` -- is all
//! this needs; no interior mutability or locking.

use crate::cs::entities::{
    ArrayIndex, ArrayIndexId, CSCallSite, CSCallSiteId, CSMethod, CSMethodId, CSObj, CSObjId, CSVar, CSVarId,
    InstanceField, InstanceFieldId, StaticField, StaticFieldId,
};
use crate::ir::{FieldId, MethodId, StmtId, VarId};
use crate::util::index::InternTable;

#[derive(Default)]
pub struct CSManager {
    cs_objs: InternTable<CSObj, CSObjId>,
    cs_vars: InternTable<CSVar, CSVarId>,
    instance_fields: InternTable<InstanceField, InstanceFieldId>,
    static_fields: InternTable<StaticField, StaticFieldId>,
    array_indices: InternTable<ArrayIndex, ArrayIndexId>,
    cs_methods: InternTable<CSMethod, CSMethodId>,
    cs_call_sites: InternTable<CSCallSite, CSCallSiteId>,
}

impl CSManager {
    pub fn new() -> Self {
        Self::default()
    }

    // -- CSObj ---------------------------------------------------------------------

    pub fn get_or_create_cs_obj(&mut self, heap_ctx: crate::context::ContextId, obj: crate::heap::Obj) -> CSObjId {
        self.cs_objs.intern(CSObj { heap_ctx, obj })
    }
    pub fn cs_obj(&self, id: CSObjId) -> &CSObj {
        self.cs_objs.get(id)
    }

    // -- CSVar (also interns the corresponding `Pointer`) ---------------------------

    pub fn get_or_create_cs_var(&mut self, ctx: crate::context::ContextId, var: VarId) -> CSVarId {
        self.cs_vars.intern(CSVar { ctx, var })
    }
    pub fn cs_var(&self, id: CSVarId) -> &CSVar {
        self.cs_vars.get(id)
    }

    // -- InstanceField ----------------------------------------------------------------

    pub fn get_or_create_instance_field(&mut self, base: CSObjId, field: FieldId) -> InstanceFieldId {
        self.instance_fields.intern(InstanceField { base, field })
    }
    pub fn instance_field(&self, id: InstanceFieldId) -> &InstanceField {
        self.instance_fields.get(id)
    }

    // -- StaticField ------------------------------------------------------------------

    pub fn get_or_create_static_field(&mut self, field: FieldId) -> StaticFieldId {
        self.static_fields.intern(StaticField { field })
    }
    pub fn static_field(&self, id: StaticFieldId) -> &StaticField {
        self.static_fields.get(id)
    }

    // -- ArrayIndex -------------------------------------------------------------------

    pub fn get_or_create_array_index(&mut self, array: CSObjId) -> ArrayIndexId {
        self.array_indices.intern(ArrayIndex { array })
    }
    pub fn array_index(&self, id: ArrayIndexId) -> &ArrayIndex {
        self.array_indices.get(id)
    }

    // -- CSMethod ---------------------------------------------------------------------

    pub fn get_or_create_cs_method(&mut self, ctx: crate::context::ContextId, method: MethodId) -> CSMethodId {
        self.cs_methods.intern(CSMethod { ctx, method })
    }
    pub fn cs_method(&self, id: CSMethodId) -> &CSMethod {
        self.cs_methods.get(id)
    }

    // -- CSCallSite ---------------------------------------------------------------------

    pub fn get_or_create_cs_call_site(&mut self, ctx: crate::context::ContextId, stmt: StmtId) -> CSCallSiteId {
        self.cs_call_sites.intern(CSCallSite { ctx, stmt })
    }
    pub fn cs_call_site(&self, id: CSCallSiteId) -> &CSCallSite {
        self.cs_call_sites.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextId;

    #[test]
    fn canonicalization_is_pointer_equality() {
        let mut mgr = CSManager::new();
        let ctx = ContextId::new(0);
        let a = mgr.get_or_create_cs_var(ctx, VarId::new(3));
        let b = mgr.get_or_create_cs_var(ctx, VarId::new(3));
        let c = mgr.get_or_create_cs_var(ctx, VarId::new(4));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn distinct_pointer_kinds_stay_distinct() {
        let mut mgr = CSManager::new();
        let ctx = ContextId::new(0);
        let cs_var = mgr.get_or_create_cs_var(ctx, VarId::new(0));
        let obj = mgr.get_or_create_cs_obj(ctx, crate::heap::Obj::Alloc(StmtId::new(0)));
        let field = mgr.get_or_create_instance_field(obj, FieldId::new(0));
        let p1 = crate::cs::entities::Pointer::Var(cs_var);
        let p2 = crate::cs::entities::Pointer::InstanceField(field);
        assert_ne!(p1, p2);
    }
}
