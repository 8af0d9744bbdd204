// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! `Context` (spec.md §3): an opaque, immutable, totally-ordered-by-equality value
//! produced by a `ContextSelector`. The core never inspects a context's contents; it
//! only compares and hashes them, with no rustc-specific `Ty`/`rustc_index` plumbing.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::rc::Rc;

use crate::util::index::newtype_index;

newtype_index! {
    /// Canonical handle for an interned `Context`.
    pub struct ContextId;
}

/// Anything that can appear as one component of a context. Call-site-sensitivity uses
/// `ir::StmtId`; object-sensitivity uses `heap::Obj`; type-sensitivity uses `ir::ClassId`.
pub trait ContextElement: Clone + Eq + Hash + Debug {}

impl ContextElement for crate::ir::StmtId {}
impl ContextElement for crate::heap::Obj {}
impl ContextElement for crate::ir::ClassId {}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Context<E: ContextElement> {
    elems: Vec<E>,
}

impl<E: ContextElement> Context<E> {
    pub fn empty() -> Rc<Self> {
        Rc::new(Context { elems: Vec::new() })
    }

    pub fn len(&self) -> usize {
        self.elems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elems.is_empty()
    }

    pub fn last_element(&self) -> Option<&E> {
        self.elems.last()
    }

    /// Prepends `elem` to `old`, discarding the oldest element once the length would
    /// exceed `k` (a k-limited context, the standard way to keep context-sensitivity
    /// terminating). `k == 0` always yields the empty context, i.e. context-insensitive.
    pub fn extend_k_limited(old: &Rc<Context<E>>, elem: E, k: usize) -> Rc<Self> {
        if k == 0 {
            return Self::empty();
        }
        let mut elems = Vec::with_capacity(k);
        elems.push(elem);
        let take = (k - 1).min(old.elems.len());
        elems.extend_from_slice(&old.elems[..take]);
        Rc::new(Context { elems })
    }

    /// Truncates `ctx` to its first `k` elements without adding a new one; used to
    /// derive a (typically shallower) heap context from a calling context.
    pub fn truncate(ctx: &Rc<Context<E>>, k: usize) -> Rc<Self> {
        if ctx.elems.len() <= k {
            ctx.clone()
        } else {
            Rc::new(Context { elems: ctx.elems[..k].to_vec() })
        }
    }
}

/// Interns `Context<E>` values so equal contexts collapse to the same `ContextId`
/// (spec.md §3 "pointer equality ≡ structural equality").
#[derive(Debug)]
pub struct ContextCache<E: ContextElement> {
    by_id: Vec<Rc<Context<E>>>,
    ids: HashMap<Rc<Context<E>>, ContextId>,
    empty_id: ContextId,
}

impl<E: ContextElement> ContextCache<E> {
    pub fn new() -> Self {
        let empty = Context::empty();
        let mut cache = ContextCache {
            by_id: vec![empty.clone()],
            ids: HashMap::new(),
            empty_id: ContextId::new(0),
        };
        cache.ids.insert(empty, cache.empty_id);
        cache
    }

    pub fn empty_context_id(&self) -> ContextId {
        self.empty_id
    }

    pub fn intern(&mut self, context: Rc<Context<E>>) -> ContextId {
        if let Some(id) = self.ids.get(&context) {
            return *id;
        }
        let id = ContextId::new(self.by_id.len());
        self.by_id.push(context.clone());
        self.ids.insert(context, id);
        id
    }

    pub fn get(&self, id: ContextId) -> &Rc<Context<E>> {
        &self.by_id[id.index()]
    }
}

impl<E: ContextElement> Default for ContextCache<E> {
    fn default() -> Self {
        Self::new()
    }
}
