// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! CHA-based call resolution: the fallback used to turn a receiver's runtime type and
//! an `InvokeStmt` into a concrete `Method`. Per spec.md §1 this is the one piece of
//! "class hierarchy" machinery this crate implements itself rather than treating as a
//! pure external collaborator.

use log::warn;

use crate::errors::ResolutionFailure;
use crate::ir::program::{CallKind, ClassId, InvokeStmt, MethodId, Program};

/// Thin wrapper around `Program` exposing the dispatch operation spec.md §6 calls
/// "Class hierarchy (consumed)". Kept as its own type (rather than inherent methods on
/// `Program`) so callers go through one obvious entry point for call resolution.
pub struct ClassHierarchy<'p> {
    program: &'p Program,
}

impl<'p> ClassHierarchy<'p> {
    pub fn new(program: &'p Program) -> Self {
        ClassHierarchy { program }
    }

    /// Resolves the callee of `invoke` given the runtime type of its receiver (ignored
    /// for `Static`/`Special` calls, required for `Virtual`/`Interface`/`Dynamic`).
    /// Returns `None` on a `ResolutionFailure` (spec.md §7): the caller logs and moves
    /// on, it is never fatal.
    pub fn resolve_callee(&self, receiver_type: Option<ClassId>, invoke: &InvokeStmt) -> Option<MethodId> {
        match invoke.kind {
            CallKind::Static | CallKind::Special => Some(invoke.declared_callee),
            CallKind::Virtual | CallKind::Interface | CallKind::Dynamic => {
                let recv_class = receiver_type?;
                let subsig = &self.program.method(invoke.declared_callee).subsignature;
                match self.program.dispatch(recv_class, subsig) {
                    Some(m) => Some(m),
                    None => {
                        let failure = ResolutionFailure::NoMatchingOverride { class: recv_class, subsig: subsig.clone() };
                        warn!("resolveCallee: {failure} (class name: `{}`)", self.program.class(recv_class).name);
                        None
                    }
                }
            }
        }
    }

    /// True iff `sub` is `sup` or a (transitive) subclass/implementor of `sup`. Used
    /// when a caller wants to check overriding eligibility without a full dispatch.
    pub fn is_subclass_of(&self, sub: ClassId, sup: ClassId) -> bool {
        if sub == sup {
            return true;
        }
        let class = self.program.class(sub);
        if class.interfaces.iter().any(|&i| self.is_subclass_of(i, sup)) {
            return true;
        }
        match class.super_class {
            Some(parent) => self.is_subclass_of(parent, sup),
            None => false,
        }
    }
}
