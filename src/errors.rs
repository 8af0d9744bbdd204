// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! The two "logged and skipped" error taxonomies spec.md §7 names. Neither ever
//! propagates as an `Err`: the solvers log them via `log::warn!` and continue rather
//! than aborting a whole-program analysis over one unusual call site. Only file I/O
//! and JSON parsing at the CLI boundary use `anyhow::Result` (`config::load_program`,
//! `taint::config::TaintConfig::resolve`'s caller).
//!
//! A third category, `InvariantViolation`, has no type here: it is a `panic!`/`assert!`
//! at the violation site, since by construction it should never be reachable.

use std::fmt;

use crate::ir::ClassId;

#[derive(Clone, Debug)]
pub enum ConfigError {
    UnknownMethod(String),
    UnknownClass(String),
    UnknownField(String),
    UnknownVariable(String),
    MalformedRule(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::UnknownMethod(name) => write!(f, "unknown method: {name}"),
            ConfigError::UnknownClass(name) => write!(f, "unknown class: {name}"),
            ConfigError::UnknownField(name) => write!(f, "unknown field: {name}"),
            ConfigError::UnknownVariable(name) => write!(f, "unknown variable: {name}"),
            ConfigError::MalformedRule(msg) => write!(f, "malformed rule: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// CHA couldn't find a concrete override at `class` matching `subsig` (spec.md §4.0
/// `ClassHierarchy::resolve_callee`). `MethodId`/`FieldId` aren't attached here since
/// the failure is precisely that no such id could be resolved.
#[derive(Clone, Debug)]
pub enum ResolutionFailure {
    NoMatchingOverride { class: ClassId, subsig: String },
}

impl fmt::Display for ResolutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionFailure::NoMatchingOverride { class, subsig } => {
                write!(f, "no non-abstract override of {subsig:?} found starting from {class:?}")
            }
        }
    }
}

impl std::error::Error for ResolutionFailure {}
