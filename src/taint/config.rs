// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! Taint configuration (spec.md §6, "Taint configuration (consumed)"): a declarative
//! document listing sources, sinks, and transfers, keyed by method name since the
//! config is authored against source-level names, not this crate's interned `MethodId`s.
//! Resolved against a `Program` once at load time; unresolved methods are logged and
//! skipped (spec.md §7 `ConfigError`), never fatal.

use std::collections::HashMap;

use log::warn;
use serde::Deserialize;

use crate::errors::ConfigError;
use crate::ir::{ClassId, MethodId, Program};

/// `BASE`/`RESULT`/`arg_i` sentinel convention for transfer endpoints (spec.md §4.7).
pub const BASE: i32 = -1;
pub const RESULT: i32 = -2;

#[derive(Clone, Copy, Debug, Deserialize)]
pub struct SourceEntry {
    pub method: String,
    #[serde(rename = "type")]
    pub ty: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SinkEntry {
    pub method: String,
    pub arg_index: i32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TransferEntry {
    pub method: String,
    pub from: i32,
    pub to: i32,
}

/// The raw, on-disk shape of a taint configuration file.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct TaintConfigDoc {
    #[serde(default)]
    pub sources: Vec<SourceEntry>,
    #[serde(default)]
    pub sinks: Vec<SinkEntry>,
    #[serde(default)]
    pub transfers: Vec<TransferEntry>,
}

#[derive(Clone, Copy, Debug)]
pub struct Source {
    pub method: MethodId,
    pub ty: ClassId,
}

#[derive(Clone, Copy, Debug)]
pub struct Sink {
    pub method: MethodId,
    pub arg_index: i32,
}

#[derive(Clone, Copy, Debug)]
pub struct Transfer {
    pub method: MethodId,
    pub from: i32,
    pub to: i32,
}

/// The configuration after resolving method/type names against a `Program`, grouped by
/// method so `TaintEngine::handle_call` doesn't rescan the whole list on every call.
#[derive(Clone, Debug, Default)]
pub struct TaintConfig {
    pub sources_by_method: HashMap<MethodId, Vec<Source>>,
    pub sinks_by_method: HashMap<MethodId, Vec<Sink>>,
    pub transfers_by_method: HashMap<MethodId, Vec<Transfer>>,
}

impl TaintConfig {
    pub fn resolve(doc: &TaintConfigDoc, program: &Program) -> Self {
        let method_by_name = method_name_index(program);
        let class_by_name = class_name_index(program);

        let mut config = TaintConfig::default();
        for s in &doc.sources {
            match (method_by_name.get(s.method.as_str()), class_by_name.get(s.ty.as_str())) {
                (Some(&method), Some(&ty)) => {
                    config.sources_by_method.entry(method).or_default().push(Source { method, ty });
                }
                _ => warn!("taint config: {}, skipping", ConfigError::UnknownMethod(s.method.clone())),
            }
        }
        for s in &doc.sinks {
            match method_by_name.get(s.method.as_str()) {
                Some(&method) => {
                    config.sinks_by_method.entry(method).or_default().push(Sink { method, arg_index: s.arg_index });
                }
                None => warn!("taint config: {}, skipping", ConfigError::UnknownMethod(s.method.clone())),
            }
        }
        for t in &doc.transfers {
            match method_by_name.get(t.method.as_str()) {
                Some(&method) => {
                    config
                        .transfers_by_method
                        .entry(method)
                        .or_default()
                        .push(Transfer { method, from: t.from, to: t.to });
                }
                None => warn!("taint config: {}, skipping", ConfigError::UnknownMethod(t.method.clone())),
            }
        }
        config
    }
}

fn method_name_index(program: &Program) -> HashMap<&str, MethodId> {
    let mut map = HashMap::new();
    for (i, m) in program.methods.iter().enumerate() {
        map.insert(m.name.as_str(), MethodId::new(i));
    }
    map
}

fn class_name_index(program: &Program) -> HashMap<&str, ClassId> {
    let mut map = HashMap::new();
    for (i, c) in program.classes.iter().enumerate() {
        map.insert(c.name.as_str(), ClassId::new(i));
    }
    map
}
