// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! Dumps `results::*` values to disk, kept separate from both the solvers and
//! `results.rs` itself -- a dedicated dumper module rather than having the solver
//! write its own output files (spec.md §6).

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::{Context, Result};
use log::info;
use serde::Serialize;

use crate::graph::CallGraph;

pub fn dump_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), value).with_context(|| format!("writing {}", path.display()))?;
    info!("wrote {}", path.display());
    Ok(())
}

pub fn dump_call_graph(call_graph: &CallGraph, path: &Path) -> Result<()> {
    call_graph.to_dot(path);
    info!("wrote {}", path.display());
    Ok(())
}
