// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

pub mod call_graph;
pub mod pfg;

pub use call_graph::CallGraph;
pub use pfg::{FlowGraph, Pfg};
