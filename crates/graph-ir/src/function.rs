// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

use crate::NodeId;

/// A named computation graph inside a [`crate::Module`].
///
/// A function does not own its nodes: it lists indices into the module's
/// node arena, in an order where every node follows its producers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    name: String,
    nodes: Vec<NodeId>,
}

impl Function {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
        }
    }

    /// Returns the function (and network) name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Node ids in execution order.
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub(crate) fn push(&mut self, id: NodeId) {
        self.nodes.push(id);
    }

    pub(crate) fn retain(&mut self, keep: impl FnMut(&NodeId) -> bool) {
        self.nodes.retain(keep);
    }
}
