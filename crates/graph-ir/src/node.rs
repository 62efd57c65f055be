// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Operator nodes.

use serde::{Deserialize, Serialize};
use std::fmt;
use tensor_core::{DType, Shape};

/// Index of a node in the module's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// The computation a node performs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "op")]
pub enum OpKind {
    /// `[M, K] x [K, N] -> [M, N]`.
    MatMul,
    /// Element-wise add; the rhs may be a bias vector over the last dim.
    Add,
    Relu,
    Gelu,
    /// Softmax over the last dimension.
    Softmax,
    /// Layer normalization over the last dimension; inputs are
    /// `(x, gamma, beta)`.
    LayerNorm { epsilon: f32 },
    /// Writes its single input to an output placeholder.
    Save { placeholder: String },
}

impl OpKind {
    pub fn save(placeholder: impl Into<String>) -> Self {
        Self::Save {
            placeholder: placeholder.into(),
        }
    }

    /// The kind name matched against a device's supported / unsupported
    /// node sets.
    pub fn name(&self) -> &'static str {
        match self {
            Self::MatMul => "matmul",
            Self::Add => "add",
            Self::Relu => "relu",
            Self::Gelu => "gelu",
            Self::Softmax => "softmax",
            Self::LayerNorm { .. } => "layer_norm",
            Self::Save { .. } => "save",
        }
    }

    /// Number of operands the kind consumes.
    pub fn arity(&self) -> usize {
        match self {
            Self::MatMul | Self::Add => 2,
            Self::LayerNorm { .. } => 3,
            Self::Relu | Self::Gelu | Self::Softmax | Self::Save { .. } => 1,
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a node input comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operand {
    /// The output of another node of the same function.
    Node(NodeId),
    /// A placeholder bound at run time.
    Placeholder(String),
    /// A constant owned by the module.
    Constant(String),
}

impl Operand {
    pub fn placeholder(name: impl Into<String>) -> Self {
        Self::Placeholder(name.into())
    }

    pub fn constant(name: impl Into<String>) -> Self {
        Self::Constant(name.into())
    }
}

/// A single operator in the module's arena.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique within its function; also the value name of its output.
    pub name: String,
    pub kind: OpKind,
    pub inputs: Vec<Operand>,
    /// Shape of the node's output.
    pub shape: Shape,
    pub dtype: DType,
}

impl Node {
    /// Creates an `F32` node.
    pub fn new(name: impl Into<String>, kind: OpKind, inputs: Vec<Operand>, shape: Shape) -> Self {
        Self {
            name: name.into(),
            kind,
            inputs,
            shape,
            dtype: DType::F32,
        }
    }

    /// Size of the node's output value in bytes.
    pub fn output_bytes(&self) -> usize {
        self.shape.size_bytes(self.dtype)
    }

    /// Returns the placeholder written by a `Save` node.
    pub fn saved_placeholder(&self) -> Option<&str> {
        match &self.kind {
            OpKind::Save { placeholder } => Some(placeholder),
            _ => None,
        }
    }

    /// Iterates the ids of producer nodes.
    pub fn node_inputs(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.inputs.iter().filter_map(|op| match op {
            Operand::Node(id) => Some(*id),
            _ => None,
        })
    }
}
