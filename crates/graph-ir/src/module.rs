// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Modules: the unit handed to the host when networks are added.
//!
//! # Type-State Pattern
//!
//! ```text
//! Module<Building>   : placeholders, constants, functions and nodes are
//!       │              being added.
//!       │  .validate() / .optimize()
//!       ▼
//! Module<Validated>  : operands resolve, arities and shapes check out,
//!       │              every function is topologically ordered.
//!       │  .strip_constants()
//!       ▼
//! Module<Stripped>   : constant payloads dropped after provisioning;
//!                      metadata and the graph stay readable.
//! ```
//!
//! Only a validated module can be partitioned, and only a stripped module
//! is kept alive by the host once its networks are installed.

use crate::{Function, GraphError, Node, NodeId, OpKind, Operand};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::marker::PhantomData;
use tensor_core::{DType, Shape, Tensor};

// ── Type-state markers ─────────────────────────────────────────────

/// Marker: the module is still being built.
#[derive(Debug, Clone)]
pub struct Building;

/// Marker: the module passed validation.
#[derive(Debug, Clone)]
pub struct Validated;

/// Marker: constant payloads have been released.
#[derive(Debug, Clone)]
pub struct Stripped;

/// Sealed trait for module states.
pub trait ModuleState: fmt::Debug + Clone + Send + Sync + 'static {}
impl ModuleState for Building {}
impl ModuleState for Validated {}
impl ModuleState for Stripped {}

// ── Values ─────────────────────────────────────────────────────────

/// A named input or output bound at run time.
#[derive(Debug, Clone, PartialEq)]
pub struct Placeholder {
    pub name: String,
    pub shape: Shape,
    pub dtype: DType,
}

/// A named tensor owned by the module (weights, biases).
#[derive(Debug, Clone, PartialEq)]
pub struct Constant {
    pub name: String,
    pub shape: Shape,
    pub dtype: DType,
    payload: Option<Tensor>,
}

impl Constant {
    /// The constant's data, or `None` once the module has been stripped.
    pub fn payload(&self) -> Option<&Tensor> {
        self.payload.as_ref()
    }

    pub fn size_bytes(&self) -> usize {
        self.shape.size_bytes(self.dtype)
    }
}

// ── Module ─────────────────────────────────────────────────────────

/// A set of functions sharing one node arena, placeholders and constants.
#[derive(Debug, Clone)]
pub struct Module<S: ModuleState = Building> {
    name: String,
    nodes: Vec<Node>,
    functions: Vec<Function>,
    placeholders: BTreeMap<String, Placeholder>,
    constants: BTreeMap<String, Constant>,
    _state: PhantomData<S>,
}

impl<S: ModuleState> Module<S> {
    fn into_state<T: ModuleState>(self) -> Module<T> {
        Module {
            name: self.name,
            nodes: self.nodes,
            functions: self.functions,
            placeholders: self.placeholders,
            constants: self.constants,
            _state: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name() == name)
    }

    /// Returns the node behind `id`.
    ///
    /// # Panics
    /// If `id` was not produced by this module.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn placeholder(&self, name: &str) -> Option<&Placeholder> {
        self.placeholders.get(name)
    }

    pub fn placeholders(&self) -> impl Iterator<Item = &Placeholder> {
        self.placeholders.values()
    }

    pub fn constant(&self, name: &str) -> Option<&Constant> {
        self.constants.get(name)
    }

    pub fn constants(&self) -> impl Iterator<Item = &Constant> {
        self.constants.values()
    }

    /// Shape of the value an operand refers to.
    fn operand_shape(&self, operand: &Operand) -> Option<&Shape> {
        match operand {
            Operand::Node(id) => self.nodes.get(id.0).map(|n| &n.shape),
            Operand::Placeholder(name) => self.placeholders.get(name).map(|p| &p.shape),
            Operand::Constant(name) => self.constants.get(name).map(|c| &c.shape),
        }
    }

    /// Estimated device memory for one node: its output plus every constant
    /// it reads.
    pub fn node_memory_bytes(&self, id: NodeId) -> usize {
        let node = self.node(id);
        let constants: usize = node
            .inputs
            .iter()
            .filter_map(|op| match op {
                Operand::Constant(name) => self.constants.get(name).map(Constant::size_bytes),
                _ => None,
            })
            .sum();
        node.output_bytes() + constants
    }

    /// Estimated device memory for a whole function, counting each
    /// constant once.
    pub fn function_memory_bytes(&self, function: &Function) -> usize {
        self.nodes_memory_bytes(function.nodes())
    }

    /// Estimated device memory for a group of nodes placed together: every
    /// output plus each distinct constant they read.
    pub fn nodes_memory_bytes(&self, ids: &[NodeId]) -> usize {
        let mut seen = HashSet::new();
        let mut total = 0;
        for &id in ids {
            let node = self.node(id);
            total += node.output_bytes();
            for op in &node.inputs {
                if let Operand::Constant(name) = op {
                    if seen.insert(name.as_str()) {
                        total += self.constants.get(name).map_or(0, Constant::size_bytes);
                    }
                }
            }
        }
        total
    }

    /// Total bytes of all constants declared by the module.
    fn total_constant_bytes(&self) -> usize {
        self.constants.values().map(Constant::size_bytes).sum()
    }

    /// Returns a one-line description of the module.
    pub fn summary(&self) -> String {
        let names: Vec<&str> = self.functions.iter().map(Function::name).collect();
        format!(
            "Module '{}': {} function(s) [{}], {} nodes, {} placeholders, {} constants ({:.1} KB)",
            self.name,
            self.functions.len(),
            names.join(", "),
            self.functions.iter().map(Function::len).sum::<usize>(),
            self.placeholders.len(),
            self.constants.len(),
            self.total_constant_bytes() as f64 / 1024.0,
        )
    }
}

// ── Building state ─────────────────────────────────────────────────

impl Module<Building> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            functions: Vec::new(),
            placeholders: BTreeMap::new(),
            constants: BTreeMap::new(),
            _state: PhantomData,
        }
    }

    fn check_free(&self, name: &str) -> Result<(), GraphError> {
        if self.placeholders.contains_key(name) || self.constants.contains_key(name) {
            return Err(GraphError::DuplicateValue(name.to_string()));
        }
        Ok(())
    }

    pub fn add_placeholder(
        &mut self,
        name: impl Into<String>,
        shape: Shape,
        dtype: DType,
    ) -> Result<(), GraphError> {
        let name = name.into();
        self.check_free(&name)?;
        self.placeholders.insert(
            name.clone(),
            Placeholder {
                name,
                shape,
                dtype,
            },
        );
        Ok(())
    }

    pub fn add_constant(&mut self, name: impl Into<String>, value: Tensor) -> Result<(), GraphError> {
        let name = name.into();
        self.check_free(&name)?;
        self.constants.insert(
            name.clone(),
            Constant {
                name,
                shape: value.shape().clone(),
                dtype: value.dtype(),
                payload: Some(value),
            },
        );
        Ok(())
    }

    pub fn create_function(&mut self, name: impl Into<String>) -> Result<(), GraphError> {
        let name = name.into();
        if self.function(&name).is_some() {
            return Err(GraphError::DuplicateFunction(name));
        }
        self.functions.push(Function::new(name));
        Ok(())
    }

    /// Appends `node` to the arena and to `function`.
    pub fn add_node(&mut self, function: &str, node: Node) -> Result<NodeId, GraphError> {
        let id = NodeId(self.nodes.len());
        let func = self
            .functions
            .iter_mut()
            .find(|f| f.name() == function)
            .ok_or_else(|| GraphError::UnknownFunction(function.to_string()))?;
        func.push(id);
        self.nodes.push(node);
        Ok(id)
    }

    pub(crate) fn functions_mut(&mut self) -> &mut [Function] {
        &mut self.functions
    }

    pub(crate) fn nodes_ref(&self) -> &[Node] {
        &self.nodes
    }

    pub(crate) fn retain_constants(&mut self, keep: impl Fn(&str) -> bool) -> usize {
        let before = self.constants.len();
        self.constants.retain(|name, _| keep(name));
        before - self.constants.len()
    }

    /// Runs the target-independent cleanup passes, then validates.
    pub fn optimize(mut self) -> Result<Module<Validated>, GraphError> {
        crate::optimizer::optimize(&mut self);
        self.validate()
    }

    /// Validates the module and transitions to `Validated`.
    ///
    /// # Checks
    /// - At least one function, and no empty function.
    /// - Node names are unique inside a function and never shadow a
    ///   placeholder.
    /// - Every operand resolves; node operands refer to an earlier node of
    ///   the same function (which also rules out cycles).
    /// - Operand count matches the kind, and output shapes are consistent
    ///   with the inputs.
    pub fn validate(self) -> Result<Module<Validated>, GraphError> {
        if self.functions.is_empty() {
            return Err(GraphError::EmptyModule(self.name.clone()));
        }
        for function in &self.functions {
            self.validate_function(function)?;
        }
        tracing::debug!("{}", self.summary());
        Ok(self.into_state())
    }

    fn validate_function(&self, function: &Function) -> Result<(), GraphError> {
        if function.is_empty() {
            return Err(GraphError::EmptyFunction(function.name().to_string()));
        }

        let mut seen: HashSet<NodeId> = HashSet::new();
        let mut names: HashSet<&str> = HashSet::new();
        for &id in function.nodes() {
            let node = self.nodes.get(id.0).ok_or_else(|| GraphError::InvalidNode {
                function: function.name().to_string(),
                node: id.to_string(),
                detail: "node id outside the arena".into(),
            })?;
            let fail = |detail: String| GraphError::InvalidNode {
                function: function.name().to_string(),
                node: node.name.clone(),
                detail,
            };

            if !names.insert(node.name.as_str()) {
                return Err(fail("duplicate node name".into()));
            }
            if self.placeholders.contains_key(&node.name) {
                return Err(fail("node name shadows a placeholder".into()));
            }
            if node.dtype != DType::F32 {
                return Err(fail(format!("unsupported node dtype {}", node.dtype)));
            }
            if node.inputs.len() != node.kind.arity() {
                return Err(fail(format!(
                    "{} takes {} operand(s), got {}",
                    node.kind,
                    node.kind.arity(),
                    node.inputs.len()
                )));
            }

            let mut shapes = Vec::with_capacity(node.inputs.len());
            for operand in &node.inputs {
                match operand {
                    Operand::Node(producer) if !seen.contains(producer) => {
                        return Err(fail(format!(
                            "operand {producer} is not an earlier node of this function"
                        )));
                    }
                    Operand::Placeholder(name) if !self.placeholders.contains_key(name) => {
                        return Err(fail(format!("unknown placeholder '{name}'")));
                    }
                    Operand::Constant(name) if !self.constants.contains_key(name) => {
                        return Err(fail(format!("unknown constant '{name}'")));
                    }
                    _ => {}
                }
                // Resolved above.
                if let Some(shape) = self.operand_shape(operand) {
                    shapes.push(shape);
                }
            }

            check_shapes(node, &shapes, self).map_err(fail)?;
            seen.insert(id);
        }
        Ok(())
    }
}

fn check_shapes(node: &Node, inputs: &[&Shape], module: &Module<Building>) -> Result<(), String> {
    let out = &node.shape;
    let same = |s: &Shape| {
        if s == out {
            Ok(())
        } else {
            Err(format!("output shape {out} does not match input {s}"))
        }
    };

    match &node.kind {
        OpKind::MatMul => {
            let (lhs, rhs) = (inputs[0], inputs[1]);
            if lhs.rank() != 2 || rhs.rank() != 2 || !lhs.is_matmul_compatible(rhs) {
                return Err(format!("cannot multiply {lhs} by {rhs}"));
            }
            let expected = Shape::matrix(lhs.dims()[0], rhs.dims()[1]);
            if *out != expected {
                return Err(format!("matmul output should be {expected}, declared {out}"));
            }
            Ok(())
        }
        OpKind::Add => {
            let (lhs, rhs) = (inputs[0], inputs[1]);
            let bias = rhs.rank() == 1 && rhs.num_elements() == lhs.last_dim();
            if lhs != rhs && !bias {
                return Err(format!("cannot add {rhs} to {lhs}"));
            }
            same(lhs)
        }
        OpKind::Relu | OpKind::Gelu | OpKind::Softmax => same(inputs[0]),
        OpKind::LayerNorm { epsilon } => {
            if *epsilon <= 0.0 {
                return Err(format!("epsilon must be positive, got {epsilon}"));
            }
            let width = inputs[0].last_dim();
            for param in &inputs[1..] {
                if param.rank() != 1 || param.num_elements() != width {
                    return Err(format!("layer_norm parameter {param} does not span width {width}"));
                }
            }
            same(inputs[0])
        }
        OpKind::Save { placeholder } => {
            let target = module
                .placeholders
                .get(placeholder)
                .ok_or_else(|| format!("unknown output placeholder '{placeholder}'"))?;
            if target.shape != *inputs[0] {
                return Err(format!(
                    "saved value {} does not fit placeholder '{placeholder}' {}",
                    inputs[0], target.shape
                ));
            }
            same(inputs[0])
        }
    }
}

// ── Validated state ────────────────────────────────────────────────

impl Module<Validated> {
    /// Drops every constant payload, keeping names, shapes and the graph.
    pub fn strip_constants(self) -> Module<Stripped> {
        let mut module: Module<Stripped> = self.into_state();
        for constant in module.constants.values_mut() {
            constant.payload = None;
        }
        module
    }
}

// ── Shared implementations ─────────────────────────────────────────

impl<S: ModuleState> fmt::Display for Module<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.summary())?;
        for function in &self.functions {
            writeln!(f, "  fn {} ({} nodes):", function.name(), function.len())?;
            for &id in function.nodes() {
                let node = self.node(id);
                writeln!(f, "    {id} {} = {} {:?} -> {}", node.name, node.kind, node.inputs, node.shape)?;
            }
        }
        Ok(())
    }
}
