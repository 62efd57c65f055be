// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Module and device fixtures shared by the unit tests.

use crate::DeviceDescriptor;
use graph_ir::{Module, Node, OpKind, Operand, Validated};
use tensor_core::{DType, Shape, Tensor};

/// `len - 1` chained relus over a vector of `width`, then a save into
/// `output`. Nodes are named `n0..`.
pub fn chain_module(function: &str, len: usize, width: usize) -> Module<Validated> {
    let mut m = Module::new("chain");
    m.add_placeholder("input", Shape::vector(width), DType::F32).unwrap();
    m.add_placeholder("output", Shape::vector(width), DType::F32).unwrap();
    m.create_function(function).unwrap();
    let mut prev = Operand::placeholder("input");
    for i in 0..len - 1 {
        let id = m
            .add_node(
                function,
                Node::new(format!("n{i}"), OpKind::Relu, vec![prev], Shape::vector(width)),
            )
            .unwrap();
        prev = Operand::Node(id);
    }
    m.add_node(
        function,
        Node::new(
            format!("n{}", len - 1),
            OpKind::save("output"),
            vec![prev],
            Shape::vector(width),
        ),
    )
    .unwrap();
    m.validate().unwrap()
}

/// Two dense layers, each with a `[width, width]` weight:
/// `output = softmax(relu(input @ w0) @ w1)`.
pub fn two_layer_module(function: &str, width: usize) -> Module<Validated> {
    let mut m = Module::new("mlp");
    m.add_placeholder("input", Shape::matrix(1, width), DType::F32).unwrap();
    m.add_placeholder("output", Shape::matrix(1, width), DType::F32).unwrap();
    for w in ["w0", "w1"] {
        let t = Tensor::from_f32(Shape::matrix(width, width), &vec![0.01; width * width]).unwrap();
        m.add_constant(w, t).unwrap();
    }
    m.create_function(function).unwrap();
    let row = Shape::matrix(1, width);
    let fc0 = m
        .add_node(
            function,
            Node::new(
                "fc0",
                OpKind::MatMul,
                vec![Operand::placeholder("input"), Operand::constant("w0")],
                row.clone(),
            ),
        )
        .unwrap();
    let act = m
        .add_node(function, Node::new("act", OpKind::Relu, vec![Operand::Node(fc0)], row.clone()))
        .unwrap();
    let fc1 = m
        .add_node(
            function,
            Node::new(
                "fc1",
                OpKind::MatMul,
                vec![Operand::Node(act), Operand::constant("w1")],
                row.clone(),
            ),
        )
        .unwrap();
    let probs = m
        .add_node(function, Node::new("probs", OpKind::Softmax, vec![Operand::Node(fc1)], row.clone()))
        .unwrap();
    m.add_node(
        function,
        Node::new("save", OpKind::save("output"), vec![Operand::Node(probs)], row),
    )
    .unwrap();
    m.validate().unwrap()
}

/// `count` CPU devices with `memory` bytes each.
pub fn devices(count: usize, memory: usize) -> Vec<DeviceDescriptor> {
    (0..count)
        .map(|i| DeviceDescriptor::new(i, format!("cpu{i}"), "CPU", memory))
        .collect()
}
