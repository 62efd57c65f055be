// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Fixtures shared by the unit tests.

use crate::backend::{create_backend, CompiledFunction};
use crate::CompilationOptions;
use graph_ir::{Building, Module, Node, OpKind, Operand, Validated};
use partitioner::{auto_partition, DeviceDescriptor};
use std::sync::Arc;
use tensor_core::{DType, Shape, Tensor};

/// `output = relu(input @ (0.5 * I) + 0.25)` over `[1, width]` rows.
pub fn mlp_module(function: &str, width: usize) -> Module<Building> {
    let mut m = Module::new("mlp");
    let shape = Shape::matrix(1, width);
    m.add_placeholder("input", shape.clone(), DType::F32).unwrap();
    m.add_placeholder("output", shape.clone(), DType::F32).unwrap();
    let mut w = vec![0.0; width * width];
    for i in 0..width {
        w[i * width + i] = 0.5;
    }
    m.add_constant("w", Tensor::from_f32(Shape::matrix(width, width), &w).unwrap())
        .unwrap();
    m.add_constant("b", Tensor::from_f32(Shape::vector(width), &vec![0.25; width]).unwrap())
        .unwrap();
    m.create_function(function).unwrap();
    let fc = m
        .add_node(
            function,
            Node::new(
                "fc",
                OpKind::MatMul,
                vec![Operand::placeholder("input"), Operand::constant("w")],
                shape.clone(),
            ),
        )
        .unwrap();
    let bias = m
        .add_node(
            function,
            Node::new("bias", OpKind::Add, vec![Operand::Node(fc), Operand::constant("b")], shape.clone()),
        )
        .unwrap();
    let act = m
        .add_node(function, Node::new("act", OpKind::Relu, vec![Operand::Node(bias)], shape.clone()))
        .unwrap();
    m.add_node(
        function,
        Node::new("save", OpKind::save("output"), vec![Operand::Node(act)], shape),
    )
    .unwrap();
    m
}

/// Expected output of [`mlp_module`].
pub fn mlp_expected(input: &[f32]) -> Vec<f32> {
    input.iter().map(|x| (0.5 * x + 0.25f32).max(0.0)).collect()
}

/// A `[1, n]` row tensor.
pub fn row(values: &[f32]) -> Tensor {
    Tensor::from_f32(Shape::matrix(1, values.len()), values).unwrap()
}

/// Compiles the whole of `function` as one partition for `CPU`.
pub fn compile_whole(
    module: &Module<Validated>,
    function: &str,
    options: &CompilationOptions,
) -> Arc<dyn CompiledFunction> {
    let devices = vec![DeviceDescriptor::new(0, "cpu0", "CPU", 1 << 30)];
    let dag = auto_partition(module, function, &devices, false).unwrap();
    let backend = create_backend("CPU").unwrap();
    Arc::from(backend.compile(module, &dag.nodes[0], options).unwrap())
}
