// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Benchmarks for a full blocking run through the host.

use criterion::{criterion_group, criterion_main, Criterion};
use graph_ir::{Building, Module, Node, OpKind, Operand};
use memory_manager::MemoryBudget;
use partitioner::GreedyPartitioner;
use runtime::{CompilationOptions, DeviceConfig, HostConfig, HostManager, PlaceholderBindings};
use tensor_core::{DType, Shape, Tensor};

const WIDTH: usize = 64;
const LAYERS: usize = 4;

/// `LAYERS` rounds of `x = relu(x @ w + b)`.
fn module() -> Module<Building> {
    let shape = Shape::matrix(1, WIDTH);
    let mut m = Module::new("bench");
    m.add_placeholder("input", shape.clone(), DType::F32).unwrap();
    m.add_placeholder("output", shape.clone(), DType::F32).unwrap();
    m.create_function("bench").unwrap();
    let mut x = Operand::placeholder("input");
    for l in 0..LAYERS {
        let w: Vec<f32> = (0..WIDTH * WIDTH).map(|i| ((i % 7) as f32 - 3.0) * 0.01).collect();
        m.add_constant(format!("w{l}"), Tensor::from_f32(Shape::matrix(WIDTH, WIDTH), &w).unwrap())
            .unwrap();
        m.add_constant(format!("b{l}"), Tensor::from_f32(Shape::vector(WIDTH), &[0.1; WIDTH]).unwrap())
            .unwrap();
        let fc = m
            .add_node("bench", Node::new(format!("fc{l}"), OpKind::MatMul, vec![x, Operand::constant(format!("w{l}"))], shape.clone()))
            .unwrap();
        let bias = m
            .add_node("bench", Node::new(format!("bias{l}"), OpKind::Add, vec![Operand::Node(fc), Operand::constant(format!("b{l}"))], shape.clone()))
            .unwrap();
        let act = m
            .add_node("bench", Node::new(format!("act{l}"), OpKind::Relu, vec![Operand::Node(bias)], shape.clone()))
            .unwrap();
        x = Operand::Node(act);
    }
    m.add_node("bench", Node::new("save", OpKind::save("output"), vec![x], shape))
        .unwrap();
    m
}

fn input() -> PlaceholderBindings {
    let tensor = Tensor::from_f32(Shape::matrix(1, WIDTH), &[0.5; WIDTH]).unwrap();
    [("input".to_string(), tensor)].into_iter().collect()
}

fn bench_single_device(c: &mut Criterion) {
    let host = HostManager::new(vec![DeviceConfig::new("CPU")], HostConfig::default()).unwrap();
    host.add_network(module(), &CompilationOptions::default(), false).unwrap();
    c.bench_function("run_network_blocking single device", |bench| {
        bench.iter(|| {
            let mut bindings = input();
            host.run_network_blocking("bench", &mut bindings).unwrap();
        })
    });
}

fn bench_split_devices(c: &mut Criterion) {
    // Room for about one layer per device.
    let devices = (0..LAYERS)
        .map(|_| DeviceConfig::new("CPU").with_memory(MemoryBudget::from_bytes(20_000)))
        .collect();
    let host = HostManager::new(devices, HostConfig::default())
        .unwrap()
        .with_partitioner(GreedyPartitioner::new());
    host.add_network(module(), &CompilationOptions::default(), false).unwrap();
    c.bench_function("run_network_blocking split devices", |bench| {
        bench.iter(|| {
            let mut bindings = input();
            host.run_network_blocking("bench", &mut bindings).unwrap();
        })
    });
}

criterion_group!(benches, bench_single_device, bench_split_devices);
criterion_main!(benches);
