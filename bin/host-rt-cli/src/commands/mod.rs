// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Subcommands and the pieces they share.

pub mod config;
pub mod inspect;
pub mod profile;
pub mod run;

use crate::NetworkArgs;
use anyhow::Context;
use graph_ir::{Building, Module, Node, OpKind, Operand};
use memory_manager::MemoryBudget;
use partitioner::{GreedyPartitioner, SingleDevicePartitioner};
use runtime::{DeviceConfig, HostManager, PlaceholderBindings, RuntimeConfig};
use std::path::Path;
use tensor_core::{DType, Shape, Tensor};
use tracing_subscriber::EnvFilter;

/// Name of the synthetic network's only function.
pub const NETWORK: &str = "synthetic";

/// Installs the global subscriber. `RUST_LOG` wins over `-v`.
pub fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

/// The config file if given, otherwise `--devices` CPU devices of `--memory`.
pub fn load_config(path: Option<&Path>, args: &NetworkArgs) -> anyhow::Result<RuntimeConfig> {
    if let Some(path) = path {
        return RuntimeConfig::from_file(path).with_context(|| format!("loading {}", path.display()));
    }
    let memory = MemoryBudget::parse(&args.memory).with_context(|| format!("invalid --memory '{}'", args.memory))?;
    let config = RuntimeConfig {
        host: Default::default(),
        devices: (0..args.devices)
            .map(|_| DeviceConfig::new("CPU").with_memory(memory))
            .collect(),
    };
    config.validate()?;
    Ok(config)
}

/// Starts a host with the partitioner named by `--strategy`.
pub fn start_host(config: RuntimeConfig, strategy: &str) -> anyhow::Result<HostManager> {
    let host = HostManager::from_config(config)?;
    Ok(match strategy {
        "auto" => host,
        "single-device" => host.with_partitioner(SingleDevicePartitioner::new()),
        "greedy" => host.with_partitioner(GreedyPartitioner::new()),
        other => anyhow::bail!("unknown strategy '{other}' (expected auto, single-device or greedy)"),
    })
}

/// `layers` rounds of `x = gelu(x @ w + b)` followed by a softmax head.
pub fn synthetic_module(width: usize, layers: usize) -> anyhow::Result<Module<Building>> {
    let shape = Shape::matrix(1, width);
    let mut m = Module::new(NETWORK);
    m.add_placeholder("input", shape.clone(), DType::F32)?;
    m.add_placeholder("output", shape.clone(), DType::F32)?;
    m.create_function(NETWORK)?;

    let mut x = Operand::placeholder("input");
    for l in 0..layers {
        let w: Vec<f32> = (0..width * width)
            .map(|i| (((i * 31 + l * 7) % 17) as f32 - 8.0) / (8.0 * width as f32))
            .collect();
        let b: Vec<f32> = (0..width).map(|i| ((i % 5) as f32 - 2.0) * 0.05).collect();
        m.add_constant(format!("w{l}"), Tensor::from_f32(Shape::matrix(width, width), &w)?)?;
        m.add_constant(format!("b{l}"), Tensor::from_f32(Shape::vector(width), &b)?)?;

        let fc = m.add_node(
            NETWORK,
            Node::new(format!("fc{l}"), OpKind::MatMul, vec![x, Operand::constant(format!("w{l}"))], shape.clone()),
        )?;
        let bias = m.add_node(
            NETWORK,
            Node::new(format!("bias{l}"), OpKind::Add, vec![Operand::Node(fc), Operand::constant(format!("b{l}"))], shape.clone()),
        )?;
        let act = m.add_node(
            NETWORK,
            Node::new(format!("act{l}"), OpKind::Gelu, vec![Operand::Node(bias)], shape.clone()),
        )?;
        x = Operand::Node(act);
    }
    let probs = m.add_node(NETWORK, Node::new("probs", OpKind::Softmax, vec![x], shape.clone()))?;
    m.add_node(NETWORK, Node::new("save", OpKind::save("output"), vec![Operand::Node(probs)], shape))?;
    Ok(m)
}

/// Input row `seed` for the synthetic network.
pub fn synthetic_input(width: usize, seed: usize) -> anyhow::Result<PlaceholderBindings> {
    let values: Vec<f32> = (0..width).map(|i| ((i + seed) % 11) as f32 / 5.0 - 1.0).collect();
    let tensor = Tensor::from_f32(Shape::matrix(1, width), &values)?;
    Ok([("input".to_string(), tensor)].into_iter().collect())
}
