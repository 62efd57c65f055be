// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Integration tests: the host end to end.
//!
//! These tests drive the public `HostManager` surface through the full
//! add → partition → provision → run → remove flow on real device worker
//! threads, including admission control and the profile → quantize loop.

use graph_ir::{Building, Module, Node, OpKind, Operand};
use memory_manager::MemoryBudget;
use partitioner::GreedyPartitioner;
use runtime::{
    CompilationOptions, DeviceConfig, ExecutionContext, HostConfig, HostManager, PlaceholderBindings,
    RuntimeConfig, RuntimeError, TraceLevel, RUN_DELAY_PARAM,
};
use std::sync::mpsc;
use std::sync::{Arc, Barrier};
use std::time::Duration;
use tensor_core::{DType, Shape, Tensor};

// ── Helpers ────────────────────────────────────────────────────

const INPUT: [f32; 4] = [1.5, -3.0, 0.25, 4.0];

/// `layers` rounds of `x = relu(x @ (0.5 * I) + 0.25)` over `[1, width]`.
fn stacked_module(function: &str, width: usize, layers: usize) -> Module<Building> {
    let shape = Shape::matrix(1, width);
    let mut m = Module::new(function);
    m.add_placeholder("input", shape.clone(), DType::F32).unwrap();
    m.add_placeholder("output", shape.clone(), DType::F32).unwrap();
    m.create_function(function).unwrap();

    let mut w = vec![0.0; width * width];
    for i in 0..width {
        w[i * width + i] = 0.5;
    }
    let mut x = Operand::placeholder("input");
    for l in 0..layers {
        m.add_constant(format!("w{l}"), Tensor::from_f32(Shape::matrix(width, width), &w).unwrap())
            .unwrap();
        m.add_constant(format!("b{l}"), Tensor::from_f32(Shape::vector(width), &vec![0.25; width]).unwrap())
            .unwrap();
        let fc = m
            .add_node(
                function,
                Node::new(format!("fc{l}"), OpKind::MatMul, vec![x, Operand::constant(format!("w{l}"))], shape.clone()),
            )
            .unwrap();
        let bias = m
            .add_node(
                function,
                Node::new(format!("bias{l}"), OpKind::Add, vec![Operand::Node(fc), Operand::constant(format!("b{l}"))], shape.clone()),
            )
            .unwrap();
        let act = m
            .add_node(function, Node::new(format!("act{l}"), OpKind::Relu, vec![Operand::Node(bias)], shape.clone()))
            .unwrap();
        x = Operand::Node(act);
    }
    m.add_node(function, Node::new("save", OpKind::save("output"), vec![x], shape))
        .unwrap();
    m
}

fn expected(layers: usize) -> Vec<f32> {
    let mut x = INPUT.to_vec();
    for _ in 0..layers {
        x = x.iter().map(|v| (0.5 * v + 0.25f32).max(0.0)).collect();
    }
    x
}

fn input() -> PlaceholderBindings {
    let tensor = Tensor::from_f32(Shape::matrix(1, INPUT.len()), &INPUT).unwrap();
    [("input".to_string(), tensor)].into_iter().collect()
}

fn output(bindings: &PlaceholderBindings) -> Vec<f32> {
    bindings.get("output").unwrap().as_f32().unwrap().to_vec()
}

fn host_with(devices: Vec<DeviceConfig>, host: HostConfig) -> HostManager {
    HostManager::new(devices, host).unwrap()
}

fn cpu_host(count: usize) -> HostManager {
    host_with((0..count).map(|_| DeviceConfig::new("CPU")).collect(), HostConfig::default())
}

/// One CPU device that sleeps before every run.
fn slow_device(delay_ms: u64) -> DeviceConfig {
    let mut config = DeviceConfig::new("CPU");
    config.parameters.insert(RUN_DELAY_PARAM.into(), delay_ms.to_string());
    config
}

type Delivered = mpsc::Receiver<(u64, Result<(), RuntimeError>, ExecutionContext)>;

/// Starts a run whose callback reports through the returned channel.
fn start(host: &HostManager, name: &str) -> (u64, Delivered) {
    let (tx, rx) = mpsc::channel();
    let id = host.run_network(
        name,
        ExecutionContext::new(input()),
        Box::new(move |id, result, context| {
            let _ = tx.send((id, result, context));
        }),
    );
    (id, rx)
}

// ── Lifecycle ──────────────────────────────────────────────────

#[test]
fn test_run_unknown_network() {
    let host = cpu_host(1);
    let (first, rx) = start(&host, "missing");
    // Delivered synchronously, with the caller's context untouched.
    let (id, result, context) = rx.try_recv().unwrap();
    assert_eq!(id, first);
    assert_eq!(result, Err(RuntimeError::NetworkNotFound("missing".into())));
    assert!(context.bindings().contains("input"));
    assert_eq!(host.active_requests(), 0);

    let (second, _rx) = start(&host, "missing");
    assert!(second > first);
}

#[test]
fn test_network_lifecycle() {
    let host = cpu_host(1);
    assert!(!host.network_added("net"));
    host.add_network(stacked_module("net", 4, 2), &CompilationOptions::default(), false)
        .unwrap();
    assert!(host.network_added("net"));

    let mut bindings = input();
    host.run_network_blocking("net", &mut bindings).unwrap();
    assert_eq!(output(&bindings), expected(2));

    host.remove_network("net").unwrap();
    assert!(!host.network_added("net"));
    assert_eq!(
        host.run_network_blocking("net", &mut input()),
        Err(RuntimeError::NetworkNotFound("net".into()))
    );

    // The name can be reused.
    host.add_network(stacked_module("net", 4, 1), &CompilationOptions::default(), false)
        .unwrap();
    let mut bindings = input();
    host.run_network_blocking("net", &mut bindings).unwrap();
    assert_eq!(output(&bindings), expected(1));
}

#[test]
fn test_multi_function_module() {
    let mut module = stacked_module("first", 4, 1);
    module.create_function("second").unwrap();
    let relu = module
        .add_node(
            "second",
            Node::new("second_relu", OpKind::Relu, vec![Operand::placeholder("input")], Shape::matrix(1, 4)),
        )
        .unwrap();
    module
        .add_node(
            "second",
            Node::new("second_save", OpKind::save("output"), vec![Operand::Node(relu)], Shape::matrix(1, 4)),
        )
        .unwrap();

    let host = cpu_host(1);
    host.add_network(module, &CompilationOptions::default(), false)
        .unwrap();
    assert_eq!(host.network_names(), vec!["first".to_string(), "second".to_string()]);

    let mut bindings = input();
    host.run_network_blocking("second", &mut bindings).unwrap();
    assert_eq!(output(&bindings), vec![1.5, 0.0, 0.25, 4.0]);
}

#[test]
fn test_remove_busy_network() {
    let host = host_with(vec![slow_device(300)], HostConfig::default());
    host.add_network(stacked_module("net", 4, 1), &CompilationOptions::default(), false)
        .unwrap();

    let loaded = host.device_descriptors()[0].available_memory;

    let (_, first) = start(&host, "net");
    assert_eq!(host.remove_network("net"), Err(RuntimeError::NetworkBusy("net".into())));
    assert!(host.network_added("net"));
    // Nothing was evicted: the memory is still held and later runs work.
    assert_eq!(host.device_descriptors()[0].available_memory, loaded);
    let (_, second) = start(&host, "net");

    for rx in [first, second] {
        let (_, result, context) = rx.recv_timeout(Duration::from_secs(10)).unwrap();
        result.unwrap();
        assert_eq!(output(context.bindings()), expected(1));
    }
    assert_eq!(host.active_requests(), 0);
    host.remove_network("net").unwrap();
    let d = &host.device_descriptors()[0];
    assert_eq!(d.available_memory, d.total_memory);
}

#[test]
fn test_admission_limit() {
    let config = HostConfig {
        max_active_requests: 2,
        ..Default::default()
    };
    let host = host_with(vec![slow_device(200)], config);
    host.add_network(stacked_module("net", 4, 1), &CompilationOptions::default(), false)
        .unwrap();

    let (_, a) = start(&host, "net");
    let (_, b) = start(&host, "net");
    let (_, c) = start(&host, "net");

    // Refused synchronously, leaving the accounting as it was.
    let (_, refused, _) = c.try_recv().unwrap();
    assert_eq!(refused, Err(RuntimeError::RequestRefused { active: 3, limit: 2 }));
    assert_eq!(refused.unwrap_err().code().to_string(), "REQUEST_REFUSED");

    for rx in [a, b] {
        let (_, result, _) = rx.recv_timeout(Duration::from_secs(10)).unwrap();
        result.unwrap();
    }
    assert_eq!(host.active_requests(), 0);

    // Capacity is back.
    let mut bindings = input();
    host.run_network_blocking("net", &mut bindings).unwrap();
}

#[test]
fn test_admission_under_racing_submitters() {
    const LIMIT: usize = 2;
    const SUBMITTERS: usize = 8;
    let config = HostConfig {
        max_active_requests: LIMIT,
        ..Default::default()
    };
    let host = Arc::new(host_with(vec![slow_device(300)], config));
    host.add_network(stacked_module("net", 4, 1), &CompilationOptions::default(), false)
        .unwrap();

    let barrier = Arc::new(Barrier::new(SUBMITTERS));
    let submitters: Vec<_> = (0..SUBMITTERS)
        .map(|_| {
            let host = Arc::clone(&host);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                let (_, rx) = start(&host, "net");
                rx.recv_timeout(Duration::from_secs(30)).unwrap().1
            })
        })
        .collect();
    let results: Vec<_> = submitters.into_iter().map(|s| s.join().unwrap()).collect();

    let admitted = results.iter().filter(|r| r.is_ok()).count();
    let refused = results
        .iter()
        .filter(|r| matches!(r, Err(RuntimeError::RequestRefused { limit: LIMIT, .. })))
        .count();
    assert_eq!(admitted + refused, SUBMITTERS, "{results:?}");
    assert!(admitted >= 1);
    assert!(refused >= 1);
    assert!(admitted <= LIMIT + SUBMITTERS);
    assert_eq!(host.active_requests(), 0);
}

#[test]
fn test_concurrent_blocking_runs() {
    let host = Arc::new(cpu_host(2));
    host.add_network(stacked_module("net", 8, 3), &CompilationOptions::default(), true)
        .unwrap();

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let host = Arc::clone(&host);
            std::thread::spawn(move || {
                for _ in 0..10 {
                    let tensor = Tensor::from_f32(Shape::matrix(1, 8), &[1.0; 8]).unwrap();
                    let mut bindings: PlaceholderBindings = [("input".to_string(), tensor)].into_iter().collect();
                    host.run_network_blocking("net", &mut bindings).unwrap();
                    let out = bindings.get("output").unwrap().as_f32().unwrap();
                    // 1.0 → 0.75 → 0.625 → 0.5625
                    assert!(out.iter().all(|&v| v == 0.5625));
                }
            })
        })
        .collect();
    for w in workers {
        w.join().unwrap();
    }
    assert_eq!(host.active_requests(), 0);
}

// ── Placement ──────────────────────────────────────────────────

#[test]
fn test_saturate_replicates_across_devices() {
    let host = cpu_host(3);
    host.add_network(stacked_module("net", 4, 1), &CompilationOptions::default(), true)
        .unwrap();
    let dag = host.network_dag("net").unwrap();
    assert_eq!(dag.len(), 1);
    assert_eq!(dag.nodes[0].device_ids.len(), 3);

    let mut bindings = input();
    host.run_network_blocking("net", &mut bindings).unwrap();
    assert_eq!(output(&bindings), expected(1));

    // Every replica holds the function until removal.
    let loaded = host.device_descriptors();
    assert!(loaded.iter().all(|d| d.available_memory < d.total_memory));
    host.remove_network("net").unwrap();
    assert!(host.device_descriptors().iter().all(|d| d.available_memory == d.total_memory));
}

#[test]
fn test_split_across_small_devices() {
    // Each layer needs 16 * 3 + 64 + 16 = 128 bytes.
    let devices = (0..3)
        .map(|_| DeviceConfig::new("CPU").with_memory(MemoryBudget::from_bytes(200)))
        .collect();
    let host = host_with(devices, HostConfig::default()).with_partitioner(GreedyPartitioner::new());
    host.add_network(stacked_module("net", 4, 3), &CompilationOptions::default(), false)
        .unwrap();
    let dag = host.network_dag("net").unwrap();
    assert!(dag.len() > 1);

    let context = ExecutionContext::new(input()).with_trace(TraceLevel::Runtime);
    let (result, context) = host.run_network_blocking_with_context("net", context);
    result.unwrap();
    assert_eq!(output(context.bindings()), expected(3));
    // One event per partition plus the whole run.
    assert_eq!(context.trace().unwrap().events().len(), dag.len() + 1);
}

#[test]
fn test_network_too_large_for_host() {
    let devices = vec![DeviceConfig::new("CPU").with_memory(MemoryBudget::from_bytes(64))];
    let host = host_with(devices, HostConfig::default());
    let err = host
        .add_network(stacked_module("net", 4, 1), &CompilationOptions::default(), false)
        .unwrap_err();
    assert!(matches!(err, RuntimeError::Partition(_)));
    assert!(host.network_names().is_empty());
}

// ── Quantization ───────────────────────────────────────────────

#[test]
fn test_profile_then_quantize() {
    let host = cpu_host(1);

    host.add_network(stacked_module("net", 4, 2), &CompilationOptions::profiling(), false)
        .unwrap();
    assert_eq!(host.device_descriptors()[0].backend_name, "Interpreter");
    let (result, mut context) = host.run_network_blocking_with_context("net", ExecutionContext::new(input()));
    result.unwrap();
    let profile = context.take_trace().unwrap().take_ranges();
    assert!(profile.contains_key("fc0"));
    assert!(profile.contains_key("act1"));
    host.remove_network("net").unwrap();

    host.add_network(stacked_module("net", 4, 2), &CompilationOptions::quantized(profile), false)
        .unwrap();
    assert_eq!(host.device_descriptors()[0].backend_name, "CPU");
    let mut bindings = input();
    host.run_network_blocking("net", &mut bindings).unwrap();
    for (got, want) in output(&bindings).iter().zip(expected(2)) {
        assert!((got - want).abs() < 0.05, "{got} vs {want}");
    }
}

#[test]
fn test_profiling_needs_an_empty_host() {
    let host = cpu_host(1);
    host.add_network(stacked_module("plain", 4, 1), &CompilationOptions::default(), false)
        .unwrap();
    let err = host
        .add_network(stacked_module("profiled", 4, 1), &CompilationOptions::profiling(), false)
        .unwrap_err();
    assert!(matches!(err, RuntimeError::ProfilingConflict(_)));
    assert!(!host.network_added("profiled"));

    host.remove_network("plain").unwrap();
    host.add_network(stacked_module("profiled", 4, 1), &CompilationOptions::profiling(), false)
        .unwrap();
    let err = host
        .add_network(stacked_module("plain", 4, 1), &CompilationOptions::default(), false)
        .unwrap_err();
    assert!(matches!(err, RuntimeError::ProfilingConflict(_)));
}

// ── Teardown and config ────────────────────────────────────────

#[test]
fn test_clear_host_twice() {
    let host = cpu_host(2);
    host.add_network(stacked_module("a", 4, 1), &CompilationOptions::default(), false)
        .unwrap();
    host.add_network(stacked_module("b", 4, 1), &CompilationOptions::default(), true)
        .unwrap();
    host.clear_host().unwrap();
    assert!(host.network_names().is_empty());
    host.clear_host().unwrap();
}

#[test]
fn test_host_from_toml() {
    let config = RuntimeConfig::from_toml(
        r#"
[host]
executor_threads = 2
max_active_requests = 4

[[devices]]
backend_name = "CPU"
name = "cpu-a"
memory = "1M"

[[devices]]
backend_name = "Interpreter"
"#,
    )
    .unwrap();
    let host = HostManager::from_config(config).unwrap();
    let names: Vec<String> = host.device_descriptors().into_iter().map(|d| d.name).collect();
    assert_eq!(names, vec!["cpu-a".to_string(), "config1".to_string()]);
    assert_eq!(host.host_config().max_active_requests, 4);

    assert!(matches!(
        HostManager::new(vec![DeviceConfig::new("TPU")], HostConfig::default()),
        Err(RuntimeError::UnknownBackend(_))
    ));
}
