// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Runs DAGs on a fixed pool of worker threads.
//!
//! A run walks its DAG in dependency order: a node is submitted to a device
//! once all its parents have finished, and nodes without a dependency
//! between them are in flight at the same time. Each node gets its own
//! child context holding only its inputs; its outputs and trace are merged
//! back when it finishes. The completion callback fires exactly once, with
//! the first error of the run, if any.

use crate::device::Device;
use crate::{ExecutionContext, FirstError, RuntimeError};
use partitioner::{Dag, DagNode, DeviceId};
use std::collections::BTreeMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Instant;
use tokio::runtime::Runtime;
use tokio::task::JoinSet;

/// Identifies one run request.
pub type RunId = u64;

/// Completion callback of a run.
pub type ResultCallback =
    Box<dyn FnOnce(RunId, Result<(), RuntimeError>, ExecutionContext) + Send + 'static>;

// ── In-flight accounting ───────────────────────────────────────

#[derive(Default)]
struct GateState {
    in_flight: usize,
    shut_down: bool,
}

#[derive(Default)]
struct Gate {
    state: Mutex<GateState>,
    drained: Condvar,
}

impl Gate {
    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Marks one admitted run; releases it on drop, after the callback.
struct InFlight(Arc<Gate>);

impl Drop for InFlight {
    fn drop(&mut self) {
        let mut state = self.0.lock();
        state.in_flight -= 1;
        if state.in_flight == 0 {
            self.0.drained.notify_all();
        }
    }
}

// ── Executor ───────────────────────────────────────────────────

/// Executor backed by a multi-threaded `tokio` runtime.
pub struct ThreadPoolExecutor {
    devices: Arc<BTreeMap<DeviceId, Arc<dyn Device>>>,
    runtime: Mutex<Option<Runtime>>,
    gate: Arc<Gate>,
    threads: usize,
}

impl ThreadPoolExecutor {
    pub fn new(devices: &[Arc<dyn Device>], threads: usize) -> Result<Self, RuntimeError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(threads.max(1))
            .thread_name("executor")
            .enable_time()
            .build()
            .map_err(|e| RuntimeError::ConfigError(format!("cannot start executor: {e}")))?;
        Ok(Self {
            devices: Arc::new(devices.iter().map(|d| (d.id(), Arc::clone(d))).collect()),
            runtime: Mutex::new(Some(runtime)),
            gate: Arc::new(Gate::default()),
            threads: threads.max(1),
        })
    }

    /// Runs currently admitted and not yet called back.
    pub fn in_flight(&self) -> usize {
        self.gate.lock().in_flight
    }

    /// Starts running `dag`. Returns immediately; `callback` is invoked on a
    /// worker thread, or synchronously with [`RuntimeError::ExecutorShutdown`]
    /// after [`shutdown`](Self::shutdown).
    pub fn run(&self, dag: Arc<Dag>, context: ExecutionContext, run_id: RunId, callback: ResultCallback) {
        let handle = {
            let mut state = self.gate.lock();
            let handle = self
                .runtime
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .as_ref()
                .map(|rt| rt.handle().clone());
            match handle {
                Some(handle) if !state.shut_down => {
                    state.in_flight += 1;
                    handle
                }
                _ => {
                    drop(state);
                    tracing::debug!(run_id, "run refused by stopped executor");
                    callback(run_id, Err(RuntimeError::ExecutorShutdown), context);
                    return;
                }
            }
        };

        let guard = InFlight(Arc::clone(&self.gate));
        let devices = Arc::clone(&self.devices);
        handle.spawn(async move {
            let _guard = guard;
            let (result, context) = execute_dag(&dag, &devices, context).await;
            if let Err(e) = &result {
                tracing::debug!(run_id, network = %dag.name(), "run failed: {e}");
            }
            callback(run_id, result, context);
        });
    }

    /// Refuses new runs, waits for every admitted run to call back, then
    /// stops the worker threads. Idempotent.
    ///
    /// Must not be called from a completion callback.
    pub fn shutdown(&self) {
        let mut state = self.gate.lock();
        state.shut_down = true;
        while state.in_flight > 0 {
            state = self
                .gate
                .drained
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
        }
        drop(state);

        let runtime = self.runtime.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(runtime) = runtime {
            runtime.shutdown_background();
            tracing::info!(threads = self.threads, "executor shut down");
        }
    }
}

impl Drop for ThreadPoolExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ThreadPoolExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPoolExecutor")
            .field("threads", &self.threads)
            .field("devices", &self.devices.len())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

/// Least-loaded of the node's devices; lowest id on ties.
fn pick_device<'d>(
    node: &DagNode,
    devices: &'d BTreeMap<DeviceId, Arc<dyn Device>>,
) -> Result<&'d Arc<dyn Device>, RuntimeError> {
    node.device_ids
        .iter()
        .filter_map(|id| devices.get(id))
        .min_by_key(|d| d.pending_runs())
        .ok_or_else(|| RuntimeError::Device {
            device: format!("{:?}", node.device_ids),
            detail: format!("no device available for '{}'", node.name),
        })
}

async fn execute_dag(
    dag: &Dag,
    devices: &BTreeMap<DeviceId, Arc<dyn Device>>,
    mut context: ExecutionContext,
) -> (Result<(), RuntimeError>, ExecutionContext) {
    let started = Instant::now();
    let mut waiting: Vec<usize> = dag.nodes.iter().map(|n| n.parents.len()).collect();
    let mut ready: Vec<usize> = dag.root.children.clone();
    let mut running = JoinSet::new();
    let mut errors = FirstError::new();
    let mut completed = 0;

    loop {
        if !errors.is_err() {
            for i in ready.drain(..) {
                let node = &dag.nodes[i];
                match pick_device(node, devices) {
                    Ok(device) => {
                        let rx = device.run(&node.name, context.child(&node.partition.inputs));
                        running.spawn(async move { (i, rx.await) });
                    }
                    Err(e) => {
                        errors.push(Err(e));
                        break;
                    }
                }
            }
        }

        let Some(joined) = running.join_next().await else {
            break;
        };
        match joined {
            Ok((i, Ok((result, child)))) => {
                let node = &dag.nodes[i];
                let produced = node.partition.outputs.iter().chain(&node.partition.output_placeholders);
                context.absorb(child, produced);
                if errors.push(result) {
                    continue;
                }
                completed += 1;
                for &c in &node.children {
                    waiting[c] -= 1;
                    if waiting[c] == 0 {
                        ready.push(c);
                    }
                }
            }
            Ok((i, Err(_))) => {
                errors.push(Err(RuntimeError::Device {
                    device: dag.nodes[i].name.clone(),
                    detail: "device dropped the run".into(),
                }));
            }
            Err(e) => {
                errors.push(Err(RuntimeError::Device {
                    device: "executor".into(),
                    detail: e.to_string(),
                }));
            }
        }
    }

    if !errors.is_err() && completed != dag.nodes.len() {
        errors.push(Err(RuntimeError::Device {
            device: "executor".into(),
            detail: format!("only {completed} of {} DAG nodes were reachable", dag.nodes.len()),
        }));
    }
    for node in &dag.nodes {
        for name in &node.partition.outputs {
            context.bindings_mut().remove(name);
        }
    }
    if let Some(trace) = context.trace_mut() {
        trace.record(dag.name(), "host", started);
    }
    (errors.get(), context)
}
