// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! A device backed by a dedicated host thread.
//!
//! Commands travel over an unbounded channel as `(command, reply sender)`
//! pairs. The worker thread owns the loaded functions and their memory
//! reservations; the reservation is dropped with the function on evict.

use super::{Device, EvictReceiver, ProvisionReceiver, RunReceiver};
use crate::backend::{Backend, CompiledFunction};
use crate::{DeviceConfig, ExecutionContext, RuntimeError};
use memory_manager::{MemoryPool, Reservation};
use partitioner::{DeviceDescriptor, DeviceId};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};

/// Config parameter: artificial latency added to every run.
pub const RUN_DELAY_PARAM: &str = "run_delay_ms";

enum Command {
    Provision(Arc<dyn CompiledFunction>, oneshot::Sender<Result<(), RuntimeError>>),
    Evict(String, oneshot::Sender<(String, Result<(), RuntimeError>)>),
    Run(
        String,
        ExecutionContext,
        oneshot::Sender<(Result<(), RuntimeError>, ExecutionContext)>,
    ),
}

struct Worker {
    tx: mpsc::UnboundedSender<Command>,
    handle: JoinHandle<()>,
}

/// Host-thread device running the interpreter backend.
pub struct CpuDevice {
    id: DeviceId,
    name: String,
    backend: Arc<dyn Backend>,
    pool: MemoryPool,
    supported_nodes: Vec<String>,
    non_supported_nodes: Vec<String>,
    run_delay: Option<Duration>,
    pending: Arc<AtomicUsize>,
    worker: Mutex<Option<Worker>>,
}

impl CpuDevice {
    pub fn new(id: DeviceId, config: &DeviceConfig, backend: Arc<dyn Backend>) -> Result<Self, RuntimeError> {
        let run_delay = match config.parameters.get(RUN_DELAY_PARAM) {
            Some(v) => Some(Duration::from_millis(v.parse().map_err(|e| {
                RuntimeError::ConfigError(format!("invalid {RUN_DELAY_PARAM} '{v}': {e}"))
            })?)),
            None => None,
        };
        Ok(Self {
            id,
            name: config.resolve_name(id.0),
            backend,
            pool: MemoryPool::new(config.resolve_memory()),
            supported_nodes: config.supported_nodes.clone(),
            non_supported_nodes: config.non_supported_nodes.clone(),
            run_delay,
            pending: Arc::new(AtomicUsize::new(0)),
            worker: Mutex::new(None),
        })
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<Worker>> {
        self.worker.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn not_running(&self) -> RuntimeError {
        RuntimeError::Device {
            device: self.name.clone(),
            detail: "device is not running".into(),
        }
    }

    /// Queues `command`, handing it back if the device is stopped.
    fn submit(&self, command: Command) -> Result<(), Command> {
        match self.lock_worker().as_ref() {
            Some(worker) => worker.tx.send(command).map_err(|e| e.0),
            None => Err(command),
        }
    }

    /// Functions currently loaded, with their reserved bytes.
    pub fn loaded(&self) -> Vec<(String, usize)> {
        self.pool.reservations()
    }
}

/// State owned by the worker thread.
struct Loaded {
    device: String,
    functions: HashMap<String, (Arc<dyn CompiledFunction>, Reservation)>,
}

impl Loaded {
    fn provision(&mut self, pool: &MemoryPool, function: Arc<dyn CompiledFunction>) -> Result<(), RuntimeError> {
        let name = function.name().to_string();
        if self.functions.contains_key(&name) {
            return Err(RuntimeError::Device {
                device: self.device.clone(),
                detail: format!("function '{name}' is already loaded"),
            });
        }
        let reservation = pool.reserve(name.clone(), function.memory_bytes())?;
        tracing::debug!(device = %self.device, function = %name, bytes = reservation.size_bytes(), "provisioned");
        self.functions.insert(name, (function, reservation));
        Ok(())
    }

    fn evict(&mut self, name: &str) -> Result<(), RuntimeError> {
        match self.functions.remove(name) {
            Some(_) => {
                tracing::debug!(device = %self.device, function = %name, "evicted");
                Ok(())
            }
            None => Err(RuntimeError::FunctionNotLoaded {
                device: self.device.clone(),
                name: name.to_string(),
            }),
        }
    }

    fn run(&self, name: &str, context: &mut ExecutionContext, delay: Option<Duration>) -> Result<(), RuntimeError> {
        let (function, _) = self.functions.get(name).ok_or_else(|| RuntimeError::FunctionNotLoaded {
            device: self.device.clone(),
            name: name.to_string(),
        })?;
        let started = Instant::now();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        let result = function.execute(&self.device, context);
        if let Some(trace) = context.trace_mut() {
            trace.record(name, self.device.as_str(), started);
        }
        result
    }
}

impl Device for CpuDevice {
    fn id(&self) -> DeviceId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    fn descriptor(&self) -> DeviceDescriptor {
        let mut d = DeviceDescriptor::new(
            self.id.0,
            self.name.clone(),
            self.backend.name(),
            self.pool.budget().as_bytes(),
        );
        d.available_memory = self.pool.available_bytes();
        d.supported_nodes = self.supported_nodes.iter().cloned().collect();
        d.non_supported_nodes = self.non_supported_nodes.iter().cloned().collect();
        d
    }

    fn init(&self) -> Result<(), RuntimeError> {
        let mut guard = self.lock_worker();
        if guard.is_some() {
            return Ok(());
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<Command>();
        let pool = self.pool.clone();
        let pending = Arc::clone(&self.pending);
        let delay = self.run_delay;
        let mut loaded = Loaded {
            device: self.name.clone(),
            functions: HashMap::new(),
        };
        let handle = std::thread::Builder::new()
            .name(format!("device-{}", self.name))
            .spawn(move || {
                while let Some(command) = rx.blocking_recv() {
                    match command {
                        Command::Provision(function, reply) => {
                            let _ = reply.send(loaded.provision(&pool, function));
                        }
                        Command::Evict(name, reply) => {
                            let result = loaded.evict(&name);
                            let _ = reply.send((name, result));
                        }
                        Command::Run(name, mut context, reply) => {
                            let result = loaded.run(&name, &mut context, delay);
                            pending.fetch_sub(1, Ordering::SeqCst);
                            let _ = reply.send((result, context));
                        }
                    }
                }
            })
            .map_err(|e| RuntimeError::Device {
                device: self.name.clone(),
                detail: format!("cannot spawn worker thread: {e}"),
            })?;

        *guard = Some(Worker { tx, handle });
        tracing::info!(device = %self.name, backend = %self.backend.name(), budget = %self.pool.budget(), "device started");
        Ok(())
    }

    fn stop(&self) -> Result<(), RuntimeError> {
        let Some(worker) = self.lock_worker().take() else {
            return Ok(());
        };
        drop(worker.tx);
        worker.handle.join().map_err(|_| RuntimeError::Device {
            device: self.name.clone(),
            detail: "worker thread panicked".into(),
        })?;
        tracing::info!(device = %self.name, stats = %self.pool.stats().summary(), "device stopped");
        Ok(())
    }

    fn provision(&self, function: Arc<dyn CompiledFunction>) -> ProvisionReceiver {
        let (tx, rx) = oneshot::channel();
        if let Err(Command::Provision(_, tx)) = self.submit(Command::Provision(function, tx)) {
            let _ = tx.send(Err(self.not_running()));
        }
        rx
    }

    fn evict(&self, name: &str) -> EvictReceiver {
        let (tx, rx) = oneshot::channel();
        if let Err(Command::Evict(name, tx)) = self.submit(Command::Evict(name.to_string(), tx)) {
            let _ = tx.send((name, Err(self.not_running())));
        }
        rx
    }

    fn run(&self, name: &str, context: ExecutionContext) -> RunReceiver {
        let (tx, rx) = oneshot::channel();
        self.pending.fetch_add(1, Ordering::SeqCst);
        if let Err(Command::Run(_, context, tx)) = self.submit(Command::Run(name.to_string(), context, tx)) {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            let _ = tx.send((Err(self.not_running()), context));
        }
        rx
    }

    fn available_memory(&self) -> usize {
        self.pool.available_bytes()
    }

    fn pending_runs(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for CpuDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CpuDevice")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("backend", &self.backend.name())
            .field("pool", &self.pool)
            .field("running", &self.lock_worker().is_some())
            .finish()
    }
}

impl Drop for CpuDevice {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!("failed to stop device: {e}");
        }
    }
}
