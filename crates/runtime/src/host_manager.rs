// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The host manager: registry of networks and front door for run requests.
//!
//! # Network Lifecycle
//!
//! ```text
//! add_network:   reserve name ─► optimize ─► partition ─► provision ─► Active
//! remove_network: Active (no runs) ─► Removing ─► evict everywhere ─► erased
//! ```
//!
//! Names are reserved while an add is in flight, so two concurrent adds
//! cannot both claim one. A `Removing` network is invisible to new runs.
//!
//! # Admission
//!
//! Every accepted run holds a reference on its network and one slot of the
//! host-wide `max_active_requests` budget until its callback fires. Both are
//! released before the caller's callback runs.

use crate::config::HostConfig;
use crate::device::{create_device, wait, Device};
use crate::executor::{ResultCallback, RunId, ThreadPoolExecutor};
use crate::{
    CompilationOptions, DeviceConfig, ExecutionContext, FirstError, PlaceholderBindings,
    Provisioner, QuantizationMode, RuntimeConfig, RuntimeError,
};
use graph_ir::{Building, Module, Stripped};
use partitioner::{AutoPartitioner, Dag, DeviceDescriptor, DeviceId, Partitioner};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tokio::sync::oneshot;

// ── Registry ───────────────────────────────────────────────────

struct NetworkEntry {
    dag: Arc<Dag>,
    module: Arc<Module<Stripped>>,
    /// Runs currently holding this network.
    refcount: usize,
    removing: bool,
}

#[derive(Default)]
struct Registry {
    networks: HashMap<String, NetworkEntry>,
    /// Names claimed by an `add_network` still in progress.
    pending: HashSet<String>,
    /// An add is swapping the device pool.
    rebuilding: bool,
}

/// State shared with completion callbacks.
#[derive(Default)]
struct HostState {
    registry: Mutex<Registry>,
    active: AtomicUsize,
}

impl HostState {
    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Takes a reference on an active network.
    fn acquire(&self, name: &str) -> Option<Arc<Dag>> {
        let mut registry = self.lock();
        let entry = registry.networks.get_mut(name).filter(|e| !e.removing)?;
        entry.refcount += 1;
        Some(Arc::clone(&entry.dag))
    }

    fn release(&self, name: &str) {
        if let Some(entry) = self.lock().networks.get_mut(name) {
            entry.refcount -= 1;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

// ── Devices, provisioner and executor ──────────────────────────

struct HostServices {
    devices: Vec<Arc<dyn Device>>,
    provisioner: Provisioner,
    executor: ThreadPoolExecutor,
    /// Devices run the profiling backend instead of their configured one.
    profiling: bool,
}

impl HostServices {
    fn start(configs: &[DeviceConfig], host: &HostConfig, profiling: bool) -> Result<Self, RuntimeError> {
        let backend_override = profiling.then_some(host.profiling_backend.as_str());
        let devices = configs
            .iter()
            .enumerate()
            .map(|(i, c)| create_device(i, c, backend_override))
            .collect::<Result<Vec<_>, _>>()?;
        for device in &devices {
            device.init()?;
        }
        Ok(Self {
            provisioner: Provisioner::new(&devices),
            executor: ThreadPoolExecutor::new(&devices, host.executor_threads)?,
            devices,
            profiling,
        })
    }

    fn device(&self, id: DeviceId) -> Result<&Arc<dyn Device>, RuntimeError> {
        self.devices.iter().find(|d| d.id() == id).ok_or_else(|| RuntimeError::Device {
            device: id.to_string(),
            detail: "no such device".into(),
        })
    }

    fn stop(&self) -> Result<(), RuntimeError> {
        self.executor.shutdown();
        let mut errors = FirstError::new();
        for device in &self.devices {
            errors.push(device.stop());
        }
        errors.get()
    }
}

// ── Host manager ───────────────────────────────────────────────

/// Owns the devices of one host and the networks registered on them.
///
/// # Example
///
/// ```no_run
/// use runtime::{CompilationOptions, DeviceConfig, HostConfig, HostManager, PlaceholderBindings};
/// # fn build() -> graph_ir::Module<graph_ir::Building> { unimplemented!() }
///
/// let host = HostManager::new(vec![DeviceConfig::new("CPU")], HostConfig::default()).unwrap();
/// host.add_network(build(), &CompilationOptions::default(), false).unwrap();
/// let mut bindings = PlaceholderBindings::new();
/// host.run_network_blocking("main", &mut bindings).unwrap();
/// ```
pub struct HostManager {
    state: Arc<HostState>,
    services: RwLock<Arc<HostServices>>,
    partitioner: Box<dyn Partitioner>,
    host_config: HostConfig,
    device_configs: Vec<DeviceConfig>,
    next_run_id: AtomicU64,
    cleared: AtomicBool,
}

impl HostManager {
    /// Creates and initializes one device per config.
    pub fn new(device_configs: Vec<DeviceConfig>, host_config: HostConfig) -> Result<Self, RuntimeError> {
        let config = RuntimeConfig {
            host: host_config,
            devices: device_configs,
        };
        config.validate()?;
        let services = HostServices::start(&config.devices, &config.host, false)?;
        tracing::info!(
            devices = services.devices.len(),
            executor_threads = config.host.executor_threads,
            max_active_requests = config.host.max_active_requests,
            "host started"
        );
        Ok(Self {
            state: Arc::new(HostState::default()),
            services: RwLock::new(Arc::new(services)),
            partitioner: Box::new(AutoPartitioner),
            host_config: config.host,
            device_configs: config.devices,
            next_run_id: AtomicU64::new(0),
            cleared: AtomicBool::new(false),
        })
    }

    pub fn from_config(config: RuntimeConfig) -> Result<Self, RuntimeError> {
        Self::new(config.devices, config.host)
    }

    /// Replaces the partitioning strategy used by later adds.
    pub fn with_partitioner(mut self, partitioner: impl Partitioner + 'static) -> Self {
        tracing::info!("partitioner → using {} strategy", partitioner.name());
        self.partitioner = Box::new(partitioner);
        self
    }

    fn services(&self) -> Arc<HostServices> {
        Arc::clone(&self.services.read().unwrap_or_else(|e| e.into_inner()))
    }

    /// Swaps in a fresh device pool. Only called on an idle host.
    fn rebuild(&self, profiling: bool) -> Result<Arc<HostServices>, RuntimeError> {
        let fresh = Arc::new(HostServices::start(&self.device_configs, &self.host_config, profiling)?);
        let old = std::mem::replace(
            &mut *self.services.write().unwrap_or_else(|e| e.into_inner()),
            Arc::clone(&fresh),
        );
        if let Err(e) = old.stop() {
            tracing::warn!("stopping previous devices failed: {e}");
        }
        tracing::info!(
            profiling,
            backend = %fresh.devices.first().map_or("", |d| d.backend().name()),
            "device pool rebuilt"
        );
        Ok(fresh)
    }

    // ── Adding ─────────────────────────────────────────────────

    /// Registers every function of `module` as a network.
    ///
    /// On failure nothing stays registered and the names are free again.
    pub fn add_network(
        &self,
        module: Module<Building>,
        options: &CompilationOptions,
        saturate_host: bool,
    ) -> Result<(), RuntimeError> {
        let names: Vec<String> = module.functions().iter().map(|f| f.name().to_string()).collect();
        let services = self.reserve(&names, options.quant_mode == QuantizationMode::Profile)?;

        let result = self.compile_and_load(module, &names, options, saturate_host, &services);

        let mut registry = self.state.lock();
        for name in &names {
            registry.pending.remove(name);
        }
        match result {
            Ok(entries) => {
                registry.networks.extend(entries);
                tracing::info!(networks = ?names, "network added");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(networks = ?names, "adding network failed: {e}");
                Err(e)
            }
        }
    }

    /// Claims `names`, switching the device pool to or from the profiling
    /// backend when the request needs it.
    ///
    /// The registry lock is released before the pool is rebuilt: stopping
    /// the old pool drains runs whose callbacks may take the lock.
    fn reserve(&self, names: &[String], profiling: bool) -> Result<Arc<HostServices>, RuntimeError> {
        if self.cleared.load(Ordering::SeqCst) {
            return Err(RuntimeError::ExecutorShutdown);
        }
        {
            let mut registry = self.state.lock();
            let mut seen = HashSet::new();
            for name in names {
                if !seen.insert(name) || registry.networks.contains_key(name) || registry.pending.contains(name) {
                    return Err(RuntimeError::AlreadyRegistered(name.clone()));
                }
            }
            if registry.rebuilding {
                return Err(RuntimeError::ProfilingConflict("host is switching device pools".into()));
            }

            let idle = registry.networks.is_empty() && registry.pending.is_empty();
            if profiling {
                if names.len() != 1 {
                    return Err(RuntimeError::ProfilingConflict(format!(
                        "profiling compiles exactly one function, module has {}",
                        names.len()
                    )));
                }
                if !idle {
                    return Err(RuntimeError::ProfilingConflict(
                        "profiling needs a host with no other network".into(),
                    ));
                }
            }

            let services = self.services();
            if services.profiling != profiling && !idle {
                return Err(RuntimeError::ProfilingConflict(
                    "host is serving a profiling network".into(),
                ));
            }
            registry.pending.extend(names.iter().cloned());
            if services.profiling == profiling {
                return Ok(services);
            }
            registry.rebuilding = true;
        }

        let rebuilt = self.rebuild(profiling);
        let mut registry = self.state.lock();
        registry.rebuilding = false;
        if rebuilt.is_err() {
            for name in names {
                registry.pending.remove(name);
            }
        }
        rebuilt
    }

    fn compile_and_load(
        &self,
        module: Module<Building>,
        names: &[String],
        options: &CompilationOptions,
        saturate_host: bool,
        services: &HostServices,
    ) -> Result<Vec<(String, NetworkEntry)>, RuntimeError> {
        let module = module.optimize()?;

        let mut descriptors: Vec<DeviceDescriptor> = services.devices.iter().map(|d| d.descriptor()).collect();
        let mut dags = Vec::with_capacity(names.len());
        for name in names {
            let dag = self.partitioner.partition(&module, name, &descriptors, saturate_host)?;
            dag.validate(&module, &descriptors)?;
            for node in &dag.nodes {
                for id in &node.device_ids {
                    if let Some(d) = descriptors.iter_mut().find(|d| d.id == *id) {
                        d.available_memory = d.available_memory.saturating_sub(node.estimated_memory_bytes);
                    }
                }
            }
            tracing::info!("{}", dag.summary());
            dags.push(dag);
        }

        services.provisioner.provision(&dags, &module, options)?;

        let module = Arc::new(module.strip_constants());
        Ok(names
            .iter()
            .cloned()
            .zip(dags)
            .map(|(name, dag)| {
                let entry = NetworkEntry {
                    dag: Arc::new(dag),
                    module: Arc::clone(&module),
                    refcount: 0,
                    removing: false,
                };
                (name, entry)
            })
            .collect())
    }

    // ── Removing ───────────────────────────────────────────────

    /// Evicts network `name` from its devices and forgets it.
    ///
    /// Unknown names succeed. A network with runs in flight, or already
    /// being removed, is [`RuntimeError::NetworkBusy`].
    pub fn remove_network(&self, name: &str) -> Result<(), RuntimeError> {
        let dag = {
            let mut registry = self.state.lock();
            let Some(entry) = registry.networks.get_mut(name) else {
                return Ok(());
            };
            if entry.refcount > 0 || entry.removing {
                return Err(RuntimeError::NetworkBusy(name.to_string()));
            }
            entry.removing = true;
            Arc::clone(&entry.dag)
        };

        let services = self.services();
        let mut errors = FirstError::new();
        for node in &dag.nodes {
            for &id in &node.device_ids {
                let evicted = services.device(id).and_then(|device| {
                    let (_, result) = wait(device.evict(&node.name), device.name())?;
                    result
                });
                errors.push(evicted);
            }
            errors.push(services.provisioner.remove_function(&node.name));
        }

        self.state.lock().networks.remove(name);
        tracing::info!(network = %name, "network removed");
        errors.get()
    }

    /// `true` if `name` is registered and not being removed.
    pub fn network_added(&self, name: &str) -> bool {
        self.state.lock().networks.get(name).is_some_and(|e| !e.removing)
    }

    // ── Running ────────────────────────────────────────────────

    /// Starts a run of network `name` and returns its id immediately.
    ///
    /// `callback` fires exactly once: synchronously when the network is
    /// unknown or the host is at `max_active_requests`, otherwise on an
    /// executor thread once the run finishes.
    pub fn run_network(&self, name: &str, context: ExecutionContext, callback: ResultCallback) -> RunId {
        let run_id = self.next_run_id.fetch_add(1, Ordering::Relaxed);

        let Some(dag) = self.state.acquire(name) else {
            tracing::debug!(run_id, network = %name, "run of unknown network");
            callback(run_id, Err(RuntimeError::NetworkNotFound(name.to_string())), context);
            return run_id;
        };

        let limit = self.host_config.max_active_requests;
        let active = self.state.active.fetch_add(1, Ordering::SeqCst) + 1;
        if active > limit {
            self.state.release(name);
            tracing::debug!(run_id, network = %name, active, limit, "run refused");
            callback(run_id, Err(RuntimeError::RequestRefused { active, limit }), context);
            return run_id;
        }

        let state = Arc::clone(&self.state);
        let network = name.to_string();
        self.services().executor.run(
            dag,
            context,
            run_id,
            Box::new(move |id, result, context| {
                state.release(&network);
                callback(id, result, context);
            }),
        );
        run_id
    }

    /// Runs network `name` and waits for it, returning the context with the
    /// outputs and trace.
    ///
    /// # Panics
    ///
    /// Must not be called from inside an async context. Panics if the run's
    /// callback is dropped without firing.
    pub fn run_network_blocking_with_context(
        &self,
        name: &str,
        context: ExecutionContext,
    ) -> (Result<(), RuntimeError>, ExecutionContext) {
        let (tx, rx) = oneshot::channel();
        let run_id = self.run_network(
            name,
            context,
            Box::new(move |_, result, context| {
                let _ = tx.send((result, context));
            }),
        );
        rx.blocking_recv()
            .unwrap_or_else(|_| panic!("run {run_id} of '{name}' dropped its completion callback"))
    }

    /// Runs network `name` on `bindings` and waits for it. Outputs are
    /// written back into `bindings`.
    ///
    /// # Panics
    ///
    /// Same as [`run_network_blocking_with_context`](Self::run_network_blocking_with_context).
    pub fn run_network_blocking(&self, name: &str, bindings: &mut PlaceholderBindings) -> Result<(), RuntimeError> {
        let context = ExecutionContext::new(std::mem::take(bindings));
        let (result, context) = self.run_network_blocking_with_context(name, context);
        *bindings = context.into_bindings();
        result
    }

    // ── Teardown ───────────────────────────────────────────────

    /// Drains every run, removes every network and stops the devices.
    /// Idempotent.
    ///
    /// # Panics
    ///
    /// Panics if a request is still accounted as active once the executor
    /// has drained, or if a run is submitted concurrently.
    pub fn clear_host(&self) -> Result<(), RuntimeError> {
        if self.cleared.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let services = self.services();
        services.executor.shutdown();
        let active = self.state.active.load(Ordering::SeqCst);
        assert_eq!(active, 0, "{active} request(s) still active after the executor drained");

        let mut errors = FirstError::new();
        let names: Vec<String> = self.state.lock().networks.keys().cloned().collect();
        for name in &names {
            errors.push(self.remove_network(name));
        }
        errors.push(services.stop());
        tracing::info!(removed = names.len(), "host cleared");
        errors.get()
    }

    // ── Accessors ──────────────────────────────────────────────

    /// Registered network names, sorted.
    pub fn network_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .state
            .lock()
            .networks
            .iter()
            .filter(|(_, e)| !e.removing)
            .map(|(n, _)| n.clone())
            .collect();
        names.sort();
        names
    }

    /// Runs admitted and not yet called back.
    pub fn active_requests(&self) -> usize {
        self.state.active.load(Ordering::SeqCst)
    }

    pub fn device_descriptors(&self) -> Vec<DeviceDescriptor> {
        self.services().devices.iter().map(|d| d.descriptor()).collect()
    }

    pub fn network_dag(&self, name: &str) -> Option<Arc<Dag>> {
        self.state.lock().networks.get(name).map(|e| Arc::clone(&e.dag))
    }

    /// The network's module with constant payloads dropped.
    pub fn network_module(&self, name: &str) -> Option<Arc<Module<Stripped>>> {
        self.state.lock().networks.get(name).map(|e| Arc::clone(&e.module))
    }

    pub fn host_config(&self) -> &HostConfig {
        &self.host_config
    }
}

impl Drop for HostManager {
    fn drop(&mut self) {
        if let Err(e) = self.clear_host() {
            tracing::warn!("clearing host on drop failed: {e}");
        }
    }
}

impl std::fmt::Debug for HostManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostManager")
            .field("partitioner", &self.partitioner.name())
            .field("networks", &self.network_names())
            .field("active_requests", &self.active_requests())
            .finish()
    }
}
