// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Compiles DAG nodes and loads them onto their devices.
//!
//! Provisioning is all-or-nothing per call: if any node fails to compile
//! or load, everything this call already loaded is evicted again and
//! unregistered before the error is returned.

use crate::backend::CompiledFunction;
use crate::device::{wait, Device};
use crate::{CompilationOptions, RuntimeError};
use graph_ir::{Module, Validated};
use partitioner::{Dag, DagNode, DeviceId};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

/// Registry of compiled functions, keyed by DAG node name.
pub struct Provisioner {
    devices: BTreeMap<DeviceId, Arc<dyn Device>>,
    functions: Mutex<HashMap<String, Arc<dyn CompiledFunction>>>,
}

impl Provisioner {
    pub fn new(devices: &[Arc<dyn Device>]) -> Self {
        Self {
            devices: devices.iter().map(|d| (d.id(), Arc::clone(d))).collect(),
            functions: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<dyn CompiledFunction>>> {
        self.functions.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn device(&self, id: DeviceId) -> Result<&Arc<dyn Device>, RuntimeError> {
        self.devices.get(&id).ok_or_else(|| RuntimeError::Device {
            device: id.to_string(),
            detail: "no such device in the pool".into(),
        })
    }

    /// Compiles every node of every DAG with its devices' backend and loads
    /// it onto each assigned device.
    ///
    /// Blocks until every device has acknowledged.
    pub fn provision(
        &self,
        dags: &[Dag],
        module: &Module<Validated>,
        options: &CompilationOptions,
    ) -> Result<(), RuntimeError> {
        let mut loaded: Vec<(DeviceId, String)> = Vec::new();
        let mut registered: Vec<String> = Vec::new();

        let result = dags
            .iter()
            .flat_map(|dag| dag.nodes.iter())
            .try_for_each(|node| self.provision_node(node, module, options, &mut loaded, &mut registered));

        if let Err(e) = &result {
            tracing::warn!("provisioning failed, rolling back {} load(s): {e}", loaded.len());
            for (id, name) in loaded.iter().rev() {
                let Ok(device) = self.device(*id) else { continue };
                match wait(device.evict(name), device.name()) {
                    Ok((_, Ok(()))) => {}
                    Ok((_, Err(err))) | Err(err) => {
                        tracing::warn!(device = %device.name(), function = %name, "rollback evict failed: {err}");
                    }
                }
            }
            let mut functions = self.lock();
            for name in &registered {
                functions.remove(name);
            }
        }
        result
    }

    fn provision_node(
        &self,
        node: &DagNode,
        module: &Module<Validated>,
        options: &CompilationOptions,
        loaded: &mut Vec<(DeviceId, String)>,
        registered: &mut Vec<String>,
    ) -> Result<(), RuntimeError> {
        let duplicate = || RuntimeError::Compile {
            name: node.name.clone(),
            detail: "a function with this name is already provisioned".into(),
        };
        if self.lock().contains_key(&node.name) {
            return Err(duplicate());
        }

        let first = node.device_ids.first().ok_or_else(|| RuntimeError::Compile {
            name: node.name.clone(),
            detail: "DAG node has no device".into(),
        })?;
        let backend = Arc::clone(self.device(*first)?.backend());
        if backend.name() != node.backend_name {
            return Err(RuntimeError::Compile {
                name: node.name.clone(),
                detail: format!("expected backend {}, device runs {}", node.backend_name, backend.name()),
            });
        }
        let function: Arc<dyn CompiledFunction> = Arc::from(backend.compile(module, node, options)?);

        for &id in &node.device_ids {
            let device = self.device(id)?;
            wait(device.provision(Arc::clone(&function)), device.name())??;
            loaded.push((id, node.name.clone()));
        }

        let mut functions = self.lock();
        if functions.contains_key(&node.name) {
            return Err(duplicate());
        }
        functions.insert(node.name.clone(), function);
        registered.push(node.name.clone());
        tracing::debug!(function = %node.name, devices = node.device_ids.len(), "provisioned");
        Ok(())
    }

    /// Drops the compiled function `name` from the registry.
    pub fn remove_function(&self, name: &str) -> Result<(), RuntimeError> {
        match self.lock().remove(name) {
            Some(_) => Ok(()),
            None => Err(RuntimeError::Compile {
                name: name.to_string(),
                detail: "no provisioned function with this name".into(),
            }),
        }
    }

    pub fn function(&self, name: &str) -> Option<Arc<dyn CompiledFunction>> {
        self.lock().get(name).cloned()
    }

    /// Number of registered functions.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for Provisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provisioner")
            .field("devices", &self.devices.len())
            .field("functions", &self.len())
            .finish()
    }
}
