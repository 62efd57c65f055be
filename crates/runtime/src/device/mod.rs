// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Devices: command queues in front of a memory budget and a backend.
//!
//! Every command returns a [`oneshot::Receiver`] that resolves once the
//! device has processed it. Commands to one device are handled strictly
//! in submission order.

mod cpu;

pub use cpu::{CpuDevice, RUN_DELAY_PARAM};

use crate::backend::{create_backend, Backend, CompiledFunction, REFERENCE_BACKENDS};
use crate::{DeviceConfig, ExecutionContext, RuntimeError};
use partitioner::{DeviceDescriptor, DeviceId};
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Resolves when a provision command has been processed.
pub type ProvisionReceiver = oneshot::Receiver<Result<(), RuntimeError>>;
/// Resolves with the evicted function's name and the outcome.
pub type EvictReceiver = oneshot::Receiver<(String, Result<(), RuntimeError>)>;
/// Resolves with the run outcome and the context handed in.
pub type RunReceiver = oneshot::Receiver<(Result<(), RuntimeError>, ExecutionContext)>;

/// A compute device managed by the host.
pub trait Device: Send + Sync + fmt::Debug {
    fn id(&self) -> DeviceId;

    fn name(&self) -> &str;

    fn backend(&self) -> &Arc<dyn Backend>;

    /// Identity, capacity and capabilities as the partitioner sees them.
    fn descriptor(&self) -> DeviceDescriptor;

    /// Starts the command queue. Idempotent.
    fn init(&self) -> Result<(), RuntimeError>;

    /// Drains the command queue and unloads everything. Idempotent.
    fn stop(&self) -> Result<(), RuntimeError>;

    /// Loads a compiled function under its name.
    fn provision(&self, function: Arc<dyn CompiledFunction>) -> ProvisionReceiver;

    /// Unloads the function `name`.
    fn evict(&self, name: &str) -> EvictReceiver;

    /// Runs the loaded function `name` against `context`.
    fn run(&self, name: &str, context: ExecutionContext) -> RunReceiver;

    fn available_memory(&self) -> usize;

    /// Runs submitted and not yet finished.
    fn pending_runs(&self) -> usize;
}

/// Creates the device described by `config`, as entry `index` of the pool.
///
/// `backend_override` replaces the configured backend, keeping the name.
pub fn create_device(
    index: usize,
    config: &DeviceConfig,
    backend_override: Option<&str>,
) -> Result<Arc<dyn Device>, RuntimeError> {
    let backend_name = backend_override.unwrap_or(&config.backend_name);
    if !REFERENCE_BACKENDS.contains(&backend_name) {
        return Err(RuntimeError::UnknownBackend(backend_name.to_string()));
    }
    let backend = create_backend(backend_name)?;
    Ok(Arc::new(CpuDevice::new(DeviceId(index), config, backend)?))
}

/// Blocks on a device reply.
///
/// Must not be called from inside an async context.
pub(crate) fn wait<T>(rx: oneshot::Receiver<T>, device: &str) -> Result<T, RuntimeError> {
    rx.blocking_recv().map_err(|_| RuntimeError::Device {
        device: device.to_string(),
        detail: "device dropped the reply".into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_names_and_override() {
        let config = DeviceConfig::new("CPU").with_name("cpu0");
        let d = create_device(2, &config, None).unwrap();
        assert_eq!(d.id(), DeviceId(2));
        assert_eq!(d.name(), "cpu0");
        assert_eq!(d.backend().name(), "CPU");

        let d = create_device(0, &config, Some("Interpreter")).unwrap();
        assert_eq!(d.name(), "cpu0");
        assert_eq!(d.descriptor().backend_name, "Interpreter");
    }

    #[test]
    fn test_factory_unknown_backend() {
        let config = DeviceConfig::new("Habana");
        assert_eq!(
            create_device(0, &config, None).unwrap_err(),
            RuntimeError::UnknownBackend("Habana".into())
        );
    }
}
