// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # runtime
//!
//! The host side of the inference runtime: registers networks on a pool of
//! devices and serves concurrent run requests against them.
//!
//! The runtime takes:
//! - A `Module` from `graph-ir` holding one or more functions.
//! - A [`Partitioner`](partitioner::Partitioner) from `partitioner` (auto
//!   selection by default).
//! - Device configurations, each backed by a `MemoryPool` from
//!   `memory-manager`.
//!
//! # Pipeline
//! ```text
//! add_network: optimize ─► partition ─► Provisioner (compile + load) ─► registry
//! run_network: admission ─► ThreadPoolExecutor (DAG order) ─► Device queues
//! ```
//!
//! # Threading
//! Each device owns one worker thread fed by a command queue. The executor
//! runs DAGs on a fixed `tokio` thread pool. Blocking entry points
//! (`run_network_blocking`, `remove_network`, `clear_host`) must be called
//! from outside any async context.

mod backend;
mod config;
mod context;
mod device;
mod error;
mod executor;
mod host_manager;
mod provisioner;
mod trace;

#[cfg(test)]
mod test_util;

pub use backend::{create_backend, Backend, CompiledFunction, InterpretedFunction, InterpreterBackend};
pub use config::{
    CompilationOptions, DeviceConfig, HostConfig, QuantizationMode, RuntimeConfig, DEFAULT_DEVICE_MEMORY,
};
pub use context::{ExecutionContext, PlaceholderBindings};
pub use device::{create_device, CpuDevice, Device, RUN_DELAY_PARAM};
pub use error::{ErrorCode, FirstError, RuntimeError};
pub use executor::{ResultCallback, RunId, ThreadPoolExecutor};
pub use host_manager::HostManager;
pub use provisioner::Provisioner;
pub use trace::{TraceContext, TraceEvent, TraceLevel, ValueRange};
