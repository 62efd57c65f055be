// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # partitioner
//!
//! Splits a function of a validated `Module` into a [`Dag`] of partitions,
//! each assigned to one or more devices, such that every device's share of
//! estimated memory fits its available memory and every operator lands on
//! a device that supports its kind.
//!
//! # Strategies
//!
//! | Strategy | Partitions | Cross-device edges | Replication |
//! |---|---|---|---|
//! | [`SingleDevicePartitioner`] | 1 | 0 | With `saturate_host` |
//! | [`GreedyPartitioner`] | 1..N | Few | Never |
//!
//! All strategies implement [`Partitioner`], so the host can be handed a
//! custom one:
//!
//! ```ignore
//! struct Pinned;
//! impl Partitioner for Pinned {
//!     fn name(&self) -> &str { "pinned" }
//!     fn partition(&self, module: &Module<Validated>, function: &str,
//!         devices: &[DeviceDescriptor], saturate_host: bool)
//!         -> Result<Dag, PartitionError> { /* ... */ }
//! }
//! ```

pub(crate) mod dag;
mod device;
mod error;
pub mod strategy;

#[cfg(test)]
mod test_util;

pub use dag::{Dag, DagNode, DagRoot, Partition};
pub use device::{DeviceDescriptor, DeviceId};
pub use error::PartitionError;
pub use strategy::greedy::GreedyPartitioner;
pub use strategy::single::SingleDevicePartitioner;
pub use strategy::Partitioner;

use graph_ir::{Module, Validated};

/// Picks a strategy for `function` and runs it.
///
/// Heuristic:
/// - If some device supports every kind and can hold the whole function,
///   use [`SingleDevicePartitioner`] (replicated when `saturate_host`).
/// - Otherwise, use [`GreedyPartitioner`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoPartitioner;

impl Partitioner for AutoPartitioner {
    fn name(&self) -> &str {
        "auto"
    }

    fn partition(
        &self,
        module: &Module<Validated>,
        function: &str,
        devices: &[DeviceDescriptor],
        saturate_host: bool,
    ) -> Result<Dag, PartitionError> {
        auto_partition(module, function, devices, saturate_host)
    }
}

/// See [`AutoPartitioner`].
pub fn auto_partition(
    module: &Module<Validated>,
    function: &str,
    devices: &[DeviceDescriptor],
    saturate_host: bool,
) -> Result<Dag, PartitionError> {
    let dag = match SingleDevicePartitioner::new().partition(module, function, devices, saturate_host) {
        Ok(dag) => {
            tracing::info!(
                function,
                replicas = dag.nodes[0].device_ids.len(),
                "function fits one device → using single-device strategy"
            );
            dag
        }
        Err(PartitionError::NoPartitionFound { .. }) => {
            tracing::info!(function, "no single device fits → using greedy strategy");
            GreedyPartitioner::new().partition(module, function, devices, saturate_host)?
        }
        Err(e) => return Err(e),
    };
    tracing::debug!("{}", dag.summary());
    Ok(dag)
}
