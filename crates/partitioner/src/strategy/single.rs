// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Whole-function placement on a single device.
//!
//! The function becomes a one-node DAG on the device with the most
//! available memory among those that support every operator kind in it.
//! When saturating, the node is replicated on every other device of the
//! chosen backend that also qualifies.
//!
//! # When to use
//! - The function fits on one device. No cross-device edges is the best
//!   possible outcome for the edge-count objective.

use crate::dag::DagBuilder;
use crate::strategy::{lookup, Partitioner};
use crate::{Dag, DeviceDescriptor, PartitionError};
use graph_ir::{Module, Validated};

/// Single-device placement, optionally replicated.
#[derive(Debug, Clone, Default)]
pub struct SingleDevicePartitioner;

impl SingleDevicePartitioner {
    pub fn new() -> Self {
        Self
    }
}

impl Partitioner for SingleDevicePartitioner {
    fn name(&self) -> &str {
        "single-device"
    }

    fn partition(
        &self,
        module: &Module<Validated>,
        function: &str,
        devices: &[DeviceDescriptor],
        saturate_host: bool,
    ) -> Result<Dag, PartitionError> {
        let func = lookup(module, function, devices)?;
        let required = module.function_memory_bytes(func);
        let kinds: Vec<&str> = func.nodes().iter().map(|&id| module.node(id).kind.name()).collect();

        let eligible: Vec<&DeviceDescriptor> = devices
            .iter()
            .filter(|d| d.available_memory >= required && kinds.iter().all(|k| d.supports(k)))
            .collect();

        // Most available memory first, lowest id on ties.
        let best = eligible
            .iter()
            .copied()
            .max_by(|a, b| {
                a.available_memory
                    .cmp(&b.available_memory)
                    .then_with(|| b.id.cmp(&a.id))
            })
            .ok_or_else(|| PartitionError::NoPartitionFound {
                function: function.to_string(),
                detail: format!("no single device holds {required} bytes with every operator kind"),
            })?;

        let device_ids = if saturate_host {
            eligible
                .iter()
                .filter(|d| d.backend_name == best.backend_name)
                .map(|d| d.id)
                .collect()
        } else {
            vec![best.id]
        };

        let mut builder = DagBuilder::new(module, func, self.name());
        builder.add_group(func.nodes().to_vec(), device_ids, &best.backend_name);
        let dag = builder.build();
        dag.validate(module, devices)?;
        Ok(dag)
    }
}
