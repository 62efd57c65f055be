// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Greedy multi-device partitioning.
//!
//! Walks the function in execution order and keeps extending the current
//! partition while its device supports the next node's kind and still has
//! room for it. When it cannot, a new partition is opened on the device
//! that already hosts most of the node's producers, which keeps
//! cross-device edges low.
//!
//! # Memory Model
//!
//! A partition costs the outputs of all its nodes plus each distinct
//! constant they read, once per partition:
//!
//! ```text
//! part_mem = sum(output_bytes) + sum(distinct constant bytes)
//! ```
//!
//! Each device's available memory is drawn down as nodes are placed on it.
//!
//! # When to use
//! - The function does not fit on any single device, or no single device
//!   supports every kind it uses.

use crate::dag::DagBuilder;
use crate::strategy::{lookup, Partitioner};
use crate::{Dag, DeviceDescriptor, DeviceId, PartitionError};
use graph_ir::{Module, NodeId, Validated};
use std::collections::HashMap;

/// Greedy placement in execution order.
#[derive(Debug, Clone, Default)]
pub struct GreedyPartitioner;

impl GreedyPartitioner {
    pub fn new() -> Self {
        Self
    }
}

/// A partition under construction.
struct OpenGroup {
    device: usize,
    nodes: Vec<NodeId>,
    bytes: usize,
}

impl Partitioner for GreedyPartitioner {
    fn name(&self) -> &str {
        "greedy"
    }

    fn partition(
        &self,
        module: &Module<Validated>,
        function: &str,
        devices: &[DeviceDescriptor],
        _saturate_host: bool,
    ) -> Result<Dag, PartitionError> {
        let func = lookup(module, function, devices)?;

        let mut remaining: Vec<usize> = devices.iter().map(|d| d.available_memory).collect();
        let mut placed_on: HashMap<NodeId, usize> = HashMap::new();
        let mut closed: Vec<OpenGroup> = Vec::new();
        let mut current: Option<OpenGroup> = None;

        for &id in func.nodes() {
            let node = module.node(id);
            let kind = node.kind.name();

            if let Some(group) = current.as_mut() {
                let mut candidate = group.nodes.clone();
                candidate.push(id);
                let bytes = module.nodes_memory_bytes(&candidate);
                let delta = bytes - group.bytes;
                if devices[group.device].supports(kind) && delta <= remaining[group.device] {
                    remaining[group.device] -= delta;
                    group.nodes = candidate;
                    group.bytes = bytes;
                    placed_on.insert(id, group.device);
                    continue;
                }
            }

            let solo = module.node_memory_bytes(id);
            let producers_on = |d: usize| {
                node.node_inputs()
                    .filter(|p| placed_on.get(p) == Some(&d))
                    .count()
            };
            // Most producers first, then most remaining memory, then lowest id.
            let device = (0..devices.len())
                .filter(|&d| devices[d].supports(kind) && solo <= remaining[d])
                .max_by(|&a, &b| {
                    producers_on(a)
                        .cmp(&producers_on(b))
                        .then_with(|| remaining[a].cmp(&remaining[b]))
                        .then_with(|| devices[b].id.cmp(&devices[a].id))
                })
                .ok_or_else(|| PartitionError::NoPartitionFound {
                    function: function.to_string(),
                    detail: format!(
                        "node '{}' ({kind}, {solo} bytes) fits on no supporting device",
                        node.name
                    ),
                })?;

            tracing::debug!(node = %node.name, device = %devices[device].name, "opening partition");
            remaining[device] -= solo;
            placed_on.insert(id, device);
            if let Some(done) = current.replace(OpenGroup {
                device,
                nodes: vec![id],
                bytes: solo,
            }) {
                closed.push(done);
            }
        }
        closed.extend(current);

        let mut builder = DagBuilder::new(module, func, self.name());
        for group in closed {
            let device = &devices[group.device];
            let ids: Vec<DeviceId> = vec![device.id];
            builder.add_group(group.nodes, ids, &device.backend_name);
        }
        let dag = builder.build();
        dag.validate(module, devices)?;
        Ok(dag)
    }
}
