// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The partitioner's output: one device-assigned DAG per function.
//!
//! A [`Dag`] is the contract between the partitioner, the provisioner
//! (which compiles and loads each [`DagNode`]) and the executor (which runs
//! the nodes in dependency order).

use crate::{DeviceDescriptor, DeviceId, PartitionError};
use graph_ir::{Function, Module, ModuleState, NodeId, Operand};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

/// The sub-graph compiled for one DAG node.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Partition {
    /// Graph nodes in execution order.
    pub nodes: Vec<NodeId>,
    /// Values read from outside: placeholder names and the names of nodes
    /// computed by parent partitions.
    pub inputs: Vec<String>,
    /// Names of nodes whose values child partitions read.
    pub outputs: Vec<String>,
    /// Placeholders this partition writes.
    pub output_placeholders: Vec<String>,
}

/// One partition and where it runs.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct DagNode {
    pub name: String,
    pub partition: Partition,
    /// More than one only when replicated across a saturated pool.
    pub device_ids: Vec<DeviceId>,
    pub backend_name: String,
    pub estimated_memory_bytes: usize,
    /// Indices into [`Dag::nodes`].
    pub parents: Vec<usize>,
    pub children: Vec<usize>,
}

impl DagNode {
    pub fn is_replicated(&self) -> bool {
        self.device_ids.len() > 1
    }
}

/// Entry point of a DAG, named after its function.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct DagRoot {
    pub name: String,
    /// Indices of the nodes without parents.
    pub children: Vec<usize>,
}

/// A partitioned function.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Dag {
    pub strategy_name: String,
    pub root: DagRoot,
    pub nodes: Vec<DagNode>,
}

impl Dag {
    /// The function (and network) name.
    pub fn name(&self) -> &str {
        &self.root.name
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, name: &str) -> Option<&DagNode> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Sum of the estimated memory of every node, per replica.
    pub fn total_memory_bytes(&self) -> usize {
        self.nodes
            .iter()
            .map(|n| n.estimated_memory_bytes * n.device_ids.len())
            .sum()
    }

    /// Node indices in an order where parents precede children, or `None`
    /// if the edges contain a cycle.
    pub fn topological_order(&self) -> Option<Vec<usize>> {
        let mut pending: Vec<usize> = self.nodes.iter().map(|n| n.parents.len()).collect();
        let mut ready: VecDeque<usize> = (0..self.nodes.len()).filter(|&i| pending[i] == 0).collect();
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(i) = ready.pop_front() {
            order.push(i);
            for &c in &self.nodes[i].children {
                let slot = pending.get_mut(c)?;
                *slot = slot.checked_sub(1)?;
                if *slot == 0 {
                    ready.push_back(c);
                }
            }
        }
        (order.len() == self.nodes.len()).then_some(order)
    }

    /// Checks that the DAG is feasible for `devices` and covers the
    /// function exactly.
    ///
    /// # Checks
    /// - Non-empty; node names unique.
    /// - Every node is assigned to at least one known device whose backend
    ///   matches and which supports every kind in the partition.
    /// - Per device, the summed estimated memory fits its available memory.
    /// - Edges are mirrored, in range and acyclic; root children are
    ///   exactly the parentless nodes.
    /// - Every node of the function appears in exactly one partition.
    pub fn validate<S: ModuleState>(
        &self,
        module: &Module<S>,
        devices: &[DeviceDescriptor],
    ) -> Result<(), PartitionError> {
        let fail = |detail: String| PartitionError::InvalidDag {
            dag: self.root.name.clone(),
            detail,
        };

        if self.nodes.is_empty() {
            return Err(fail("DAG has no nodes".into()));
        }

        let by_id: HashMap<DeviceId, &DeviceDescriptor> = devices.iter().map(|d| (d.id, d)).collect();
        let mut names = HashSet::new();
        let mut load: BTreeMap<DeviceId, usize> = BTreeMap::new();

        for (i, node) in self.nodes.iter().enumerate() {
            if !names.insert(node.name.as_str()) {
                return Err(fail(format!("duplicate node name '{}'", node.name)));
            }
            if node.device_ids.is_empty() {
                return Err(fail(format!("node '{}' has no device", node.name)));
            }
            for id in &node.device_ids {
                let device = by_id
                    .get(id)
                    .ok_or_else(|| fail(format!("node '{}' uses unknown {id}", node.name)))?;
                if device.backend_name != node.backend_name {
                    return Err(fail(format!(
                        "node '{}' targets backend {} but {} is {}",
                        node.name, node.backend_name, device.name, device.backend_name
                    )));
                }
                for &nid in &node.partition.nodes {
                    let kind = module.node(nid).kind.name();
                    if !device.supports(kind) {
                        return Err(fail(format!(
                            "node '{}' places {kind} on {}, which does not support it",
                            node.name, device.name
                        )));
                    }
                }
                *load.entry(*id).or_default() += node.estimated_memory_bytes;
            }
            for &p in &node.parents {
                if !self.nodes.get(p).is_some_and(|parent| parent.children.contains(&i)) {
                    return Err(fail(format!("edge {p} -> {i} is not mirrored")));
                }
            }
            for &c in &node.children {
                if !self.nodes.get(c).is_some_and(|child| child.parents.contains(&i)) {
                    return Err(fail(format!("edge {i} -> {c} is not mirrored")));
                }
            }
        }

        for (id, used) in &load {
            let device = by_id[id];
            if *used > device.available_memory {
                return Err(fail(format!(
                    "{} needs {used} bytes, only {} available",
                    device.name, device.available_memory
                )));
            }
        }

        if self.topological_order().is_none() {
            return Err(fail("DAG contains a cycle".into()));
        }
        let mut roots: Vec<usize> = (0..self.nodes.len())
            .filter(|&i| self.nodes[i].parents.is_empty())
            .collect();
        let mut declared = self.root.children.clone();
        roots.sort_unstable();
        declared.sort_unstable();
        if roots != declared {
            return Err(fail("root children do not match parentless nodes".into()));
        }

        let function = module
            .function(&self.root.name)
            .ok_or_else(|| PartitionError::UnknownFunction(self.root.name.clone()))?;
        let mut covered: Vec<NodeId> = self
            .nodes
            .iter()
            .flat_map(|n| n.partition.nodes.iter().copied())
            .collect();
        let mut expected = function.nodes().to_vec();
        covered.sort_unstable();
        expected.sort_unstable();
        if covered != expected {
            return Err(fail("partitions do not cover the function exactly once".into()));
        }

        Ok(())
    }

    /// Returns a human-readable summary of the DAG.
    pub fn summary(&self) -> String {
        let parts: Vec<String> = self
            .nodes
            .iter()
            .map(|n| {
                let devices: Vec<String> = n.device_ids.iter().map(|d| d.0.to_string()).collect();
                format!(
                    "{}({} nodes on {}[{}], {:.1} KB)",
                    n.name,
                    n.partition.nodes.len(),
                    n.backend_name,
                    devices.join(","),
                    n.estimated_memory_bytes as f64 / 1024.0
                )
            })
            .collect();
        format!(
            "DAG '{}' via {}: {} partition(s), {} cross-partition edge(s): {}",
            self.root.name,
            self.strategy_name,
            self.nodes.len(),
            self.nodes.iter().map(|n| n.children.len()).sum::<usize>(),
            parts.join(", "),
        )
    }
}

/// Builds a [`Dag`] from groups of graph nodes.
///
/// Groups must be added in an order where each group only reads from
/// itself or earlier groups; strategies that walk the function in order
/// get this for free.
pub(crate) struct DagBuilder<'m, S: ModuleState> {
    module: &'m Module<S>,
    function: &'m Function,
    strategy_name: String,
    groups: Vec<(Vec<NodeId>, Vec<DeviceId>, String)>,
}

impl<'m, S: ModuleState> DagBuilder<'m, S> {
    pub fn new(module: &'m Module<S>, function: &'m Function, strategy_name: &str) -> Self {
        Self {
            module,
            function,
            strategy_name: strategy_name.to_string(),
            groups: Vec::new(),
        }
    }

    pub fn add_group(&mut self, nodes: Vec<NodeId>, devices: Vec<DeviceId>, backend_name: &str) {
        self.groups.push((nodes, devices, backend_name.to_string()));
    }

    pub fn build(self) -> Dag {
        let fn_name = self.function.name();
        let single = self.groups.len() == 1;

        let mut owner: HashMap<NodeId, usize> = HashMap::new();
        for (g, (nodes, _, _)) in self.groups.iter().enumerate() {
            for &id in nodes {
                owner.insert(id, g);
            }
        }

        let mut dag_nodes: Vec<DagNode> = self
            .groups
            .iter()
            .enumerate()
            .map(|(g, (nodes, devices, backend))| DagNode {
                name: if single {
                    fn_name.to_string()
                } else {
                    format!("{fn_name}_part{g}")
                },
                partition: Partition {
                    nodes: nodes.clone(),
                    inputs: Vec::new(),
                    outputs: Vec::new(),
                    output_placeholders: Vec::new(),
                },
                device_ids: devices.clone(),
                backend_name: backend.clone(),
                estimated_memory_bytes: self.module.nodes_memory_bytes(nodes),
                parents: Vec::new(),
                children: Vec::new(),
            })
            .collect();

        for g in 0..dag_nodes.len() {
            let ids = dag_nodes[g].partition.nodes.clone();
            for id in ids {
                let node = self.module.node(id);
                if let Some(p) = node.saved_placeholder() {
                    push_unique(&mut dag_nodes[g].partition.output_placeholders, p);
                }
                for operand in &node.inputs {
                    match operand {
                        Operand::Placeholder(name) => {
                            push_unique(&mut dag_nodes[g].partition.inputs, name);
                        }
                        Operand::Node(producer) => {
                            let Some(&src) = owner.get(producer) else {
                                continue;
                            };
                            if src == g {
                                continue;
                            }
                            let value = &self.module.node(*producer).name;
                            push_unique(&mut dag_nodes[g].partition.inputs, value);
                            push_unique(&mut dag_nodes[src].partition.outputs, value);
                            if !dag_nodes[g].parents.contains(&src) {
                                dag_nodes[g].parents.push(src);
                                dag_nodes[src].children.push(g);
                            }
                        }
                        Operand::Constant(_) => {}
                    }
                }
            }
        }

        let root_children = (0..dag_nodes.len())
            .filter(|&i| dag_nodes[i].parents.is_empty())
            .collect();

        Dag {
            strategy_name: self.strategy_name,
            root: DagRoot {
                name: fn_name.to_string(),
                children: root_children,
            },
            nodes: dag_nodes,
        }
    }
}

fn push_unique(values: &mut Vec<String>, value: &str) {
    if !values.iter().any(|v| v == value) {
        values.push(value.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{chain_module, devices};

    fn two_part_dag() -> (graph_ir::Module<graph_ir::Validated>, Dag) {
        let module = chain_module("net", 4, 16);
        let function = module.function("net").unwrap();
        let ids = function.nodes().to_vec();
        let mut b = DagBuilder::new(&module, function, "manual");
        b.add_group(ids[..2].to_vec(), vec![DeviceId(0)], "CPU");
        b.add_group(ids[2..].to_vec(), vec![DeviceId(1)], "CPU");
        let dag = b.build();
        (module, dag)
    }

    #[test]
    fn test_builder_edges_and_values() {
        let (module, dag) = two_part_dag();
        assert_eq!(dag.nodes[0].name, "net_part0");
        assert_eq!(dag.nodes[1].name, "net_part1");
        assert_eq!(dag.nodes[0].children, vec![1]);
        assert_eq!(dag.nodes[1].parents, vec![0]);
        assert_eq!(dag.root.children, vec![0]);
        assert_eq!(dag.nodes[0].partition.inputs, vec!["input".to_string()]);
        assert_eq!(dag.nodes[0].partition.outputs, vec!["n1".to_string()]);
        assert_eq!(dag.nodes[1].partition.inputs, vec!["n1".to_string()]);
        assert_eq!(dag.nodes[1].partition.output_placeholders, vec!["output".to_string()]);
        dag.validate(&module, &devices(2, 1 << 20)).unwrap();
        assert_eq!(dag.topological_order(), Some(vec![0, 1]));
    }

    #[test]
    fn test_single_group_named_after_function() {
        let module = chain_module("solo", 2, 8);
        let function = module.function("solo").unwrap();
        let mut b = DagBuilder::new(&module, function, "manual");
        b.add_group(function.nodes().to_vec(), vec![DeviceId(0)], "CPU");
        let dag = b.build();
        assert_eq!(dag.nodes[0].name, "solo");
        assert_eq!(dag.name(), "solo");
        assert_eq!(dag.nodes[0].estimated_memory_bytes, module.function_memory_bytes(function));
    }

    #[test]
    fn test_validate_memory_overflow() {
        let (module, dag) = two_part_dag();
        let tiny = devices(2, 8);
        assert!(matches!(
            dag.validate(&module, &tiny),
            Err(PartitionError::InvalidDag { .. })
        ));
    }

    #[test]
    fn test_validate_unsupported_kind() {
        let (module, dag) = two_part_dag();
        let mut devs = devices(2, 1 << 20);
        devs[1].non_supported_nodes.insert("save".into());
        assert!(dag.validate(&module, &devs).is_err());
    }

    #[test]
    fn test_validate_detects_cycle_and_bad_mirror() {
        let (module, mut dag) = two_part_dag();
        dag.nodes[1].children.push(0);
        dag.nodes[0].parents.push(1);
        assert!(dag.topological_order().is_none());
        assert!(dag.validate(&module, &devices(2, 1 << 20)).is_err());

        let (module, mut dag) = two_part_dag();
        dag.nodes[0].children.clear();
        assert!(dag.validate(&module, &devices(2, 1 << 20)).is_err());
    }

    #[test]
    fn test_validate_coverage() {
        let (module, mut dag) = two_part_dag();
        dag.nodes[1].partition.nodes.pop();
        assert!(dag.validate(&module, &devices(2, 1 << 20)).is_err());
    }

    #[test]
    fn test_summary() {
        let (_, dag) = two_part_dag();
        let s = dag.summary();
        assert!(s.contains("net"));
        assert!(s.contains("2 partition(s)"));
        assert!(s.contains("1 cross-partition edge(s)"));
    }
}
