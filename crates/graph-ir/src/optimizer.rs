// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Target-independent cleanup run before a module is partitioned.
//!
//! Two passes, in order:
//! 1. Dead-node elimination: per function, drop every node whose output
//!    cannot reach a `Save`.
//! 2. Constant pruning: drop constants no remaining node reads.

use crate::{Building, Module, NodeId, Operand};
use std::collections::HashSet;

/// Runs all passes. Returns the number of nodes and constants removed.
pub fn optimize(module: &mut Module<Building>) -> (usize, usize) {
    let nodes = eliminate_dead_nodes(module);
    let constants = prune_constants(module);
    if nodes + constants > 0 {
        tracing::debug!(
            module = module.name(),
            nodes,
            constants,
            "removed dead nodes and unused constants"
        );
    }
    (nodes, constants)
}

/// Removes nodes that do not contribute to any `Save` of their function.
///
/// Walks each function backwards; a node is live when it is a `Save` or
/// when a live node consumes it.
pub fn eliminate_dead_nodes(module: &mut Module<Building>) -> usize {
    let live_per_function: Vec<HashSet<NodeId>> = module
        .functions()
        .iter()
        .map(|function| {
            let mut live = HashSet::new();
            for &id in function.nodes().iter().rev() {
                let Some(node) = module.nodes_ref().get(id.0) else {
                    continue;
                };
                if node.saved_placeholder().is_some() || live.contains(&id) {
                    live.insert(id);
                    live.extend(node.node_inputs());
                }
            }
            live
        })
        .collect();

    let mut removed = 0;
    for (function, live) in module.functions_mut().iter_mut().zip(live_per_function) {
        let before = function.len();
        function.retain(|id| live.contains(id));
        removed += before - function.len();
    }
    removed
}

/// Removes constants that no node of any function reads.
pub fn prune_constants(module: &mut Module<Building>) -> usize {
    let used: HashSet<String> = module
        .functions()
        .iter()
        .flat_map(|f| f.nodes().iter().copied())
        .filter_map(|id| module.nodes_ref().get(id.0))
        .flat_map(|node| node.inputs.iter())
        .filter_map(|op| match op {
            Operand::Constant(name) => Some(name.clone()),
            _ => None,
        })
        .collect();
    module.retain_constants(|name| used.contains(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Node, OpKind};
    use tensor_core::{DType, Shape, Tensor};

    fn module_with_dead_branch() -> Module<Building> {
        let mut m = Module::new("m");
        m.add_placeholder("x", Shape::vector(4), DType::F32).unwrap();
        m.add_placeholder("y", Shape::vector(4), DType::F32).unwrap();
        m.add_constant("unused", Tensor::zeros(Shape::vector(4), DType::F32))
            .unwrap();
        m.create_function("f").unwrap();
        let live = m
            .add_node("f", Node::new("live", OpKind::Relu, vec![Operand::placeholder("x")], Shape::vector(4)))
            .unwrap();
        let dead = m
            .add_node(
                "f",
                Node::new(
                    "dead",
                    OpKind::Add,
                    vec![Operand::placeholder("x"), Operand::constant("unused")],
                    Shape::vector(4),
                ),
            )
            .unwrap();
        m.add_node("f", Node::new("dead2", OpKind::Gelu, vec![Operand::Node(dead)], Shape::vector(4)))
            .unwrap();
        m.add_node("f", Node::new("save", OpKind::save("y"), vec![Operand::Node(live)], Shape::vector(4)))
            .unwrap();
        m
    }

    #[test]
    fn test_dead_nodes_removed() {
        let mut m = module_with_dead_branch();
        assert_eq!(eliminate_dead_nodes(&mut m), 2);
        let names: Vec<_> = m
            .function("f")
            .unwrap()
            .nodes()
            .iter()
            .map(|&id| m.node(id).name.clone())
            .collect();
        assert_eq!(names, vec!["live", "save"]);
    }

    #[test]
    fn test_optimize_prunes_constants_and_validates() {
        let mut m = module_with_dead_branch();
        assert_eq!(optimize(&mut m), (2, 1));
        assert!(m.constant("unused").is_none());

        let validated = module_with_dead_branch().optimize().unwrap();
        assert_eq!(validated.function("f").unwrap().len(), 2);
    }

    #[test]
    fn test_function_without_save_becomes_empty() {
        let mut m = Module::new("m");
        m.add_placeholder("x", Shape::vector(1), DType::F32).unwrap();
        m.create_function("f").unwrap();
        m.add_node("f", Node::new("r", OpKind::Relu, vec![Operand::placeholder("x")], Shape::vector(1)))
            .unwrap();
        assert!(matches!(
            m.optimize(),
            Err(crate::GraphError::EmptyFunction(_))
        ));
    }
}
