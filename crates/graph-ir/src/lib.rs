// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # graph-ir
//!
//! The graph representation served by the host runtime.
//!
//! - [`Module`]: owns a node arena, named placeholders (inputs/outputs)
//!   and named constants, plus one or more [`Function`]s. It moves through
//!   a **type-state** lifecycle (`Building` → `Validated` → `Stripped`).
//! - [`Function`]: a named computation graph; a non-owning list of
//!   [`NodeId`]s into the module's arena, in topological order.
//! - [`Node`] / [`OpKind`] / [`Operand`]: one operator and its inputs.
//!
//! # Example
//! ```
//! use graph_ir::{Module, Node, OpKind, Operand};
//! use tensor_core::{DType, Shape, Tensor};
//!
//! let mut module = Module::new("demo");
//! module.add_placeholder("input", Shape::matrix(1, 4), DType::F32).unwrap();
//! module.add_placeholder("output", Shape::matrix(1, 4), DType::F32).unwrap();
//! module.create_function("main").unwrap();
//! let relu = module
//!     .add_node("main", Node::new("relu", OpKind::Relu, vec![Operand::placeholder("input")], Shape::matrix(1, 4)))
//!     .unwrap();
//! module
//!     .add_node("main", Node::new("save", OpKind::save("output"), vec![Operand::Node(relu)], Shape::matrix(1, 4)))
//!     .unwrap();
//!
//! let module = module.optimize().unwrap();
//! println!("{}", module.summary());
//! ```

mod error;
mod function;
pub mod module;
mod node;
pub mod optimizer;

pub use error::GraphError;
pub use function::Function;
pub use module::{Building, Constant, Module, ModuleState, Placeholder, Stripped, Validated};
pub use node::{Node, NodeId, OpKind, Operand};
