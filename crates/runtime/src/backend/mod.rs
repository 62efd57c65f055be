// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Compilation seam between the provisioner and device code.
//!
//! A [`Backend`] turns one DAG node's partition into a
//! [`CompiledFunction`]; devices load compiled functions and execute them
//! against an [`ExecutionContext`].

mod interpreter;

pub use interpreter::{InterpretedFunction, InterpreterBackend};

use crate::{CompilationOptions, ExecutionContext, RuntimeError};
use graph_ir::{Module, OpKind, Validated};
use partitioner::DagNode;
use std::fmt;
use std::sync::Arc;

/// Backend names served by [`InterpreterBackend`].
pub const REFERENCE_BACKENDS: [&str; 2] = ["CPU", "Interpreter"];

/// Compiles partitions for one family of devices.
pub trait Backend: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Whether nodes of this kind can be compiled at all.
    fn is_op_supported(&self, kind: &OpKind) -> bool;

    /// Compiles `node`'s partition of `module`.
    ///
    /// The module must still carry its constant payloads.
    fn compile(
        &self,
        module: &Module<Validated>,
        node: &DagNode,
        options: &CompilationOptions,
    ) -> Result<Box<dyn CompiledFunction>, RuntimeError>;
}

/// A loaded, runnable partition.
pub trait CompiledFunction: Send + Sync + fmt::Debug {
    /// Name of the DAG node this was compiled from.
    fn name(&self) -> &str;

    fn backend_name(&self) -> &str;

    /// Device memory the function occupies once loaded.
    fn memory_bytes(&self) -> usize;

    /// Runs the partition. Inputs are read from `context`'s bindings;
    /// outputs and saved placeholders are written back to them.
    fn execute(&self, device: &str, context: &mut ExecutionContext) -> Result<(), RuntimeError>;
}

/// Looks up a backend by name.
pub fn create_backend(name: &str) -> Result<Arc<dyn Backend>, RuntimeError> {
    if REFERENCE_BACKENDS.contains(&name) {
        return Ok(Arc::new(InterpreterBackend::new(name)));
    }
    Err(RuntimeError::UnknownBackend(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory() {
        assert_eq!(create_backend("CPU").unwrap().name(), "CPU");
        assert_eq!(create_backend("Interpreter").unwrap().name(), "Interpreter");
        assert_eq!(
            create_backend("NPU").unwrap_err(),
            RuntimeError::UnknownBackend("NPU".into())
        );
    }
}
