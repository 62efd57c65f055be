// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for graph construction and validation.

/// Errors that can occur when building or validating a [`crate::Module`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    /// A function with this name already exists in the module.
    #[error("duplicate function '{0}'")]
    DuplicateFunction(String),

    /// A placeholder or constant with this name already exists.
    #[error("duplicate value name '{0}'")]
    DuplicateValue(String),

    /// The named function does not exist.
    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    /// The module does not contain any function.
    #[error("module '{0}' has no functions")]
    EmptyModule(String),

    /// A function has no nodes left to execute.
    #[error("function '{0}' contains no nodes")]
    EmptyFunction(String),

    /// A node definition is invalid (unknown operand, bad arity, shape).
    #[error("invalid node '{node}' in function '{function}': {detail}")]
    InvalidNode {
        function: String,
        node: String,
        detail: String,
    },
}
