// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for partitioning.

/// Errors that can occur while partitioning a function.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PartitionError {
    /// No device descriptors were provided.
    #[error("no devices available for partitioning")]
    NoDevices,

    /// The function is not part of the module.
    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    /// No assignment satisfies the memory and capability constraints.
    #[error("no partition found for '{function}': {detail}")]
    NoPartitionFound { function: String, detail: String },

    /// A DAG failed its consistency checks.
    #[error("invalid DAG '{dag}': {detail}")]
    InvalidDag { dag: String, detail: String },
}
