// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for memory accounting.

/// Errors that can occur while reserving device memory.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MemoryError {
    /// The reservation would exceed the budget.
    #[error("out of memory reserving '{label}': requested {requested_bytes} bytes, only {available_bytes} available (budget: {budget_bytes})")]
    OutOfMemory {
        label: String,
        requested_bytes: usize,
        available_bytes: usize,
        budget_bytes: usize,
    },

    /// Attempted to reserve zero bytes.
    #[error("cannot reserve zero bytes for '{0}'")]
    ZeroSizedReservation(String),

    /// A budget string could not be parsed.
    #[error("invalid memory budget '{0}': expected a number with an optional K, M or G suffix")]
    InvalidBudget(String),
}
