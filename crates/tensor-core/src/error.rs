// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for tensor operations.

use crate::{DType, Shape};

/// Errors that can occur during tensor construction and kernels.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TensorError {
    /// The number of provided elements does not match the shape.
    #[error("element count mismatch: shape needs {expected} elements, got {actual}")]
    ElementCountMismatch { expected: usize, actual: usize },

    /// Two tensors have incompatible shapes for the requested operation.
    #[error("incompatible shapes for {op}: {lhs} vs {rhs}")]
    ShapeMismatch {
        op: &'static str,
        lhs: Shape,
        rhs: Shape,
    },

    /// The tensor holds a different element kind than the caller asked for.
    #[error("dtype mismatch: expected {expected}, found {actual}")]
    DTypeMismatch { expected: DType, actual: DType },

    /// The requested element kind is not supported by this operation.
    #[error("unsupported dtype {dtype} for operation {op}")]
    UnsupportedDType { op: &'static str, dtype: DType },

    /// A numeric computation failed (e.g., NaN or overflow).
    #[error("numeric error in {op}: {detail}")]
    Numeric { op: &'static str, detail: String },
}
