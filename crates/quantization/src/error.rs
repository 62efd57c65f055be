// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the quantization transforms.

use tensor_core::{DType, TensorError};

/// Errors produced while deriving parameters or encoding tensors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QuantizationError {
    /// The observed range is empty, inverted or not finite.
    #[error("invalid quantization range [{min}, {max}]")]
    InvalidRange { min: f32, max: f32 },

    /// A float scale that cannot be turned into a fixed-point transform.
    #[error("invalid quantization scale {scale}")]
    InvalidScale { scale: f32 },

    /// The element kind cannot be used for this transform.
    #[error("{op} does not support element kind {dtype}")]
    UnsupportedDType { op: &'static str, dtype: DType },

    /// Input rank or width is wrong for the transform.
    #[error("{op} expects {expected}, got shape {actual}")]
    BadShape {
        op: &'static str,
        expected: &'static str,
        actual: tensor_core::Shape,
    },

    /// Error propagated from tensor construction or access.
    #[error("tensor error: {0}")]
    Tensor(#[from] TensorError),
}
