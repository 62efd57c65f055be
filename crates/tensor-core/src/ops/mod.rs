// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Reference tensor kernels.
//!
//! Every kernel writes into a caller-provided output tensor and validates
//! element kinds and shapes first. Only `F32` is supported; quantized
//! weights are dequantized by the backend before they reach a kernel.

mod elementwise;
mod matmul;
mod normalize;

pub use elementwise::{add, gelu, relu};
pub use matmul::matmul;
pub use normalize::{layer_norm, softmax};

use crate::{DType, Tensor, TensorError};

fn require_f32(op: &'static str, t: &Tensor) -> Result<(), TensorError> {
    if t.dtype() != DType::F32 {
        return Err(TensorError::UnsupportedDType {
            op,
            dtype: t.dtype(),
        });
    }
    Ok(())
}

fn require_same_shape(op: &'static str, a: &Tensor, b: &Tensor) -> Result<(), TensorError> {
    if a.shape() != b.shape() {
        return Err(TensorError::ShapeMismatch {
            op,
            lhs: a.shape().clone(),
            rhs: b.shape().clone(),
        });
    }
    Ok(())
}
