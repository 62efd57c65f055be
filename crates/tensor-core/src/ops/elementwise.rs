// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Element-wise kernels: add, relu, gelu.

use super::{require_f32, require_same_shape};
use crate::{Tensor, TensorError};

const SQRT_2_OVER_PI: f32 = 0.797_884_6;
const GELU_COEFF: f32 = 0.044_715;

/// Computes `output = lhs + rhs`.
///
/// `rhs` must either have the same shape as `lhs` or be a vector whose
/// length equals the last dimension of `lhs` (bias broadcast).
pub fn add(lhs: &Tensor, rhs: &Tensor, output: &mut Tensor) -> Result<(), TensorError> {
    require_f32("add", lhs)?;
    require_f32("add", rhs)?;
    require_same_shape("add (output)", lhs, output)?;

    let last = lhs.shape().last_dim();
    let bias = rhs.shape().rank() == 1 && rhs.len() == last && lhs.shape() != rhs.shape();
    if !bias {
        require_same_shape("add", lhs, rhs)?;
    }

    let a = lhs.as_f32()?;
    let b = rhs.as_f32()?;
    let out = output.as_f32_mut()?;
    if bias {
        for (i, o) in out.iter_mut().enumerate() {
            *o = a[i] + b[i % last];
        }
    } else {
        for ((o, x), y) in out.iter_mut().zip(a).zip(b) {
            *o = x + y;
        }
    }
    Ok(())
}

/// Computes `output = max(input, 0)`.
pub fn relu(input: &Tensor, output: &mut Tensor) -> Result<(), TensorError> {
    require_f32("relu", input)?;
    require_same_shape("relu", input, output)?;
    for (o, &x) in output.as_f32_mut()?.iter_mut().zip(input.as_f32()?) {
        *o = x.max(0.0);
    }
    Ok(())
}

/// GELU activation, tanh approximation.
pub fn gelu(input: &Tensor, output: &mut Tensor) -> Result<(), TensorError> {
    require_f32("gelu", input)?;
    require_same_shape("gelu", input, output)?;
    for (o, &x) in output.as_f32_mut()?.iter_mut().zip(input.as_f32()?) {
        *o = gelu_scalar(x);
    }
    Ok(())
}

#[inline]
fn gelu_scalar(x: f32) -> f32 {
    let inner = SQRT_2_OVER_PI * (x + GELU_COEFF * x * x * x);
    0.5 * x * (1.0 + inner.tanh())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DType, Shape};

    #[test]
    fn test_add_same_shape() {
        let a = Tensor::from_f32(Shape::matrix(1, 3), &[1.0, 2.0, 3.0]).unwrap();
        let b = Tensor::from_f32(Shape::matrix(1, 3), &[0.5, 0.5, 0.5]).unwrap();
        let mut out = Tensor::zeros(Shape::matrix(1, 3), DType::F32);
        add(&a, &b, &mut out).unwrap();
        assert_eq!(out.as_f32().unwrap(), &[1.5, 2.5, 3.5]);
    }

    #[test]
    fn test_add_bias_broadcast() {
        let a = Tensor::from_f32(Shape::matrix(2, 2), &[1.0, 2.0, 3.0, 4.0]).unwrap();
        let bias = Tensor::from_f32(Shape::vector(2), &[10.0, 20.0]).unwrap();
        let mut out = Tensor::zeros(Shape::matrix(2, 2), DType::F32);
        add(&a, &bias, &mut out).unwrap();
        assert_eq!(out.as_f32().unwrap(), &[11.0, 22.0, 13.0, 24.0]);
    }

    #[test]
    fn test_add_shape_mismatch() {
        let a = Tensor::zeros(Shape::matrix(2, 2), DType::F32);
        let b = Tensor::zeros(Shape::vector(3), DType::F32);
        let mut out = Tensor::zeros(Shape::matrix(2, 2), DType::F32);
        assert!(add(&a, &b, &mut out).is_err());
    }

    #[test]
    fn test_relu() {
        let a = Tensor::from_f32(Shape::vector(3), &[-1.0, 0.0, 2.0]).unwrap();
        let mut out = Tensor::zeros(Shape::vector(3), DType::F32);
        relu(&a, &mut out).unwrap();
        assert_eq!(out.as_f32().unwrap(), &[0.0, 0.0, 2.0]);
    }

    #[test]
    fn test_gelu_known_values() {
        assert!(gelu_scalar(0.0).abs() < 1e-6);
        assert!((gelu_scalar(1.0) - 0.8412).abs() < 0.01);
        assert!((gelu_scalar(-1.0) + 0.1588).abs() < 0.01);
        assert!((gelu_scalar(3.0) - 3.0).abs() < 0.01);
    }
}
