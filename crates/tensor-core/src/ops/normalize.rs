// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Row-wise normalization kernels: softmax and layer norm.
//!
//! Both operate over the last dimension; every other dimension is treated
//! as a batch of independent rows.

use super::{require_f32, require_same_shape};
use crate::{Tensor, TensorError};

/// Softmax over the last dimension.
pub fn softmax(input: &Tensor, output: &mut Tensor) -> Result<(), TensorError> {
    require_f32("softmax", input)?;
    require_same_shape("softmax", input, output)?;

    let width = input.shape().last_dim();
    if width == 0 {
        return Ok(());
    }

    let src = input.as_f32()?;
    let dst = output.as_f32_mut()?;
    for (row_src, row_dst) in src.chunks(width).zip(dst.chunks_mut(width)) {
        // Subtract the row max so exp() cannot overflow.
        let max = row_src.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let mut sum = 0.0f32;
        for (d, &s) in row_dst.iter_mut().zip(row_src) {
            *d = (s - max).exp();
            sum += *d;
        }
        if sum > 0.0 {
            row_dst.iter_mut().for_each(|d| *d /= sum);
        }
    }
    Ok(())
}

/// Layer normalization over the last dimension with learned `gamma`/`beta`.
pub fn layer_norm(
    input: &Tensor,
    gamma: &Tensor,
    beta: &Tensor,
    eps: f32,
    output: &mut Tensor,
) -> Result<(), TensorError> {
    require_f32("layer_norm", input)?;
    require_f32("layer_norm", gamma)?;
    require_f32("layer_norm", beta)?;
    require_same_shape("layer_norm", input, output)?;

    let width = input.shape().last_dim();
    for (name, param) in [("layer_norm (gamma)", gamma), ("layer_norm (beta)", beta)] {
        if param.shape().rank() != 1 || param.len() != width {
            return Err(TensorError::ShapeMismatch {
                op: name,
                lhs: param.shape().clone(),
                rhs: input.shape().clone(),
            });
        }
    }
    if width == 0 {
        return Ok(());
    }

    let g = gamma.as_f32()?;
    let b = beta.as_f32()?;
    let src = input.as_f32()?;
    let dst = output.as_f32_mut()?;
    for (row_src, row_dst) in src.chunks(width).zip(dst.chunks_mut(width)) {
        let mean = row_src.iter().sum::<f32>() / width as f32;
        let var = row_src.iter().map(|x| (x - mean) * (x - mean)).sum::<f32>() / width as f32;
        let inv_std = 1.0 / (var + eps).sqrt();
        for j in 0..width {
            row_dst[j] = g[j] * (row_src[j] - mean) * inv_std + b[j];
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DType, Shape};

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let input =
            Tensor::from_f32(Shape::matrix(2, 3), &[1.0, 2.0, 3.0, 1.0, 1.0, 1.0]).unwrap();
        let mut out = Tensor::zeros(Shape::matrix(2, 3), DType::F32);
        softmax(&input, &mut out).unwrap();

        let r = out.as_f32().unwrap();
        assert!((r[0..3].iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert!(r[0] < r[1] && r[1] < r[2]);
        assert!(r[3..6].iter().all(|x| (x - 1.0 / 3.0).abs() < 1e-5));
    }

    #[test]
    fn test_softmax_large_values_stay_finite() {
        let input = Tensor::from_f32(Shape::vector(3), &[1000.0, 1001.0, 1002.0]).unwrap();
        let mut out = Tensor::zeros(Shape::vector(3), DType::F32);
        softmax(&input, &mut out).unwrap();
        assert!(out.as_f32().unwrap().iter().all(|x| x.is_finite()));
    }

    #[test]
    fn test_layer_norm_zero_mean_unit_variance() {
        let input = Tensor::from_f32(Shape::vector(5), &[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        let gamma = Tensor::from_f32(Shape::vector(5), &[1.0; 5]).unwrap();
        let beta = Tensor::from_f32(Shape::vector(5), &[0.0; 5]).unwrap();
        let mut out = Tensor::zeros(Shape::vector(5), DType::F32);

        layer_norm(&input, &gamma, &beta, 1e-5, &mut out).unwrap();

        let r = out.as_f32().unwrap();
        let mean = r.iter().sum::<f32>() / 5.0;
        let var = r.iter().map(|x| (x - mean) * (x - mean)).sum::<f32>() / 5.0;
        assert!(mean.abs() < 1e-5);
        assert!((var - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_layer_norm_rejects_wrong_gamma() {
        let input = Tensor::zeros(Shape::vector(3), DType::F32);
        let gamma = Tensor::zeros(Shape::vector(4), DType::F32);
        let beta = Tensor::zeros(Shape::vector(3), DType::F32);
        let mut out = Tensor::zeros(Shape::vector(3), DType::F32);
        assert!(layer_norm(&input, &gamma, &beta, 1e-5, &mut out).is_err());
    }
}
