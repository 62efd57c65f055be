// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Matrix multiplication.

use super::require_f32;
use crate::{Shape, Tensor, TensorError};

/// Computes `output = lhs @ rhs` for 2-D tensors.
///
/// `lhs` is `[M, K]`, `rhs` is `[K, N]` and `output` must be `[M, N]`.
pub fn matmul(lhs: &Tensor, rhs: &Tensor, output: &mut Tensor) -> Result<(), TensorError> {
    require_f32("matmul", lhs)?;
    require_f32("matmul", rhs)?;
    require_f32("matmul", output)?;

    if lhs.shape().rank() != 2
        || rhs.shape().rank() != 2
        || !lhs.shape().is_matmul_compatible(rhs.shape())
    {
        return Err(TensorError::ShapeMismatch {
            op: "matmul",
            lhs: lhs.shape().clone(),
            rhs: rhs.shape().clone(),
        });
    }

    let (m, k) = (lhs.shape().dims()[0], lhs.shape().dims()[1]);
    let n = rhs.shape().last_dim();
    let expected = Shape::matrix(m, n);
    if output.shape() != &expected {
        return Err(TensorError::ShapeMismatch {
            op: "matmul (output)",
            lhs: expected,
            rhs: output.shape().clone(),
        });
    }

    let a = lhs.as_f32()?;
    let b = rhs.as_f32()?;
    let c = output.as_f32_mut()?;
    c.iter_mut().for_each(|x| *x = 0.0);

    // ikj order keeps the inner loop a contiguous saxpy over a row of C.
    for i in 0..m {
        let c_row = &mut c[i * n..(i + 1) * n];
        for p in 0..k {
            let a_ip = a[i * k + p];
            let b_row = &b[p * n..(p + 1) * n];
            for (cj, bj) in c_row.iter_mut().zip(b_row) {
                *cj += a_ip * bj;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DType;

    #[test]
    fn test_matmul_2x3_times_3x2() {
        let a = Tensor::from_f32(Shape::matrix(2, 3), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let b = Tensor::from_f32(Shape::matrix(3, 2), &[7.0, 8.0, 9.0, 10.0, 11.0, 12.0]).unwrap();
        let mut c = Tensor::zeros(Shape::matrix(2, 2), DType::F32);

        matmul(&a, &b, &mut c).unwrap();

        assert_eq!(c.as_f32().unwrap(), &[58.0, 64.0, 139.0, 154.0]);
    }

    #[test]
    fn test_matmul_rejects_bad_inner_dim() {
        let a = Tensor::zeros(Shape::matrix(2, 3), DType::F32);
        let b = Tensor::zeros(Shape::matrix(4, 2), DType::F32);
        let mut c = Tensor::zeros(Shape::matrix(2, 2), DType::F32);
        assert!(matmul(&a, &b, &mut c).is_err());
    }

    #[test]
    fn test_matmul_rejects_quantized_input() {
        let a = Tensor::zeros(Shape::matrix(1, 1), DType::I8);
        let b = Tensor::zeros(Shape::matrix(1, 1), DType::F32);
        let mut c = Tensor::zeros(Shape::matrix(1, 1), DType::F32);
        assert!(matches!(
            matmul(&a, &b, &mut c),
            Err(TensorError::UnsupportedDType { .. })
        ));
    }
}
