// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Whole-tensor quantize / dequantize.

use tensor_core::{DType, Tensor};

use crate::{dequantize, quantize, QuantizationError, QuantizationParams, QuantizedElem};

fn encode<T: QuantizedElem>(values: &[f32], params: QuantizationParams) -> Vec<T> {
    values.iter().map(|&x| quantize::<T>(x, params)).collect()
}

/// Quantizes an `F32` tensor into `dest` using one set of parameters.
pub fn quantize_tensor(
    tensor: &Tensor,
    params: QuantizationParams,
    dest: DType,
) -> Result<Tensor, QuantizationError> {
    let values = tensor.as_f32()?;
    let shape = tensor.shape().clone();
    let out = match dest {
        DType::I8 => Tensor::from_i8(shape, encode(values, params))?,
        DType::U8 => Tensor::from_u8(shape, DType::U8, encode(values, params))?,
        DType::I16 => Tensor::from_i16(shape, encode(values, params))?,
        DType::I32 => Tensor::from_i32(shape, encode(values, params))?,
        other => {
            return Err(QuantizationError::UnsupportedDType {
                op: "quantize_tensor",
                dtype: other,
            })
        }
    };
    Ok(out)
}

/// Dequantizes an integer tensor back to `F32`.
pub fn dequantize_tensor(
    tensor: &Tensor,
    params: QuantizationParams,
) -> Result<Tensor, QuantizationError> {
    let values: Vec<f32> = match tensor.dtype() {
        DType::I8 => tensor.as_i8()?.iter().map(|&q| dequantize(q, params)).collect(),
        DType::U8 => tensor.as_u8()?.iter().map(|&q| dequantize(q, params)).collect(),
        DType::I16 => tensor.as_i16()?.iter().map(|&q| dequantize(q, params)).collect(),
        DType::I32 => tensor.as_i32()?.iter().map(|&q| dequantize(q, params)).collect(),
        other => {
            return Err(QuantizationError::UnsupportedDType {
                op: "dequantize_tensor",
                dtype: other,
            })
        }
    };
    Ok(Tensor::from_f32(tensor.shape().clone(), &values)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{choose_quantization_params, Schema};
    use tensor_core::Shape;

    #[test]
    fn test_tensor_roundtrip_within_half_step() {
        let values = [-0.75, -0.1, 0.0, 0.33, 0.9];
        let input = Tensor::from_f32(Shape::vector(5), &values).unwrap();
        for &dest in &[DType::I8, DType::U8, DType::I16] {
            let params = choose_quantization_params(-0.75, 0.9, Schema::Asymmetric, dest).unwrap();
            let q = quantize_tensor(&input, params, dest).unwrap();
            assert_eq!(q.dtype(), dest);
            let back = dequantize_tensor(&q, params).unwrap();
            for (b, x) in back.as_f32().unwrap().iter().zip(values) {
                assert!((b - x).abs() <= params.scale / 2.0 + 1e-6);
            }
        }
    }

    #[test]
    fn test_quantize_requires_float_input() {
        let input = Tensor::zeros(Shape::vector(2), DType::I8);
        let params = QuantizationParams::new(1.0, 0);
        assert!(quantize_tensor(&input, params, DType::I8).is_err());
        assert!(dequantize_tensor(&Tensor::zeros(Shape::vector(2), DType::F32), params).is_err());
    }

    #[test]
    fn test_fused_destination_is_rejected() {
        let input = Tensor::zeros(Shape::vector(2), DType::F32);
        let params = QuantizationParams::new(1.0, 0);
        assert!(matches!(
            quantize_tensor(&input, params, DType::U8Fused),
            Err(QuantizationError::UnsupportedDType { .. })
        ));
    }
}
