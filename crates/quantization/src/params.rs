// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Quantization parameters and their derivation from observed ranges.

use serde::{Deserialize, Serialize};
use tensor_core::DType;

use crate::QuantizationError;

/// How the float range is mapped onto the integer range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Schema {
    /// The range is not necessarily centered on zero.
    #[default]
    Asymmetric,
    /// The range is centered on zero and the offset is always 0.
    Symmetric,
    /// Like `Symmetric`, except that a non-negative range uses the whole
    /// integer range with `offset == qmin` (an unsigned view of the type).
    SymmetricWithUnsigned,
}

/// Scale and zero point of a quantized tensor.
///
/// `real = scale * (q - offset)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantizationParams {
    pub scale: f32,
    pub offset: i32,
}

impl QuantizationParams {
    pub fn new(scale: f32, offset: i32) -> Self {
        Self { scale, offset }
    }
}

/// Derives quantization parameters for the clipped range `[min, max]`.
///
/// The range is first widened to contain zero. A degenerate range produces
/// a scale of `0.1` so that dequantization stays well defined. The zero
/// point is taken from whichever range end gives the smaller rounding
/// error and then nudged onto an integer inside the destination range.
///
/// # Errors
/// Returns [`QuantizationError::InvalidRange`] when `min > max` or either
/// bound is NaN, and [`QuantizationError::UnsupportedDType`] when `qty` is
/// not an integer kind.
pub fn choose_quantization_params(
    min: f32,
    max: f32,
    schema: Schema,
    qty: DType,
) -> Result<QuantizationParams, QuantizationError> {
    if min.is_nan() || max.is_nan() || min > max {
        return Err(QuantizationError::InvalidRange { min, max });
    }
    let (qmin, qmax) = match qty {
        DType::I8 | DType::U8 | DType::I16 | DType::I32 => qty.int_range(),
        _ => None,
    }
    .ok_or(QuantizationError::UnsupportedDType {
        op: "choose_quantization_params",
        dtype: qty,
    })?;
    let (qmin, qmax) = (qmin as f64, qmax as f64);

    let mut schema = schema;
    if schema == Schema::SymmetricWithUnsigned && min < 0.0 {
        schema = Schema::Symmetric;
    }

    let mut min = min.min(0.0) as f64;
    let mut max = max.max(0.0) as f64;

    if schema == Schema::Symmetric {
        // Extend whichever end saturates later so that zero maps to 0.
        let rmin = min / qmin;
        let rmax = max / qmax;
        if rmin > rmax {
            max = rmin * qmax;
        } else {
            min = rmax * qmin;
        }
    }

    min = min.max(f32::MIN as f64);
    max = max.min(f32::MAX as f64);

    let mut scale = (max - min) / (qmax - qmin);
    if scale == 0.0 {
        scale = 0.1;
    }

    let zero_from_min = qmin - min / scale;
    let zero_from_max = qmax - max / scale;
    let error_from_min = qmin.abs() + (min / scale).abs();
    let error_from_max = qmax.abs() + (max / scale).abs();
    let mut zero_point = if error_from_min < error_from_max {
        zero_from_min
    } else {
        zero_from_max
    };
    if schema == Schema::Symmetric {
        zero_point = 0.0;
    }

    let offset = if zero_point < qmin {
        qmin
    } else if zero_point > qmax {
        qmax
    } else {
        // f64::round rounds half away from zero.
        zero_point.round()
    };

    Ok(QuantizationParams {
        scale: scale as f32,
        offset: offset as i32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{dequantize, quantize};

    #[test]
    fn test_asymmetric_unit_range_int8() {
        let p = choose_quantization_params(-1.0, 1.0, Schema::Asymmetric, DType::I8).unwrap();
        assert!((p.scale - 2.0 / 255.0).abs() < 1e-6);
        assert!(p.offset.abs() <= 1);

        let tolerance = p.scale / 2.0 + 1e-6;
        for i in 0..=200 {
            let x = -1.0 + i as f32 * 0.01;
            let back = dequantize(quantize::<i8>(x, p), p);
            assert!((x - back).abs() <= tolerance, "x={x} back={back}");
        }
    }

    #[test]
    fn test_range_expanded_to_include_zero() {
        let p = choose_quantization_params(2.0, 4.0, Schema::Asymmetric, DType::I8).unwrap();
        let zero = quantize::<i8>(0.0, p);
        assert_eq!(dequantize(zero, p), 0.0);
        assert_eq!(zero as i32, p.offset);
    }

    #[test]
    fn test_degenerate_range_uses_fallback_scale() {
        let p = choose_quantization_params(0.0, 0.0, Schema::Asymmetric, DType::I8).unwrap();
        assert!((p.scale - 0.1).abs() < 1e-7);
        assert!(p.scale > 0.0);
    }

    #[test]
    fn test_symmetric_offset_is_zero() {
        let p = choose_quantization_params(-0.5, 3.0, Schema::Symmetric, DType::I8).unwrap();
        assert_eq!(p.offset, 0);
        // 3.0 saturates first, so the range becomes [-3.0 * 128/127, 3.0].
        assert!((p.scale - 3.0 / 127.0).abs() < 1e-6);
    }

    #[test]
    fn test_symmetric_with_unsigned() {
        let positive =
            choose_quantization_params(0.0, 2.55, Schema::SymmetricWithUnsigned, DType::I8)
                .unwrap();
        assert_eq!(positive.offset, -128);
        assert!((positive.scale - 0.01).abs() < 1e-6);

        let mixed =
            choose_quantization_params(-1.0, 2.0, Schema::SymmetricWithUnsigned, DType::I8)
                .unwrap();
        assert_eq!(mixed.offset, 0);
    }

    #[test]
    fn test_offset_within_destination_range() {
        for &(lo, hi) in &[(-100.0, 0.001), (0.0, 1e-3), (-5.0, 5.0), (-1e-6, 1e6)] {
            for &ty in &[DType::I8, DType::U8, DType::I16] {
                let p = choose_quantization_params(lo, hi, Schema::Asymmetric, ty).unwrap();
                let (qmin, qmax) = ty.int_range().unwrap();
                assert!(p.scale > 0.0);
                assert!((p.offset as i64) >= qmin && (p.offset as i64) <= qmax);
            }
        }
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(matches!(
            choose_quantization_params(1.0, -1.0, Schema::Asymmetric, DType::I8),
            Err(QuantizationError::InvalidRange { .. })
        ));
        assert!(choose_quantization_params(f32::NAN, 1.0, Schema::Asymmetric, DType::I8).is_err());
        assert!(matches!(
            choose_quantization_params(-1.0, 1.0, Schema::Asymmetric, DType::F32),
            Err(QuantizationError::UnsupportedDType { .. })
        ));
    }

    #[test]
    fn test_schema_serde() {
        let json = serde_json::to_string(&Schema::SymmetricWithUnsigned).unwrap();
        assert_eq!(json, "\"symmetric_with_unsigned\"");
        let back: Schema = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Schema::SymmetricWithUnsigned);
    }
}
