// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Scalar quantize / dequantize.

use tensor_core::DType;

use crate::QuantizationParams;

/// Integer element kinds a float can be quantized into.
pub trait QuantizedElem: Copy + Send + Sync + 'static {
    /// The tensor element kind holding values of this type.
    const DTYPE: DType;

    /// Clips a rounded value into the range of `Self`.
    fn clip(value: i64) -> Self;

    /// Widens to `i64` so the `i32` case cannot overflow when the offset is
    /// subtracted.
    fn widen(self) -> i64;
}

macro_rules! impl_quantized_elem {
    ($ty:ty, $dtype:expr) => {
        impl QuantizedElem for $ty {
            const DTYPE: DType = $dtype;

            #[inline]
            fn clip(value: i64) -> Self {
                value.clamp(<$ty>::MIN as i64, <$ty>::MAX as i64) as $ty
            }

            #[inline]
            fn widen(self) -> i64 {
                self as i64
            }
        }
    };
}

impl_quantized_elem!(i8, DType::I8);
impl_quantized_elem!(u8, DType::U8);
impl_quantized_elem!(i16, DType::I16);
impl_quantized_elem!(i32, DType::I32);

/// Converts a float into the quantized type `T`.
///
/// `clip(round_ties_even(input / scale + offset))`.
#[inline]
pub fn quantize<T: QuantizedElem>(input: f32, params: QuantizationParams) -> T {
    let result = input / params.scale + params.offset as f32;
    // Float-to-int `as` saturates, and NaN becomes 0.
    T::clip(result.round_ties_even() as i64)
}

/// Converts a quantized value back to float: `scale * (q - offset)`.
#[inline]
pub fn dequantize<T: QuantizedElem>(input: T, params: QuantizationParams) -> f32 {
    params.scale * (input.widen() - params.offset as i64) as f32
}

/// Quantizes with a float offset into the `u8` row-wise layout.
///
/// The value `(input - offset) / scale` is truncated into `u8`. When the
/// destination is `i8` the byte is shifted down by 128.
#[inline]
pub fn quantize_with_float_offset<T: FloatOffsetElem>(input: f32, scale: f32, offset: f32) -> T {
    let byte = ((input - offset) / scale) as u8;
    T::from_unsigned(byte)
}

/// Inverse of [`quantize_with_float_offset`]: `byte * scale + offset`.
#[inline]
pub fn dequantize_with_float_offset<T: FloatOffsetElem>(input: T, scale: f32, offset: f32) -> f32 {
    input.to_unsigned() as f32 * scale + offset
}

/// Byte-sized kinds usable with float-offset quantization.
pub trait FloatOffsetElem: Copy {
    fn from_unsigned(byte: u8) -> Self;
    fn to_unsigned(self) -> u8;
}

impl FloatOffsetElem for u8 {
    fn from_unsigned(byte: u8) -> Self {
        byte
    }

    fn to_unsigned(self) -> u8 {
        self
    }
}

impl FloatOffsetElem for i8 {
    fn from_unsigned(byte: u8) -> Self {
        byte.wrapping_sub(128) as i8
    }

    fn to_unsigned(self) -> u8 {
        (self as u8).wrapping_add(128)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantize_rounds_half_to_even() {
        let p = QuantizationParams::new(1.0, 0);
        assert_eq!(quantize::<i8>(2.5, p), 2);
        assert_eq!(quantize::<i8>(3.5, p), 4);
        assert_eq!(quantize::<i8>(-2.5, p), -2);
    }

    #[test]
    fn test_quantize_clips() {
        let p = QuantizationParams::new(0.1, 0);
        assert_eq!(quantize::<i8>(100.0, p), 127);
        assert_eq!(quantize::<i8>(-100.0, p), -128);
        assert_eq!(quantize::<u8>(-1.0, p), 0);
        assert_eq!(quantize::<i16>(1e9, p), i16::MAX);
    }

    #[test]
    fn test_dequantize_i32_does_not_overflow() {
        let p = QuantizationParams::new(1.0, i32::MIN);
        assert_eq!(dequantize(i32::MAX, p), u32::MAX as f32);
    }

    #[test]
    fn test_float_offset_u8() {
        let q: u8 = quantize_with_float_offset(1.0, 0.5, -1.0);
        assert_eq!(q, 4);
        assert_eq!(dequantize_with_float_offset(q, 0.5, -1.0), 1.0);
    }

    #[test]
    fn test_float_offset_i8_shifts_by_128() {
        let q: i8 = quantize_with_float_offset(1.0, 0.5, -1.0);
        assert_eq!(q, (4_i32 - 128) as i8);
        assert_eq!(dequantize_with_float_offset(q, 0.5, -1.0), 1.0);

        let top: i8 = quantize_with_float_offset(255.0, 1.0, 0.0);
        assert_eq!(top, 127);
    }
}
