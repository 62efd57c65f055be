// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Supported tensor element kinds.

/// Enumerates the element kinds a [`crate::Tensor`] can hold.
///
/// Besides `F32`, the quantized kinds are the destination types of the
/// quantization transforms. `U8Fused` is a `u8` matrix whose rows carry
/// their own scale and offset as trailing bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum DType {
    /// 32-bit IEEE 754 floating point.
    F32,
    /// 8-bit signed quantized integer.
    I8,
    /// 8-bit unsigned quantized integer.
    U8,
    /// 16-bit signed quantized integer.
    I16,
    /// 32-bit signed quantized integer (accumulators, biases).
    I32,
    /// 8-bit unsigned rows with fused per-row scale/offset.
    U8Fused,
}

impl DType {
    /// Returns the size of a single element in bytes.
    pub fn size_bytes(self) -> usize {
        match self {
            DType::F32 | DType::I32 => 4,
            DType::I16 => 2,
            DType::I8 | DType::U8 | DType::U8Fused => 1,
        }
    }

    /// Inclusive `[min, max]` range of the integer kind, as `i64`.
    ///
    /// Returns `None` for `F32`.
    pub fn int_range(self) -> Option<(i64, i64)> {
        match self {
            DType::F32 => None,
            DType::I8 => Some((i8::MIN as i64, i8::MAX as i64)),
            DType::U8 | DType::U8Fused => Some((u8::MIN as i64, u8::MAX as i64)),
            DType::I16 => Some((i16::MIN as i64, i16::MAX as i64)),
            DType::I32 => Some((i32::MIN as i64, i32::MAX as i64)),
        }
    }

    /// Returns a human-readable label for this element kind.
    pub fn as_str(self) -> &'static str {
        match self {
            DType::F32 => "f32",
            DType::I8 => "i8",
            DType::U8 => "u8",
            DType::I16 => "i16",
            DType::I32 => "i32",
            DType::U8Fused => "u8_fused",
        }
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
