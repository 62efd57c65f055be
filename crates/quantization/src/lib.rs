// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # quantization
//!
//! Numeric transforms used when a network is compiled for low-precision
//! execution.
//!
//! - [`choose_quantization_params`] derives a `(scale, offset)` pair from an
//!   observed float range under a [`Schema`].
//! - [`quantize`] / [`dequantize`] map single values; the `*_with_float_offset`
//!   variants serve the `u8` row-wise layout.
//! - [`QuantizationTransform32To8`] rescales 32-bit accumulators to 8 bits
//!   using shifts and an integer multiplier only.
//! - [`rowwise_quantize`], [`rowwise_quantize_float_offset`] and
//!   [`fused_rowwise_quantize`] encode each row of a matrix independently.
//! - [`quantize_tensor`] / [`dequantize_tensor`] lift the element transforms
//!   to whole tensors; [`create_mapping`] builds an `i8 -> i8` lookup table.
//!
//! Zero is always exactly representable and scales are strictly positive.

mod elementwise;
mod error;
mod mapping;
mod params;
mod rowwise;
mod tensor;
mod transform;

pub use elementwise::{
    dequantize, dequantize_with_float_offset, quantize, quantize_with_float_offset, FloatOffsetElem,
    QuantizedElem,
};
pub use error::QuantizationError;
pub use mapping::create_mapping;
pub use params::{choose_quantization_params, QuantizationParams, Schema};
pub use rowwise::{
    dequantize_fused_rowwise, fused_row_scale_offset, fused_rowwise_quantize, rowwise_quantize,
    rowwise_quantize_float_offset, FloatOffsetRowwise, RowwiseQuantized, FUSED_ROW_EXTRA_BYTES,
};
pub use tensor::{dequantize_tensor, quantize_tensor};
pub use transform::{quantize_scale_offset_32_to_8, QuantizationTransform32To8};
