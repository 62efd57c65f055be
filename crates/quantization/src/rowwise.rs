// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Row-wise quantization.
//!
//! Every row of the input (the first dimension; remaining dimensions are
//! flattened into the row) gets its own parameters, derived from that
//! row's min/max after widening the range to include zero.

use tensor_core::{DType, Shape, Tensor};

use crate::{
    choose_quantization_params, quantize, quantize_with_float_offset, QuantizationError, Schema,
};

/// Trailing bytes of every fused row: an `f32` scale then an `f32` offset.
pub const FUSED_ROW_EXTRA_BYTES: usize = 2 * std::mem::size_of::<f32>();

/// Ranges narrower than this encode with scale 1 instead of dividing by ~0.
const FUSED_EQUALITY_THRESHOLD: f32 = 1e-10;

/// Output of [`rowwise_quantize`]: `i8` data plus one `(scale, offset)`
/// per row.
#[derive(Debug, Clone, PartialEq)]
pub struct RowwiseQuantized {
    pub data: Tensor,
    pub scales: Vec<f32>,
    pub offsets: Vec<i32>,
}

/// Output of [`rowwise_quantize_float_offset`].
#[derive(Debug, Clone, PartialEq)]
pub struct FloatOffsetRowwise {
    pub data: Tensor,
    pub scales: Vec<f32>,
    pub offsets: Vec<f32>,
}

fn row_range(row: &[f32]) -> (f32, f32) {
    let (lo, hi) = row
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &x| {
            (lo.min(x), hi.max(x))
        });
    (lo.min(0.0), hi.max(0.0))
}

fn require_f32(op: &'static str, input: &Tensor) -> Result<(), QuantizationError> {
    if input.dtype() != DType::F32 {
        return Err(QuantizationError::UnsupportedDType {
            op,
            dtype: input.dtype(),
        });
    }
    if input.shape().rank() == 0 {
        return Err(QuantizationError::BadShape {
            op,
            expected: "at least one dimension",
            actual: input.shape().clone(),
        });
    }
    Ok(())
}

/// Quantizes each row into `i8` with int32 offsets chosen by
/// [`choose_quantization_params`] under `schema`.
pub fn rowwise_quantize(
    input: &Tensor,
    schema: Schema,
) -> Result<RowwiseQuantized, QuantizationError> {
    require_f32("rowwise_quantize", input)?;
    let (rows, width) = input.shape().flatten_rows();
    let src = input.as_f32()?;

    let mut data = Vec::with_capacity(src.len());
    let mut scales = Vec::with_capacity(rows);
    let mut offsets = Vec::with_capacity(rows);
    for row in src.chunks(width.max(1)).take(rows) {
        let (min, max) = row_range(row);
        let params = choose_quantization_params(min, max, schema, DType::I8)?;
        data.extend(row.iter().map(|&x| quantize::<i8>(x, params)));
        scales.push(params.scale);
        offsets.push(params.offset);
    }

    Ok(RowwiseQuantized {
        data: Tensor::from_i8(input.shape().clone(), data)?,
        scales,
        offsets,
    })
}

/// Quantizes each row into `dest` (`U8` or `I8`) with float offsets:
/// `scale = (max - min) / 255`, `offset = min`.
pub fn rowwise_quantize_float_offset(
    input: &Tensor,
    dest: DType,
) -> Result<FloatOffsetRowwise, QuantizationError> {
    const OP: &str = "rowwise_quantize_float_offset";
    require_f32(OP, input)?;
    if !matches!(dest, DType::U8 | DType::I8) {
        return Err(QuantizationError::UnsupportedDType { op: OP, dtype: dest });
    }

    let (rows, width) = input.shape().flatten_rows();
    let src = input.as_f32()?;

    let mut bytes: Vec<u8> = Vec::with_capacity(src.len());
    let mut scales = Vec::with_capacity(rows);
    let mut offsets = Vec::with_capacity(rows);
    for row in src.chunks(width.max(1)).take(rows) {
        let (min, max) = row_range(row);
        let scale = ((max as f64 - min as f64) / 255.0) as f32;
        let offset = min;
        bytes.extend(
            row.iter()
                .map(|&x| quantize_with_float_offset::<u8>(x, scale, offset)),
        );
        scales.push(scale);
        offsets.push(offset);
    }

    let data = match dest {
        DType::I8 => Tensor::from_i8(
            input.shape().clone(),
            bytes.into_iter().map(|b| b.wrapping_sub(128) as i8).collect(),
        )?,
        _ => Tensor::from_u8(input.shape().clone(), DType::U8, bytes)?,
    };

    Ok(FloatOffsetRowwise {
        data,
        scales,
        offsets,
    })
}

/// Quantizes a 2-D `F32` tensor into a `U8Fused` tensor of shape
/// `[rows, cols + 8]`; the last eight bytes of each row hold the row's
/// `f32` scale and offset in native byte order.
pub fn fused_rowwise_quantize(input: &Tensor) -> Result<Tensor, QuantizationError> {
    const OP: &str = "fused_rowwise_quantize";
    require_f32(OP, input)?;
    if input.shape().rank() != 2 {
        return Err(QuantizationError::BadShape {
            op: OP,
            expected: "a 2-D tensor",
            actual: input.shape().clone(),
        });
    }

    let rows = input.shape().dims()[0];
    let width = input.shape().dims()[1];
    let out_width = width + FUSED_ROW_EXTRA_BYTES;
    let src = input.as_f32()?;

    let mut out = Vec::with_capacity(rows * out_width);
    for r in 0..rows {
        let row = &src[r * width..(r + 1) * width];
        let (min, max) = row_range(row);
        let scale = if max - min < FUSED_EQUALITY_THRESHOLD {
            1.0
        } else {
            ((max as f64 - min as f64) / 255.0) as f32
        };
        let offset = min;

        out.extend(
            row.iter()
                .map(|&x| quantize_with_float_offset::<u8>(x, scale, offset)),
        );
        out.extend_from_slice(&scale.to_ne_bytes());
        out.extend_from_slice(&offset.to_ne_bytes());
    }

    Ok(Tensor::from_u8(
        Shape::matrix(rows, out_width),
        DType::U8Fused,
        out,
    )?)
}

/// Reads the `(scale, offset)` trailer of `row` in a fused tensor.
pub fn fused_row_scale_offset(fused: &Tensor, row: usize) -> Result<(f32, f32), QuantizationError> {
    let (rows, out_width) = fused_dims(fused)?;
    if row >= rows {
        return Err(QuantizationError::BadShape {
            op: "fused_row_scale_offset",
            expected: "a row index inside the tensor",
            actual: fused.shape().clone(),
        });
    }
    let bytes = fused.as_u8()?;
    let tail = (row + 1) * out_width - FUSED_ROW_EXTRA_BYTES;
    let mut scale = [0u8; 4];
    let mut offset = [0u8; 4];
    scale.copy_from_slice(&bytes[tail..tail + 4]);
    offset.copy_from_slice(&bytes[tail + 4..tail + 8]);
    Ok((f32::from_ne_bytes(scale), f32::from_ne_bytes(offset)))
}

/// Decodes a `U8Fused` tensor back into an `F32` tensor of shape
/// `[rows, cols]`.
pub fn dequantize_fused_rowwise(fused: &Tensor) -> Result<Tensor, QuantizationError> {
    let (rows, out_width) = fused_dims(fused)?;
    let width = out_width - FUSED_ROW_EXTRA_BYTES;
    let bytes = fused.as_u8()?;

    let mut values = Vec::with_capacity(rows * width);
    for r in 0..rows {
        let (scale, offset) = fused_row_scale_offset(fused, r)?;
        let row = &bytes[r * out_width..r * out_width + width];
        values.extend(row.iter().map(|&b| b as f32 * scale + offset));
    }
    Ok(Tensor::from_f32(Shape::matrix(rows, width), &values)?)
}

fn fused_dims(fused: &Tensor) -> Result<(usize, usize), QuantizationError> {
    if fused.dtype() != DType::U8Fused {
        return Err(QuantizationError::UnsupportedDType {
            op: "fused rowwise decode",
            dtype: fused.dtype(),
        });
    }
    match fused.shape().dims() {
        [rows, cols] if *cols >= FUSED_ROW_EXTRA_BYTES => Ok((*rows, *cols)),
        _ => Err(QuantizationError::BadShape {
            op: "fused rowwise decode",
            expected: "[rows, cols + 8]",
            actual: fused.shape().clone(),
        }),
    }
}
