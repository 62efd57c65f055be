// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Integer-only rescaling of 32-bit accumulators into 8-bit outputs.

use serde::{Deserialize, Serialize};

use crate::QuantizationError;

/// Largest post-shift that keeps `1 << post` inside an `i64` safely.
const MAX_POST_SHIFT: u32 = 31;

/// The transform `(((x >> pre) * scale) + round) >> post + offset`.
///
/// `>>` rounds towards negative infinity; adding `round = 1 << (post - 1)`
/// before the final shift turns that into round-to-nearest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantizationTransform32To8 {
    pub pre: u32,
    pub post: u32,
    pub scale: i32,
    pub offset: i32,
}

impl QuantizationTransform32To8 {
    pub fn new(pre: u32, post: u32, scale: i32, offset: i32) -> Self {
        Self {
            pre,
            post,
            scale,
            offset,
        }
    }

    /// Applies the transform to one accumulator value.
    pub fn transform(&self, input: i32) -> i32 {
        let round: i64 = if self.post == 0 {
            0
        } else {
            1i64 << (self.post - 1)
        };
        let shifted = (input as i64) >> self.pre.min(63);
        let scaled = shifted * self.scale as i64 + round;
        ((scaled >> self.post.min(63)) + self.offset as i64) as i32
    }
}

/// Converts a float `scale` and integer `offset` into a shift/multiply
/// transform.
///
/// The scale is doubled (raising `post`) while it is below one half, or
/// below 256 with fewer than 15 post-shifts, then halved back (lowering
/// `post`) until the multiplier fits in eight bits. The multiplier is the
/// rounded result. Derived transforms never pre-shift.
///
/// # Errors
/// Returns [`QuantizationError::InvalidScale`] for a non-positive or
/// non-finite scale, a scale too small to express with a 31-bit shift, or
/// a scale above 255.
pub fn quantize_scale_offset_32_to_8(
    scale: f32,
    offset: i32,
) -> Result<QuantizationTransform32To8, QuantizationError> {
    if !scale.is_finite() || scale <= 0.0 {
        return Err(QuantizationError::InvalidScale { scale });
    }

    let mut s = scale;
    let mut post = 0u32;

    while s < 0.5 || (s < 256.0 && post < 15) {
        s *= 2.0;
        post += 1;
        if post > MAX_POST_SHIFT {
            return Err(QuantizationError::InvalidScale { scale });
        }
    }
    while s > 255.0 {
        if post == 0 {
            return Err(QuantizationError::InvalidScale { scale });
        }
        s /= 2.0;
        post -= 1;
    }

    Ok(QuantizationTransform32To8::new(
        0,
        post,
        s.round() as i32,
        offset,
    ))
}
