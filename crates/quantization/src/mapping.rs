// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

use crate::{dequantize, quantize, QuantizationParams};

/// Builds a 256-entry `i8 -> i8` lookup table for the float function `f`.
///
/// Entry `i` holds the output for the input value `i - 128`, so the table
/// is indexed by `(q as i32 + 128) as usize`.
pub fn create_mapping(
    input: QuantizationParams,
    output: QuantizationParams,
    f: impl Fn(f32) -> f32,
) -> Vec<i8> {
    (i8::MIN..=i8::MAX)
        .map(|q| quantize::<i8>(f(dequantize(q, input)), output))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_mapping() {
        let p = QuantizationParams::new(0.5, 0);
        let table = create_mapping(p, p, |x| x);
        assert_eq!(table.len(), 256);
        for (i, &v) in table.iter().enumerate() {
            assert_eq!(v as i32, i as i32 - 128);
        }
    }

    #[test]
    fn test_relu_mapping() {
        let p = QuantizationParams::new(0.1, 0);
        let table = create_mapping(p, p, |x| x.max(0.0));
        assert_eq!(table[0], 0);
        assert_eq!(table[128], 0);
        assert_eq!(table[255], 127);
    }

    #[test]
    fn test_mapping_rescales() {
        let input = QuantizationParams::new(1.0, 0);
        let output = QuantizationParams::new(2.0, 0);
        let table = create_mapping(input, output, |x| x);
        // 10 / 2.0 = 5
        assert_eq!(table[(10 + 128) as usize], 5);
    }
}
