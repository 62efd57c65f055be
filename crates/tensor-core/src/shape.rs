// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tensor dimensions.

use std::fmt;

/// Row-major dimensions of a [`crate::Tensor`] or graph value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    /// # Examples
    /// ```
    /// use tensor_core::Shape;
    /// let s = Shape::new(vec![2, 3, 4]);
    /// assert_eq!(s.rank(), 3);
    /// assert_eq!(s.num_elements(), 24);
    /// ```
    pub fn new(dims: Vec<usize>) -> Self {
        Self { dims }
    }

    pub fn vector(len: usize) -> Self {
        Self { dims: vec![len] }
    }

    pub fn matrix(rows: usize, cols: usize) -> Self {
        Self {
            dims: vec![rows, cols],
        }
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Element count; 1 for rank 0.
    pub fn num_elements(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Bytes needed to hold this shape as `dtype`.
    pub fn size_bytes(&self, dtype: super::DType) -> usize {
        self.num_elements() * dtype.size_bytes()
    }

    /// The `(rows, cols)` view used by row-wise quantization: the first
    /// dimension against the product of the rest.
    ///
    /// Rank 0 is `(1, 1)` and a vector of length `n` is one row `(1, n)`.
    pub fn flatten_rows(&self) -> (usize, usize) {
        match self.dims.as_slice() {
            [] => (1, 1),
            [n] => (1, *n),
            [first, rest @ ..] => (*first, rest.iter().product()),
        }
    }

    /// Innermost dimension, or 1 for rank 0.
    pub fn last_dim(&self) -> usize {
        self.dims.last().copied().unwrap_or(1)
    }

    /// `self` is `[.., M, K]` and `other` is `[.., K, N]`.
    pub fn is_matmul_compatible(&self, other: &Shape) -> bool {
        match (self.dims.as_slice(), other.dims.as_slice()) {
            ([.., k_lhs], [.., k_rhs, _]) if self.rank() >= 2 => k_lhs == k_rhs,
            _ => false,
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, "]")
    }
}
