// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Core tensor type.

use crate::{DType, Shape, TensorError};

/// Typed backing storage. `U8` and `U8Fused` tensors share `U8`.
#[derive(Debug, Clone, PartialEq)]
enum Storage {
    F32(Vec<f32>),
    I8(Vec<i8>),
    U8(Vec<u8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
}

/// An owned, n-dimensional tensor stored in contiguous row-major memory.
///
/// `Tensor` is the data carrier of the runtime: placeholder bindings,
/// constant payloads and intermediate values between partitions are all
/// tensors. Element access is typed; asking for the wrong element kind
/// returns [`TensorError::DTypeMismatch`] instead of reinterpreting bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Shape,
    dtype: DType,
    storage: Storage,
}

fn check_count(shape: &Shape, actual: usize) -> Result<(), TensorError> {
    let expected = shape.num_elements();
    if expected != actual {
        return Err(TensorError::ElementCountMismatch { expected, actual });
    }
    Ok(())
}

impl Tensor {
    /// Creates a new tensor filled with zeros.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::{Tensor, Shape, DType};
    /// let t = Tensor::zeros(Shape::matrix(2, 3), DType::F32);
    /// assert_eq!(t.size_bytes(), 24);
    /// ```
    pub fn zeros(shape: Shape, dtype: DType) -> Self {
        let n = shape.num_elements();
        let storage = match dtype {
            DType::F32 => Storage::F32(vec![0.0; n]),
            DType::I8 => Storage::I8(vec![0; n]),
            DType::U8 | DType::U8Fused => Storage::U8(vec![0; n]),
            DType::I16 => Storage::I16(vec![0; n]),
            DType::I32 => Storage::I32(vec![0; n]),
        };
        Self {
            shape,
            dtype,
            storage,
        }
    }

    /// Creates an `F32` tensor from a slice of values.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::{Tensor, Shape};
    /// let t = Tensor::from_f32(Shape::vector(3), &[1.0, 2.0, 3.0]).unwrap();
    /// assert_eq!(t.as_f32().unwrap(), &[1.0, 2.0, 3.0]);
    /// ```
    pub fn from_f32(shape: Shape, values: &[f32]) -> Result<Self, TensorError> {
        check_count(&shape, values.len())?;
        Ok(Self {
            shape,
            dtype: DType::F32,
            storage: Storage::F32(values.to_vec()),
        })
    }

    /// Creates an `I8` tensor.
    pub fn from_i8(shape: Shape, values: Vec<i8>) -> Result<Self, TensorError> {
        check_count(&shape, values.len())?;
        Ok(Self {
            shape,
            dtype: DType::I8,
            storage: Storage::I8(values),
        })
    }

    /// Creates a `U8` or `U8Fused` tensor.
    pub fn from_u8(shape: Shape, dtype: DType, values: Vec<u8>) -> Result<Self, TensorError> {
        if !matches!(dtype, DType::U8 | DType::U8Fused) {
            return Err(TensorError::DTypeMismatch {
                expected: DType::U8,
                actual: dtype,
            });
        }
        check_count(&shape, values.len())?;
        Ok(Self {
            shape,
            dtype,
            storage: Storage::U8(values),
        })
    }

    /// Creates an `I16` tensor.
    pub fn from_i16(shape: Shape, values: Vec<i16>) -> Result<Self, TensorError> {
        check_count(&shape, values.len())?;
        Ok(Self {
            shape,
            dtype: DType::I16,
            storage: Storage::I16(values),
        })
    }

    /// Creates an `I32` tensor.
    pub fn from_i32(shape: Shape, values: Vec<i32>) -> Result<Self, TensorError> {
        check_count(&shape, values.len())?;
        Ok(Self {
            shape,
            dtype: DType::I32,
            storage: Storage::I32(values),
        })
    }

    /// Returns the tensor's shape.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Returns the tensor's element kind.
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Returns the number of elements.
    pub fn len(&self) -> usize {
        self.shape.num_elements()
    }

    /// Returns `true` if the tensor holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the memory footprint of this tensor in bytes.
    pub fn size_bytes(&self) -> usize {
        self.shape.size_bytes(self.dtype)
    }

    fn mismatch(&self, expected: DType) -> TensorError {
        TensorError::DTypeMismatch {
            expected,
            actual: self.dtype,
        }
    }

    /// Borrows the elements of an `F32` tensor.
    pub fn as_f32(&self) -> Result<&[f32], TensorError> {
        match &self.storage {
            Storage::F32(v) => Ok(v),
            _ => Err(self.mismatch(DType::F32)),
        }
    }

    /// Mutably borrows the elements of an `F32` tensor.
    pub fn as_f32_mut(&mut self) -> Result<&mut [f32], TensorError> {
        let dtype = self.dtype;
        match &mut self.storage {
            Storage::F32(v) => Ok(v),
            _ => Err(TensorError::DTypeMismatch {
                expected: DType::F32,
                actual: dtype,
            }),
        }
    }

    /// Borrows the elements of an `I8` tensor.
    pub fn as_i8(&self) -> Result<&[i8], TensorError> {
        match &self.storage {
            Storage::I8(v) => Ok(v),
            _ => Err(self.mismatch(DType::I8)),
        }
    }

    /// Borrows the elements of a `U8` or `U8Fused` tensor.
    pub fn as_u8(&self) -> Result<&[u8], TensorError> {
        match &self.storage {
            Storage::U8(v) => Ok(v),
            _ => Err(self.mismatch(DType::U8)),
        }
    }

    /// Borrows the elements of an `I16` tensor.
    pub fn as_i16(&self) -> Result<&[i16], TensorError> {
        match &self.storage {
            Storage::I16(v) => Ok(v),
            _ => Err(self.mismatch(DType::I16)),
        }
    }

    /// Borrows the elements of an `I32` tensor.
    pub fn as_i32(&self) -> Result<&[i32], TensorError> {
        match &self.storage {
            Storage::I32(v) => Ok(v),
            _ => Err(self.mismatch(DType::I32)),
        }
    }

    /// Fills an `F32` tensor with a constant value.
    pub fn fill_f32(&mut self, value: f32) -> Result<(), TensorError> {
        self.as_f32_mut()?.iter_mut().for_each(|x| *x = value);
        Ok(())
    }

    /// Returns `(min, max)` over an `F32` tensor, or `None` when empty.
    pub fn min_max_f32(&self) -> Result<Option<(f32, f32)>, TensorError> {
        let values = self.as_f32()?;
        Ok(values.iter().fold(None, |acc, &x| match acc {
            None => Some((x, x)),
            Some((lo, hi)) => Some((lo.min(x), hi.max(x))),
        }))
    }
}
