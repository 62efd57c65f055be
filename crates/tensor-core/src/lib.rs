// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # tensor-core
//!
//! Tensor storage and reference kernels shared by every crate of the
//! device host runtime.
//!
//! This crate provides:
//! - [`Tensor`]: an owned n-dimensional tensor with typed storage for
//!   float and quantized element kinds.
//! - [`Shape`]: runtime shape descriptors.
//! - [`DType`]: element kinds (`f32` plus the quantized integer kinds
//!   produced by the compiler's quantization path).
//! - Reference kernels used by the interpreter backend: matmul, add,
//!   relu, gelu, softmax, layer normalization.
//!
//! # Design Goals
//! - Typed storage: no reinterpreting of byte buffers, so alignment is
//!   never an issue on any target.
//! - Kernels write into caller-provided outputs.
//! - Clean error types via `thiserror`.

mod dtype;
mod error;
mod ops;
mod shape;
mod tensor;

pub use dtype::DType;
pub use error::TensorError;
pub use ops::{add, gelu, layer_norm, matmul, relu, softmax};
pub use shape::Shape;
pub use tensor::Tensor;
