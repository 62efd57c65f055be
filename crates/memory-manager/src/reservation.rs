// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! RAII handle for reserved device memory.

use crate::pool::Ledger;
use std::sync::Arc;

/// Bytes reserved in a [`MemoryPool`](crate::MemoryPool).
///
/// The bytes are returned to the pool when the reservation is dropped.
/// Devices store one reservation next to each provisioned artifact, so
/// evicting the artifact releases its memory.
pub struct Reservation {
    id: u64,
    label: String,
    bytes: usize,
    ledger: Arc<Ledger>,
}

impl Reservation {
    pub(crate) fn new(id: u64, label: String, bytes: usize, ledger: Arc<Ledger>) -> Self {
        Self {
            id,
            label,
            bytes,
            ledger,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn size_bytes(&self) -> usize {
        self.bytes
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.ledger.release(self.id, self.bytes);
    }
}

impl std::fmt::Debug for Reservation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reservation")
            .field("label", &self.label)
            .field("bytes", &self.bytes)
            .finish()
    }
}
