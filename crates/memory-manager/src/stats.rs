// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Reservation statistics for diagnostics.

/// Cumulative statistics about a [`MemoryPool`](crate::MemoryPool).
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct AllocationStats {
    /// Successful reservations.
    pub total_reservations: u64,
    /// Reservations refused because the budget was exhausted.
    pub oom_count: u64,
    /// Reservations released (dropped).
    pub total_releases: u64,
    /// High-water mark of reserved bytes.
    pub peak_reserved_bytes: usize,
    /// Sum of all bytes ever reserved.
    pub cumulative_reserved_bytes: u64,
}

impl AllocationStats {
    pub(crate) fn record_reservation(&mut self, bytes: usize, now_reserved: usize) {
        self.total_reservations += 1;
        self.cumulative_reserved_bytes += bytes as u64;
        self.peak_reserved_bytes = self.peak_reserved_bytes.max(now_reserved);
    }

    pub(crate) fn record_oom(&mut self) {
        self.oom_count += 1;
    }

    pub(crate) fn record_release(&mut self) {
        self.total_releases += 1;
    }

    pub fn summary(&self) -> String {
        format!(
            "Reservations: {} total, {} live, {} refused, peak {:.2} MB",
            self.total_reservations,
            self.total_reservations - self.total_releases,
            self.oom_count,
            self.peak_reserved_bytes as f64 / (1024.0 * 1024.0),
        )
    }
}
