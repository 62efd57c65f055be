// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Budget-enforced reservation ledger.
//!
//! The check against the budget and the update of the reserved total
//! happen under one lock, so concurrent provisioning can never push a
//! device past its capacity.
//!
//! # Thread Safety
//! `MemoryPool` is `Send + Sync` and cheap to share behind an `Arc`.

use crate::{AllocationStats, MemoryBudget, MemoryError, Reservation};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct LedgerState {
    reserved_bytes: usize,
    next_id: u64,
    /// Live reservations: id → (label, bytes).
    live: BTreeMap<u64, (String, usize)>,
    stats: AllocationStats,
}

/// State shared between the pool and its outstanding reservations.
#[derive(Debug)]
pub(crate) struct Ledger {
    budget: MemoryBudget,
    state: Mutex<LedgerState>,
}

impl Ledger {
    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        // The state stays consistent even if a holder panicked.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn release(&self, id: u64, bytes: usize) {
        let mut state = self.lock();
        if state.live.remove(&id).is_some() {
            state.reserved_bytes -= bytes;
            state.stats.record_release();
        }
    }
}

/// Tracks how much of a device's memory is reserved.
///
/// # Example
/// ```
/// use memory_manager::{MemoryBudget, MemoryError, MemoryPool};
///
/// let pool = MemoryPool::new(MemoryBudget::from_bytes(1000));
/// let held = pool.reserve("a", 600).unwrap();
/// assert!(matches!(pool.reserve("b", 600), Err(MemoryError::OutOfMemory { .. })));
/// drop(held);
/// assert!(pool.reserve("b", 600).is_ok());
/// ```
#[derive(Clone)]
pub struct MemoryPool {
    ledger: Arc<Ledger>,
}

impl MemoryPool {
    pub fn new(budget: MemoryBudget) -> Self {
        Self {
            ledger: Arc::new(Ledger {
                budget,
                state: Mutex::new(LedgerState::default()),
            }),
        }
    }

    /// Reserves `bytes` under `label`.
    ///
    /// # Errors
    /// [`MemoryError::OutOfMemory`] if the budget cannot cover the request,
    /// [`MemoryError::ZeroSizedReservation`] for a zero-byte request.
    pub fn reserve(&self, label: impl Into<String>, bytes: usize) -> Result<Reservation, MemoryError> {
        let label = label.into();
        if bytes == 0 {
            return Err(MemoryError::ZeroSizedReservation(label));
        }

        let budget = self.ledger.budget.as_bytes();
        let mut state = self.ledger.lock();
        let available = budget.saturating_sub(state.reserved_bytes);
        if bytes > available {
            state.stats.record_oom();
            tracing::debug!(%label, bytes, available, "reservation refused");
            return Err(MemoryError::OutOfMemory {
                label,
                requested_bytes: bytes,
                available_bytes: available,
                budget_bytes: budget,
            });
        }

        let id = state.next_id;
        state.next_id += 1;
        state.reserved_bytes += bytes;
        state.live.insert(id, (label.clone(), bytes));
        let now = state.reserved_bytes;
        state.stats.record_reservation(bytes, now);
        drop(state);

        Ok(Reservation::new(id, label, bytes, Arc::clone(&self.ledger)))
    }

    /// Bytes currently reserved.
    pub fn used_bytes(&self) -> usize {
        self.ledger.lock().reserved_bytes
    }

    /// Bytes still available under the budget.
    pub fn available_bytes(&self) -> usize {
        self.ledger
            .budget
            .as_bytes()
            .saturating_sub(self.used_bytes())
    }

    pub fn budget(&self) -> MemoryBudget {
        self.ledger.budget
    }

    /// Labels and sizes of the live reservations, oldest first.
    pub fn reservations(&self) -> Vec<(String, usize)> {
        self.ledger.lock().live.values().cloned().collect()
    }

    /// Snapshot of the pool's statistics.
    pub fn stats(&self) -> AllocationStats {
        self.ledger.lock().stats.clone()
    }
}

impl std::fmt::Debug for MemoryPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryPool")
            .field("budget", &self.ledger.budget)
            .field("used_bytes", &self.used_bytes())
            .field("available_bytes", &self.available_bytes())
            .finish()
    }
}
