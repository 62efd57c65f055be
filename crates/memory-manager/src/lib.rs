// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # memory-manager
//!
//! Memory accounting for compute devices. A device never hands out raw
//! buffers through this crate; it *reserves* the bytes a provisioned
//! artifact needs and releases them on eviction.
//!
//! # Key Components
//!
//! - [`MemoryBudget`]: a device's memory capacity, parsed from
//!   human-readable strings (`"512M"`, `"2G"`) or plain byte counts.
//! - [`MemoryPool`]: the ledger: enforces the budget atomically and
//!   tracks which labelled reservations are live.
//! - [`Reservation`]: an RAII handle. Dropping it returns its bytes to the
//!   pool, so an evicted artifact can never leak accounted memory.
//! - [`AllocationStats`]: cumulative reservation metrics.
//!
//! # Ownership Model
//!
//! ```text
//! MemoryPool::reserve(label, bytes)
//!       │
//!       ▼
//!   Reservation  ◄─── holds Arc<Ledger>
//!       │
//!       │  drop()
//!       ▼
//!   Ledger::release()  ──► bytes available again
//! ```
//!
//! # Example
//! ```
//! use memory_manager::{MemoryBudget, MemoryPool};
//!
//! let pool = MemoryPool::new(MemoryBudget::from_mb(64));
//! let a = pool.reserve("net_part0", 1024 * 1024).unwrap();
//! let b = pool.reserve("net_part1", 512 * 1024).unwrap();
//! assert_eq!(pool.used_bytes(), 1024 * 1024 + 512 * 1024);
//!
//! drop(a);
//! assert_eq!(pool.used_bytes(), 512 * 1024);
//! # drop(b);
//! ```

mod budget;
mod error;
pub mod pool;
mod reservation;
mod stats;

pub use budget::MemoryBudget;
pub use error::MemoryError;
pub use pool::MemoryPool;
pub use reservation::Reservation;
pub use stats::AllocationStats;
