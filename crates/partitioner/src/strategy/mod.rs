// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The [`Partitioner`] trait and strategy implementations.

pub mod greedy;
pub mod single;

use crate::{Dag, DeviceDescriptor, PartitionError};
use graph_ir::{Function, Module, Validated};

/// Trait for partitioning strategies.
///
/// A strategy turns one function of a validated module into a [`Dag`]
/// whose per-device memory and operator kinds fit the given devices, or
/// fails with [`PartitionError::NoPartitionFound`].
///
/// Strategies are purely algorithmic, so they can be tested without any
/// device attached.
pub trait Partitioner: Send + Sync {
    /// Human-readable name of this strategy.
    fn name(&self) -> &str;

    /// Partitions `function` across `devices`.
    ///
    /// With `saturate_host`, a function that fits on one device is
    /// replicated on every device of the same backend that can hold it.
    fn partition(
        &self,
        module: &Module<Validated>,
        function: &str,
        devices: &[DeviceDescriptor],
        saturate_host: bool,
    ) -> Result<Dag, PartitionError>;
}

/// Common argument checks shared by the strategies.
pub(crate) fn lookup<'m>(
    module: &'m Module<Validated>,
    function: &str,
    devices: &[DeviceDescriptor],
) -> Result<&'m Function, PartitionError> {
    if devices.is_empty() {
        return Err(PartitionError::NoDevices);
    }
    module
        .function(function)
        .ok_or_else(|| PartitionError::UnknownFunction(function.to_string()))
}
