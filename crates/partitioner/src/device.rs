// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! What the partitioner knows about a device.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Index of a device in the host's device pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(pub usize);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "device#{}", self.0)
    }
}

/// A device's identity, capacity and operator capabilities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub id: DeviceId,
    pub name: String,
    pub backend_name: String,
    pub total_memory: usize,
    pub available_memory: usize,
    /// Kinds the device runs. Empty means every kind not listed in
    /// `non_supported_nodes`.
    #[serde(default)]
    pub supported_nodes: BTreeSet<String>,
    #[serde(default)]
    pub non_supported_nodes: BTreeSet<String>,
}

impl DeviceDescriptor {
    /// Creates a descriptor that supports every kind.
    pub fn new(
        id: usize,
        name: impl Into<String>,
        backend_name: impl Into<String>,
        memory: usize,
    ) -> Self {
        Self {
            id: DeviceId(id),
            name: name.into(),
            backend_name: backend_name.into(),
            total_memory: memory,
            available_memory: memory,
            supported_nodes: BTreeSet::new(),
            non_supported_nodes: BTreeSet::new(),
        }
    }

    /// Returns `true` if the device can run nodes of `kind`.
    pub fn supports(&self, kind: &str) -> bool {
        if self.non_supported_nodes.contains(kind) {
            return false;
        }
        self.supported_nodes.is_empty() || self.supported_nodes.contains(kind)
    }
}
