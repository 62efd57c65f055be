// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Device memory capacity and its textual forms.

use crate::MemoryError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

const KIB: usize = 1024;
const MIB: usize = 1024 * KIB;
const GIB: usize = 1024 * MIB;

/// Suffixes accepted by [`MemoryBudget::parse`], longest first so that
/// `"MB"` is tried before `"B"`.
const SUFFIXES: &[(&str, usize)] = &[
    ("GB", GIB),
    ("MB", MIB),
    ("KB", KIB),
    ("G", GIB),
    ("M", MIB),
    ("K", KIB),
    ("B", 1),
];

/// A device's memory capacity.
///
/// In configuration files a budget may be written either as a plain byte
/// count (`memory = 2000000000`) or as a string with a binary suffix
/// (`memory = "2G"`). It always serializes back as a byte count.
///
/// # Examples
/// ```
/// use memory_manager::MemoryBudget;
///
/// assert_eq!(MemoryBudget::parse("1G").unwrap().as_mb(), 1024);
/// assert_eq!(MemoryBudget::parse("4096").unwrap().as_bytes(), 4096);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MemoryBudget {
    bytes: usize,
}

impl MemoryBudget {
    pub const fn from_bytes(bytes: usize) -> Self {
        Self { bytes }
    }

    pub const fn from_mb(mb: usize) -> Self {
        Self { bytes: mb * MIB }
    }

    pub const fn from_gb(gb: usize) -> Self {
        Self { bytes: gb * GIB }
    }

    pub fn as_bytes(&self) -> usize {
        self.bytes
    }

    /// Whole megabytes, truncated.
    pub fn as_mb(&self) -> usize {
        self.bytes / MIB
    }

    /// Parses `"512M"`, `"512MB"`, `"1g"`, `"2048K"`, `"100B"` or a plain
    /// byte count. Case-insensitive; surrounding whitespace is ignored.
    pub fn parse(s: &str) -> Result<Self, MemoryError> {
        let invalid = || MemoryError::InvalidBudget(s.to_string());
        let trimmed = s.trim();
        let upper = trimmed.to_ascii_uppercase();

        let (digits, multiplier) = SUFFIXES
            .iter()
            .find_map(|&(suffix, mult)| {
                upper
                    .strip_suffix(suffix)
                    .map(|rest| (&trimmed[..rest.len()], mult))
            })
            .unwrap_or((trimmed, 1));

        let value: usize = digits.trim().parse().map_err(|_| invalid())?;
        let bytes = value.checked_mul(multiplier).ok_or_else(invalid)?;
        if bytes == 0 {
            return Err(invalid());
        }
        Ok(Self { bytes })
    }
}

impl std::str::FromStr for MemoryBudget {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for MemoryBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.bytes {
            b if b >= GIB && b % GIB == 0 => write!(f, "{} GB", b / GIB),
            b if b >= MIB && b % MIB == 0 => write!(f, "{} MB", b / MIB),
            b if b >= KIB && b % KIB == 0 => write!(f, "{} KB", b / KIB),
            b => write!(f, "{b} B"),
        }
    }
}

impl Serialize for MemoryBudget {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.bytes as u64)
    }
}

impl<'de> Deserialize<'de> for MemoryBudget {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Bytes(u64),
            Text(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Bytes(0) => Err(serde::de::Error::custom("memory budget must be non-zero")),
            Repr::Bytes(b) => usize::try_from(b)
                .map(Self::from_bytes)
                .map_err(serde::de::Error::custom),
            Repr::Text(s) => Self::parse(&s).map_err(serde::de::Error::custom),
        }
    }
}
