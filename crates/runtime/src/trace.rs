// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Per-run diagnostic state carried inside an [`crate::ExecutionContext`].
//!
//! Two kinds of information are collected:
//! - timed events (runtime level: one per partition; operator level: one
//!   per step as well), exportable in Chrome trace format;
//! - observed value ranges per node, filled in when a network is compiled
//!   for quantization profiling and later fed back as the profile.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;
use tensor_core::Tensor;

/// How much detail a run records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceLevel {
    /// Partition-level events only.
    #[default]
    Runtime,
    /// Partition and per-step events.
    Operator,
}

/// One timed span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub name: String,
    /// Device (or `host`) the span ran on.
    pub device: String,
    /// Microseconds since the context was created.
    pub start_us: u64,
    pub duration_us: u64,
}

/// Observed `[min, max]` of a node's output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f32,
    pub max: f32,
}

impl ValueRange {
    pub fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Widens the range to cover `other`.
    pub fn merge(&mut self, other: ValueRange) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }
}

/// Events and value ranges collected during one or more runs.
#[derive(Debug, Clone)]
pub struct TraceContext {
    level: TraceLevel,
    origin: Instant,
    events: Vec<TraceEvent>,
    ranges: BTreeMap<String, ValueRange>,
}

impl TraceContext {
    pub fn new(level: TraceLevel) -> Self {
        Self {
            level,
            origin: Instant::now(),
            events: Vec::new(),
            ranges: BTreeMap::new(),
        }
    }

    /// An empty context sharing this one's level and time origin, for a
    /// single partition of the run.
    pub fn child(&self) -> Self {
        Self {
            level: self.level,
            origin: self.origin,
            events: Vec::new(),
            ranges: BTreeMap::new(),
        }
    }

    pub fn level(&self) -> TraceLevel {
        self.level
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    pub fn ranges(&self) -> &BTreeMap<String, ValueRange> {
        &self.ranges
    }

    /// Records a span that started at `start` and ends now.
    pub fn record(&mut self, name: impl Into<String>, device: impl Into<String>, start: Instant) {
        let start_us = start.saturating_duration_since(self.origin).as_micros() as u64;
        self.events.push(TraceEvent {
            name: name.into(),
            device: device.into(),
            start_us,
            duration_us: start.elapsed().as_micros() as u64,
        });
    }

    /// Widens the recorded range of `name` by the contents of `value`.
    ///
    /// Non-float and empty tensors are ignored.
    pub fn record_range(&mut self, name: &str, value: &Tensor) {
        let Ok(Some((min, max))) = value.min_max_f32() else {
            return;
        };
        self.ranges
            .entry(name.to_string())
            .and_modify(|r| r.merge(ValueRange::new(min, max)))
            .or_insert(ValueRange::new(min, max));
    }

    /// Moves another context's events and ranges into this one.
    pub fn merge(&mut self, other: TraceContext) {
        self.events.extend(other.events);
        for (name, range) in other.ranges {
            self.ranges
                .entry(name)
                .and_modify(|r| r.merge(range))
                .or_insert(range);
        }
    }

    /// Hands the observed ranges over, e.g. as a quantization profile.
    pub fn take_ranges(&mut self) -> BTreeMap<String, ValueRange> {
        std::mem::take(&mut self.ranges)
    }

    /// Events as a Chrome trace (`chrome://tracing`) document.
    pub fn to_chrome_json(&self) -> serde_json::Value {
        let events: Vec<serde_json::Value> = self
            .events
            .iter()
            .map(|e| {
                serde_json::json!({
                    "name": e.name,
                    "ph": "X",
                    "ts": e.start_us,
                    "dur": e.duration_us,
                    "pid": 0,
                    "tid": e.device,
                })
            })
            .collect();
        serde_json::json!({ "traceEvents": events })
    }
}
