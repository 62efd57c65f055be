// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Host, device and compilation configuration.
//!
//! # TOML Format
//! ```toml
//! [host]
//! executor_threads = 3
//! max_active_requests = 100
//! profiling_backend = "Interpreter"
//!
//! [[devices]]
//! backend_name = "CPU"
//! name = "cpu0"
//! memory = "2G"
//! non_supported_nodes = ["softmax"]
//! ```

use crate::trace::ValueRange;
use crate::RuntimeError;
use memory_manager::MemoryBudget;
use quantization::Schema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tensor_core::DType;

/// Default memory of a device whose config leaves it out.
pub const DEFAULT_DEVICE_MEMORY: MemoryBudget = MemoryBudget::from_bytes(2_000_000_000);

// ── Host ───────────────────────────────────────────────────────

/// Host-wide limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Worker threads driving the executor.
    pub executor_threads: usize,
    /// Runs allowed in flight before new ones are refused.
    pub max_active_requests: usize,
    /// Backend every device is rebuilt on when a network is compiled for
    /// quantization profiling.
    pub profiling_backend: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            executor_threads: 3,
            max_active_requests: 100,
            profiling_backend: "Interpreter".to_string(),
        }
    }
}

// ── Devices ────────────────────────────────────────────────────

/// How to create one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub backend_name: String,
    /// Defaults to `config{index}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Defaults to [`DEFAULT_DEVICE_MEMORY`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<MemoryBudget>,
    #[serde(default)]
    pub supported_nodes: Vec<String>,
    #[serde(default)]
    pub non_supported_nodes: Vec<String>,
    /// Backend-specific key/value parameters.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

impl DeviceConfig {
    pub fn new(backend_name: impl Into<String>) -> Self {
        Self {
            backend_name: backend_name.into(),
            name: None,
            memory: None,
            supported_nodes: Vec::new(),
            non_supported_nodes: Vec::new(),
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_memory(mut self, memory: MemoryBudget) -> Self {
        self.memory = Some(memory);
        self
    }

    /// The configured name, or `config{index}`.
    pub fn resolve_name(&self, index: usize) -> String {
        self.name.clone().unwrap_or_else(|| format!("config{index}"))
    }

    pub fn resolve_memory(&self) -> MemoryBudget {
        self.memory.unwrap_or(DEFAULT_DEVICE_MEMORY)
    }
}

// ── Whole runtime ──────────────────────────────────────────────

/// Everything needed to start a host.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub host: HostConfig,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

impl RuntimeConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, RuntimeError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RuntimeError::ConfigError(format!("cannot read config '{}': {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, RuntimeError> {
        let config: Self = toml::from_str(toml_str)
            .map_err(|e| RuntimeError::ConfigError(format!("TOML parse error: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialises configuration to TOML.
    pub fn to_toml(&self) -> Result<String, RuntimeError> {
        toml::to_string_pretty(self)
            .map_err(|e| RuntimeError::ConfigError(format!("TOML serialise error: {e}")))
    }

    /// Rejects settings the host cannot start with.
    pub fn validate(&self) -> Result<(), RuntimeError> {
        if self.host.executor_threads == 0 {
            return Err(RuntimeError::ConfigError("executor_threads must be at least 1".into()));
        }
        if self.devices.is_empty() {
            return Err(RuntimeError::ConfigError("at least one device is required".into()));
        }
        Ok(())
    }
}

// ── Compilation ────────────────────────────────────────────────

/// Whether and how a network is compiled for low precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantizationMode {
    /// Plain float execution.
    #[default]
    None,
    /// Float execution that records every node's output range.
    Profile,
    /// Constants stored quantized, node outputs snapped to the profiled
    /// ranges.
    Quantize,
}

/// Options handed to the backend for every partition of a network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilationOptions {
    pub quant_mode: QuantizationMode,
    pub schema: Schema,
    /// Quantized element kind.
    pub precision: DType,
    /// Store constants row-wise (fused `U8` rows) instead of per tensor.
    pub enable_rowwise: bool,
    /// Per-node ranges gathered by a profiling run.
    pub profile: BTreeMap<String, ValueRange>,
    pub backend_options: BTreeMap<String, String>,
}

impl Default for CompilationOptions {
    fn default() -> Self {
        Self {
            quant_mode: QuantizationMode::None,
            schema: Schema::Asymmetric,
            precision: DType::I8,
            enable_rowwise: false,
            profile: BTreeMap::new(),
            backend_options: BTreeMap::new(),
        }
    }
}

impl CompilationOptions {
    /// Options for a profiling compile.
    pub fn profiling() -> Self {
        Self {
            quant_mode: QuantizationMode::Profile,
            ..Default::default()
        }
    }

    /// Options for a quantized compile using `profile`.
    pub fn quantized(profile: BTreeMap<String, ValueRange>) -> Self {
        Self {
            quant_mode: QuantizationMode::Quantize,
            profile,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[host]
executor_threads = 2
max_active_requests = 8

[[devices]]
backend_name = "CPU"
name = "cpu0"
memory = "64M"
non_supported_nodes = ["softmax"]

[[devices]]
backend_name = "Interpreter"
"#;

    #[test]
    fn test_host_defaults() {
        let h = HostConfig::default();
        assert_eq!(h.executor_threads, 3);
        assert_eq!(h.max_active_requests, 100);
        assert_eq!(h.profiling_backend, "Interpreter");
    }

    #[test]
    fn test_from_toml() {
        let c = RuntimeConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(c.host.executor_threads, 2);
        assert_eq!(c.host.max_active_requests, 8);
        assert_eq!(c.host.profiling_backend, "Interpreter");
        assert_eq!(c.devices.len(), 2);
        assert_eq!(c.devices[0].resolve_memory(), MemoryBudget::from_mb(64));
        assert_eq!(c.devices[0].non_supported_nodes, vec!["softmax".to_string()]);
        assert_eq!(c.devices[1].resolve_name(1), "config1");
        assert_eq!(c.devices[1].resolve_memory(), DEFAULT_DEVICE_MEMORY);
    }

    #[test]
    fn test_to_toml_roundtrip() {
        let c = RuntimeConfig::from_toml(SAMPLE).unwrap();
        let back = RuntimeConfig::from_toml(&c.to_toml().unwrap()).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn test_validate() {
        assert!(RuntimeConfig::from_toml("[host]\nexecutor_threads = 2\n").is_err());
        let c = RuntimeConfig {
            host: HostConfig {
                executor_threads: 0,
                ..Default::default()
            },
            devices: vec![DeviceConfig::new("CPU")],
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_compilation_options_serde() {
        let mut profile = BTreeMap::new();
        profile.insert("fc".to_string(), ValueRange::new(-1.0, 1.0));
        let opts = CompilationOptions::quantized(profile);
        let text = toml::to_string(&opts).unwrap();
        let back: CompilationOptions = toml::from_str(&text).unwrap();
        assert_eq!(back, opts);
        assert_eq!(back.quant_mode, QuantizationMode::Quantize);
        assert_eq!(CompilationOptions::profiling().quant_mode, QuantizationMode::Profile);
    }
}
