// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the host runtime.

use std::fmt;

/// Coarse error categories reported at the host boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Any failure without a dedicated code.
    RuntimeError,
    /// The network has runs in flight or is already being removed.
    NetworkBusy,
    /// No active network has that name.
    NetworkNotFound,
    /// Admission control turned the request away.
    RequestRefused,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::RuntimeError => "RUNTIME_ERROR",
            Self::NetworkBusy => "NET_BUSY",
            Self::NetworkNotFound => "NET_NOT_FOUND",
            Self::RequestRefused => "REQUEST_REFUSED",
        };
        f.write_str(s)
    }
}

/// Errors that can occur while registering, running or removing networks.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuntimeError {
    /// A function name collides with a registered or pending network.
    #[error("network '{0}' is already registered")]
    AlreadyRegistered(String),

    /// No active network has this name.
    #[error("network '{0}' not found")]
    NetworkNotFound(String),

    /// The network has runs in flight or is being removed.
    #[error("network '{0}' is busy")]
    NetworkBusy(String),

    /// Too many requests in flight.
    #[error("request refused: {active} active requests exceed the limit of {limit}")]
    RequestRefused { active: usize, limit: usize },

    /// The executor no longer accepts runs.
    #[error("executor is shut down")]
    ExecutorShutdown,

    /// Profiling compilation needs the host to itself.
    #[error("quantization profiling requires exactly one network on the host: {0}")]
    ProfilingConflict(String),

    /// No backend is registered under this name.
    #[error("unknown backend '{0}'")]
    UnknownBackend(String),

    /// A device failed or rejected a command.
    #[error("device '{device}': {detail}")]
    Device { device: String, detail: String },

    /// A device holds no compiled function of this name.
    #[error("device '{device}' has no function '{name}'")]
    FunctionNotLoaded { device: String, name: String },

    /// A partition could not be compiled.
    #[error("failed to compile '{name}': {detail}")]
    Compile { name: String, detail: String },

    /// A value a step needs is neither bound nor computed.
    #[error("missing value '{0}' during execution")]
    MissingValue(String),

    /// A kernel failed while executing a step.
    #[error("execution error in node '{node}': {source}")]
    Execution {
        node: String,
        #[source]
        source: tensor_core::TensorError,
    },

    #[error("graph error: {0}")]
    Graph(#[from] graph_ir::GraphError),

    #[error("partition error: {0}")]
    Partition(#[from] partitioner::PartitionError),

    #[error("memory error: {0}")]
    Memory(#[from] memory_manager::MemoryError),

    #[error("quantization error: {0}")]
    Quantization(#[from] quantization::QuantizationError),

    #[error("tensor error: {0}")]
    Tensor(#[from] tensor_core::TensorError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl RuntimeError {
    /// Maps the error onto its boundary code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NetworkBusy(_) => ErrorCode::NetworkBusy,
            Self::NetworkNotFound(_) => ErrorCode::NetworkNotFound,
            Self::RequestRefused { .. } => ErrorCode::RequestRefused,
            _ => ErrorCode::RuntimeError,
        }
    }
}

/// Keeps the first failure of a sequence of fallible steps.
///
/// Later failures are logged at `debug` and dropped.
///
/// ```
/// use runtime::{FirstError, RuntimeError};
///
/// let mut errors = FirstError::new();
/// errors.push(Ok(()));
/// errors.push(Err(RuntimeError::ExecutorShutdown));
/// errors.push(Err(RuntimeError::NetworkBusy("a".into())));
/// assert_eq!(errors.get(), Err(RuntimeError::ExecutorShutdown));
/// ```
#[derive(Debug, Default)]
pub struct FirstError {
    first: Option<RuntimeError>,
    dropped: usize,
}

impl FirstError {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `result`; returns `true` if it was an error.
    pub fn push(&mut self, result: Result<(), RuntimeError>) -> bool {
        match result {
            Ok(()) => false,
            Err(e) => {
                if self.first.is_none() {
                    self.first = Some(e);
                } else {
                    tracing::debug!("dropping subsequent error: {e}");
                    self.dropped += 1;
                }
                true
            }
        }
    }

    pub fn is_err(&self) -> bool {
        self.first.is_some()
    }

    /// Number of errors recorded after the first.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Consumes the reducer, returning the first error if any.
    pub fn get(self) -> Result<(), RuntimeError> {
        match self.first {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(RuntimeError::NetworkBusy("n".into()).code(), ErrorCode::NetworkBusy);
        assert_eq!(RuntimeError::NetworkNotFound("n".into()).code(), ErrorCode::NetworkNotFound);
        assert_eq!(
            RuntimeError::RequestRefused { active: 3, limit: 2 }.code(),
            ErrorCode::RequestRefused
        );
        assert_eq!(RuntimeError::ExecutorShutdown.code(), ErrorCode::RuntimeError);
        assert_eq!(ErrorCode::NetworkBusy.to_string(), "NET_BUSY");
    }

    #[test]
    fn test_first_error_keeps_first() {
        let mut errors = FirstError::new();
        assert!(!errors.push(Ok(())));
        assert!(!errors.is_err());
        assert!(errors.push(Err(RuntimeError::MissingValue("x".into()))));
        assert!(errors.push(Err(RuntimeError::ExecutorShutdown)));
        assert_eq!(errors.dropped(), 1);
        assert_eq!(errors.get(), Err(RuntimeError::MissingValue("x".into())));
    }

    #[test]
    fn test_first_error_empty_is_ok() {
        assert_eq!(FirstError::new().get(), Ok(()));
    }

    #[test]
    fn test_from_conversions() {
        let e: RuntimeError = memory_manager::MemoryError::ZeroSizedReservation("x".into()).into();
        assert!(matches!(e, RuntimeError::Memory(_)));
        let e: RuntimeError = partitioner::PartitionError::NoDevices.into();
        assert!(e.to_string().contains("no devices"));
    }
}
