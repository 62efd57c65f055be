// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Run-scoped state: tensor bindings plus optional trace.
//!
//! An [`ExecutionContext`] is moved into a run and handed back to the
//! completion callback, with output placeholders filled in.

use crate::trace::{TraceContext, TraceLevel};
use graph_ir::{Module, ModuleState};
use std::collections::BTreeMap;
use tensor_core::Tensor;

/// Tensors bound to placeholder (and, during a run, intermediate value)
/// names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaceholderBindings {
    values: BTreeMap<String, Tensor>,
}

impl PlaceholderBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `tensor` to `name`, returning the previous binding.
    pub fn insert(&mut self, name: impl Into<String>, tensor: Tensor) -> Option<Tensor> {
        self.values.insert(name.into(), tensor)
    }

    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.values.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Tensor> {
        self.values.get_mut(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Tensor> {
        self.values.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Tensor)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Binds a zero tensor to every placeholder of `module` that is not
    /// bound yet.
    pub fn allocate<S: ModuleState>(&mut self, module: &Module<S>) {
        for p in module.placeholders() {
            self.values
                .entry(p.name.clone())
                .or_insert_with(|| Tensor::zeros(p.shape.clone(), p.dtype));
        }
    }
}

impl FromIterator<(String, Tensor)> for PlaceholderBindings {
    fn from_iter<I: IntoIterator<Item = (String, Tensor)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Everything a run owns.
#[derive(Debug, Default)]
pub struct ExecutionContext {
    bindings: PlaceholderBindings,
    trace: Option<TraceContext>,
}

impl ExecutionContext {
    pub fn new(bindings: PlaceholderBindings) -> Self {
        Self {
            bindings,
            trace: None,
        }
    }

    /// Enables tracing at `level`.
    pub fn with_trace(mut self, level: TraceLevel) -> Self {
        self.trace = Some(TraceContext::new(level));
        self
    }

    pub fn bindings(&self) -> &PlaceholderBindings {
        &self.bindings
    }

    pub fn bindings_mut(&mut self) -> &mut PlaceholderBindings {
        &mut self.bindings
    }

    pub fn into_bindings(self) -> PlaceholderBindings {
        self.bindings
    }

    pub fn trace(&self) -> Option<&TraceContext> {
        self.trace.as_ref()
    }

    pub fn trace_mut(&mut self) -> Option<&mut TraceContext> {
        self.trace.as_mut()
    }

    /// The trace, created at runtime level if absent.
    pub fn trace_or_default(&mut self) -> &mut TraceContext {
        self.trace
            .get_or_insert_with(|| TraceContext::new(TraceLevel::Runtime))
    }

    pub fn take_trace(&mut self) -> Option<TraceContext> {
        self.trace.take()
    }

    /// A context for one partition: the named values copied out of this
    /// one, plus a child trace if this run is traced.
    pub(crate) fn child<'a>(&self, names: impl IntoIterator<Item = &'a String>) -> Self {
        let bindings = names
            .into_iter()
            .filter_map(|n| self.bindings.get(n).map(|t| (n.clone(), t.clone())))
            .collect();
        Self {
            bindings,
            trace: self.trace.as_ref().map(TraceContext::child),
        }
    }

    /// Moves the named values and the trace of a finished partition back
    /// into this context.
    pub(crate) fn absorb<'a>(&mut self, mut child: Self, names: impl IntoIterator<Item = &'a String>) {
        for name in names {
            if let Some(t) = child.bindings.remove(name) {
                self.bindings.insert(name.clone(), t);
            }
        }
        if let Some(trace) = child.trace.take() {
            self.trace_or_default().merge(trace);
        }
    }
}
