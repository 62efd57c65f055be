// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Reference backend: partitions are lowered to a flat list of steps and
//! run with the `tensor-core` kernels.
//!
//! Quantization modes:
//! - `Profile`: every step's output range is recorded into the run's trace.
//! - `Quantize`: constants are stored quantized (per tensor, or fused
//!   row-wise for matrices) and dequantized when a run needs them; step
//!   outputs with a profiled range are snapped onto that range's
//!   quantization grid.

use super::{Backend, CompiledFunction};
use crate::trace::TraceLevel;
use crate::{CompilationOptions, ExecutionContext, QuantizationMode, RuntimeError};
use graph_ir::{Module, OpKind, Operand, Validated};
use partitioner::DagNode;
use quantization::{
    choose_quantization_params, dequantize_fused_rowwise, dequantize_tensor, fused_rowwise_quantize,
    quantize_tensor, QuantizationParams,
};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;
use tensor_core::{DType, Shape, Tensor};

/// The reference backend, registered as `CPU` and `Interpreter`.
#[derive(Debug, Clone)]
pub struct InterpreterBackend {
    name: String,
}

impl InterpreterBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

// ── Compiled form ──────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Source {
    /// A placeholder or the output of another node.
    Value(String),
    Constant(String),
}

#[derive(Debug, Clone)]
struct Step {
    name: String,
    kind: OpKind,
    inputs: Vec<Source>,
    shape: Shape,
    /// Grid the output is snapped onto in quantized mode.
    snap: Option<QuantizationParams>,
}

#[derive(Debug, Clone)]
enum StoredConstant {
    Float(Tensor),
    Quantized {
        data: Tensor,
        params: QuantizationParams,
    },
    FusedRows(Tensor),
}

impl StoredConstant {
    fn size_bytes(&self) -> usize {
        match self {
            Self::Float(t) | Self::FusedRows(t) => t.size_bytes(),
            Self::Quantized { data, .. } => data.size_bytes(),
        }
    }

    fn materialize(&self) -> Result<Cow<'_, Tensor>, RuntimeError> {
        Ok(match self {
            Self::Float(t) => Cow::Borrowed(t),
            Self::Quantized { data, params } => Cow::Owned(dequantize_tensor(data, *params)?),
            Self::FusedRows(t) => Cow::Owned(dequantize_fused_rowwise(t)?),
        })
    }
}

/// A partition lowered for [`InterpreterBackend`].
#[derive(Debug, Clone)]
pub struct InterpretedFunction {
    name: String,
    backend: String,
    mode: QuantizationMode,
    precision: DType,
    steps: Vec<Step>,
    constants: BTreeMap<String, StoredConstant>,
    inputs: Vec<String>,
    outputs: Vec<String>,
}

// ── Compilation ────────────────────────────────────────────────

impl Backend for InterpreterBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_op_supported(&self, _kind: &OpKind) -> bool {
        true
    }

    fn compile(
        &self,
        module: &Module<Validated>,
        node: &DagNode,
        options: &CompilationOptions,
    ) -> Result<Box<dyn CompiledFunction>, RuntimeError> {
        let fail = |detail: String| RuntimeError::Compile {
            name: node.name.clone(),
            detail,
        };
        let quantize = options.quant_mode == QuantizationMode::Quantize;

        let mut steps = Vec::with_capacity(node.partition.nodes.len());
        let mut constants = BTreeMap::new();
        for &id in &node.partition.nodes {
            let graph_node = module.node(id);
            if !self.is_op_supported(&graph_node.kind) {
                return Err(fail(format!("{} is not supported by {}", graph_node.kind, self.name)));
            }

            let mut inputs = Vec::with_capacity(graph_node.inputs.len());
            for operand in &graph_node.inputs {
                let source = match operand {
                    Operand::Node(p) => Source::Value(module.node(*p).name.clone()),
                    Operand::Placeholder(name) => Source::Value(name.clone()),
                    Operand::Constant(name) => {
                        if !constants.contains_key(name) {
                            let payload = module
                                .constant(name)
                                .and_then(|c| c.payload())
                                .ok_or_else(|| fail(format!("constant '{name}' has no payload")))?;
                            constants.insert(name.clone(), store_constant(payload, options)?);
                        }
                        Source::Constant(name.clone())
                    }
                };
                inputs.push(source);
            }

            let snap = match options.profile.get(&graph_node.name) {
                Some(range) if quantize && graph_node.saved_placeholder().is_none() => Some(
                    choose_quantization_params(range.min, range.max, options.schema, options.precision)?,
                ),
                _ => None,
            };

            steps.push(Step {
                name: graph_node.name.clone(),
                kind: graph_node.kind.clone(),
                inputs,
                shape: graph_node.shape.clone(),
                snap,
            });
        }

        tracing::debug!(
            function = %node.name,
            backend = %self.name,
            steps = steps.len(),
            constants = constants.len(),
            mode = ?options.quant_mode,
            "compiled partition"
        );

        Ok(Box::new(InterpretedFunction {
            name: node.name.clone(),
            backend: self.name.clone(),
            mode: options.quant_mode,
            precision: options.precision,
            steps,
            constants,
            inputs: node.partition.inputs.clone(),
            outputs: node.partition.outputs.clone(),
        }))
    }
}

fn store_constant(
    payload: &Tensor,
    options: &CompilationOptions,
) -> Result<StoredConstant, RuntimeError> {
    if options.quant_mode != QuantizationMode::Quantize {
        return Ok(StoredConstant::Float(payload.clone()));
    }
    if options.enable_rowwise && payload.shape().rank() == 2 {
        return Ok(StoredConstant::FusedRows(fused_rowwise_quantize(payload)?));
    }
    let (min, max) = payload.min_max_f32()?.unwrap_or((0.0, 0.0));
    let params = choose_quantization_params(min, max, options.schema, options.precision)?;
    Ok(StoredConstant::Quantized {
        data: quantize_tensor(payload, params, options.precision)?,
        params,
    })
}

// ── Execution ──────────────────────────────────────────────────

fn run_kernel(step: &Step, args: &[&Tensor]) -> Result<Tensor, tensor_core::TensorError> {
    if let OpKind::Save { .. } = step.kind {
        return Ok(args[0].clone());
    }
    let mut out = Tensor::zeros(step.shape.clone(), DType::F32);
    match &step.kind {
        OpKind::MatMul => tensor_core::matmul(args[0], args[1], &mut out)?,
        OpKind::Add => tensor_core::add(args[0], args[1], &mut out)?,
        OpKind::Relu => tensor_core::relu(args[0], &mut out)?,
        OpKind::Gelu => tensor_core::gelu(args[0], &mut out)?,
        OpKind::Softmax => tensor_core::softmax(args[0], &mut out)?,
        OpKind::LayerNorm { epsilon } => {
            tensor_core::layer_norm(args[0], args[1], args[2], *epsilon, &mut out)?
        }
        OpKind::Save { .. } => {}
    }
    Ok(out)
}

impl CompiledFunction for InterpretedFunction {
    fn name(&self) -> &str {
        &self.name
    }

    fn backend_name(&self) -> &str {
        &self.backend
    }

    fn memory_bytes(&self) -> usize {
        let outputs: usize = self.steps.iter().map(|s| s.shape.size_bytes(DType::F32)).sum();
        outputs + self.constants.values().map(StoredConstant::size_bytes).sum::<usize>()
    }

    fn execute(&self, device: &str, context: &mut ExecutionContext) -> Result<(), RuntimeError> {
        if let Some(missing) = self.inputs.iter().find(|n| !context.bindings().contains(n.as_str())) {
            return Err(RuntimeError::MissingValue(missing.clone()));
        }

        let mut constants: HashMap<&str, Cow<'_, Tensor>> = HashMap::new();
        for (name, stored) in &self.constants {
            constants.insert(name.as_str(), stored.materialize()?);
        }

        let per_step = context.trace().is_some_and(|t| t.level() >= TraceLevel::Operator);
        let mut values: HashMap<&str, Tensor> = HashMap::new();
        for step in &self.steps {
            let started = Instant::now();
            let mut out = {
                let mut args = Vec::with_capacity(step.inputs.len());
                for source in &step.inputs {
                    let value = match source {
                        Source::Value(name) => values
                            .get(name.as_str())
                            .or_else(|| context.bindings().get(name)),
                        Source::Constant(name) => constants.get(name.as_str()).map(|c| c.as_ref()),
                    };
                    let name = match source {
                        Source::Value(n) | Source::Constant(n) => n,
                    };
                    args.push(value.ok_or_else(|| RuntimeError::MissingValue(name.clone()))?);
                }
                run_kernel(step, &args).map_err(|source| RuntimeError::Execution {
                    node: step.name.clone(),
                    source,
                })?
            };

            if let Some(params) = step.snap {
                out = dequantize_tensor(&quantize_tensor(&out, params, self.precision)?, params)?;
            }
            if self.mode == QuantizationMode::Profile {
                context.trace_or_default().record_range(&step.name, &out);
            }
            if per_step {
                if let Some(trace) = context.trace_mut() {
                    trace.record(step.name.as_str(), device, started);
                }
            }

            match &step.kind {
                OpKind::Save { placeholder } => {
                    context.bindings_mut().insert(placeholder.clone(), out);
                }
                _ => {
                    values.insert(step.name.as_str(), out);
                }
            }
        }

        for name in &self.outputs {
            let value = values
                .remove(name.as_str())
                .ok_or_else(|| RuntimeError::MissingValue(name.clone()))?;
            context.bindings_mut().insert(name.clone(), value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{compile_whole, mlp_expected, mlp_module, row};
    use crate::trace::TraceLevel;
    use crate::PlaceholderBindings;

    const INPUT: [f32; 4] = [1.0, -1.0, 2.0, 0.0];

    fn run(function: &dyn CompiledFunction, trace: Option<TraceLevel>) -> ExecutionContext {
        let mut bindings = PlaceholderBindings::new();
        bindings.insert("input", row(&INPUT));
        let mut context = ExecutionContext::new(bindings);
        if let Some(level) = trace {
            context = context.with_trace(level);
        }
        function.execute("cpu0", &mut context).unwrap();
        context
    }

    #[test]
    fn test_float_execution() {
        let module = mlp_module("net", 4).validate().unwrap();
        let f = compile_whole(&module, "net", &CompilationOptions::default());
        assert_eq!(f.name(), "net");
        assert_eq!(f.backend_name(), "CPU");
        // Four row outputs of 16 bytes, w 64 bytes, b 16 bytes.
        assert_eq!(f.memory_bytes(), 4 * 16 + 64 + 16);

        let context = run(f.as_ref(), None);
        let out = context.bindings().get("output").unwrap();
        assert_eq!(out.as_f32().unwrap(), mlp_expected(&INPUT).as_slice());
        // Intermediates stay inside the partition.
        assert!(!context.bindings().contains("act"));
    }

    #[test]
    fn test_missing_input() {
        let module = mlp_module("net", 4).validate().unwrap();
        let f = compile_whole(&module, "net", &CompilationOptions::default());
        let mut context = ExecutionContext::default();
        assert_eq!(
            f.execute("cpu0", &mut context),
            Err(RuntimeError::MissingValue("input".into()))
        );
    }

    #[test]
    fn test_operator_trace_events() {
        let module = mlp_module("net", 4).validate().unwrap();
        let f = compile_whole(&module, "net", &CompilationOptions::default());
        let context = run(f.as_ref(), Some(TraceLevel::Operator));
        let names: Vec<&str> = context.trace().unwrap().events().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["fc", "bias", "act", "save"]);

        let context = run(f.as_ref(), Some(TraceLevel::Runtime));
        assert!(context.trace().unwrap().events().is_empty());
    }

    #[test]
    fn test_profile_then_quantize() {
        let module = mlp_module("net", 4).validate().unwrap();
        let profiled = compile_whole(&module, "net", &CompilationOptions::profiling());
        let mut context = run(profiled.as_ref(), None);
        let ranges = context.trace_or_default().take_ranges();
        assert_eq!(ranges["fc"].min, -0.5);
        assert_eq!(ranges["fc"].max, 1.0);
        assert!(ranges.contains_key("act"));

        let quantized = compile_whole(&module, "net", &CompilationOptions::quantized(ranges.clone()));
        // w and b shrink to one byte per element.
        assert_eq!(quantized.memory_bytes(), 4 * 16 + 16 + 4);

        let context = run(quantized.as_ref(), None);
        let out = context.bindings().get("output").unwrap().as_f32().unwrap().to_vec();
        let act = ranges["act"];
        let params = choose_quantization_params(act.min, act.max, Default::default(), DType::I8).unwrap();
        for (o, e) in out.iter().zip(mlp_expected(&INPUT)) {
            assert!((o - e).abs() <= 2.0 * params.scale, "{o} vs {e}");
        }
    }

    #[test]
    fn test_rowwise_constants() {
        let module = mlp_module("net", 4).validate().unwrap();
        let options = CompilationOptions {
            quant_mode: QuantizationMode::Quantize,
            enable_rowwise: true,
            ..Default::default()
        };
        let f = compile_whole(&module, "net", &options);
        // w: 4 fused rows of 4 + 8 bytes; the bias vector stays per tensor.
        assert_eq!(f.memory_bytes(), 4 * 16 + 4 * 12 + 4);
        let context = run(f.as_ref(), None);
        let out = context.bindings().get("output").unwrap().as_f32().unwrap().to_vec();
        for (o, e) in out.iter().zip(mlp_expected(&INPUT)) {
            assert!((o - e).abs() < 0.02, "{o} vs {e}");
        }
    }
}
