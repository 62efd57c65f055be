// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `host-rt profile` command: profile, quantize and compare.
//!
//! ```text
//! add (Profile, profiling backend) ─► run ─► ranges ─► remove
//! add (float) ─► run ─► reference
//! add (Quantize, ranges) ─► run ─► compare
//! ```

use super::NETWORK;
use crate::NetworkArgs;
use runtime::{CompilationOptions, ExecutionContext, HostManager, PlaceholderBindings};
use std::path::Path;

fn run_once(host: &HostManager, options: &CompilationOptions, args: &NetworkArgs) -> anyhow::Result<Vec<f32>> {
    host.add_network(super::synthetic_module(args.width, args.layers)?, options, args.saturate)?;
    let mut bindings = super::synthetic_input(args.width, 0)?;
    host.run_network_blocking(NETWORK, &mut bindings)?;
    host.remove_network(NETWORK)?;
    output(&bindings)
}

fn output(bindings: &PlaceholderBindings) -> anyhow::Result<Vec<f32>> {
    let tensor = bindings
        .get("output")
        .ok_or_else(|| anyhow::anyhow!("run produced no output"))?;
    Ok(tensor.as_f32()?.to_vec())
}

pub fn execute(path: Option<&Path>, args: &NetworkArgs, rowwise: bool) -> anyhow::Result<()> {
    let config = super::load_config(path, args)?;
    let host = super::start_host(config, &args.strategy)?;

    host.add_network(
        super::synthetic_module(args.width, args.layers)?,
        &CompilationOptions::profiling(),
        false,
    )?;
    let context = ExecutionContext::new(super::synthetic_input(args.width, 0)?);
    let (result, mut context) = host.run_network_blocking_with_context(NETWORK, context);
    result?;
    host.remove_network(NETWORK)?;
    let profile = context.take_trace().map(|mut t| t.take_ranges()).unwrap_or_default();
    println!("  Profiled {} node output(s)", profile.len());
    for (name, range) in &profile {
        println!("   {:<10} [{:>9.4}, {:>9.4}]", name, range.min, range.max);
    }
    println!();

    let reference = run_once(&host, &CompilationOptions::default(), args)?;
    let mut options = CompilationOptions::quantized(profile);
    options.enable_rowwise = rowwise;
    let quantized = run_once(&host, &options, args)?;

    let max_err = reference
        .iter()
        .zip(&quantized)
        .map(|(a, b)| (a - b).abs())
        .fold(0.0f32, f32::max);
    println!("  Storage:        {}", if rowwise { "fused row-wise uint8" } else { "per-tensor int8" });
    println!("  Max abs error:  {max_err:.6}");

    host.clear_host()?;
    Ok(())
}
