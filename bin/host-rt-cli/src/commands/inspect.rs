// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `host-rt inspect` command: add the network and show where it landed.

use super::NETWORK;
use crate::NetworkArgs;
use runtime::CompilationOptions;
use std::path::Path;

pub fn execute(path: Option<&Path>, args: &NetworkArgs) -> anyhow::Result<()> {
    let config = super::load_config(path, args)?;
    let host = super::start_host(config, &args.strategy)?;

    let module = super::synthetic_module(args.width, args.layers)?;
    println!("  Module: {}", module.summary());
    host.add_network(module, &CompilationOptions::default(), args.saturate)?;

    let dag = host
        .network_dag(NETWORK)
        .ok_or_else(|| anyhow::anyhow!("network '{NETWORK}' vanished after add"))?;
    println!("  {}", dag.summary());
    println!();

    println!("  {:<16} {:>6} {:>10} {:>12}  {}", "Partition", "Nodes", "Memory", "Devices", "Inputs");
    println!("  {}", "─".repeat(64));
    for node in &dag.nodes {
        let devices: Vec<String> = node.device_ids.iter().map(ToString::to_string).collect();
        println!(
            "  {:<16} {:>6} {:>7.1} KB {:>12}  {}",
            node.name,
            node.partition.nodes.len(),
            node.estimated_memory_bytes as f64 / 1024.0,
            devices.join(","),
            node.partition.inputs.join(", "),
        );
    }
    println!();

    println!("  Devices");
    for d in host.device_descriptors() {
        println!(
            "   {:<10} {:<12} {:>10} / {:>10} bytes free",
            d.name, d.backend_name, d.available_memory, d.total_memory
        );
    }

    host.clear_host()?;
    Ok(())
}
