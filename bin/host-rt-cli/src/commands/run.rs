// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `host-rt run` command: serve a burst of concurrent requests.

use super::NETWORK;
use crate::NetworkArgs;
use runtime::{CompilationOptions, ExecutionContext, RuntimeError};
use std::path::Path;
use std::sync::mpsc;
use std::time::{Duration, Instant};

pub fn execute(path: Option<&Path>, args: &NetworkArgs, requests: usize) -> anyhow::Result<()> {
    let config = super::load_config(path, args)?;
    let limit = config.host.max_active_requests;
    let host = super::start_host(config, &args.strategy)?;

    let module = super::synthetic_module(args.width, args.layers)?;
    host.add_network(module, &CompilationOptions::default(), args.saturate)?;
    if let Some(dag) = host.network_dag(NETWORK) {
        println!("  {}", dag.summary());
    }
    println!("  Submitting {requests} request(s), admission limit {limit}");
    println!();

    let (tx, rx) = mpsc::channel();
    let started = Instant::now();
    for seed in 0..requests {
        let tx = tx.clone();
        let submitted = Instant::now();
        let context = ExecutionContext::new(super::synthetic_input(args.width, seed)?);
        host.run_network(
            NETWORK,
            context,
            Box::new(move |id, result, _| {
                let _ = tx.send((id, result, submitted.elapsed()));
            }),
        );
    }
    drop(tx);

    let mut latencies: Vec<Duration> = Vec::with_capacity(requests);
    let mut refused = 0;
    let mut failed = 0;
    for (id, result, latency) in rx {
        match result {
            Ok(()) => latencies.push(latency),
            Err(RuntimeError::RequestRefused { .. }) => refused += 1,
            Err(e) => {
                tracing::warn!(run_id = id, "run failed: {e}");
                failed += 1;
            }
        }
    }
    let wall = started.elapsed();

    latencies.sort();
    println!("  {:<12} {:>8}", "Completed", latencies.len());
    println!("  {:<12} {:>8}", "Refused", refused);
    println!("  {:<12} {:>8}", "Failed", failed);
    println!("  {:<12} {:>8.2?}", "Wall time", wall);
    if !latencies.is_empty() {
        let pct = |p: f64| latencies[((latencies.len() - 1) as f64 * p) as usize];
        println!("  {:<12} {:>8.2?}", "p50", pct(0.50));
        println!("  {:<12} {:>8.2?}", "p99", pct(0.99));
        println!(
            "  {:<12} {:>8.1} req/s",
            "Throughput",
            latencies.len() as f64 / wall.as_secs_f64()
        );
    }

    host.clear_host()?;
    if failed > 0 {
        anyhow::bail!("{failed} request(s) failed");
    }
    Ok(())
}
