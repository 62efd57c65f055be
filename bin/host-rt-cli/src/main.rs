// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # host-rt
//!
//! Command-line driver for the host runtime. Every command works on a
//! synthetic stacked network (`matmul → add → gelu` per layer, softmax
//! head) so the runtime can be exercised without model files.
//!
//! ## Usage
//! ```bash
//! # Serve 64 concurrent requests on two 1 MB devices
//! host-rt run --devices 2 --memory 1M --requests 64
//!
//! # Show how a network would be partitioned
//! host-rt inspect --layers 8 --memory 64K --strategy greedy
//!
//! # Profile, then compare int8 against float
//! host-rt profile --width 32
//!
//! # Print the effective configuration
//! host-rt config
//! ```

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "host-rt",
    about = "Partitioned graph runtime host driver",
    version,
    author
)]
struct Cli {
    /// Path to a TOML runtime configuration (replaces --devices/--memory).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (repeat for more: -v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Shape of the synthetic network and the devices it runs on.
#[derive(clap::Args, Debug, Clone)]
pub struct NetworkArgs {
    /// Number of devices when no config file is given.
    #[arg(short, long, default_value_t = 1)]
    devices: usize,

    /// Memory per device (e.g. "64K", "1M").
    #[arg(short, long, default_value = "2G")]
    memory: String,

    /// Hidden width of the network.
    #[arg(short, long, default_value_t = 64)]
    width: usize,

    /// Number of stacked layers.
    #[arg(short, long, default_value_t = 4)]
    layers: usize,

    /// Partition strategy: auto, single-device, greedy.
    #[arg(short, long, default_value = "auto")]
    strategy: String,

    /// Replicate the network on every device that can hold it.
    #[arg(long)]
    saturate: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Add the synthetic network and serve a burst of run requests.
    Run {
        #[command(flatten)]
        network: NetworkArgs,

        /// Number of requests submitted at once.
        #[arg(short, long, default_value_t = 16)]
        requests: usize,
    },

    /// Partition the synthetic network and print the resulting DAG.
    Inspect {
        #[command(flatten)]
        network: NetworkArgs,
    },

    /// Profile the network, recompile it quantized and report the error.
    Profile {
        #[command(flatten)]
        network: NetworkArgs,

        /// Store constants as fused row-wise uint8.
        #[arg(long)]
        rowwise: bool,
    },

    /// Print the effective runtime configuration as TOML.
    Config {
        #[command(flatten)]
        network: NetworkArgs,
    },
}

// Host calls block on device replies, so `main` stays synchronous.
fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    commands::init_tracing(cli.verbose);

    match cli.command {
        Commands::Run { network, requests } => {
            commands::run::execute(cli.config.as_deref(), &network, requests)
        }
        Commands::Inspect { network } => commands::inspect::execute(cli.config.as_deref(), &network),
        Commands::Profile { network, rowwise } => {
            commands::profile::execute(cli.config.as_deref(), &network, rowwise)
        }
        Commands::Config { network } => commands::config::execute(cli.config.as_deref(), &network),
    }
}
