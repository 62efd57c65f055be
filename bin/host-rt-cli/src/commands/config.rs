// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `host-rt config` command: print the effective configuration.

use crate::NetworkArgs;
use std::path::Path;

pub fn execute(path: Option<&Path>, args: &NetworkArgs) -> anyhow::Result<()> {
    let config = super::load_config(path, args)?;
    print!("{}", config.to_toml()?);
    Ok(())
}
