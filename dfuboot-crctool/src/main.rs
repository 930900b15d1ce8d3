// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Image checksum tool for the dfuboot bootloader.
//!
//! Usage:
//!   crctool checksum firmware.bin
//!   crctool patch firmware.bin --start 0
//!   crctool verify firmware.bin

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let args = cli::Cli::parse();
    cli::run(args)
}
