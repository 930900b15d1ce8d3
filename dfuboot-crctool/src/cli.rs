// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command-line interface definitions.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use dfuboot_common::IMAGE_SIZE;

use crate::commands;

/// Command-line arguments.
#[derive(Parser)]
#[command(name = "crctool")]
#[command(about = "Compute, patch and verify dfuboot image checksums")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// Print the image checksum in hex
    Checksum {
        /// Firmware binary file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Byte offset of the image header within the file
        #[arg(short = 'S', long, default_value = "0")]
        start: usize,
    },

    /// Pad the image to the region size and write its checksum into the header
    Patch {
        /// Firmware binary file, rewritten in place
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Byte offset of the image header within the file
        #[arg(short = 'S', long, default_value = "0")]
        start: usize,

        /// Size of the device image region in bytes
        #[arg(long, default_value_t = IMAGE_SIZE as usize)]
        region_size: usize,
    },

    /// Check the image the way the bootloader does
    Verify {
        /// Firmware binary file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Byte offset of the image header within the file
        #[arg(short = 'S', long, default_value = "0")]
        start: usize,
    },
}

/// Execute the parsed CLI command.
pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Checksum { file, start } => commands::checksum(&file, start),
        Commands::Patch {
            file,
            start,
            region_size,
        } => commands::patch(&file, start, region_size),
        Commands::Verify { file, start } => commands::verify(&file, start),
    }
}
