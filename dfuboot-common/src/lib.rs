// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Core of the dfuboot USB firmware-update bootloader.
//!
//! This crate supports both `no_std` (embedded) and `std` (host) environments:
//! - Default: `no_std` mode for embedded targets
//! - `std` feature: Enables `std` support for host tools
//! - `embedded` feature: Enables board support (rp2040-hal) and the
//!   application-side re-entry call
//! - `defmt` feature: Derives `defmt::Format` on protocol types

#![cfg_attr(not(feature = "std"), no_std)]

pub mod boot;
pub mod checksum;
pub mod dfu;
pub mod flash;
pub mod image;
pub mod layout;

// Re-entry from a running application (requires embedded feature)
#[cfg(feature = "embedded")]
pub mod reentry;

// Re-export commonly used types
pub use boot::{BootDecision, BootVector, StayReason};
pub use dfu::{BootloaderContext, Completed, Completion, DfuState, DfuStatus, Reply, SetupPacket};
pub use flash::{FlashError, FlashFacility, Watchdog};
pub use image::{AppEntry, ImageError, ImageHeader};
pub use layout::{ImageRegion, APP_ADDRESS, FLASH_BASE, IMAGE_SIZE, TRANSFER_BLOCK_SIZE};

// Embedded-specific exports (only with embedded feature)
#[cfg(feature = "embedded")]
use embedded_hal::delay::DelayNs;
#[cfg(feature = "embedded")]
use embedded_hal::digital::OutputPin;
#[cfg(feature = "embedded")]
use rp2040_hal as hal;

#[cfg(feature = "embedded")]
pub type LedPin =
    hal::gpio::Pin<hal::gpio::bank0::Gpio25, hal::gpio::FunctionSioOutput, hal::gpio::PullDown>;

/// Blink an LED a specified number of times.
#[cfg(feature = "embedded")]
pub fn blink(led: &mut impl OutputPin, timer: &mut impl DelayNs, count: u32, period_ms: u32) {
    for _ in 0..count {
        led.set_high().ok();
        timer.delay_ms(period_ms);
        led.set_low().ok();
        timer.delay_ms(period_ms);
    }
}
