// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Hardware watchdog used while update mode is active.

use fugit::ExtU32;
use rp2040_hal as hal;

/// Longest stall tolerated in update mode.
const TIMEOUT_US: u32 = 2_000_000;

pub struct BootWatchdog {
    dog: hal::Watchdog,
}

impl BootWatchdog {
    /// Arm the watchdog. Clocks must be running (tick generation enabled).
    pub fn start(mut dog: hal::Watchdog) -> Self {
        dog.start(TIMEOUT_US.micros());
        Self { dog }
    }
}

impl dfuboot_common::Watchdog for BootWatchdog {
    fn reset_countdown(&mut self) {
        self.dog.feed();
    }
}
