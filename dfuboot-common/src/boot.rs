// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Boot decision and control handoff - pure logic without hardware dependencies.
//!
//! The decision is a function of the force-bootloader signal and the image
//! integrity check, evaluated once per reset. The two operations that leave
//! the bootloader's control flow (starting the application and resetting the
//! system) are isolated behind [`BootVector`].

use crate::dfu::BootloaderContext;
use crate::image::{self, AppEntry, ImageHeader};
use crate::layout::ImageRegion;

/// Why the bootloader stays resident.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StayReason {
    /// The board asked for update mode.
    Forced,
    /// The application image is absent or corrupt.
    InvalidImage,
}

/// Result of the boot-time trust decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BootDecision {
    RunApplication(AppEntry),
    StayInBootloader(StayReason),
}

/// Decide whether to stay in the bootloader.
///
/// `verify` is only evaluated when the bootloader is not forced.
pub fn should_stay_in_bootloader(
    force_bootloader: bool,
    verify: impl FnOnce() -> bool,
) -> Option<StayReason> {
    if force_bootloader {
        Some(StayReason::Forced)
    } else if !verify() {
        Some(StayReason::InvalidImage)
    } else {
        None
    }
}

/// Decide what to boot given the application image contents.
pub fn decide(force_bootloader: bool, image: &[u8]) -> BootDecision {
    if let Some(reason) = should_stay_in_bootloader(force_bootloader, || image::verify(image)) {
        return BootDecision::StayInBootloader(reason);
    }
    match ImageHeader::parse(image) {
        Ok(header) => BootDecision::RunApplication(header.entry()),
        Err(_) => BootDecision::StayInBootloader(StayReason::InvalidImage),
    }
}

/// Hardware boot vector: the only way control leaves the bootloader.
pub trait BootVector {
    /// Point the interrupt vector table base at `address`.
    fn set_vector_table_base(&mut self, address: u32);

    /// Jump into the application. Never returns.
    ///
    /// # Safety
    /// `entry` must describe a verified application image, and the vector
    /// table base must already point at its table.
    unsafe fn transfer_control(&mut self, entry: AppEntry) -> !;

    /// Reset the whole system. Never returns.
    fn system_reset(&mut self) -> !;
}

/// Run the cold-boot decision.
///
/// Jumps into the application when it is valid and update mode is not
/// forced; otherwise returns why the bootloader has to stay.
pub fn cold_boot<V: BootVector>(
    vector: &mut V,
    force_bootloader: bool,
    image: &[u8],
) -> StayReason {
    match decide(force_bootloader, image) {
        BootDecision::RunApplication(entry) => {
            vector.set_vector_table_base(entry.vector_table);
            unsafe { vector.transfer_control(entry) }
        }
        BootDecision::StayInBootloader(reason) => reason,
    }
}

/// Take over from a previous execution context.
///
/// Restores the bootloader's own vector table and returns a freshly
/// zeroed context. Nothing from writable memory is read; callers must not
/// touch any bootloader state before this has run.
pub fn enter_bootloader<V: BootVector>(
    vector: &mut V,
    bootloader_vector_table: u32,
    region: ImageRegion,
) -> BootloaderContext {
    vector.set_vector_table_base(bootloader_vector_table);
    let mut ctx = BootloaderContext::new(region);
    ctx.sanitize();
    ctx
}
