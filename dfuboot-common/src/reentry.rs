// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Application-side entry into the bootloader.

use crate::layout::REENTRY_RENDEZVOUS_ADDR;

/// Signature of the routine published at the rendezvous address.
pub type ReentryFn = unsafe extern "C" fn() -> !;

/// Stop the application and restart the update process.
///
/// Calls through the function pointer the bootloader stores at
/// [`REENTRY_RENDEZVOUS_ADDR`]. The bootloader discards all RAM contents, so
/// nothing the application holds survives the call.
pub fn enter_bootloader() -> ! {
    cortex_m::interrupt::disable();

    unsafe {
        let target = (REENTRY_RENDEZVOUS_ADDR as *const usize).read_volatile();
        let reentry = core::mem::transmute::<usize, ReentryFn>(target);
        reentry()
    }
}

/// Reboot normally.
pub fn reboot() -> ! {
    cortex_m::peripheral::SCB::sys_reset();
}
