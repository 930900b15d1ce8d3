// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! dfuboot: USB DFU bootloader for RP2040.
//!
//! Boots the application in the image region when its checksum verifies and
//! the force pin (GP2) is not held low. Otherwise it enumerates as a USB DFU
//! device and writes downloaded blocks into the image region. Applications
//! can re-enter it through the rendezvous word at the end of its region.

#![no_std]
#![no_main]

mod boot;
mod dfu_class;
mod flash;
mod peripherals;
mod reentry;
mod update;
mod watchdog;

use defmt_rtt as _;
use dfuboot_common::layout::ImageRegion;
use panic_probe as _;

defmt::timestamp!("{=u64:us}", { 0 });

use cortex_m_rt::entry;

#[link_section = ".boot2"]
#[used]
pub static BOOT2: [u8; 256] = rp2040_boot2::BOOT_LOADER_GENERIC_03H;

#[entry]
fn main() -> ! {
    defmt::println!("Bootloader init");

    let mut p = peripherals::init();
    let force = p.force_bootloader();

    let mut vector = unsafe { boot::CortexBootVector::new() };
    let image = unsafe { ImageRegion::application().as_slice() };
    let reason = dfuboot_common::boot::cold_boot(&mut vector, force, image);
    defmt::println!("Staying in bootloader: {}", reason);

    run_bootloader(p, vector)
}

/// Bootloader initialization after a re-entry from the application.
pub(crate) fn bootloader_main() -> ! {
    let p = peripherals::init();
    let vector = unsafe { boot::CortexBootVector::new() };
    run_bootloader(p, vector)
}

fn run_bootloader(p: peripherals::Peripherals, mut vector: boot::CortexBootVector) -> ! {
    let ctx = dfuboot_common::boot::enter_bootloader(
        &mut vector,
        boot::bootloader_vector_table(),
        ImageRegion::application(),
    );
    update::enter_update_mode(p, ctx, vector)
}
