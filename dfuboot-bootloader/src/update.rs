// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Update mode: USB DFU device loop.

use dfuboot_common::dfu::{BootloaderContext, Completed};
use dfuboot_common::{BootVector, Watchdog};
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use rp2040_hal as hal;
use usb_device::class_prelude::UsbBusAllocator;
use usb_device::prelude::*;

use crate::boot::CortexBootVector;
use crate::dfu_class::DfuClass;
use crate::flash::RomFlash;
use crate::peripherals::{self, Peripherals};
use crate::watchdog::BootWatchdog;

const USB_VID: u16 = 0x2E8A;
const USB_PID: u16 = 0x000C;
const EP0_PACKET_SIZE: u8 = 64;

/// Time given to the USB stack to finish the last status stage before reset.
const RESET_GRACE_MS: u32 = 50;

/// Enter update mode: initialize USB and serve DFU requests until the host
/// completes a transfer. Never returns; the device resets on manifestation.
pub fn enter_update_mode(
    mut p: Peripherals,
    ctx: BootloaderContext,
    mut vector: CortexBootVector,
) -> ! {
    defmt::println!("Update mode: region 0x{:08x}, {} bytes", ctx.region().base, ctx.region().size);

    dfuboot_common::blink(&mut p.led_pin, &mut p.timer, 10, 50);

    let mut usb = p.usb;
    let usb_bus = peripherals::store_usb_bus(UsbBusAllocator::new(hal::usb::UsbBus::new(
        usb.regs,
        usb.dpram,
        usb.clock,
        true,
        &mut usb.resets,
    )));

    let mut dfu = DfuClass::new(usb_bus, ctx);
    let Ok(builder) = UsbDeviceBuilder::new(usb_bus, UsbVidPid(USB_VID, USB_PID))
        .strings(&[StringDescriptors::default()
            .manufacturer("ADNT")
            .product("dfuboot Bootloader")
            .serial_number("0001")])
    else {
        defmt::panic!("Invalid USB string descriptors");
    };
    let Ok(builder) = builder.max_packet_size_0(EP0_PACKET_SIZE) else {
        defmt::panic!("Invalid EP0 packet size");
    };
    let mut usb_dev = builder.build();

    let mut flash = RomFlash::new();
    let mut watchdog = BootWatchdog::start(p.watchdog);

    defmt::println!("USB DFU initialized, entering update loop");
    p.led_pin.set_high().ok();

    loop {
        watchdog.reset_countdown();
        usb_dev.poll(&mut [&mut dfu]);

        match dfu.run_pending(&mut flash, &mut watchdog) {
            None | Some(Completed::Idle) => {}
            Some(Completed::Programmed { address, len }) => {
                defmt::debug!("Programmed {} bytes at 0x{:08x}", len, address);
            }
            Some(Completed::Failed(status)) => {
                defmt::println!("Flash write failed: {}", status);
            }
            Some(Completed::ResetRequested) => {
                handle_reboot(&mut usb_dev, &mut dfu, &mut p.timer, &mut watchdog, &mut vector);
            }
        }
    }
}

/// Finish the manifestation: let the status stage complete, then reset.
fn handle_reboot(
    usb_dev: &mut UsbDevice<'static, hal::usb::UsbBus>,
    dfu: &mut DfuClass,
    timer: &mut hal::Timer,
    watchdog: &mut BootWatchdog,
    vector: &mut CortexBootVector,
) -> ! {
    defmt::println!("Download complete, resetting");

    for _ in 0..RESET_GRACE_MS {
        watchdog.reset_countdown();
        usb_dev.poll(&mut [&mut *dfu]);
        timer.delay_ms(1);
    }

    vector.system_reset()
}
