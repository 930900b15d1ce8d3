// Copyright (c) 2026 ADNT Sarl <info@adnt.io>
// SPDX-License-Identifier: MIT

//! Sample application for the dfuboot bootloader.
//!
//! Linked behind the bootloader with an image header in front of its vector
//! table. Offers a USB serial console; `bootload` re-enters the bootloader
//! without a reset.

#![no_std]
#![no_main]

use dfuboot_common::image::{self, ImageHeader};
use dfuboot_common::layout::ImageRegion;
use dfuboot_common::reentry;
use defmt_rtt as _;
use embedded_hal::digital::OutputPin;
use embedded_hal::digital::StatefulOutputPin;
use panic_probe as _;
use rp2040_hal as hal;
use rp2040_hal::usb::UsbBus;
use usb_device::class_prelude::UsbBusAllocator;
use usb_device::prelude::*;
use usbd_serial::SerialPort;

defmt::timestamp!("{=u64:us}", { 0 });

use cortex_m_rt::entry;

unsafe extern "C" {
    static __vector_table: u32;
    fn Reset() -> !;
}

/// Image header as laid out in flash. The checksum is patched in after
/// linking by `dfuboot-crctool patch`.
#[allow(dead_code)]
#[repr(C)]
pub struct ImageHeaderRecord {
    vector_table: &'static u32,
    entry_point: unsafe extern "C" fn() -> !,
    checksum: u32,
}

#[link_section = ".image_header"]
#[used]
pub static IMAGE_HEADER: ImageHeaderRecord = ImageHeaderRecord {
    vector_table: unsafe { &__vector_table },
    entry_point: Reset,
    checksum: 0,
};

/// Static storage for UsbBusAllocator (required by usb-device for 'static lifetime).
static mut USB_BUS: Option<UsbBusAllocator<UsbBus>> = None;

/// What the console asked for.
enum Action {
    None,
    EnterBootloader,
    Reboot,
}

/// Process a received command line and return what to do next.
fn process_command(line: &str, serial: &mut SerialPort<UsbBus>) -> Action {
    let line = line.trim();

    match line {
        "help" | "?" => {
            let _ = serial.write(b"Available commands:\r\n");
            let _ = serial.write(b"  help     - Show this help\r\n");
            let _ = serial.write(b"  info     - Show image header and integrity\r\n");
            let _ = serial.write(b"  bootload - Enter the bootloader update mode\r\n");
            let _ = serial.write(b"  reboot   - Reboot normally\r\n");
        }
        "info" => {
            let mut buf = [0u8; 256];
            let len = format_info(&mut buf);
            let _ = serial.write(&buf[..len]);
        }
        "bootload" => {
            let _ = serial.write(b"Entering bootloader...\r\n");
            return Action::EnterBootloader;
        }
        "reboot" => {
            let _ = serial.write(b"Rebooting...\r\n");
            return Action::Reboot;
        }
        "" => {}
        _ => {
            let _ = serial.write(b"Unknown command. Type 'help' for available commands.\r\n");
        }
    }

    Action::None
}

fn format_info(buf: &mut [u8]) -> usize {
    use core::fmt::Write;

    struct BufWriter<'b> {
        buf: &'b mut [u8],
        pos: usize,
    }

    impl<'b> Write for BufWriter<'b> {
        fn write_str(&mut self, s: &str) -> core::fmt::Result {
            let bytes = s.as_bytes();
            let remaining = self.buf.len() - self.pos;
            let to_write = bytes.len().min(remaining);
            self.buf[self.pos..self.pos + to_write].copy_from_slice(&bytes[..to_write]);
            self.pos += to_write;
            Ok(())
        }
    }

    let region = ImageRegion::application();
    let flash = unsafe { region.as_slice() };

    let mut writer = BufWriter { buf, pos: 0 };
    match ImageHeader::parse(flash) {
        Ok(header) => {
            let _ = write!(
                writer,
                "Image header at 0x{:08x}:\r\n  Vector table: 0x{:08x}\r\n  Entry point:  0x{:08x}\r\n  Checksum:     0x{:08x}\r\n  Verified:     {}\r\n",
                region.base,
                header.vector_table,
                header.entry_point,
                header.checksum,
                if image::verify(flash) { "yes" } else { "no" }
            );
        }
        Err(e) => {
            let _ = write!(writer, "Image header unreadable: {}\r\n", e);
        }
    }

    writer.pos
}

#[entry]
fn main() -> ! {
    defmt::println!("Firmware started!");

    // --- Inline peripheral init (need USB access) ---
    let mut pac = unsafe { hal::pac::Peripherals::steal() };

    let mut watchdog = hal::Watchdog::new(pac.WATCHDOG);
    let Ok(clocks) = hal::clocks::init_clocks_and_plls(
        12_000_000u32,
        pac.XOSC,
        pac.CLOCKS,
        pac.PLL_SYS,
        pac.PLL_USB,
        &mut pac.RESETS,
        &mut watchdog,
    ) else {
        defmt::panic!("Clock initialization failed");
    };

    let mut timer = hal::Timer::new(pac.TIMER, &mut pac.RESETS, &clocks);
    let sio = hal::Sio::new(pac.SIO);
    let pins = hal::gpio::Pins::new(
        pac.IO_BANK0,
        pac.PADS_BANK0,
        sio.gpio_bank0,
        &mut pac.RESETS,
    );

    let mut led_pin = pins.gpio25.into_push_pull_output();

    // Blink to signal firmware alive
    dfuboot_common::blink(&mut led_pin, &mut timer, 5, 100);

    // Initialize USB
    let usb_bus = UsbBusAllocator::new(hal::usb::UsbBus::new(
        pac.USBCTRL_REGS,
        pac.USBCTRL_DPRAM,
        clocks.usb_clock,
        true,
        &mut pac.RESETS,
    ));
    let usb_bus: &'static UsbBusAllocator<UsbBus> =
        unsafe { (*core::ptr::addr_of_mut!(USB_BUS)).insert(usb_bus) };

    let mut serial = SerialPort::new(usb_bus);
    let Ok(builder) = UsbDeviceBuilder::new(usb_bus, UsbVidPid(0x2E8A, 0x000B)).strings(&[
        StringDescriptors::default()
            .manufacturer("ADNT")
            .product("dfuboot Sample Firmware")
            .serial_number("FW001"),
    ]) else {
        defmt::panic!("Invalid USB string descriptors");
    };
    let mut usb_dev = builder.device_class(usbd_serial::USB_CLASS_CDC).build();

    defmt::println!("USB CDC initialized, entering main loop");
    defmt::println!("Connect via serial terminal and type 'help' for commands");

    let mut cmd_buf = [0u8; 64];
    let mut cmd_pos = 0usize;
    let mut blink_counter = 0u32;

    loop {
        usb_dev.poll(&mut [&mut serial]);

        let mut buf = [0u8; 64];
        if let Ok(count) = serial.read(&mut buf) {
            for &byte in &buf[..count] {
                // Echo character
                let _ = serial.write(&[byte]);

                if byte == b'\r' || byte == b'\n' {
                    let _ = serial.write(b"\r\n");

                    if cmd_pos > 0 {
                        let action = match core::str::from_utf8(&cmd_buf[..cmd_pos]) {
                            Ok(line) => process_command(line, &mut serial),
                            Err(_) => Action::None,
                        };
                        cmd_pos = 0;

                        if !matches!(action, Action::None) {
                            // Flush USB before leaving
                            for _ in 0..100 {
                                usb_dev.poll(&mut [&mut serial]);
                                cortex_m::asm::delay(10_000);
                            }
                        }
                        match action {
                            Action::None => {}
                            Action::EnterBootloader => {
                                defmt::println!("Re-entering bootloader");
                                reentry::enter_bootloader();
                            }
                            Action::Reboot => reentry::reboot(),
                        }
                    }
                } else if byte == 0x7F || byte == 0x08 {
                    // Backspace
                    if cmd_pos > 0 {
                        cmd_pos -= 1;
                        let _ = serial.write(b"\x08 \x08");
                    }
                } else if cmd_pos < cmd_buf.len() {
                    cmd_buf[cmd_pos] = byte;
                    cmd_pos += 1;
                }
            }
        }

        // Slow blink LED to show activity
        blink_counter += 1;
        if blink_counter >= 500_000 {
            blink_counter = 0;
            if led_pin.is_set_high().unwrap_or(false) {
                led_pin.set_low().ok();
            } else {
                led_pin.set_high().ok();
            }
        }
    }
}
