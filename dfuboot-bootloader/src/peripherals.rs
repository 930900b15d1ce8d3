// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Peripheral initialization for the bootloader.

use core::mem::MaybeUninit;

use dfuboot_common::LedPin;
use embedded_hal::digital::InputPin;
use rp2040_hal as hal;
use rp2040_hal::usb::UsbBus;
use usb_device::class_prelude::UsbBusAllocator;

/// Force-bootloader input: held low to stay in update mode.
pub type ForcePin =
    hal::gpio::Pin<hal::gpio::bank0::Gpio2, hal::gpio::FunctionSioInput, hal::gpio::PullUp>;

const XOSC_FREQ_HZ: u32 = 12_000_000;

/// Static storage for UsbBusAllocator (required by usb-device for 'static lifetime).
///
/// Written exactly once per bootloader entry; the previous contents are
/// never read or dropped.
static mut USB_BUS: MaybeUninit<UsbBusAllocator<UsbBus>> = MaybeUninit::uninit();

pub fn store_usb_bus(bus: UsbBusAllocator<UsbBus>) -> &'static UsbBusAllocator<UsbBus> {
    unsafe { (*core::ptr::addr_of_mut!(USB_BUS)).write(bus) }
}

pub struct Peripherals {
    pub led_pin: LedPin,
    pub force_pin: ForcePin,
    pub timer: hal::Timer,
    pub watchdog: hal::Watchdog,
    pub usb: UsbPeripherals,
}

pub struct UsbPeripherals {
    pub regs: hal::pac::USBCTRL_REGS,
    pub dpram: hal::pac::USBCTRL_DPRAM,
    pub clock: hal::clocks::UsbClock,
    pub resets: hal::pac::RESETS,
}

impl Peripherals {
    /// Sample the force-bootloader signal.
    pub fn force_bootloader(&mut self) -> bool {
        self.force_pin.is_low().unwrap_or(false)
    }
}

pub fn init() -> Peripherals {
    let mut pac = unsafe { hal::pac::Peripherals::steal() };

    let mut watchdog = hal::Watchdog::new(pac.WATCHDOG);
    // The application may have left its countdown armed before re-entry.
    watchdog.disable();
    let Ok(clocks) = hal::clocks::init_clocks_and_plls(
        XOSC_FREQ_HZ,
        pac.XOSC,
        pac.CLOCKS,
        pac.PLL_SYS,
        pac.PLL_USB,
        &mut pac.RESETS,
        &mut watchdog,
    ) else {
        defmt::panic!("Clock initialization failed");
    };

    let timer = hal::Timer::new(pac.TIMER, &mut pac.RESETS, &clocks);
    let sio = hal::Sio::new(pac.SIO);
    let pins = hal::gpio::Pins::new(
        pac.IO_BANK0,
        pac.PADS_BANK0,
        sio.gpio_bank0,
        &mut pac.RESETS,
    );

    Peripherals {
        led_pin: pins.gpio25.into_push_pull_output(),
        force_pin: pins.gpio2.into_pull_up_input(),
        timer,
        watchdog,
        usb: UsbPeripherals {
            regs: pac.USBCTRL_REGS,
            dpram: pac.USBCTRL_DPRAM,
            clock: clocks.usb_clock,
            resets: pac.RESETS,
        },
    }
}
