// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Cortex-M0+ boot vector: vector table relocation, handoff and reset.

use dfuboot_common::{AppEntry, BootVector};

unsafe extern "C" {
    static __vector_table: u32;
}

macro_rules! linker_addr {
    ($sym:ident) => {
        unsafe { &$sym as *const u32 as u32 }
    };
}

const SCB_VTOR: *mut u32 = 0xE000_ED08 as *mut u32;

/// Address of the bootloader's own vector table.
pub fn bootloader_vector_table() -> u32 {
    linker_addr!(__vector_table)
}

pub struct CortexBootVector {
    _private: (),
}

impl CortexBootVector {
    /// # Safety
    /// Only one instance may exist; it owns VTOR and the handoff path.
    pub unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl BootVector for CortexBootVector {
    fn set_vector_table_base(&mut self, address: u32) {
        cortex_m::interrupt::disable();
        unsafe { SCB_VTOR.write_volatile(address) };
        cortex_m::asm::dsb();
        cortex_m::asm::isb();
    }

    unsafe fn transfer_control(&mut self, entry: AppEntry) -> ! {
        defmt::println!(
            "Jumping to application: vector table 0x{:08x}, entry 0x{:08x}",
            entry.vector_table,
            entry.entry_point
        );

        prepare_for_firmware_handoff();
        reset_clocks_to_power_on_state();

        let initial_sp = (entry.vector_table as *const u32).read_volatile();
        jump_to_firmware(initial_sp, entry.entry_point);
    }

    fn system_reset(&mut self) -> ! {
        defmt::println!("System reset");
        cortex_m::peripheral::SCB::sys_reset();
    }
}

/// Mask and clear every NVIC interrupt and stop SysTick.
pub unsafe fn prepare_for_firmware_handoff() {
    cortex_m::interrupt::disable();

    // Clear all pending interrupts in NVIC
    const NVIC_ICPR: *mut u32 = 0xE000_E280 as *mut u32;
    NVIC_ICPR.write_volatile(0xFFFF_FFFF);

    // Disable all NVIC interrupts
    const NVIC_ICER: *mut u32 = 0xE000_E180 as *mut u32;
    NVIC_ICER.write_volatile(0xFFFF_FFFF);

    const SYST_CSR: *mut u32 = 0xE000_E010 as *mut u32;
    SYST_CSR.write_volatile(0);

    // Clear a SysTick that fired before it was stopped
    const SCB_ICSR: *mut u32 = 0xE000_ED04 as *mut u32;
    const ICSR_PENDSTCLR: u32 = 1 << 25;
    SCB_ICSR.write_volatile(ICSR_PENDSTCLR);
}

/// Reset clocks to power-on reset state:
/// - clk_sys runs from clk_ref
/// - clk_ref runs from ROSC
/// - XOSC disabled
/// - PLLs in reset
/// - Watchdog tick disabled
pub unsafe fn reset_clocks_to_power_on_state() {
    const CLOCKS_BASE: u32 = 0x4000_8000;
    const CLK_REF_CTRL: *mut u32 = (CLOCKS_BASE + 0x30) as *mut u32;
    const CLK_REF_SELECTED: *const u32 = (CLOCKS_BASE + 0x38) as *const u32;
    const CLK_SYS_CTRL: *mut u32 = (CLOCKS_BASE + 0x3C) as *mut u32;
    const CLK_SYS_SELECTED: *const u32 = (CLOCKS_BASE + 0x44) as *const u32;

    const XOSC_BASE: u32 = 0x4002_4000;
    const XOSC_CTRL: *mut u32 = XOSC_BASE as *mut u32;

    const RESETS_BASE: u32 = 0x4000_C000;
    const RESETS_RESET: *mut u32 = RESETS_BASE as *mut u32;

    const WATCHDOG_BASE: u32 = 0x4005_8000;
    const WATCHDOG_TICK: *mut u32 = (WATCHDOG_BASE + 0x2C) as *mut u32;

    const PLL_SYS_RESET_BIT: u32 = 1 << 12;
    const PLL_USB_RESET_BIT: u32 = 1 << 13;

    // clk_sys <- clk_ref
    let ctrl = CLK_SYS_CTRL.read_volatile();
    CLK_SYS_CTRL.write_volatile(ctrl & !0x1);
    while CLK_SYS_SELECTED.read_volatile() != 0x1 {
        core::hint::spin_loop();
    }

    // clk_ref <- ROSC
    let ctrl = CLK_REF_CTRL.read_volatile();
    CLK_REF_CTRL.write_volatile(ctrl & !0x3);
    while CLK_REF_SELECTED.read_volatile() != 0x1 {
        core::hint::spin_loop();
    }

    const XOSC_CTRL_DISABLE: u32 = 0xD1E << 12;
    let ctrl = XOSC_CTRL.read_volatile();
    XOSC_CTRL.write_volatile((ctrl & !0x00FFF000) | XOSC_CTRL_DISABLE);

    let reset = RESETS_RESET.read_volatile();
    RESETS_RESET.write_volatile(reset | PLL_SYS_RESET_BIT | PLL_USB_RESET_BIT);

    WATCHDOG_TICK.write_volatile(0);

    cortex_m::asm::dsb();
    cortex_m::asm::isb();
}

unsafe fn jump_to_firmware(initial_sp: u32, reset_vector: u32) -> ! {
    core::arch::asm!(
        "msr msp, {sp}",
        "cpsie i",  // Application expects PRIMASK=0
        "bx {reset}",
        sp = in(reg) initial_sp,
        reset = in(reg) reset_vector,
        options(noreturn)
    );
}
