// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Re-entry into the bootloader from a running application.
//!
//! The application calls through the pointer stored at the rendezvous word
//! (`dfuboot_common::layout::REENTRY_RENDEZVOUS_ADDR`). Nothing the
//! application left in RAM, in the core or in the clock tree is trusted:
//! the stack is reset, `.data`/`.bss` are initialized again from flash,
//! interrupts and SysTick are quiesced, clocks go back to their power-on
//! sources and the peripherals the bootloader drives are reset before
//! normal initialization runs.

use dfuboot_common::reentry::ReentryFn;

use crate::boot;

#[link_section = ".reentry"]
#[used]
pub static REENTRY_VECTOR: ReentryFn = reentry_trampoline;

unsafe extern "C" {
    static __vector_table: u32;
    static mut __sdata: u32;
    static mut __edata: u32;
    static __sidata: u32;
    static mut __sbss: u32;
    static mut __ebss: u32;
}

const SCB_VTOR: *mut u32 = 0xE000_ED08 as *mut u32;

/// Restore the bootloader's vector table and stack, then continue in
/// [`reentry_main`]. Touches no RAM.
unsafe extern "C" fn reentry_trampoline() -> ! {
    cortex_m::interrupt::disable();

    let vector_table = core::ptr::addr_of!(__vector_table);
    SCB_VTOR.write_volatile(vector_table as u32);
    cortex_m::asm::dsb();
    cortex_m::asm::isb();

    let initial_sp = vector_table.read_volatile();
    core::arch::asm!(
        "msr msp, {sp}",
        "bl {main}",
        sp = in(reg) initial_sp,
        main = sym reentry_main,
        options(noreturn)
    );
}

unsafe extern "C" fn reentry_main() -> ! {
    sanitize_ram();
    boot::prepare_for_firmware_handoff();
    boot::reset_clocks_to_power_on_state();
    reset_peripherals();

    defmt::println!("Re-entered bootloader from application");
    crate::bootloader_main()
}

/// Run the same `.data` copy and `.bss` zeroing the reset handler does.
#[inline(always)]
unsafe fn sanitize_ram() {
    let sdata = core::ptr::addr_of_mut!(__sdata);
    let edata = core::ptr::addr_of_mut!(__edata);
    let sidata = core::ptr::addr_of!(__sidata);
    let data_words = edata.offset_from(sdata) as usize;
    for i in 0..data_words {
        sdata.add(i).write_volatile(sidata.add(i).read_volatile());
    }

    let sbss = core::ptr::addr_of_mut!(__sbss);
    let ebss = core::ptr::addr_of_mut!(__ebss);
    let bss_words = ebss.offset_from(sbss) as usize;
    for i in 0..bss_words {
        sbss.add(i).write_volatile(0);
    }

    cortex_m::asm::dsb();
}

/// Put the peripherals the application may have left running into reset.
/// USB going into reset drops the D+ pull-up, so the host sees a detach.
unsafe fn reset_peripherals() {
    const RESETS_RESET: *mut u32 = 0x4000_C000 as *mut u32;
    const IO_BANK0: u32 = 1 << 5;
    const PADS_BANK0: u32 = 1 << 8;
    const TIMER: u32 = 1 << 21;
    const USBCTRL: u32 = 1 << 24;

    let reset = RESETS_RESET.read_volatile();
    RESETS_RESET.write_volatile(reset | IO_BANK0 | PADS_BANK0 | TIMER | USBCTRL);

    // Hold the detach long enough for the host to notice (clk_sys on ROSC).
    cortex_m::asm::delay(600_000);
}
