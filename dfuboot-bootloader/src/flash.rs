// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Flash erase/program facility using RP2040 ROM routines.
//!
//! On RP2040, flash operations (erase/program) require disabling XIP first.
//! The full sequence is:
//!   1. connect_internal_flash()
//!   2. flash_exit_xip()
//!   3. flash_range_erase() or flash_range_program()
//!   4. flash_flush_cache()
//!   5. flash_enter_cmd_xip()
//!
//! All code executing during steps 1-5 must run from RAM, not flash.
//! The two sequences live in `.data`, and the ROM function pointers are
//! resolved into a [`RomRoutines`] value held on the stack, so nothing
//! during the sequence touches XIP flash.

use dfuboot_common::layout::{
    APP_ADDRESS, DEVICE_FLASH_SIZE, FLASH_BASE, FLASH_PAGE_SIZE, FLASH_SECTOR_SIZE,
};
use dfuboot_common::{FlashError, FlashFacility};

// ROM function pointer types
type RomFnVoid = unsafe extern "C" fn();
type RomFnErase = unsafe extern "C" fn(u32, usize, u32, u8);
type RomFnProgram = unsafe extern "C" fn(u32, *const u8, usize);

/// Sector erase command passed to `flash_range_erase`.
const SECTOR_ERASE_CMD: u8 = 0x20;

/// Look up a ROM function by its two-character tag.
/// ROM table pointer at 0x14 and lookup function at 0x18 are 16-bit halfword pointers.
unsafe fn rom_func_lookup(tag: &[u8; 2]) -> usize {
    let fn_table = *(0x14 as *const u16) as *const u16;
    let lookup: unsafe extern "C" fn(*const u16, u32) -> usize =
        core::mem::transmute::<usize, unsafe extern "C" fn(*const u16, u32) -> usize>(
            *(0x18 as *const u16) as usize,
        );
    let code = u16::from_le_bytes(*tag) as u32;
    lookup(fn_table, code)
}

#[derive(Clone, Copy)]
struct RomRoutines {
    connect_internal_flash: RomFnVoid,
    exit_xip: RomFnVoid,
    range_erase: RomFnErase,
    range_program: RomFnProgram,
    flush_cache: RomFnVoid,
    enter_cmd_xip: RomFnVoid,
}

impl RomRoutines {
    /// Resolve every routine. Requires XIP to be active.
    unsafe fn lookup() -> Option<Self> {
        macro_rules! resolve {
            ($tag:literal, $ty:ty) => {{
                let addr = rom_func_lookup($tag);
                if addr == 0 {
                    return None;
                }
                core::mem::transmute::<usize, $ty>(addr)
            }};
        }

        Some(Self {
            connect_internal_flash: resolve!(b"IF", RomFnVoid),
            exit_xip: resolve!(b"EX", RomFnVoid),
            range_erase: resolve!(b"RE", RomFnErase),
            range_program: resolve!(b"RP", RomFnProgram),
            flush_cache: resolve!(b"FC", RomFnVoid),
            enter_cmd_xip: resolve!(b"CX", RomFnVoid),
        })
    }
}

#[link_section = ".data"]
#[inline(never)]
unsafe fn ram_erase(rom: &RomRoutines, offset: u32, size: u32) {
    cortex_m::interrupt::disable();
    (rom.connect_internal_flash)();
    (rom.exit_xip)();
    (rom.range_erase)(offset, size as usize, FLASH_SECTOR_SIZE, SECTOR_ERASE_CMD);
    (rom.flush_cache)();
    (rom.enter_cmd_xip)();
    cortex_m::interrupt::enable();
}

#[link_section = ".data"]
#[inline(never)]
unsafe fn ram_program(rom: &RomRoutines, offset: u32, data: *const u8, len: usize) {
    cortex_m::interrupt::disable();
    (rom.connect_internal_flash)();
    (rom.exit_xip)();
    (rom.range_program)(offset, data, len);
    (rom.flush_cache)();
    (rom.enter_cmd_xip)();
    cortex_m::interrupt::enable();
}

/// Convert an absolute XIP flash address to a flash-relative offset.
fn addr_to_offset(abs_addr: u32) -> u32 {
    abs_addr - FLASH_BASE
}

/// Only the application region is writable.
fn check_writable(address: u32, len: u32) -> Result<(), FlashError> {
    let end = address.checked_add(len).ok_or(FlashError::Locked)?;
    if address < APP_ADDRESS || end > FLASH_BASE + DEVICE_FLASH_SIZE {
        return Err(FlashError::Locked);
    }
    Ok(())
}

fn read_back_equals(address: u32, expected: impl Iterator<Item = u8>) -> bool {
    expected
        .enumerate()
        .all(|(i, b)| unsafe { ((address + i as u32) as *const u8).read_volatile() } == b)
}

/// QSPI flash behind the boot ROM.
pub struct RomFlash {
    rom: Option<RomRoutines>,
}

impl RomFlash {
    pub fn new() -> Self {
        let rom = unsafe { RomRoutines::lookup() };
        if rom.is_none() {
            defmt::println!("ROM flash routines not found, flash is write-protected");
        }
        Self { rom }
    }

    fn routines(&self) -> Result<&RomRoutines, FlashError> {
        self.rom.as_ref().ok_or(FlashError::Locked)
    }
}

impl FlashFacility for RomFlash {
    const ERASE_SIZE: u32 = FLASH_SECTOR_SIZE;
    const PROGRAM_SIZE: u32 = FLASH_PAGE_SIZE;

    fn unlock(&mut self) -> Result<(), FlashError> {
        self.routines().map(|_| ())
    }

    fn erase_page(&mut self, address: u32) -> Result<(), FlashError> {
        let sector = address - address % FLASH_SECTOR_SIZE;
        check_writable(sector, FLASH_SECTOR_SIZE)?;
        let rom = self.routines()?;

        unsafe { ram_erase(rom, addr_to_offset(sector), FLASH_SECTOR_SIZE) };

        if read_back_equals(sector, core::iter::repeat(0xFF).take(FLASH_SECTOR_SIZE as usize)) {
            Ok(())
        } else {
            Err(FlashError::Erase)
        }
    }

    fn program(&mut self, address: u32, bytes: &[u8]) -> Result<(), FlashError> {
        check_writable(address, bytes.len() as u32)?;
        let rom = self.routines()?;

        unsafe { ram_program(rom, addr_to_offset(address), bytes.as_ptr(), bytes.len()) };

        if read_back_equals(address, bytes.iter().copied()) {
            Ok(())
        } else {
            Err(FlashError::Verify)
        }
    }
}
