// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Block-buffered flash programming.
//!
//! The engine is generic over the flash peripheral and the watchdog so the
//! same sequencing runs on the device and against simulated flash in tests.

use core::fmt;

/// Largest program unit any supported flash may declare.
pub const MAX_PROGRAM_SIZE: usize = 256;

/// Failure reported by a flash primitive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlashError {
    /// Flash could not be unlocked for writing.
    Locked,
    /// A page did not read back as erased.
    Erase,
    /// Programming was rejected by the peripheral.
    Program,
    /// Programmed data did not read back.
    Verify,
}

impl fmt::Display for FlashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlashError::Locked => write!(f, "flash is locked"),
            FlashError::Erase => write!(f, "page erase failed"),
            FlashError::Program => write!(f, "program operation failed"),
            FlashError::Verify => write!(f, "programmed data did not verify"),
        }
    }
}

/// Erase and program primitives of a flash peripheral.
pub trait FlashFacility {
    /// Erase granularity in bytes.
    const ERASE_SIZE: u32;
    /// Smallest unit the hardware programs atomically, in bytes.
    const PROGRAM_SIZE: u32;

    /// Open a write scope.
    fn unlock(&mut self) -> Result<(), FlashError> {
        Ok(())
    }

    /// Close the write scope opened by [`FlashFacility::unlock`].
    fn lock(&mut self) {}

    /// Erase the page containing `address`.
    fn erase_page(&mut self, address: u32) -> Result<(), FlashError>;

    /// Program `bytes` at `address`.
    ///
    /// `address` is aligned to and `bytes.len()` equals [`FlashFacility::PROGRAM_SIZE`].
    fn program(&mut self, address: u32, bytes: &[u8]) -> Result<(), FlashError>;
}

/// The hardware watchdog.
pub trait Watchdog {
    /// Re-arm the countdown.
    fn reset_countdown(&mut self);
}

/// Erase-then-write one transfer block.
///
/// Every erase unit whose first byte lies inside the block is erased before
/// programming. When erase units are no larger than a block this is the page
/// containing `dest` and any that follow it within the block; when they are
/// larger, the unit is erased by the first block that lands in it, so blocks
/// must arrive in ascending order. Data sharing an erased unit is lost.
///
/// A block that does not start an erase unit is never erased, including when
/// the host sends it again: new data is programmed over what is already there
/// and only the image checksum at the next boot reveals the damage.
///
/// The watchdog is re-armed after every erase and every program unit.
pub fn write_block<F, W>(
    flash: &mut F,
    watchdog: &mut W,
    dest: u32,
    bytes: &[u8],
) -> Result<(), FlashError>
where
    F: FlashFacility,
    W: Watchdog,
{
    flash.unlock()?;
    let result = erase_and_program(flash, watchdog, dest, bytes);
    flash.lock();
    result
}

fn erase_and_program<F, W>(
    flash: &mut F,
    watchdog: &mut W,
    dest: u32,
    bytes: &[u8],
) -> Result<(), FlashError>
where
    F: FlashFacility,
    W: Watchdog,
{
    let end = dest + bytes.len() as u32;
    let mut page = dest.next_multiple_of(F::ERASE_SIZE);
    while page < end {
        flash.erase_page(page)?;
        watchdog.reset_countdown();
        page += F::ERASE_SIZE;
    }

    let unit = F::PROGRAM_SIZE as usize;
    let mut addr = dest;
    for chunk in bytes.chunks(unit) {
        if chunk.len() == unit {
            flash.program(addr, chunk)?;
        } else {
            let mut padded = [crate::image::ERASED_BYTE; MAX_PROGRAM_SIZE];
            padded[..chunk.len()].copy_from_slice(chunk);
            flash.program(addr, &padded[..unit])?;
        }
        watchdog.reset_countdown();
        addr += unit as u32;
    }

    Ok(())
}
