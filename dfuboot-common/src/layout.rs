// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Flash memory map shared by the bootloader, the application and host tools.

// --- Flash layout constants ---

pub const FLASH_BASE: u32 = 0x1000_0000;
pub const DEVICE_FLASH_SIZE: u32 = 2 * 1024 * 1024; // 2MB QSPI flash

/// Space reserved for boot2, the bootloader and the re-entry rendezvous.
pub const BOOTLOADER_RESERVED_SIZE: u32 = 64 * 1024;

pub const APP_ADDRESS: u32 = FLASH_BASE + BOOTLOADER_RESERVED_SIZE;
pub const IMAGE_SIZE: u32 = DEVICE_FLASH_SIZE - BOOTLOADER_RESERVED_SIZE;

/// Last word of the bootloader region, holding the re-entry function pointer.
pub const REENTRY_RENDEZVOUS_ADDR: u32 = APP_ADDRESS - 4;

pub const FLASH_SECTOR_SIZE: u32 = 4096;
pub const FLASH_PAGE_SIZE: u32 = 256;

/// DFU `wTransferSize`: one block per DNLOAD request.
///
/// Bounded by the 256-byte control buffer of the USB device stack.
pub const TRANSFER_BLOCK_SIZE: usize = 256;

const _: () = assert!(IMAGE_SIZE % 4 == 0);
const _: () = assert!(APP_ADDRESS % FLASH_SECTOR_SIZE == 0);
const _: () = assert!(FLASH_SECTOR_SIZE as usize % TRANSFER_BLOCK_SIZE == 0);

/// A contiguous region of flash that receives a firmware image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageRegion {
    pub base: u32,
    pub size: u32,
}

impl ImageRegion {
    /// The application region of the device.
    pub const fn application() -> Self {
        Self {
            base: APP_ADDRESS,
            size: IMAGE_SIZE,
        }
    }

    pub const fn end(&self) -> u32 {
        self.base + self.size
    }

    /// Destination address of a DFU block, or `None` if any part of a
    /// `len`-byte block would fall outside the region.
    pub fn block_address(&self, block_number: u16, block_size: usize, len: usize) -> Option<u32> {
        let offset = u32::from(block_number).checked_mul(block_size as u32)?;
        let end = offset.checked_add(len as u32)?;
        if end > self.size {
            return None;
        }
        Some(self.base + offset)
    }

    /// View the region as a byte slice.
    ///
    /// # Safety
    /// The region must be mapped, readable memory (e.g. XIP flash) for the
    /// lifetime of the returned slice.
    pub unsafe fn as_slice(&self) -> &'static [u8] {
        core::slice::from_raw_parts(self.base as *const u8, self.size as usize)
    }
}
