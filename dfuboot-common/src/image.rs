// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Firmware image layout and integrity check.
//!
//! An application image starts with a three-word header:
//!
//! | Offset | Field                                   |
//! |--------|-----------------------------------------|
//! | 0      | address of the application vector table |
//! | 4      | application entry point                 |
//! | 8      | checksum of the whole image             |
//!
//! The checksum covers every word of the image, with the checksum field
//! itself read as zero. The same procedure is used on the device to verify
//! an image and by the host tool to patch the field before flashing.

use core::fmt;

use crate::checksum::{Checksum, WORD_SIZE};

/// Value of a neutralized checksum field.
const NEUTRAL_CHECKSUM: u32 = 0;

/// Erased flash byte.
pub const ERASED_BYTE: u8 = 0xFF;

/// Parsed image header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ImageHeader {
    pub vector_table: u32,
    pub entry_point: u32,
    pub checksum: u32,
}

impl ImageHeader {
    pub const VECTOR_TABLE_OFFSET: usize = 0;
    pub const ENTRY_POINT_OFFSET: usize = 4;
    pub const CHECKSUM_OFFSET: usize = 8;
    pub const LEN: usize = 12;

    /// Read the header from the start of an image.
    pub fn parse(image: &[u8]) -> Result<Self, ImageError> {
        if image.len() < Self::LEN {
            return Err(ImageError::TooShort { len: image.len() });
        }
        Ok(Self {
            vector_table: read_word(image, Self::VECTOR_TABLE_OFFSET),
            entry_point: read_word(image, Self::ENTRY_POINT_OFFSET),
            checksum: read_word(image, Self::CHECKSUM_OFFSET),
        })
    }

    /// Handoff target described by this header.
    pub fn entry(&self) -> AppEntry {
        AppEntry {
            vector_table: self.vector_table,
            entry_point: self.entry_point,
        }
    }
}

/// Where control goes when the application is started.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AppEntry {
    pub vector_table: u32,
    pub entry_point: u32,
}

/// Reasons an image cannot be checksummed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ImageError {
    /// Image is shorter than its header.
    TooShort { len: usize },
    /// Image length is not a whole number of words.
    Unaligned { len: usize },
}

impl fmt::Display for ImageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageError::TooShort { len } => {
                write!(f, "image of {len} bytes is shorter than its {}-byte header", ImageHeader::LEN)
            }
            ImageError::Unaligned { len } => {
                write!(f, "image length {len} is not a multiple of {WORD_SIZE} bytes")
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ImageError {}

fn read_word(image: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        image[offset],
        image[offset + 1],
        image[offset + 2],
        image[offset + 3],
    ])
}

/// Compute the checksum of an image with its checksum field neutralized.
///
/// Words are fed in image order: the two header words, a zero word standing
/// in for the checksum field, then the remainder of the image.
pub fn image_checksum(image: &[u8]) -> Result<u32, ImageError> {
    if image.len() < ImageHeader::LEN {
        return Err(ImageError::TooShort { len: image.len() });
    }
    if image.len() % WORD_SIZE != 0 {
        return Err(ImageError::Unaligned { len: image.len() });
    }

    let unaligned = |_| ImageError::Unaligned { len: image.len() };
    let mut crc = Checksum::new();
    crc.update_words(&image[..ImageHeader::CHECKSUM_OFFSET]).map_err(unaligned)?;
    crc.update_word(NEUTRAL_CHECKSUM);
    crc.update_words(&image[ImageHeader::LEN..]).map_err(unaligned)?;
    Ok(crc.finalize())
}

/// Check that the checksum baked into an image matches its contents.
///
/// Never fails loudly: an image that cannot be checksummed is invalid.
pub fn verify(image: &[u8]) -> bool {
    let Ok(header) = ImageHeader::parse(image) else {
        return false;
    };
    match image_checksum(image) {
        Ok(computed) => computed == header.checksum,
        Err(_) => false,
    }
}

/// Compute the image checksum and store it in the checksum field.
pub fn patch(image: &mut [u8]) -> Result<u32, ImageError> {
    let crc = image_checksum(image)?;
    image[ImageHeader::CHECKSUM_OFFSET..ImageHeader::LEN].copy_from_slice(&crc.to_le_bytes());
    Ok(crc)
}
