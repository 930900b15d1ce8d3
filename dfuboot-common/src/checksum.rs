// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Image checksum engine.
//!
//! CRC-32 with polynomial 0x04C11DB7, initial value 0xFFFFFFFF, no input or
//! output reflection and no final XOR (catalogued as CRC-32/MPEG-2, a member
//! of the BZIP2 family). This is *not* the common reflected CRC-32.
//!
//! Firmware images are checksummed as a stream of 32-bit words, each fed
//! most-significant byte first. This is the order in which a word-wide
//! hardware CRC unit consumes little-endian memory.

use crc::{Crc, Digest, CRC_32_MPEG_2};

pub static CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_MPEG_2);

/// Size of a checksummed word in bytes.
pub const WORD_SIZE: usize = 4;

/// Word-stream input whose length is not a multiple of [`WORD_SIZE`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UnalignedLength(pub usize);

/// One-shot checksum of a byte sequence.
pub fn checksum(bytes: &[u8]) -> u32 {
    CRC32.checksum(bytes)
}

/// Incremental checksum accumulator.
///
/// Input may be fed in any number of non-contiguous chunks; the result only
/// depends on the concatenation of everything fed since the last reset.
pub struct Checksum {
    digest: Digest<'static, u32>,
}

impl Checksum {
    pub fn new() -> Self {
        Self {
            digest: CRC32.digest(),
        }
    }

    /// Discard all accumulated input.
    pub fn reset(&mut self) {
        self.digest = CRC32.digest();
    }

    /// Feed raw bytes in order.
    pub fn update(&mut self, bytes: &[u8]) {
        self.digest.update(bytes);
    }

    /// Feed one 32-bit word, most-significant byte first.
    pub fn update_word(&mut self, word: u32) {
        self.digest.update(&word.to_be_bytes());
    }

    /// Feed a run of little-endian words from memory.
    ///
    /// Nothing is fed unless `bytes.len()` is a multiple of [`WORD_SIZE`].
    pub fn update_words(&mut self, bytes: &[u8]) -> Result<(), UnalignedLength> {
        if bytes.len() % WORD_SIZE != 0 {
            return Err(UnalignedLength(bytes.len()));
        }
        for word in bytes.chunks_exact(WORD_SIZE) {
            self.digest.update(&[word[3], word[2], word[1], word[0]]);
        }
        Ok(())
    }

    pub fn finalize(self) -> u32 {
        self.digest.finalize()
    }
}

impl Default for Checksum {
    fn default() -> Self {
        Self::new()
    }
}
