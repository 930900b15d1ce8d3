// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Simulated flash and watchdog shared by the integration tests.

#![allow(dead_code)]

use dfuboot_common::flash::{FlashError, FlashFacility, Watchdog};

/// Everything the simulated hardware was asked to do, in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Op {
    Unlock,
    Lock,
    Erase(u32),
    Program(u32, usize),
}

/// RAM-backed flash with 1 KiB erase pages and half-word programming.
pub struct SimFlash {
    pub base: u32,
    pub memory: Vec<u8>,
    pub ops: Vec<Op>,
    pub fail_erase: bool,
    pub fail_program: bool,
}

impl SimFlash {
    pub fn new(base: u32, size: usize) -> Self {
        Self {
            base,
            memory: vec![0xFF; size],
            ops: Vec::new(),
            fail_erase: false,
            fail_program: false,
        }
    }

    pub fn read(&self, address: u32, len: usize) -> &[u8] {
        let offset = (address - self.base) as usize;
        &self.memory[offset..offset + len]
    }

    pub fn erases(&self) -> Vec<u32> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::Erase(addr) => Some(*addr),
                _ => None,
            })
            .collect()
    }

    pub fn programs(&self) -> usize {
        self.ops.iter().filter(|op| matches!(op, Op::Program(..))).count()
    }
}

impl FlashFacility for SimFlash {
    const ERASE_SIZE: u32 = 1024;
    const PROGRAM_SIZE: u32 = 2;

    fn unlock(&mut self) -> Result<(), FlashError> {
        self.ops.push(Op::Unlock);
        Ok(())
    }

    fn lock(&mut self) {
        self.ops.push(Op::Lock);
    }

    fn erase_page(&mut self, address: u32) -> Result<(), FlashError> {
        if self.fail_erase {
            return Err(FlashError::Erase);
        }
        let page = address - address % Self::ERASE_SIZE;
        self.ops.push(Op::Erase(page));
        let offset = (page - self.base) as usize;
        self.memory[offset..offset + Self::ERASE_SIZE as usize].fill(0xFF);
        Ok(())
    }

    fn program(&mut self, address: u32, bytes: &[u8]) -> Result<(), FlashError> {
        if self.fail_program {
            return Err(FlashError::Program);
        }
        assert_eq!(address % Self::PROGRAM_SIZE, 0, "unaligned program");
        assert_eq!(bytes.len(), Self::PROGRAM_SIZE as usize, "partial program unit");
        self.ops.push(Op::Program(address, bytes.len()));
        let offset = (address - self.base) as usize;
        let target = &mut self.memory[offset..offset + bytes.len()];
        // NOR flash can only clear bits.
        for (cell, byte) in target.iter_mut().zip(bytes) {
            *cell &= *byte;
        }
        Ok(())
    }
}

/// Flash with a sector larger than a transfer block, like QSPI NOR.
pub struct SectorFlash {
    pub inner: SimFlash,
}

impl FlashFacility for SectorFlash {
    const ERASE_SIZE: u32 = 4096;
    const PROGRAM_SIZE: u32 = 256;

    fn erase_page(&mut self, address: u32) -> Result<(), FlashError> {
        let page = address - address % Self::ERASE_SIZE;
        self.inner.ops.push(Op::Erase(page));
        let offset = (page - self.inner.base) as usize;
        self.inner.memory[offset..offset + Self::ERASE_SIZE as usize].fill(0xFF);
        Ok(())
    }

    fn program(&mut self, address: u32, bytes: &[u8]) -> Result<(), FlashError> {
        assert_eq!(bytes.len(), Self::PROGRAM_SIZE as usize, "partial program unit");
        self.inner.ops.push(Op::Program(address, bytes.len()));
        let offset = (address - self.inner.base) as usize;
        for (cell, byte) in self.inner.memory[offset..offset + bytes.len()].iter_mut().zip(bytes) {
            *cell &= *byte;
        }
        Ok(())
    }
}

/// Watchdog that counts how often it was fed.
#[derive(Default)]
pub struct CountingWatchdog {
    pub feeds: usize,
}

impl Watchdog for CountingWatchdog {
    fn reset_countdown(&mut self) {
        self.feeds += 1;
    }
}
