// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! DFU control-request state machine.
//!
//! [`BootloaderContext`] owns the whole update session: the protocol state,
//! the last status code and the single-block transfer buffer. It is handed
//! each class request addressed to the DFU interface and answers with a
//! [`Reply`]. Flash writes are deferred to the completion of the following
//! GETSTATUS request, which the USB glue runs through
//! [`BootloaderContext::complete`] once the status reply has been queued.
//!
//! No state survives a reset: the context is constructed zeroed on every
//! bootloader entry.

use heapless::Vec;

use crate::flash::{self, FlashError, FlashFacility, Watchdog};
use crate::layout::{ImageRegion, TRANSFER_BLOCK_SIZE};

/// `bmRequestType` of DFU requests with the direction bit masked off:
/// class request addressed to an interface.
pub const DFU_REQUEST_TYPE: u8 = 0x21;
const DIRECTION_MASK: u8 = 0x7F;
const DIRECTION_IN: u8 = 0x80;

/// Poll timeout reported while a block is waiting to be written, in milliseconds.
pub const DOWNLOAD_POLL_TIMEOUT_MS: u32 = 100;

/// Length of a GETSTATUS reply.
pub const STATUS_LEN: usize = 6;

/// DFU class request codes.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DfuRequest {
    Detach = 0,
    Download = 1,
    Upload = 2,
    GetStatus = 3,
    ClearStatus = 4,
    GetState = 5,
    Abort = 6,
}

impl DfuRequest {
    /// Whether the request carries its data stage from device to host.
    pub fn is_device_to_host(self) -> bool {
        matches!(self, Self::Upload | Self::GetStatus | Self::GetState)
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Detach),
            1 => Some(Self::Download),
            2 => Some(Self::Upload),
            3 => Some(Self::GetStatus),
            4 => Some(Self::ClearStatus),
            5 => Some(Self::GetState),
            6 => Some(Self::Abort),
            _ => None,
        }
    }
}

/// Protocol state, numbered as in the DFU 1.1 class specification.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DfuState {
    Idle = 2,
    DownloadSync = 3,
    DownloadBusy = 4,
    DownloadIdle = 5,
    ManifestSync = 6,
    Manifest = 7,
    Error = 10,
}

/// Status code reported by GETSTATUS.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DfuStatus {
    Ok = 0x00,
    ErrWrite = 0x03,
    ErrErase = 0x04,
    ErrProgram = 0x06,
    ErrVerify = 0x07,
    ErrAddress = 0x08,
}

impl From<FlashError> for DfuStatus {
    fn from(e: FlashError) -> Self {
        match e {
            FlashError::Locked => DfuStatus::ErrWrite,
            FlashError::Erase => DfuStatus::ErrErase,
            FlashError::Program => DfuStatus::ErrProgram,
            FlashError::Verify => DfuStatus::ErrVerify,
        }
    }
}

/// Setup stage of a control request, as delivered by the USB stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SetupPacket {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub length: u16,
}

/// Payload of a GETSTATUS reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusReport {
    pub status: DfuStatus,
    /// 24-bit hint for how long the host should wait before polling again.
    pub poll_timeout_ms: u32,
    pub state: DfuState,
}

impl StatusReport {
    pub fn to_bytes(&self) -> [u8; STATUS_LEN] {
        let timeout = self.poll_timeout_ms.to_le_bytes();
        [
            self.status as u8,
            timeout[0],
            timeout[1],
            timeout[2],
            self.state as u8,
            0, // iString
        ]
    }
}

/// Work to run once a reply has been handed to the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Completion {
    GetStatus,
}

/// Answer to a control request.
#[derive(Debug, PartialEq, Eq)]
pub enum Reply {
    /// Not handled; the USB stack stalls the request.
    Rejected,
    /// Handled with no data stage back to the host.
    Accepted,
    /// Handled; send `data` to the host, then run `completion`.
    Data {
        data: Vec<u8, STATUS_LEN>,
        completion: Option<Completion>,
    },
}

/// Result of running a [`Completion`].
#[must_use]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Completed {
    /// Nothing was pending.
    Idle,
    /// A block was written to flash.
    Programmed { address: u32, len: usize },
    /// Writing a block failed; the context is now in [`DfuState::Error`].
    Failed(DfuStatus),
    /// Transfer complete: the caller must reset the system now.
    ResetRequested,
}

/// The block received by the last DNLOAD request, waiting to be flashed.
pub struct TransferSession {
    buffer: [u8; TRANSFER_BLOCK_SIZE],
    length: usize,
    block_number: u16,
}

impl TransferSession {
    pub const fn zeroed() -> Self {
        Self {
            buffer: [0; TRANSFER_BLOCK_SIZE],
            length: 0,
            block_number: 0,
        }
    }

    pub fn clear(&mut self) {
        self.buffer.fill(0);
        self.length = 0;
        self.block_number = 0;
    }

    pub fn buffer(&self) -> &[u8; TRANSFER_BLOCK_SIZE] {
        &self.buffer
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn block_number(&self) -> u16 {
        self.block_number
    }

    /// Valid bytes of the pending block.
    pub fn pending(&self) -> &[u8] {
        &self.buffer[..self.length]
    }

    fn store(&mut self, block_number: u16, data: &[u8]) {
        self.buffer[..data.len()].copy_from_slice(data);
        self.length = data.len();
        self.block_number = block_number;
    }
}

/// All mutable bootloader state.
pub struct BootloaderContext {
    region: ImageRegion,
    state: DfuState,
    status: DfuStatus,
    session: TransferSession,
}

impl BootloaderContext {
    /// Fresh context in [`DfuState::Idle`] with an all-zero session.
    pub const fn new(region: ImageRegion) -> Self {
        Self {
            region,
            state: DfuState::Idle,
            status: DfuStatus::Ok,
            session: TransferSession::zeroed(),
        }
    }

    /// Return every piece of session state to its initial value.
    pub fn sanitize(&mut self) {
        self.state = DfuState::Idle;
        self.status = DfuStatus::Ok;
        self.session.clear();
    }

    pub fn state(&self) -> DfuState {
        self.state
    }

    pub fn status(&self) -> DfuStatus {
        self.status
    }

    pub fn session(&self) -> &TransferSession {
        &self.session
    }

    pub fn region(&self) -> ImageRegion {
        self.region
    }

    /// Interpret one control request. `data` is the OUT data stage, if any.
    pub fn handle_request(&mut self, setup: &SetupPacket, data: &[u8]) -> Reply {
        if setup.request_type & DIRECTION_MASK != DFU_REQUEST_TYPE {
            return Reply::Rejected;
        }

        let Some(request) = DfuRequest::from_code(setup.request) else {
            return Reply::Rejected;
        };
        let device_to_host = setup.request_type & DIRECTION_IN != 0;
        if request.is_device_to_host() != device_to_host {
            return Reply::Rejected;
        }

        match request {
            DfuRequest::Download => self.download(setup.value, data),
            DfuRequest::GetStatus => self.get_status(),
            DfuRequest::ClearStatus => self.clear_status(),
            DfuRequest::Abort => {
                self.sanitize();
                Reply::Accepted
            }
            DfuRequest::GetState => {
                let mut reply = Vec::new();
                reply.push(self.state as u8).ok();
                Reply::Data {
                    data: reply,
                    completion: None,
                }
            }
            DfuRequest::Upload | DfuRequest::Detach => Reply::Rejected,
        }
    }

    fn download(&mut self, block_number: u16, data: &[u8]) -> Reply {
        if data.is_empty() {
            self.state = DfuState::ManifestSync;
            return Reply::Accepted;
        }

        if data.len() > TRANSFER_BLOCK_SIZE {
            return Reply::Rejected;
        }

        if self
            .region
            .block_address(block_number, TRANSFER_BLOCK_SIZE, data.len())
            .is_none()
        {
            self.session.clear();
            self.state = DfuState::Error;
            self.status = DfuStatus::ErrAddress;
            return Reply::Rejected;
        }

        self.session.store(block_number, data);
        self.state = DfuState::DownloadSync;
        Reply::Accepted
    }

    fn get_status(&mut self) -> Reply {
        let mut poll_timeout_ms = 0;
        match self.state {
            DfuState::DownloadSync => {
                self.state = DfuState::DownloadBusy;
                poll_timeout_ms = DOWNLOAD_POLL_TIMEOUT_MS;
            }
            DfuState::ManifestSync => {
                // Device resets once this reply has gone out.
                self.state = DfuState::Manifest;
            }
            _ => {}
        }

        let report = StatusReport {
            status: self.status,
            poll_timeout_ms,
            state: self.state,
        };
        let mut data = Vec::new();
        data.extend_from_slice(&report.to_bytes()).ok();
        Reply::Data {
            data,
            completion: Some(Completion::GetStatus),
        }
    }

    fn clear_status(&mut self) -> Reply {
        if self.state != DfuState::Error {
            return Reply::Rejected;
        }
        self.state = DfuState::Idle;
        self.status = DfuStatus::Ok;
        Reply::Accepted
    }

    /// Run deferred work after a reply has been sent.
    pub fn complete<F, W>(
        &mut self,
        completion: Completion,
        flash: &mut F,
        watchdog: &mut W,
    ) -> Completed
    where
        F: FlashFacility,
        W: Watchdog,
    {
        match (completion, self.state) {
            (Completion::GetStatus, DfuState::DownloadBusy) => self.flash_pending(flash, watchdog),
            (Completion::GetStatus, DfuState::Manifest) => Completed::ResetRequested,
            _ => Completed::Idle,
        }
    }

    fn flash_pending<F, W>(&mut self, flash: &mut F, watchdog: &mut W) -> Completed
    where
        F: FlashFacility,
        W: Watchdog,
    {
        let len = self.session.len();
        let dest = self
            .region
            .block_address(self.session.block_number(), TRANSFER_BLOCK_SIZE, len);

        let result = match dest {
            Some(address) if len > 0 => {
                flash::write_block(flash, watchdog, address, self.session.pending())
                    .map(|()| Completed::Programmed { address, len })
                    .map_err(DfuStatus::from)
            }
            Some(_) => Ok(Completed::Idle),
            None => Err(DfuStatus::ErrAddress),
        };
        self.session.clear();

        match result {
            Ok(done) => {
                // Straight to dfuDNLOAD-IDLE; the host polls again before the next block.
                self.state = DfuState::DownloadIdle;
                done
            }
            Err(status) => {
                self.state = DfuState::Error;
                self.status = status;
                Completed::Failed(status)
            }
        }
    }
}
