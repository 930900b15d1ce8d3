// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! USB DFU-mode interface on top of [`BootloaderContext`].
//!
//! Presents a single DFU interface (class 0xFE, subclass 1, protocol 2) and
//! hands every non-standard control request to the state machine. Work the
//! state machine defers until after a reply has gone out is kept here and
//! run by the update loop through [`DfuClass::run_pending`].

use dfuboot_common::dfu::{BootloaderContext, Completed, Completion, Reply, SetupPacket};
use dfuboot_common::layout::TRANSFER_BLOCK_SIZE;
use dfuboot_common::{FlashFacility, Watchdog};
use usb_device::class_prelude::*;
use usb_device::control::{Recipient, Request, RequestType};

const USB_CLASS_APPLICATION_SPECIFIC: u8 = 0xFE;
const DFU_SUBCLASS_FIRMWARE_UPGRADE: u8 = 0x01;
const DFU_PROTOCOL_DFU_MODE: u8 = 0x02;

const DFU_TYPE_FUNCTIONAL: u8 = 0x21;
const DFU_WILL_DETACH: u8 = 1 << 3;
const DFU_CAN_DNLOAD: u8 = 1 << 0;

const DETACH_TIMEOUT_MS: u16 = 255;
const DFU_VERSION: u16 = 0x0100;

const INTERFACE_NAME: &str = "dfuboot application flash";

pub struct DfuClass {
    iface: InterfaceNumber,
    interface_string: StringIndex,
    ctx: BootloaderContext,
    pending: Option<Completion>,
}

impl DfuClass {
    pub fn new<B: UsbBus>(alloc: &UsbBusAllocator<B>, ctx: BootloaderContext) -> Self {
        Self {
            iface: alloc.interface(),
            interface_string: alloc.string(),
            ctx,
            pending: None,
        }
    }

    /// Run the work deferred by the last reply, if any.
    pub fn run_pending<F, W>(&mut self, flash: &mut F, watchdog: &mut W) -> Option<Completed>
    where
        F: FlashFacility,
        W: Watchdog,
    {
        let completion = self.pending.take()?;
        Some(self.ctx.complete(completion, flash, watchdog))
    }

    /// Whether a request belongs to this interface rather than the device.
    fn claims(&self, req: &Request) -> bool {
        if req.request_type == RequestType::Standard {
            return false;
        }
        !(req.recipient == Recipient::Interface && req.index != u8::from(self.iface) as u16)
    }
}

fn setup_packet(req: &Request) -> SetupPacket {
    SetupPacket {
        request_type: req.direction as u8 | (req.request_type as u8) << 5 | req.recipient as u8,
        request: req.request,
        value: req.value,
        index: req.index,
        length: req.length,
    }
}

impl<B: UsbBus> UsbClass<B> for DfuClass {
    fn get_configuration_descriptors(&self, writer: &mut DescriptorWriter) -> usb_device::Result<()> {
        writer.interface_alt(
            self.iface,
            0,
            USB_CLASS_APPLICATION_SPECIFIC,
            DFU_SUBCLASS_FIRMWARE_UPGRADE,
            DFU_PROTOCOL_DFU_MODE,
            Some(self.interface_string),
        )?;

        let detach_timeout = DETACH_TIMEOUT_MS.to_le_bytes();
        let transfer_size = (TRANSFER_BLOCK_SIZE as u16).to_le_bytes();
        let dfu_version = DFU_VERSION.to_le_bytes();
        writer.write(
            DFU_TYPE_FUNCTIONAL,
            &[
                DFU_CAN_DNLOAD | DFU_WILL_DETACH, // bmAttributes
                detach_timeout[0],
                detach_timeout[1],
                transfer_size[0],
                transfer_size[1],
                dfu_version[0],
                dfu_version[1],
            ],
        )
    }

    fn get_string(&self, index: StringIndex, lang_id: LangID) -> Option<&str> {
        if index == self.interface_string && (lang_id == LangID::EN_US || u16::from(lang_id) == 0) {
            return Some(INTERFACE_NAME);
        }
        None
    }

    fn reset(&mut self) {
        // A bus reset abandons the transfer in progress.
        self.pending = None;
        self.ctx.sanitize();
    }

    fn control_in(&mut self, xfer: ControlIn<B>) {
        let req = *xfer.request();
        if !self.claims(&req) {
            return;
        }

        match self.ctx.handle_request(&setup_packet(&req), &[]) {
            Reply::Data { data, completion } => {
                if xfer.accept_with(&data).is_ok() {
                    self.pending = completion;
                }
            }
            Reply::Accepted => {
                xfer.accept_with(&[]).ok();
            }
            Reply::Rejected => {
                xfer.reject().ok();
            }
        }
    }

    fn control_out(&mut self, xfer: ControlOut<B>) {
        let req = *xfer.request();
        if !self.claims(&req) {
            return;
        }

        match self.ctx.handle_request(&setup_packet(&req), xfer.data()) {
            Reply::Accepted => {
                xfer.accept().ok();
            }
            Reply::Rejected | Reply::Data { .. } => {
                xfer.reject().ok();
            }
        }
    }
}
