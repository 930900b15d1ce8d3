// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Unit tests for the DFU control-request state machine.

mod sim;

use dfuboot_common::dfu::{
    BootloaderContext, Completed, Completion, DfuRequest, DfuState, DfuStatus, Reply, SetupPacket,
    StatusReport, DOWNLOAD_POLL_TIMEOUT_MS,
};
use dfuboot_common::layout::{ImageRegion, TRANSFER_BLOCK_SIZE};
use sim::{CountingWatchdog, Op, SimFlash};

const BASE: u32 = 0x0800_2000;
const REGION_SIZE: u32 = 16 * 1024;
const MAX_BLOCK: u16 = (REGION_SIZE as usize / TRANSFER_BLOCK_SIZE) as u16;

const ALL_STATES: [DfuState; 7] = [
    DfuState::Idle,
    DfuState::DownloadSync,
    DfuState::DownloadBusy,
    DfuState::DownloadIdle,
    DfuState::ManifestSync,
    DfuState::Manifest,
    DfuState::Error,
];

fn region() -> ImageRegion {
    ImageRegion {
        base: BASE,
        size: REGION_SIZE,
    }
}

fn new_context() -> BootloaderContext {
    BootloaderContext::new(region())
}

fn new_flash() -> SimFlash {
    SimFlash::new(BASE, REGION_SIZE as usize)
}

fn out_request(request: DfuRequest, value: u16, length: u16) -> SetupPacket {
    SetupPacket {
        request_type: 0x21,
        request: request as u8,
        value,
        index: 0,
        length,
    }
}

fn in_request(request: DfuRequest, length: u16) -> SetupPacket {
    SetupPacket {
        request_type: 0xA1,
        request: request as u8,
        value: 0,
        index: 0,
        length,
    }
}

fn block(seed: u8) -> Vec<u8> {
    (0..TRANSFER_BLOCK_SIZE)
        .map(|i| (i as u8).wrapping_add(seed))
        .collect()
}

fn download(ctx: &mut BootloaderContext, block_number: u16, data: &[u8]) -> Reply {
    let setup = out_request(DfuRequest::Download, block_number, data.len() as u16);
    ctx.handle_request(&setup, data)
}

fn get_status(ctx: &mut BootloaderContext) -> Reply {
    ctx.handle_request(&in_request(DfuRequest::GetStatus, 6), &[])
}

fn status_bytes(reply: &Reply) -> [u8; 6] {
    match reply {
        Reply::Data { data, .. } => {
            let mut bytes = [0u8; 6];
            bytes.copy_from_slice(data);
            bytes
        }
        other => panic!("expected status data, got {other:?}"),
    }
}

/// Everything the state machine owns, for before/after comparisons.
fn snapshot(ctx: &BootloaderContext) -> (DfuState, DfuStatus, usize, u16, Vec<u8>) {
    (
        ctx.state(),
        ctx.status(),
        ctx.session().len(),
        ctx.session().block_number(),
        ctx.session().buffer().to_vec(),
    )
}

/// Put a fresh context into `state` through the public request interface.
fn drive_to(state: DfuState, flash: &mut SimFlash) -> BootloaderContext {
    let mut ctx = new_context();
    let mut wd = CountingWatchdog::default();
    match state {
        DfuState::Idle => {}
        DfuState::DownloadSync => {
            download(&mut ctx, 1, &block(1));
        }
        DfuState::DownloadBusy => {
            download(&mut ctx, 1, &block(1));
            get_status(&mut ctx);
        }
        DfuState::DownloadIdle => {
            download(&mut ctx, 1, &block(1));
            get_status(&mut ctx);
            let _ = ctx.complete(Completion::GetStatus, flash, &mut wd);
        }
        DfuState::ManifestSync => {
            download(&mut ctx, 0, &[]);
        }
        DfuState::Manifest => {
            download(&mut ctx, 0, &[]);
            get_status(&mut ctx);
        }
        DfuState::Error => {
            download(&mut ctx, MAX_BLOCK, &block(0));
        }
    }
    assert_eq!(ctx.state(), state);
    ctx
}

// =============================================================================
// Initial state
// =============================================================================

#[test]
fn test_new_context_is_idle_and_zeroed() {
    let ctx = new_context();
    assert_eq!(ctx.state(), DfuState::Idle);
    assert_eq!(ctx.status(), DfuStatus::Ok);
    assert!(ctx.session().is_empty());
    assert_eq!(ctx.session().block_number(), 0);
    assert!(ctx.session().buffer().iter().all(|&b| b == 0));
}

#[test]
fn test_state_byte_values() {
    assert_eq!(DfuState::Idle as u8, 2);
    assert_eq!(DfuState::DownloadSync as u8, 3);
    assert_eq!(DfuState::DownloadBusy as u8, 4);
    assert_eq!(DfuState::DownloadIdle as u8, 5);
    assert_eq!(DfuState::ManifestSync as u8, 6);
    assert_eq!(DfuState::Manifest as u8, 7);
    assert_eq!(DfuState::Error as u8, 10);
}

#[test]
fn test_request_codes_round_trip() {
    for code in 0..=6u8 {
        assert_eq!(DfuRequest::from_code(code).map(|r| r as u8), Some(code));
    }
    assert_eq!(DfuRequest::from_code(7), None);
    assert_eq!(DfuRequest::from_code(0xFF), None);
}

// =============================================================================
// Download
// =============================================================================

#[test]
fn test_download_stores_block() {
    let mut ctx = new_context();
    let data = block(7);

    assert_eq!(download(&mut ctx, 3, &data), Reply::Accepted);
    assert_eq!(ctx.state(), DfuState::DownloadSync);
    assert_eq!(ctx.session().block_number(), 3);
    assert_eq!(ctx.session().len(), TRANSFER_BLOCK_SIZE);
    assert_eq!(ctx.session().pending(), &data[..]);
}

#[test]
fn test_short_download_records_length() {
    let mut ctx = new_context();
    assert_eq!(download(&mut ctx, 0, &[1, 2, 3]), Reply::Accepted);
    assert_eq!(ctx.session().pending(), &[1, 2, 3]);
}

#[test]
fn test_download_accepted_in_every_state() {
    for state in ALL_STATES {
        let mut flash = new_flash();
        let mut ctx = drive_to(state, &mut flash);
        assert_eq!(download(&mut ctx, 2, &block(2)), Reply::Accepted, "{state:?}");
        assert_eq!(ctx.state(), DfuState::DownloadSync);
    }
}

#[test]
fn test_zero_length_download_enters_manifest_sync() {
    let mut ctx = new_context();
    assert_eq!(download(&mut ctx, 0, &[]), Reply::Accepted);
    assert_eq!(ctx.state(), DfuState::ManifestSync);
}

#[test]
fn test_oversized_download_rejected_without_mutation() {
    let mut ctx = new_context();
    let before = snapshot(&ctx);
    let data = vec![0xAB; TRANSFER_BLOCK_SIZE + 1];

    assert_eq!(download(&mut ctx, 0, &data), Reply::Rejected);
    assert_eq!(snapshot(&ctx), before);
}

#[test]
fn test_download_outside_region_enters_error() {
    let mut ctx = new_context();

    assert_eq!(download(&mut ctx, MAX_BLOCK, &block(0)), Reply::Rejected);
    assert_eq!(ctx.state(), DfuState::Error);
    assert_eq!(ctx.status(), DfuStatus::ErrAddress);
    assert!(ctx.session().is_empty());
}

#[test]
fn test_download_of_last_block_in_region_accepted() {
    let mut ctx = new_context();
    assert_eq!(download(&mut ctx, MAX_BLOCK - 1, &block(0)), Reply::Accepted);
}

// =============================================================================
// Get-Status and deferred flash write
// =============================================================================

#[test]
fn test_get_status_after_download_reports_busy() {
    let mut ctx = new_context();
    download(&mut ctx, 0, &block(0));

    let reply = get_status(&mut ctx);

    let timeout = DOWNLOAD_POLL_TIMEOUT_MS.to_le_bytes();
    assert_eq!(
        status_bytes(&reply),
        [0x00, timeout[0], timeout[1], timeout[2], DfuState::DownloadBusy as u8, 0]
    );
    assert_eq!(ctx.state(), DfuState::DownloadBusy);
    assert!(matches!(
        reply,
        Reply::Data {
            completion: Some(Completion::GetStatus),
            ..
        }
    ));
}

#[test]
fn test_flash_untouched_until_completion() {
    let mut ctx = new_context();
    let mut flash = new_flash();
    download(&mut ctx, 0, &block(0));
    get_status(&mut ctx);

    assert!(flash.ops.is_empty());

    let mut wd = CountingWatchdog::default();
    let _ = ctx.complete(Completion::GetStatus, &mut flash, &mut wd);
    assert!(!flash.ops.is_empty());
}

#[test]
fn test_completion_writes_block_at_block_address() {
    let mut ctx = new_context();
    let mut flash = new_flash();
    let mut wd = CountingWatchdog::default();
    let data = block(42);
    let block_number = 5;

    download(&mut ctx, block_number, &data);
    get_status(&mut ctx);
    let done = ctx.complete(Completion::GetStatus, &mut flash, &mut wd);

    let dest = BASE + u32::from(block_number) * TRANSFER_BLOCK_SIZE as u32;
    assert_eq!(
        done,
        Completed::Programmed {
            address: dest,
            len: TRANSFER_BLOCK_SIZE
        }
    );
    assert_eq!(flash.read(dest, TRANSFER_BLOCK_SIZE), &data[..]);
    assert_eq!(ctx.state(), DfuState::DownloadIdle);
}

#[test]
fn test_completion_invokes_engine_exactly_once() {
    let mut ctx = new_context();
    let mut flash = new_flash();
    let mut wd = CountingWatchdog::default();

    download(&mut ctx, 0, &block(0));
    get_status(&mut ctx);
    let _ = ctx.complete(Completion::GetStatus, &mut flash, &mut wd);
    let _ = ctx.complete(Completion::GetStatus, &mut flash, &mut wd);

    let unlocks = flash.ops.iter().filter(|op| **op == Op::Unlock).count();
    assert_eq!(unlocks, 1);
    assert_eq!(flash.programs(), TRANSFER_BLOCK_SIZE / 2);
}

#[test]
fn test_completion_zeroes_session() {
    let mut ctx = new_context();
    let mut flash = new_flash();
    let mut wd = CountingWatchdog::default();

    download(&mut ctx, 9, &block(0xEE));
    get_status(&mut ctx);
    let _ = ctx.complete(Completion::GetStatus, &mut flash, &mut wd);

    assert!(ctx.session().is_empty());
    assert_eq!(ctx.session().block_number(), 0);
    assert!(ctx.session().buffer().iter().all(|&b| b == 0));
}

#[test]
fn test_completion_feeds_watchdog() {
    let mut ctx = new_context();
    let mut flash = new_flash();
    let mut wd = CountingWatchdog::default();

    download(&mut ctx, 0, &block(0));
    get_status(&mut ctx);
    let _ = ctx.complete(Completion::GetStatus, &mut flash, &mut wd);

    assert!(wd.feeds >= TRANSFER_BLOCK_SIZE / 2);
}

#[test]
fn test_get_status_in_idle_reports_without_transition() {
    let mut ctx = new_context();
    let mut flash = new_flash();
    let mut wd = CountingWatchdog::default();

    let reply = get_status(&mut ctx);
    assert_eq!(status_bytes(&reply), [0, 0, 0, 0, DfuState::Idle as u8, 0]);
    assert_eq!(ctx.state(), DfuState::Idle);

    let done = ctx.complete(Completion::GetStatus, &mut flash, &mut wd);
    assert_eq!(done, Completed::Idle);
    assert!(flash.ops.is_empty());
}

#[test]
fn test_get_status_in_download_idle_stays() {
    let mut flash = new_flash();
    let mut ctx = drive_to(DfuState::DownloadIdle, &mut flash);
    let reply = get_status(&mut ctx);
    assert_eq!(status_bytes(&reply)[4], DfuState::DownloadIdle as u8);
    assert_eq!(ctx.state(), DfuState::DownloadIdle);
}

// =============================================================================
// Manifest
// =============================================================================

#[test]
fn test_get_status_in_manifest_sync_enters_manifest() {
    let mut ctx = new_context();
    download(&mut ctx, 0, &[]);

    let reply = get_status(&mut ctx);

    assert_eq!(status_bytes(&reply), [0, 0, 0, 0, DfuState::Manifest as u8, 0]);
    assert_eq!(ctx.state(), DfuState::Manifest);
}

#[test]
fn test_manifest_completion_requests_reset() {
    let mut flash = new_flash();
    let mut wd = CountingWatchdog::default();
    let mut ctx = drive_to(DfuState::Manifest, &mut flash);

    let done = ctx.complete(Completion::GetStatus, &mut flash, &mut wd);

    assert_eq!(done, Completed::ResetRequested);
    assert!(flash.ops.is_empty());
}

// =============================================================================
// Clear-Status, Abort, Get-State
// =============================================================================

#[test]
fn test_clear_status_from_error_returns_to_idle() {
    let mut flash = new_flash();
    let mut ctx = drive_to(DfuState::Error, &mut flash);

    let reply = ctx.handle_request(&out_request(DfuRequest::ClearStatus, 0, 0), &[]);

    assert_eq!(reply, Reply::Accepted);
    assert_eq!(ctx.state(), DfuState::Idle);
    assert_eq!(ctx.status(), DfuStatus::Ok);
}

#[test]
fn test_clear_status_outside_error_rejected_without_mutation() {
    for state in ALL_STATES.into_iter().filter(|s| *s != DfuState::Error) {
        let mut flash = new_flash();
        let mut ctx = drive_to(state, &mut flash);
        let before = snapshot(&ctx);

        let reply = ctx.handle_request(&out_request(DfuRequest::ClearStatus, 0, 0), &[]);

        assert_eq!(reply, Reply::Rejected, "{state:?}");
        assert_eq!(snapshot(&ctx), before, "{state:?}");
    }
}

#[test]
fn test_abort_returns_to_idle_from_every_state() {
    for state in ALL_STATES {
        let mut flash = new_flash();
        let mut ctx = drive_to(state, &mut flash);

        let reply = ctx.handle_request(&out_request(DfuRequest::Abort, 0, 0), &[]);

        assert_eq!(reply, Reply::Accepted);
        assert_eq!(ctx.state(), DfuState::Idle);
        assert_eq!(ctx.status(), DfuStatus::Ok);
    }
}

#[test]
fn test_abort_discards_pending_block() {
    let mut ctx = new_context();
    let mut flash = new_flash();
    let mut wd = CountingWatchdog::default();
    download(&mut ctx, 0, &block(1));

    ctx.handle_request(&out_request(DfuRequest::Abort, 0, 0), &[]);
    let done = ctx.complete(Completion::GetStatus, &mut flash, &mut wd);

    assert!(ctx.session().is_empty());
    assert_eq!(done, Completed::Idle);
    assert!(flash.ops.is_empty());
}

#[test]
fn test_get_state_reports_without_transition() {
    for state in ALL_STATES {
        let mut flash = new_flash();
        let mut ctx = drive_to(state, &mut flash);
        let before = snapshot(&ctx);

        let reply = ctx.handle_request(&in_request(DfuRequest::GetState, 1), &[]);

        match reply {
            Reply::Data { data, completion } => {
                assert_eq!(&data[..], &[state as u8]);
                assert_eq!(completion, None);
            }
            other => panic!("unexpected reply {other:?}"),
        }
        assert_eq!(snapshot(&ctx), before);
    }
}

// =============================================================================
// Rejections
// =============================================================================

#[test]
fn test_unsupported_requests_rejected_in_every_state() {
    for state in ALL_STATES {
        let mut flash = new_flash();
        let mut ctx = drive_to(state, &mut flash);
        let before = snapshot(&ctx);

        for request in [DfuRequest::Upload as u8, DfuRequest::Detach as u8, 7, 0x42, 0xFF] {
            let setup = SetupPacket {
                request_type: 0xA1,
                request,
                value: 0,
                index: 0,
                length: 64,
            };
            assert_eq!(ctx.handle_request(&setup, &[]), Reply::Rejected);
            assert_eq!(snapshot(&ctx), before, "{state:?} request {request}");
        }
    }
}

#[test]
fn test_wrong_direction_requests_rejected_without_mutation() {
    let host_to_device = [DfuRequest::Download, DfuRequest::ClearStatus, DfuRequest::Abort];
    let device_to_host = [DfuRequest::GetStatus, DfuRequest::GetState];

    for state in ALL_STATES {
        let mut flash = new_flash();
        let mut ctx = drive_to(state, &mut flash);
        let before = snapshot(&ctx);

        for request in host_to_device {
            let reply = ctx.handle_request(&in_request(request, TRANSFER_BLOCK_SIZE as u16), &[]);
            assert_eq!(reply, Reply::Rejected, "{state:?} IN {request:?}");
            assert_eq!(snapshot(&ctx), before, "{state:?} IN {request:?}");
        }
        for request in device_to_host {
            let reply = ctx.handle_request(&out_request(request, 0, 0), &[]);
            assert_eq!(reply, Reply::Rejected, "{state:?} OUT {request:?}");
            assert_eq!(snapshot(&ctx), before, "{state:?} OUT {request:?}");
        }
    }
}

#[test]
fn test_device_to_host_download_does_not_end_transfer() {
    let mut ctx = new_context();
    download(&mut ctx, 0, &block(3));

    let setup = in_request(DfuRequest::Download, TRANSFER_BLOCK_SIZE as u16);
    assert_eq!(ctx.handle_request(&setup, &[]), Reply::Rejected);
    assert_eq!(ctx.state(), DfuState::DownloadSync);
    assert_eq!(ctx.session().pending(), block(3).as_slice());
}

#[test]
fn test_requests_outside_dfu_addressing_rejected() {
    // Standard/device, vendor/interface, class/endpoint, class/device.
    let foreign_types = [0x00, 0x80, 0x41, 0xC1, 0x22, 0xA2, 0x20];

    for state in ALL_STATES {
        let mut flash = new_flash();
        let mut ctx = drive_to(state, &mut flash);
        let before = snapshot(&ctx);

        for request_type in foreign_types {
            for request in 0..=6u8 {
                let setup = SetupPacket {
                    request_type,
                    request,
                    value: 1,
                    index: 0,
                    length: 4,
                };
                assert_eq!(ctx.handle_request(&setup, &[1, 2, 3, 4]), Reply::Rejected);
                assert_eq!(snapshot(&ctx), before);
            }
        }
    }
}

// =============================================================================
// Flash faults
// =============================================================================

#[test]
fn test_erase_fault_enters_error_state() {
    let mut ctx = new_context();
    let mut flash = new_flash();
    flash.fail_erase = true;
    let mut wd = CountingWatchdog::default();

    download(&mut ctx, 0, &block(0));
    get_status(&mut ctx);
    let done = ctx.complete(Completion::GetStatus, &mut flash, &mut wd);

    assert_eq!(done, Completed::Failed(DfuStatus::ErrErase));
    assert_eq!(ctx.state(), DfuState::Error);
    assert_eq!(ctx.status(), DfuStatus::ErrErase);
    assert!(ctx.session().is_empty());

    let reply = get_status(&mut ctx);
    assert_eq!(
        status_bytes(&reply),
        [DfuStatus::ErrErase as u8, 0, 0, 0, DfuState::Error as u8, 0]
    );
}

#[test]
fn test_program_fault_enters_error_state() {
    let mut ctx = new_context();
    let mut flash = new_flash();
    flash.fail_program = true;
    let mut wd = CountingWatchdog::default();

    download(&mut ctx, 0, &block(0));
    get_status(&mut ctx);
    let done = ctx.complete(Completion::GetStatus, &mut flash, &mut wd);

    assert_eq!(done, Completed::Failed(DfuStatus::ErrProgram));
    assert_eq!(ctx.state(), DfuState::Error);
}

// =============================================================================
// Sanitization
// =============================================================================

#[test]
fn test_sanitize_resets_dirty_context() {
    let mut flash = new_flash();
    let mut ctx = drive_to(DfuState::DownloadSync, &mut flash);

    ctx.sanitize();

    assert_eq!(snapshot(&ctx), snapshot(&new_context()));
}

#[test]
fn test_sanitize_is_idempotent() {
    let mut flash = new_flash();
    let mut once = drive_to(DfuState::Error, &mut flash);
    let mut twice = drive_to(DfuState::DownloadSync, &mut flash);

    once.sanitize();
    twice.sanitize();
    twice.sanitize();

    assert_eq!(snapshot(&once), snapshot(&twice));
    assert_eq!(twice.state(), DfuState::Idle);
    assert!(twice.session().buffer().iter().all(|&b| b == 0));
}

// =============================================================================
// Status report encoding
// =============================================================================

#[test]
fn test_status_report_poll_timeout_is_24_bit_little_endian() {
    let report = StatusReport {
        status: DfuStatus::Ok,
        poll_timeout_ms: 0x0012_3456,
        state: DfuState::DownloadBusy,
    };
    assert_eq!(report.to_bytes(), [0x00, 0x56, 0x34, 0x12, 4, 0]);
}

// =============================================================================
// Whole transfer
// =============================================================================

#[test]
fn test_full_transfer_writes_image() {
    let mut ctx = new_context();
    let mut flash = new_flash();
    let mut wd = CountingWatchdog::default();

    let image: Vec<u8> = (0..4 * TRANSFER_BLOCK_SIZE).map(|i| (i % 251) as u8).collect();

    for (n, chunk) in image.chunks(TRANSFER_BLOCK_SIZE).enumerate() {
        assert_eq!(download(&mut ctx, n as u16, chunk), Reply::Accepted);
        get_status(&mut ctx);
        let done = ctx.complete(Completion::GetStatus, &mut flash, &mut wd);
        assert!(matches!(done, Completed::Programmed { .. }));
        assert_eq!(ctx.state(), DfuState::DownloadIdle);
    }

    download(&mut ctx, 0, &[]);
    get_status(&mut ctx);
    let done = ctx.complete(Completion::GetStatus, &mut flash, &mut wd);

    assert_eq!(done, Completed::ResetRequested);
    assert_eq!(flash.read(BASE, image.len()), &image[..]);
}
