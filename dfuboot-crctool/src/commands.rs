// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command implementations for image checksum operations.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};

use dfuboot_common::image::{self, ImageHeader, ERASED_BYTE};

/// Read a firmware file and check that `start` lies inside it.
fn load(file: &Path, start: usize) -> Result<Vec<u8>> {
    let data = fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    if start > data.len() {
        bail!(
            "Start offset {} is past the end of {} ({} bytes)",
            start,
            file.display(),
            data.len()
        );
    }
    Ok(data)
}

/// Extend `image` to `region_size` bytes with erased-flash filler.
pub fn pad_image(image: &mut Vec<u8>, region_size: usize) -> Result<()> {
    if image.len() > region_size {
        bail!(
            "Image is {} bytes, larger than the {} byte region",
            image.len(),
            region_size
        );
    }
    image.resize(region_size, ERASED_BYTE);
    Ok(())
}

/// Pad the image at `start` and write its checksum into the header.
/// Bytes before `start` are kept as they are.
pub fn patch_buffer(data: &mut Vec<u8>, start: usize, region_size: usize) -> Result<u32> {
    let mut image = data.split_off(start);
    pad_image(&mut image, region_size)?;
    let checksum = image::patch(&mut image).context("Cannot checksum image")?;
    data.extend_from_slice(&image);
    Ok(checksum)
}

/// Print the checksum of the image at `start`.
pub fn checksum(file: &Path, start: usize) -> Result<()> {
    let data = load(file, start)?;
    let checksum = image::image_checksum(&data[start..]).context("Cannot checksum image")?;
    println!("{:X}", checksum);
    Ok(())
}

/// Pad the image, patch its checksum field and write the file back.
pub fn patch(file: &Path, start: usize, region_size: usize) -> Result<()> {
    let mut data = load(file, start)?;
    let original_len = data.len() - start;

    let checksum = patch_buffer(&mut data, start, region_size)?;
    fs::write(file, &data).with_context(|| format!("Failed to write {}", file.display()))?;

    println!(
        "Patched {}: {} -> {} bytes, checksum 0x{:08X} at offset {}",
        file.display(),
        original_len,
        region_size,
        checksum,
        start + ImageHeader::CHECKSUM_OFFSET
    );
    Ok(())
}

/// Verify the image at `start` the way the bootloader does.
pub fn verify(file: &Path, start: usize) -> Result<()> {
    let data = load(file, start)?;
    let image = &data[start..];

    let header = ImageHeader::parse(image).context("Cannot read image header")?;
    let computed = image::image_checksum(image).context("Cannot checksum image")?;

    println!("Vector table: 0x{:08x}", header.vector_table);
    println!("Entry point:  0x{:08x}", header.entry_point);
    println!("Stored:       0x{:08X}", header.checksum);
    println!("Computed:     0x{:08X}", computed);

    if !image::verify(image) {
        bail!("Image does not verify");
    }
    println!("Image OK");
    Ok(())
}
