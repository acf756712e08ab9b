// Copyright (c) 2025 Robin Edwards
//
// MIT License

//! Lays down the initial FAT16 volume on a freshly created [`FlashDisk`].
//!
//! The external FAT library can read and write files but cannot format, so
//! the handful of on-disk structures are written here directly: an MBR with a
//! single FAT16 partition, the BIOS parameter block, the two FAT headers and
//! a volume-label root entry.  Everything else in the volume is zeros, which
//! is exactly what unmapped translation-layer sectors read as, so only the
//! five non-zero sectors are actually written.

use embedded_sdmmc::{Mode, VolumeIdx, VolumeManager};
use log::info;

use crate::disk::{DiskError, FlashDisk, NullTime};
use crate::flash::SectorFlash;
use crate::{BLOCK_SIZE, NUM_FAT_SECTORS};

/// LBA of the first partition sector.
const PART_START: u32 = 64;
/// Sectors in the partition.
const PART_SECTORS: u32 = NUM_FAT_SECTORS as u32 - PART_START;
const SECTORS_PER_CLUSTER: u8 = 4;
const RESERVED_SECTORS: u16 = 1;
const NUM_FATS: u8 = 2;
const SECTORS_PER_FAT: u16 = 30;
const ROOT_ENTRIES: u16 = 512;

const LABEL: &[u8; 11] = b"A8-PICOCART";
const VOLUME_ID: u32 = 0xA81C_CA57;

const GREETING: &str =
    "Atari 8-bit PicoCart\r\n(c)2023 Electrotrains\r\nDrag ROM,CAR & XEX files in here!\r\n";

/// Write the partition table and empty FAT16 structures.
///
/// The disk must already be created/mounted; afterwards the volume opens
/// cleanly with the FAT library.
pub fn format<F: SectorFlash>(disk: &FlashDisk<F>) -> Result<(), DiskError<F::Error>> {
    info!("formatting FAT16 volume");
    let mut block = [0u8; BLOCK_SIZE];

    // Master boot record: one FAT16 entry, CHS fields pinned to the
    // LBA-only convention.
    let entry = &mut block[446..462];
    entry[1] = 0xFE;
    entry[2] = 0xFF;
    entry[3] = 0xFF;
    entry[4] = 0x06; // FAT16
    entry[5] = 0xFE;
    entry[6] = 0xFF;
    entry[7] = 0xFF;
    entry[8..12].copy_from_slice(&PART_START.to_le_bytes());
    entry[12..16].copy_from_slice(&PART_SECTORS.to_le_bytes());
    block[510] = 0x55;
    block[511] = 0xAA;
    disk.write_blocks(&block, 0)?;

    // BIOS parameter block.
    block.fill(0);
    block[0..3].copy_from_slice(&[0xEB, 0x3C, 0x90]);
    block[3..11].copy_from_slice(b"A8PICO  ");
    block[11..13].copy_from_slice(&(BLOCK_SIZE as u16).to_le_bytes());
    block[13] = SECTORS_PER_CLUSTER;
    block[14..16].copy_from_slice(&RESERVED_SECTORS.to_le_bytes());
    block[16] = NUM_FATS;
    block[17..19].copy_from_slice(&ROOT_ENTRIES.to_le_bytes());
    block[19..21].copy_from_slice(&(PART_SECTORS as u16).to_le_bytes());
    block[21] = 0xF8;
    block[22..24].copy_from_slice(&SECTORS_PER_FAT.to_le_bytes());
    block[24..26].copy_from_slice(&32u16.to_le_bytes()); // sectors/track
    block[26..28].copy_from_slice(&2u16.to_le_bytes()); // heads
    block[28..32].copy_from_slice(&PART_START.to_le_bytes()); // hidden
    block[36] = 0x80; // drive number
    block[38] = 0x29; // extended boot signature
    block[39..43].copy_from_slice(&VOLUME_ID.to_le_bytes());
    block[43..54].copy_from_slice(LABEL);
    block[54..62].copy_from_slice(b"FAT16   ");
    block[510] = 0x55;
    block[511] = 0xAA;
    disk.write_blocks(&block, PART_START)?;

    // First sector of each FAT: media byte and end-of-chain markers.
    block.fill(0);
    block[0..4].copy_from_slice(&[0xF8, 0xFF, 0xFF, 0xFF]);
    let fat1 = PART_START + RESERVED_SECTORS as u32;
    let fat2 = fat1 + SECTORS_PER_FAT as u32;
    disk.write_blocks(&block, fat1)?;
    disk.write_blocks(&block, fat2)?;

    // Volume-label entry at the head of the root directory.
    block.fill(0);
    block[0..11].copy_from_slice(LABEL);
    block[11] = 0x08; // ATTR_VOLUME_ID
    disk.write_blocks(&block, fat2 + SECTORS_PER_FAT as u32)?;

    disk.sync()
}

/// Drop the greeting file into the root of a freshly formatted volume.
pub fn write_welcome<F: SectorFlash>(
    disk: &FlashDisk<F>,
) -> Result<(), embedded_sdmmc::Error<DiskError<F::Error>>> {
    let mut volume_mgr = VolumeManager::new(disk, NullTime);
    let mut volume = volume_mgr.open_volume(VolumeIdx(0))?;
    let mut root = volume.open_root_dir()?;
    let mut file = root.open_file_in_dir("WELCOME.TXT", Mode::ReadWriteCreate)?;
    file.write(GREETING.as_bytes())?;
    file.flush()?;
    Ok(())
}
