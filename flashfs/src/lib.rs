// Copyright (c) 2025 Robin Edwards
//
// MIT License

//! Flash filesystem for the A8 Pico Cart.
//!
//! Implements 512 byte FAT sectors on 4096 byte flash sectors, copy-on-write:
//! a logical sector is never rewritten in place, it is redirected to a fresh
//! 512 byte slot and the old slot is released.  Doesn't really implement wear
//! levelling (the allocation cursor only spreads erases) so not for heavy
//! use, but fine for a drive that mostly holds cartridge images.
//!
//! Layout, from [`FS_BASE_OFFSET`] into flash:
//!
//! * physical sectors `0..15`: the sector map: 8 magic bytes then
//!   30,716 little-endian `u16` entries, `(phys << 3) | slot`, `0` = never
//!   written.
//! * physical sectors `15..3840`: data, 8 × 512 byte slots each.
//!
//! [`FlashFs`] is the translation layer, [`FlashDisk`] adapts it to the block
//! contract the external FAT library ([`embedded_sdmmc`]) consumes, and
//! [`mkfs`] lays down the initial FAT16 volume.

#![cfg_attr(not(feature = "std"), no_std)]

mod disk;
mod flash;
mod ftl;
pub mod mkfs;
#[cfg(feature = "std")]
pub mod sim;

pub use disk::{DiskError, FlashDisk, NullTime};
pub use flash::SectorFlash;
pub use ftl::{Error, FlashFs, FsBuffers};

/// 512 byte logical sectors presented to the FAT layer.
///
/// 15 MiB / 512 = 30,720, less the 4 map entries displaced by the magic
/// header.
pub const NUM_FAT_SECTORS: usize = 30_716;

/// 4096 byte physical flash sectors backing the filesystem (15 MiB).
pub const NUM_FLASH_SECTORS: usize = 3_840;

/// Size of one physical (erasable) flash sector.
pub const FLASH_SECTOR_SIZE: usize = 4096;

/// Size of one logical sector.
pub const BLOCK_SIZE: usize = 512;

/// Physical sectors reserved for the sector map.
pub const MAP_SECTORS: usize = 15;

/// Identifies an initialised filesystem, at byte 0 of map sector 0.
pub const MAGIC: &[u8; 8] = b"RHE!FS30";

/// Offset into the MCU's flash at which the filesystem region starts,
/// leaving the first megabyte for firmware.
pub const FS_BASE_OFFSET: u32 = 1024 * 1024;
