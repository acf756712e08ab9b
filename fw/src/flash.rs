// Copyright (c) 2025 Robin Edwards
//
// MIT licence

//! The physical flash behind the filesystem region.
//!
//! The HAL's blocking flash driver runs its program/erase inner loops from
//! RAM with interrupts masked and the other core paused, which is exactly
//! the contract `SectorFlash` demands.  Reads come straight out of the XIP
//! window.

use a8pico_flashfs::{FLASH_SECTOR_SIZE, FS_BASE_OFFSET, FlashDisk, SectorFlash};
use embassy_rp::flash::{Blocking, Error, Flash};
use embassy_rp::peripherals::FLASH;

/// QSPI flash fitted to the 16 MiB Pico clones this board is built from.
pub const FLASH_SIZE: usize = 16 * 1024 * 1024;

pub type PicoDisk<'a> = FlashDisk<'a, PicoFlash<'a>>;

pub struct PicoFlash<'d> {
    inner: Flash<'d, FLASH, Blocking, FLASH_SIZE>,
}

impl<'d> PicoFlash<'d> {
    pub fn new(inner: Flash<'d, FLASH, Blocking, FLASH_SIZE>) -> Self {
        Self { inner }
    }

    fn byte_offset(sector: u16, offset: u8) -> u32 {
        FS_BASE_OFFSET + sector as u32 * FLASH_SECTOR_SIZE as u32 + offset as u32 * 512
    }
}

impl SectorFlash for PicoFlash<'_> {
    type Error = Error;

    fn read(&mut self, sector: u16, offset: u8, buf: &mut [u8]) -> Result<(), Error> {
        self.inner.blocking_read(Self::byte_offset(sector, offset), buf)
    }

    fn erase(&mut self, sector: u16) -> Result<(), Error> {
        let from = Self::byte_offset(sector, 0);
        self.inner.blocking_erase(from, from + FLASH_SECTOR_SIZE as u32)
    }

    fn program(&mut self, sector: u16, offset: u8, data: &[u8]) -> Result<(), Error> {
        self.inner.blocking_write(Self::byte_offset(sector, offset), data)
    }
}
