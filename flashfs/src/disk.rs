// Copyright (c) 2025 Robin Edwards
//
// MIT License

//! Block-device adapter between the translation layer and the FAT library.

use core::cell::{Cell, RefCell};

use embedded_sdmmc::{Block, BlockCount, BlockDevice, BlockIdx, TimeSource, Timestamp};
use log::error;

use crate::ftl::{Error, FlashFs};
use crate::flash::SectorFlash;
use crate::{BLOCK_SIZE, NUM_FAT_SECTORS};

/// Presents a [`FlashFs`] as 30,716 512 byte blocks.
///
/// Every write is read back and compared; a mismatch surfaces as an I/O
/// error rather than letting bit rot propagate into FAT metadata.
pub struct FlashDisk<'b, F: SectorFlash> {
    fs: RefCell<FlashFs<'b, F>>,
    mounted: Cell<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskError<E> {
    /// The filesystem has not been mounted (or creation failed).
    NotMounted,
    /// Block index beyond the device.
    OutOfRange { block: u32 },
    /// Post-write verification read back different data.
    VerifyFailed { block: u32 },
    /// Translation-layer failure.
    Fs(Error<E>),
}

impl<E> From<Error<E>> for DiskError<E> {
    fn from(e: Error<E>) -> Self {
        DiskError::Fs(e)
    }
}

impl<'b, F: SectorFlash> FlashDisk<'b, F> {
    pub fn new(fs: FlashFs<'b, F>) -> Self {
        Self {
            fs: RefCell::new(fs),
            mounted: Cell::new(false),
        }
    }

    pub fn into_inner(self) -> FlashFs<'b, F> {
        self.fs.into_inner()
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.get()
    }

    /// Mount the translation layer.  `Ok(false)` means the magic header was
    /// missing and the region needs [`Self::create`].
    pub fn mount(&self) -> Result<bool, DiskError<F::Error>> {
        match self.fs.borrow_mut().mount() {
            Ok(()) => {
                self.mounted.set(true);
                Ok(true)
            }
            Err(Error::NoMagic) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Initialise an empty translation layer.
    pub fn create(&self) -> Result<(), DiskError<F::Error>> {
        self.fs.borrow_mut().create()?;
        self.mounted.set(true);
        Ok(())
    }

    /// Flush map changes to flash.
    pub fn sync(&self) -> Result<(), DiskError<F::Error>> {
        self.fs.borrow_mut().sync()?;
        Ok(())
    }

    pub fn read_blocks(&self, buf: &mut [u8], start: u32) -> Result<(), DiskError<F::Error>> {
        if !self.mounted.get() {
            return Err(DiskError::NotMounted);
        }
        let mut fs = self.fs.borrow_mut();
        for (i, chunk) in buf.chunks_exact_mut(BLOCK_SIZE).enumerate() {
            let block = start + i as u32;
            check_range(block)?;
            let out: &mut [u8; BLOCK_SIZE] = chunk.try_into().expect("chunks_exact");
            fs.read_sector(block as u16, out)?;
        }
        Ok(())
    }

    pub fn write_blocks(&self, buf: &[u8], start: u32) -> Result<(), DiskError<F::Error>> {
        if !self.mounted.get() {
            return Err(DiskError::NotMounted);
        }
        let mut fs = self.fs.borrow_mut();
        for (i, chunk) in buf.chunks_exact(BLOCK_SIZE).enumerate() {
            let block = start + i as u32;
            check_range(block)?;
            let data: &[u8; BLOCK_SIZE] = chunk.try_into().expect("chunks_exact");
            fs.write_sector(block as u16, data)?;
            if !fs.verify_sector(block as u16, data)? {
                error!("flash verify failed at block {block}");
                return Err(DiskError::VerifyFailed { block });
            }
        }
        Ok(())
    }
}

fn check_range<E>(block: u32) -> Result<(), DiskError<E>> {
    if block >= NUM_FAT_SECTORS as u32 {
        Err(DiskError::OutOfRange { block })
    } else {
        Ok(())
    }
}

impl<F: SectorFlash> BlockDevice for FlashDisk<'_, F> {
    type Error = DiskError<F::Error>;

    fn read(
        &self,
        blocks: &mut [Block],
        start_block_idx: BlockIdx,
        _reason: &str,
    ) -> Result<(), Self::Error> {
        for (i, block) in blocks.iter_mut().enumerate() {
            self.read_blocks(&mut block.contents, start_block_idx.0 + i as u32)?;
        }
        Ok(())
    }

    fn write(&self, blocks: &[Block], start_block_idx: BlockIdx) -> Result<(), Self::Error> {
        for (i, block) in blocks.iter().enumerate() {
            self.write_blocks(&block.contents, start_block_idx.0 + i as u32)?;
        }
        Ok(())
    }

    fn num_blocks(&self) -> Result<BlockCount, Self::Error> {
        Ok(BlockCount(NUM_FAT_SECTORS as u32))
    }
}

impl<F: SectorFlash> BlockDevice for &FlashDisk<'_, F> {
    type Error = DiskError<F::Error>;

    fn read(
        &self,
        blocks: &mut [Block],
        start_block_idx: BlockIdx,
        reason: &str,
    ) -> Result<(), Self::Error> {
        (**self).read(blocks, start_block_idx, reason)
    }

    fn write(&self, blocks: &[Block], start_block_idx: BlockIdx) -> Result<(), Self::Error> {
        (**self).write(blocks, start_block_idx)
    }

    fn num_blocks(&self) -> Result<BlockCount, Self::Error> {
        (**self).num_blocks()
    }
}

/// Timestamp source handed to the FAT library; the cartridge has no clock.
#[derive(Default, Clone, Copy)]
pub struct NullTime;

impl TimeSource for NullTime {
    fn get_timestamp(&self) -> Timestamp {
        Timestamp {
            year_since_1970: 53,
            zero_indexed_month: 0,
            zero_indexed_day: 0,
            hours: 0,
            minutes: 0,
            seconds: 0,
        }
    }
}
