// Copyright (c) 2025 Robin Edwards
//
// MIT License

//! Physical flash contract consumed by the translation layer.

/// A 4 KiB-sector flash device.
///
/// Sector indices are relative to the filesystem region, not to the start of
/// the part.  `offset` addresses 512 byte slots within a sector (`0..8`).
///
/// Implementations must run erase and program with interrupts masked for
/// their whole duration; on parts that execute in place from the same flash,
/// instruction fetch stalls otherwise.  Reads are plain memory loads from the
/// XIP window and carry no such requirement.  Callers treat both erase and
/// program as blocking for milliseconds.
pub trait SectorFlash {
    type Error: core::fmt::Debug;

    /// Read `buf.len()` bytes starting at slot `offset` of `sector`.
    fn read(&mut self, sector: u16, offset: u8, buf: &mut [u8]) -> Result<(), Self::Error>;

    /// Erase `sector` (all 4096 bytes revert to `0xFF`).
    fn erase(&mut self, sector: u16) -> Result<(), Self::Error>;

    /// Program `data.len()` bytes starting at slot `offset` of `sector`.
    ///
    /// The range must have been erased since it was last programmed.
    fn program(&mut self, sector: u16, offset: u8, data: &[u8]) -> Result<(), Self::Error>;
}
