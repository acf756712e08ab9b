// Copyright (c) 2025 Robin Edwards
//
// MIT License

//! Mounted ATR disk images.
//!
//! An ATR file is a 16 byte header followed by raw sector data.  The host
//! reads and writes it through the command channel in 128 byte pages: the
//! first three sectors are always 128 bytes regardless of the header's
//! sector size, larger sectors from sector 4 on are addressed as
//! (sector, page) pairs.

use alloc::string::String;

use embedded_sdmmc::{BlockDevice, Mode, RawFile, RawVolume, TimeSource, VolumeIdx, VolumeManager};
use log::info;

pub const ATR_HEADER_SIZE: usize = 16;
const ATR_SIGNATURE: u16 = 0x0296;
const PAGE: u32 = 128;

/// The 16 byte little-endian header at the front of every ATR image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtrHeader {
    pub signature: u16,
    pub pars: u16,
    pub sector_size: u16,
    pub pars_high: u16,
    pub flags: u8,
    pub prot_info: u16,
    pub reserved: [u8; 5],
}

impl AtrHeader {
    pub fn parse(raw: &[u8; ATR_HEADER_SIZE]) -> Self {
        Self {
            signature: u16::from_le_bytes([raw[0], raw[1]]),
            pars: u16::from_le_bytes([raw[2], raw[3]]),
            sector_size: u16::from_le_bytes([raw[4], raw[5]]),
            pars_high: u16::from_le_bytes([raw[6], raw[7]]),
            flags: raw[8],
            prot_info: u16::from_le_bytes([raw[9], raw[10]]),
            reserved: [raw[11], raw[12], raw[13], raw[14], raw[15]],
        }
    }

    pub fn to_bytes(&self) -> [u8; ATR_HEADER_SIZE] {
        let mut out = [0u8; ATR_HEADER_SIZE];
        out[0..2].copy_from_slice(&self.signature.to_le_bytes());
        out[2..4].copy_from_slice(&self.pars.to_le_bytes());
        out[4..6].copy_from_slice(&self.sector_size.to_le_bytes());
        out[6..8].copy_from_slice(&self.pars_high.to_le_bytes());
        out[8] = self.flags;
        out[9..11].copy_from_slice(&self.prot_info.to_le_bytes());
        out[11..16].copy_from_slice(&self.reserved);
        out
    }
}

/// Byte offset of a (sector, page) pair within the image file.
///
/// Sectors 1..=3 are 128 bytes whatever the header claims; from sector 4 the
/// header's sector size applies and `page` selects a 128 byte slice of it.
pub fn sector_offset(header: &AtrHeader, sector: u16, page: u8) -> u32 {
    let mut offset = ATR_HEADER_SIZE as u32;
    if sector <= 3 {
        offset += (sector as u32 - 1) * PAGE;
    } else {
        offset += 3 * PAGE
            + (sector as u32 - 4) * header.sector_size as u32
            + page as u32 * PAGE;
    }
    offset
}

/// Mount failures, numbered as the menu ROM expects them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AtrError {
    /// The FAT volume would not open.
    NoMedia = 1,
    /// The image file would not open.
    NotFound = 2,
    /// Short read or bad signature in the header.
    BadImage = 3,
}

/// Sector I/O failures, numbered as the menu ROM expects them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AtrIoError {
    /// No image is mounted.
    NotMounted = 1,
    /// Sector 0, write past end of image, or the file I/O failed.
    BadSector = 2,
}

struct Mounted {
    volume: RawVolume,
    file: RawFile,
    header: AtrHeader,
    path: String,
    size: u32,
}

/// One mounted ATR image.
///
/// Owns its own FAT volume manager so the file handle stays valid across
/// commands while the rest of the menu opens and drops volumes per
/// operation.  Remounting closes the previous handles first.
pub struct AtrSession<D, T>
where
    D: BlockDevice,
    T: TimeSource,
{
    volume_mgr: VolumeManager<D, T>,
    mounted: Option<Mounted>,
}

impl<D, T> AtrSession<D, T>
where
    D: BlockDevice,
    T: TimeSource,
{
    pub fn new(volume_mgr: VolumeManager<D, T>) -> Self {
        Self {
            volume_mgr,
            mounted: None,
        }
    }

    pub fn header(&self) -> Option<&AtrHeader> {
        self.mounted.as_ref().map(|m| &m.header)
    }

    pub fn path(&self) -> Option<&str> {
        self.mounted.as_ref().map(|m| m.path.as_str())
    }

    /// Mount the image at `path`, replacing whatever was mounted before.
    pub fn mount(&mut self, path: &str) -> Result<&AtrHeader, AtrError> {
        self.unmount();

        let volume = self
            .volume_mgr
            .open_raw_volume(VolumeIdx(0))
            .map_err(|_| AtrError::NoMedia)?;
        match self.mount_file(volume, path) {
            Ok(mounted) => {
                info!("mounted ATR {path}");
                Ok(&self.mounted.insert(mounted).header)
            }
            Err(e) => {
                let _ = self.volume_mgr.close_volume(volume);
                Err(e)
            }
        }
    }

    fn mount_file(&mut self, volume: RawVolume, path: &str) -> Result<Mounted, AtrError> {
        let mut dir = self
            .volume_mgr
            .open_root_dir(volume)
            .map_err(|_| AtrError::NotFound)?;
        let mut segments = path.split('/').filter(|s| !s.is_empty()).peekable();
        let mut name = "";
        while let Some(segment) = segments.next() {
            if segments.peek().is_none() {
                name = segment;
                break;
            }
            let child = match self.volume_mgr.open_dir(dir, segment) {
                Ok(d) => d,
                Err(_) => {
                    let _ = self.volume_mgr.close_dir(dir);
                    return Err(AtrError::NotFound);
                }
            };
            let _ = self.volume_mgr.close_dir(dir);
            dir = child;
        }

        let opened = self
            .volume_mgr
            .open_file_in_dir(dir, name, Mode::ReadWriteAppend);
        let _ = self.volume_mgr.close_dir(dir);
        let file = opened.map_err(|_| AtrError::NotFound)?;

        let mut raw = [0u8; ATR_HEADER_SIZE];
        let header_ok = self
            .volume_mgr
            .file_seek_from_start(file, 0)
            .and_then(|_| self.volume_mgr.read(file, &mut raw))
            .map(|n| n == ATR_HEADER_SIZE)
            .unwrap_or(false);
        let header = AtrHeader::parse(&raw);
        if !header_ok || header.signature != ATR_SIGNATURE {
            let _ = self.volume_mgr.close_file(file);
            return Err(AtrError::BadImage);
        }

        let size = self
            .volume_mgr
            .file_length(file)
            .map_err(|_| AtrError::BadImage)?;
        Ok(Mounted {
            volume,
            file,
            header,
            path: String::from(path),
            size,
        })
    }

    /// Close the mounted image's handles, if any.
    pub fn unmount(&mut self) {
        if let Some(m) = self.mounted.take() {
            let _ = self.volume_mgr.close_file(m.file);
            let _ = self.volume_mgr.close_volume(m.volume);
        }
    }

    /// Read one 128 byte page.  Pages beyond the end of the image read as
    /// zeros without error - some images are shorter than their geometry.
    pub fn read_sector(
        &mut self,
        sector: u16,
        page: u8,
        buf: &mut [u8; PAGE as usize],
    ) -> Result<(), AtrIoError> {
        let m = self.mounted.as_ref().ok_or(AtrIoError::NotMounted)?;
        if sector == 0 {
            return Err(AtrIoError::BadSector);
        }
        let offset = sector_offset(&m.header, sector, page);
        if offset as i64 > m.size as i64 - PAGE as i64 {
            buf.fill(0);
            return Ok(());
        }
        let file = m.file;
        self.volume_mgr
            .file_seek_from_start(file, offset)
            .map_err(|_| AtrIoError::BadSector)?;
        let n = self
            .volume_mgr
            .read(file, buf)
            .map_err(|_| AtrIoError::BadSector)?;
        if n != PAGE as usize {
            return Err(AtrIoError::BadSector);
        }
        Ok(())
    }

    /// Write one 128 byte page and flush it; writes past the end of the
    /// image are refused.
    pub fn write_sector(
        &mut self,
        sector: u16,
        page: u8,
        buf: &[u8; PAGE as usize],
    ) -> Result<(), AtrIoError> {
        let m = self.mounted.as_ref().ok_or(AtrIoError::NotMounted)?;
        if sector == 0 {
            return Err(AtrIoError::BadSector);
        }
        let offset = sector_offset(&m.header, sector, page);
        if offset as i64 > m.size as i64 - PAGE as i64 {
            return Err(AtrIoError::BadSector);
        }
        let file = m.file;
        self.volume_mgr
            .file_seek_from_start(file, offset)
            .and_then(|_| self.volume_mgr.write(file, buf))
            .and_then(|_| self.volume_mgr.flush_file(file))
            .map_err(|_| AtrIoError::BadSector)?;
        Ok(())
    }
}

impl<D, T> Drop for AtrSession<D, T>
where
    D: BlockDevice,
    T: TimeSource,
{
    fn drop(&mut self) {
        self.unmount();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(sector_size: u16) -> AtrHeader {
        AtrHeader {
            signature: ATR_SIGNATURE,
            pars: 0,
            sector_size,
            pars_high: 0,
            flags: 0,
            prot_info: 0,
            reserved: [0; 5],
        }
    }

    #[test]
    fn boot_sectors_are_always_short() {
        let h = header(256);
        assert_eq!(sector_offset(&h, 1, 0), 16);
        assert_eq!(sector_offset(&h, 2, 0), 16 + 128);
        assert_eq!(sector_offset(&h, 3, 0), 16 + 256);
    }

    #[test]
    fn large_sectors_use_header_size_and_pages() {
        let h = header(256);
        assert_eq!(sector_offset(&h, 4, 0), 16 + 384);
        assert_eq!(sector_offset(&h, 4, 1), 16 + 384 + 128);
        assert_eq!(sector_offset(&h, 5, 0), 16 + 384 + 256);
    }

    #[test]
    fn single_density_layout() {
        let h = header(128);
        // Sector n starts 128 bytes after sector n-1 throughout.
        assert_eq!(sector_offset(&h, 4, 0), 16 + 3 * 128);
        assert_eq!(sector_offset(&h, 10, 0), 16 + 9 * 128);
    }

    #[test]
    fn header_round_trip() {
        let h = header(128);
        assert_eq!(AtrHeader::parse(&h.to_bytes()), h);
        let raw = h.to_bytes();
        assert_eq!(u16::from_le_bytes([raw[0], raw[1]]), 0x0296);
    }
}
