// Copyright (c) 2025 Robin Edwards
//
// MIT License

//! Loads a cartridge image file into the shared RAM buffer.

use embedded_sdmmc::{BlockDevice, File, Mode, TimeSource, VolumeIdx, VolumeManager};
use log::info;

use crate::error::MenuError;
use crate::path::{open_dir_at, split_parent};
use crate::types::MapperKind;

/// The shared buffer a loaded image (or XEX payload, or listing) lives in.
pub const CART_RAM_SIZE: usize = 128 * 1024;

const CAR_HEADER_SIZE: usize = 16;

/// Read until `buf` is full or the file runs out; returns bytes read.
fn read_fully<D, T, const MD: usize, const MF: usize, const MV: usize>(
    file: &mut File<'_, D, T, MD, MF, MV>,
    buf: &mut [u8],
) -> Result<usize, embedded_sdmmc::Error<D::Error>>
where
    D: BlockDevice,
    T: TimeSource,
{
    let mut total = 0;
    while total < buf.len() {
        let n = file.read(&mut buf[total..])?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}

/// Open `path`, recognise its format and fill `ram` with the image.
///
/// `.CAR` files carry their mapper in byte 7 of the header and must match
/// that type's size exactly.  `.XEX` files get their length stored
/// little-endian in the first four bytes of the buffer, payload after.
/// Anything else is treated as a raw dump and guessed from its size.
/// 128 KiB of payload is the hard cap.
pub fn load_file<D, T, const MD: usize, const MF: usize, const MV: usize>(
    volume_mgr: &mut VolumeManager<D, T, MD, MF, MV>,
    path: &str,
    ram: &mut [u8; CART_RAM_SIZE],
) -> Result<MapperKind, MenuError>
where
    D: BlockDevice,
    T: TimeSource,
{
    let upper_ext = |s: &str, e: &str| s.len() >= 4 && s[s.len() - 4..].eq_ignore_ascii_case(e);
    let car_file = upper_ext(path, ".CAR");
    let xex_file = upper_ext(path, ".XEX");

    let mut volume = volume_mgr
        .open_volume(VolumeIdx(0))
        .map_err(|_| MenuError::NoMedia)?;
    let (parent, name) = split_parent(path);
    let mut dir = open_dir_at(&mut volume, parent).map_err(|_| MenuError::OpenFailed)?;
    let mut file = dir
        .open_file_in_dir(name, Mode::ReadOnly)
        .map_err(|_| MenuError::OpenFailed)?;

    let mut expected = None;
    let mut cart_type = MapperKind::Std8k;
    if car_file {
        let mut header = [0u8; CAR_HEADER_SIZE];
        if read_fully(&mut file, &mut header).map_err(|_| MenuError::BadCarHeader)? != CAR_HEADER_SIZE {
            return Err(MenuError::BadCarHeader);
        }
        let (kind, size) =
            MapperKind::from_car_type(header[7]).ok_or(MenuError::UnsupportedCarType)?;
        cart_type = kind;
        expected = Some(size);
    }

    // Pull the whole body into the buffer; XEX payloads start at offset 4 to
    // leave room for the length prefix.
    let body = if xex_file { &mut ram[4..] } else { &mut ram[..] };
    let size = read_fully(&mut file, body).map_err(|_| MenuError::ReadFailed)?;
    if size == body.len() {
        // Buffer full - anything left in the file is over the cap.
        let mut probe = [0u8; 1];
        if file.read(&mut probe).map_err(|_| MenuError::ReadFailed)? != 0 {
            return Err(MenuError::TooBig);
        }
    }

    if car_file {
        if Some(size) != expected {
            return Err(MenuError::WrongCarSize);
        }
    } else if xex_file {
        cart_type = MapperKind::Xex;
        ram[0] = size as u8;
        ram[1] = (size >> 8) as u8;
        ram[2] = (size >> 16) as u8;
        ram[3] = 0; // the 6502 loader requires this zero
    } else {
        cart_type = MapperKind::from_rom_size(size).ok_or(MenuError::UnsupportedRomSize)?;
    }

    // Small standard carts are relocated so the plain 8K loop can serve
    // them: the image sits at the top of the window, unpopulated bytes float
    // high like an unconnected bus.
    match cart_type {
        MapperKind::Std4k => {
            ram.copy_within(0..4096, 4096);
            ram[..4096].fill(0xFF);
        }
        MapperKind::Std2k => {
            ram.copy_within(0..6144, 6144);
            ram[..6144].fill(0xFF);
        }
        // Mirrored into both halves so the Phoenix loop serves one image.
        MapperKind::Blizzard4k => {
            ram.copy_within(0..4096, 4096);
        }
        _ => {}
    }

    info!("loaded {path}: {cart_type:?}, {size} bytes");
    Ok(cart_type)
}
