// Copyright (c) 2025 Robin Edwards
//
// MIT License

//! ATR session behaviour: mounting, the mixed sector-size offset rule, and
//! page I/O at the edges of the image.

use a8pico_cart::{AtrError, AtrIoError, AtrSession};
use a8pico_flashfs::sim::SimFlash;
use a8pico_flashfs::{FlashDisk, FlashFs, FsBuffers, NullTime, mkfs};
use embedded_sdmmc::{Mode, VolumeIdx, VolumeManager};

fn fat_disk(bufs: &mut FsBuffers) -> FlashDisk<'_, SimFlash> {
    let disk = FlashDisk::new(FlashFs::new(SimFlash::new(), bufs));
    disk.create().unwrap();
    mkfs::format(&disk).unwrap();
    disk
}

fn put_file(disk: &FlashDisk<SimFlash>, name: &str, contents: &[u8]) {
    let volume_mgr = VolumeManager::new(disk, NullTime);
    let volume = volume_mgr.open_volume(VolumeIdx(0)).unwrap();
    let root = volume.open_root_dir().unwrap();
    let mut file = root.open_file_in_dir(name, Mode::ReadWriteCreate).unwrap();
    file.write(contents).unwrap();
    file.flush().unwrap();
}

/// A valid single-density image: `sectors` 128 byte sectors, each filled
/// with its own sector number.
fn atr_image(sectors: u16, sector_size: u16) -> Vec<u8> {
    let mut image = vec![0u8; 16];
    image[0..2].copy_from_slice(&0x0296u16.to_le_bytes());
    image[4..6].copy_from_slice(&sector_size.to_le_bytes());
    for s in 1..=sectors {
        image.extend(std::iter::repeat(s as u8).take(128));
    }
    image
}

#[test]
fn mount_validates_the_header() {
    let mut bufs = FsBuffers::new();
    let disk = fat_disk(&mut bufs);
    put_file(&disk, "GOOD.ATR", &atr_image(16, 128));
    put_file(&disk, "BAD.ATR", &[0u8; 400]);
    put_file(&disk, "TINY.ATR", &[0x96, 0x02]);

    let mut session = AtrSession::new(VolumeManager::new(&disk, NullTime));
    assert_eq!(session.mount("MISSING.ATR").unwrap_err(), AtrError::NotFound);
    assert_eq!(session.mount("BAD.ATR").unwrap_err(), AtrError::BadImage);
    assert_eq!(session.mount("TINY.ATR").unwrap_err(), AtrError::BadImage);

    let header = session.mount("GOOD.ATR").unwrap();
    assert_eq!(header.signature, 0x0296);
    assert_eq!(header.sector_size, 128);
    assert_eq!(session.path(), Some("GOOD.ATR"));
}

#[test]
fn io_without_a_mount_is_refused() {
    let mut bufs = FsBuffers::new();
    let disk = fat_disk(&mut bufs);
    let mut session = AtrSession::new(VolumeManager::new(&disk, NullTime));
    let mut page = [0u8; 128];
    assert_eq!(
        session.read_sector(1, 0, &mut page),
        Err(AtrIoError::NotMounted)
    );
    assert_eq!(
        session.write_sector(1, 0, &page),
        Err(AtrIoError::NotMounted)
    );
}

#[test]
fn sector_zero_is_invalid() {
    let mut bufs = FsBuffers::new();
    let disk = fat_disk(&mut bufs);
    put_file(&disk, "DISK.ATR", &atr_image(16, 128));
    let mut session = AtrSession::new(VolumeManager::new(&disk, NullTime));
    session.mount("DISK.ATR").unwrap();

    let mut page = [0u8; 128];
    assert_eq!(
        session.read_sector(0, 0, &mut page),
        Err(AtrIoError::BadSector)
    );
    assert_eq!(session.write_sector(0, 0, &page), Err(AtrIoError::BadSector));
}

#[test]
fn pages_round_trip_and_land_at_the_right_offsets() {
    let mut bufs = FsBuffers::new();
    let disk = fat_disk(&mut bufs);
    put_file(&disk, "DISK.ATR", &atr_image(32, 128));
    let mut session = AtrSession::new(VolumeManager::new(&disk, NullTime));
    session.mount("DISK.ATR").unwrap();

    let mut page = [0u8; 128];
    session.read_sector(1, 0, &mut page).unwrap();
    assert!(page.iter().all(|b| *b == 1));
    session.read_sector(20, 0, &mut page).unwrap();
    assert!(page.iter().all(|b| *b == 20));

    let fresh = [0xE7u8; 128];
    session.write_sector(5, 0, &fresh).unwrap();
    session.read_sector(5, 0, &mut page).unwrap();
    assert_eq!(page, fresh);
    // Neighbours untouched.
    session.read_sector(4, 0, &mut page).unwrap();
    assert!(page.iter().all(|b| *b == 4));
    session.read_sector(6, 0, &mut page).unwrap();
    assert!(page.iter().all(|b| *b == 6));
}

#[test]
fn double_density_pages_split_large_sectors() {
    let mut bufs = FsBuffers::new();
    let disk = fat_disk(&mut bufs);
    // Boot sectors stay 128 bytes; from sector 4 each is 256 bytes.  Build
    // the image by hand so each half-sector is distinguishable.
    let mut image = vec![0u8; 16];
    image[0..2].copy_from_slice(&0x0296u16.to_le_bytes());
    image[4..6].copy_from_slice(&256u16.to_le_bytes());
    for s in 1..=3u8 {
        image.extend(std::iter::repeat(s).take(128));
    }
    for s in 4..=8u8 {
        image.extend(std::iter::repeat(s * 2).take(128));
        image.extend(std::iter::repeat(s * 2 + 1).take(128));
    }
    put_file(&disk, "DD.ATR", &image);

    let mut session = AtrSession::new(VolumeManager::new(&disk, NullTime));
    session.mount("DD.ATR").unwrap();

    let mut page = [0u8; 128];
    session.read_sector(3, 0, &mut page).unwrap();
    assert!(page.iter().all(|b| *b == 3));
    session.read_sector(4, 0, &mut page).unwrap();
    assert!(page.iter().all(|b| *b == 8));
    session.read_sector(4, 1, &mut page).unwrap();
    assert!(page.iter().all(|b| *b == 9));
    session.read_sector(6, 1, &mut page).unwrap();
    assert!(page.iter().all(|b| *b == 13));
}

#[test]
fn past_the_end_reads_zeros_but_refuses_writes() {
    let mut bufs = FsBuffers::new();
    let disk = fat_disk(&mut bufs);
    put_file(&disk, "DISK.ATR", &atr_image(8, 128));
    let mut session = AtrSession::new(VolumeManager::new(&disk, NullTime));
    session.mount("DISK.ATR").unwrap();

    let mut page = [0xAAu8; 128];
    session.read_sector(100, 0, &mut page).unwrap();
    assert_eq!(page, [0u8; 128]);
    assert_eq!(
        session.write_sector(100, 0, &page),
        Err(AtrIoError::BadSector)
    );
}

#[test]
fn remount_replaces_the_previous_image() {
    let mut bufs = FsBuffers::new();
    let disk = fat_disk(&mut bufs);
    put_file(&disk, "ONE.ATR", &atr_image(8, 128));
    put_file(&disk, "TWO.ATR", &atr_image(8, 256));

    let mut session = AtrSession::new(VolumeManager::new(&disk, NullTime));
    session.mount("ONE.ATR").unwrap();
    assert_eq!(session.header().unwrap().sector_size, 128);

    // The old handle is closed, not leaked; repeated remounts would
    // otherwise exhaust the FAT library's handle table.
    for _ in 0..16 {
        session.mount("TWO.ATR").unwrap();
        session.mount("ONE.ATR").unwrap();
    }
    assert_eq!(session.header().unwrap().sector_size, 128);
    assert_eq!(session.path(), Some("ONE.ATR"));
}
