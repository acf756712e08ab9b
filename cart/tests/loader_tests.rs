// Copyright (c) 2025 Robin Edwards
//
// MIT License

//! Image-loader behaviour against a real FAT volume on simulated flash.

use a8pico_cart::{CART_RAM_SIZE, MapperKind, MenuError, load_file};
use a8pico_flashfs::sim::SimFlash;
use a8pico_flashfs::{FlashDisk, FlashFs, FsBuffers, NullTime, mkfs};
use embedded_sdmmc::{Mode, VolumeIdx, VolumeManager};

fn fat_disk(bufs: &mut FsBuffers) -> FlashDisk<'_, SimFlash> {
    let disk = FlashDisk::new(FlashFs::new(SimFlash::new(), bufs));
    disk.create().unwrap();
    mkfs::format(&disk).unwrap();
    disk
}

fn put_file(disk: &FlashDisk<SimFlash>, dir_path: &str, name: &str, contents: &[u8]) {
    let mut volume_mgr = VolumeManager::new(disk, NullTime);
    let mut volume = volume_mgr.open_volume(VolumeIdx(0)).unwrap();
    let mut dir = volume.open_root_dir().unwrap();
    for seg in dir_path.split('/').filter(|s| !s.is_empty()) {
        if dir.find_directory_entry(seg).is_err() {
            dir.make_dir_in_dir(seg).unwrap();
        }
        dir.change_dir(seg).unwrap();
    }
    let mut file = dir.open_file_in_dir(name, Mode::ReadWriteCreate).unwrap();
    file.write(contents).unwrap();
    file.flush().unwrap();
}

fn car_image(car_type: u8, body: &[u8]) -> Vec<u8> {
    let mut image = vec![0u8; 16];
    image[0..4].copy_from_slice(b"CART");
    image[7] = car_type;
    image.extend_from_slice(body);
    image
}

fn ram_buffer() -> Box<[u8; CART_RAM_SIZE]> {
    vec![0u8; CART_RAM_SIZE].into_boxed_slice().try_into().unwrap()
}

fn body(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 + 3) as u8).collect()
}

#[test]
fn car_header_selects_the_mapper() {
    let mut bufs = FsBuffers::new();
    let disk = fat_disk(&mut bufs);
    let body = body(32768);
    put_file(&disk, "", "XEGS.CAR", &car_image(12, &body));

    let mut volume_mgr = VolumeManager::new(&disk, NullTime);
    let mut ram = ram_buffer();
    let kind = load_file(&mut volume_mgr, "XEGS.CAR", &mut ram).unwrap();
    assert_eq!(kind, MapperKind::Xegs32k);
    assert_eq!(ram[0], body[0]);
    assert_eq!(ram[32767], body[32767]);
}

#[test]
fn car_body_must_match_its_type_size() {
    let mut bufs = FsBuffers::new();
    let disk = fat_disk(&mut bufs);
    put_file(&disk, "", "SHORT.CAR", &car_image(12, &body(16384)));

    let mut volume_mgr = VolumeManager::new(&disk, NullTime);
    let mut ram = ram_buffer();
    let err = load_file(&mut volume_mgr, "SHORT.CAR", &mut ram).unwrap_err();
    assert_eq!(err, MenuError::WrongCarSize);
    assert_eq!(err.message(), "CAR file is wrong size");
}

#[test]
fn unknown_car_types_are_refused() {
    let mut bufs = FsBuffers::new();
    let disk = fat_disk(&mut bufs);
    put_file(&disk, "", "ODD.CAR", &car_image(4, &body(8192)));

    let mut volume_mgr = VolumeManager::new(&disk, NullTime);
    let mut ram = ram_buffer();
    assert_eq!(
        load_file(&mut volume_mgr, "ODD.CAR", &mut ram),
        Err(MenuError::UnsupportedCarType)
    );
}

#[test]
fn truncated_car_header_is_an_error() {
    let mut bufs = FsBuffers::new();
    let disk = fat_disk(&mut bufs);
    put_file(&disk, "", "STUB.CAR", &[0x43, 0x41]);

    let mut volume_mgr = VolumeManager::new(&disk, NullTime);
    let mut ram = ram_buffer();
    assert_eq!(
        load_file(&mut volume_mgr, "STUB.CAR", &mut ram),
        Err(MenuError::BadCarHeader)
    );
}

#[test]
fn xex_gets_a_length_prefix() {
    let mut bufs = FsBuffers::new();
    let disk = fat_disk(&mut bufs);
    let payload = body(5000);
    put_file(&disk, "", "DEMO.XEX", &payload);

    let mut volume_mgr = VolumeManager::new(&disk, NullTime);
    let mut ram = ram_buffer();
    let kind = load_file(&mut volume_mgr, "DEMO.XEX", &mut ram).unwrap();
    assert_eq!(kind, MapperKind::Xex);
    // 5000 = 0x1388, little-endian, high byte forced zero.
    assert_eq!(&ram[0..4], &[0x88, 0x13, 0x00, 0x00]);
    assert_eq!(ram[4], payload[0]);
    assert_eq!(ram[4 + 4999], payload[4999]);
}

#[test]
fn raw_roms_are_guessed_by_size() {
    let mut bufs = FsBuffers::new();
    let disk = fat_disk(&mut bufs);
    put_file(&disk, "", "PLAIN.ROM", &body(16384));
    put_file(&disk, "", "WEIRD.ROM", &body(12345));

    let mut volume_mgr = VolumeManager::new(&disk, NullTime);
    let mut ram = ram_buffer();
    assert_eq!(
        load_file(&mut volume_mgr, "PLAIN.ROM", &mut ram),
        Ok(MapperKind::Std16k)
    );
    assert_eq!(
        load_file(&mut volume_mgr, "WEIRD.ROM", &mut ram),
        Err(MenuError::UnsupportedRomSize)
    );
}

#[test]
fn payloads_over_128k_are_refused() {
    let mut bufs = FsBuffers::new();
    let disk = fat_disk(&mut bufs);
    put_file(&disk, "", "HUGE.ROM", &vec![0x55u8; CART_RAM_SIZE + 1]);

    let mut volume_mgr = VolumeManager::new(&disk, NullTime);
    let mut ram = ram_buffer();
    assert_eq!(
        load_file(&mut volume_mgr, "HUGE.ROM", &mut ram),
        Err(MenuError::TooBig)
    );
}

#[test]
fn small_standard_carts_relocate_to_the_top_of_the_window() {
    let mut bufs = FsBuffers::new();
    let disk = fat_disk(&mut bufs);
    let body4k = body(4096);
    let body2k = body(2048);
    put_file(&disk, "", "TINY4.CAR", &car_image(58, &body4k));
    put_file(&disk, "", "TINY2.CAR", &car_image(57, &body2k));
    put_file(&disk, "", "BLIZZ.CAR", &car_image(46, &body4k));

    let mut volume_mgr = VolumeManager::new(&disk, NullTime);
    let mut ram = ram_buffer();

    assert_eq!(
        load_file(&mut volume_mgr, "TINY4.CAR", &mut ram),
        Ok(MapperKind::Std4k)
    );
    assert!(ram[..4096].iter().all(|b| *b == 0xFF));
    assert_eq!(ram[4096], body4k[0]);
    assert_eq!(ram[8191], body4k[4095]);

    assert_eq!(
        load_file(&mut volume_mgr, "TINY2.CAR", &mut ram),
        Ok(MapperKind::Std2k)
    );
    assert!(ram[..6144].iter().all(|b| *b == 0xFF));
    assert_eq!(ram[6144], body2k[0]);

    // Blizzard 4K is mirrored, not relocated.
    assert_eq!(
        load_file(&mut volume_mgr, "BLIZZ.CAR", &mut ram),
        Ok(MapperKind::Blizzard4k)
    );
    assert_eq!(ram[0], body4k[0]);
    assert_eq!(ram[4096], body4k[0]);
    assert_eq!(ram[8191], body4k[4095]);
}

#[test]
fn files_load_from_subdirectories() {
    let mut bufs = FsBuffers::new();
    let disk = fat_disk(&mut bufs);
    put_file(&disk, "GAMES/CLASSIC", "A.ROM", &body(8192));

    let mut volume_mgr = VolumeManager::new(&disk, NullTime);
    let mut ram = ram_buffer();
    assert_eq!(
        load_file(&mut volume_mgr, "GAMES/CLASSIC/A.ROM", &mut ram),
        Ok(MapperKind::Std8k)
    );
    assert_eq!(
        load_file(&mut volume_mgr, "GAMES/MISSING.ROM", &mut ram),
        Err(MenuError::OpenFailed)
    );
}
