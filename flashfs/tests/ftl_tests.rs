// Copyright (c) 2025 Robin Edwards
//
// MIT License

//! Translation-layer behaviour against the simulated flash: round trips,
//! copy-on-write, dirty tracking, and allocator reclaim.

use a8pico_flashfs::sim::SimFlash;
use a8pico_flashfs::{
    BLOCK_SIZE, Error, FlashFs, FsBuffers, MAP_SECTORS, NUM_FAT_SECTORS, NUM_FLASH_SECTORS,
};

fn block(tag: u8) -> [u8; BLOCK_SIZE] {
    [tag; BLOCK_SIZE]
}

/// A recognisable, distinct payload per (logical, generation).
fn pattern(logical: u16, generation: u8) -> [u8; BLOCK_SIZE] {
    let mut buf = [0u8; BLOCK_SIZE];
    for (i, b) in buf.iter_mut().enumerate() {
        *b = (logical as usize)
            .wrapping_add(i)
            .wrapping_mul(31)
            .wrapping_add(generation as usize) as u8;
    }
    buf
}

/// Power-cycle: serialise nothing extra, just rebuild from the flash image.
fn remount<'a>(fs: FlashFs<'_, SimFlash>, bufs: &'a mut FsBuffers) -> FlashFs<'a, SimFlash> {
    let flash = fs.release();
    let mut fs = FlashFs::new(flash, bufs);
    fs.mount().expect("remount");
    fs
}

#[test]
fn fresh_flash_needs_create() {
    let mut bufs = FsBuffers::new();
    let mut fs = FlashFs::new(SimFlash::new(), &mut bufs);

    assert_eq!(fs.mount().unwrap_err(), Error::NoMagic);
    fs.create().unwrap();
    fs.mount().unwrap();

    let mut out = [0xAAu8; BLOCK_SIZE];
    fs.read_sector(0, &mut out).unwrap();
    assert_eq!(out, [0u8; BLOCK_SIZE]);
}

#[test]
fn sparse_writes_survive_a_power_cycle() {
    let mut bufs = FsBuffers::new();
    let mut fs = FlashFs::new(SimFlash::new(), &mut bufs);
    fs.create().unwrap();

    fs.write_sector(17, &block(0xAB)).unwrap();
    fs.write_sector(2000, &block(0xCD)).unwrap();
    fs.sync().unwrap();

    let mut bufs2 = FsBuffers::new();
    let mut fs = remount(fs, &mut bufs2);

    let mut out = [0u8; BLOCK_SIZE];
    fs.read_sector(17, &mut out).unwrap();
    assert_eq!(out, block(0xAB));
    fs.read_sector(2000, &mut out).unwrap();
    assert_eq!(out, block(0xCD));
    fs.read_sector(42, &mut out).unwrap();
    assert_eq!(out, [0u8; BLOCK_SIZE]);
}

#[test]
fn last_write_wins_over_random_sequence() {
    let mut bufs = FsBuffers::new();
    let mut fs = FlashFs::new(SimFlash::new(), &mut bufs);
    fs.create().unwrap();

    // Deterministic pseudo-random walk over a small set of sectors, with
    // plenty of rewrites.
    let mut seed = 0x2F6E_2B1Eu32;
    let mut generation = [0u8; 64];
    for _ in 0..1000 {
        seed = seed.wrapping_mul(1664525).wrapping_add(1013904223);
        let l = (seed >> 16) as u16 % 64;
        generation[l as usize] = generation[l as usize].wrapping_add(1);
        fs.write_sector(l * 97, &pattern(l * 97, generation[l as usize]))
            .unwrap();
    }

    let mut out = [0u8; BLOCK_SIZE];
    for l in 0..64u16 {
        fs.read_sector(l * 97, &mut out).unwrap();
        if generation[l as usize] == 0 {
            assert_eq!(out, [0u8; BLOCK_SIZE], "sector {} never written", l * 97);
        } else {
            assert_eq!(out, pattern(l * 97, generation[l as usize]), "sector {}", l * 97);
        }
    }
}

#[test]
fn bitmap_matches_map_after_remount() {
    let mut bufs = FsBuffers::new();
    let mut fs = FlashFs::new(SimFlash::new(), &mut bufs);
    fs.create().unwrap();

    for l in (0..NUM_FAT_SECTORS as u16).step_by(311) {
        fs.write_sector(l, &pattern(l, 1)).unwrap();
    }
    // Rewrites release slots; the rebuilt bitmap must not resurrect them.
    for l in (0..NUM_FAT_SECTORS as u16).step_by(622) {
        fs.write_sector(l, &pattern(l, 2)).unwrap();
    }
    fs.sync().unwrap();

    let mut bufs2 = FsBuffers::new();
    let fs = remount(fs, &mut bufs2);

    let mut expected = vec![0u8; NUM_FLASH_SECTORS];
    expected[..MAP_SECTORS].fill(0xFF);
    for l in 0..NUM_FAT_SECTORS as u16 {
        if let Some((phys, slot)) = fs.location_of(l) {
            expected[phys as usize] |= 1 << slot;
        }
    }
    for sector in 0..NUM_FLASH_SECTORS as u16 {
        for slot in 0..8u8 {
            assert_eq!(
                fs.slot_referenced(sector, slot),
                expected[sector as usize] & (1 << slot) != 0,
                "sector {sector} slot {slot}"
            );
        }
    }
}

#[test]
fn rewrite_releases_old_slot_but_preserves_bytes() {
    let mut bufs = FsBuffers::new();
    let mut fs = FlashFs::new(SimFlash::new(), &mut bufs);
    fs.create().unwrap();

    let old = pattern(9, 1);
    fs.write_sector(9, &old).unwrap();
    let (phys, slot) = fs.location_of(9).unwrap();
    assert!(fs.slot_referenced(phys, slot));

    fs.write_sector(9, &pattern(9, 2)).unwrap();
    let moved = fs.location_of(9).unwrap();
    assert_ne!(moved, (phys, slot));
    assert!(!fs.slot_referenced(phys, slot));

    let mut out = [0u8; BLOCK_SIZE];
    fs.read_sector(9, &mut out).unwrap();
    assert_eq!(out, pattern(9, 2));

    // The stale copy stays on flash until the allocator reclaims the
    // physical sector.
    let flash = fs.release();
    let at = slot as usize * BLOCK_SIZE;
    assert_eq!(&flash.sector(phys)[at..at + BLOCK_SIZE], &old);
}

#[test]
fn one_write_dirties_exactly_one_map_sector() {
    let mut bufs = FsBuffers::new();
    let mut fs = FlashFs::new(SimFlash::new(), &mut bufs);
    fs.create().unwrap();
    assert_eq!(fs.dirty_mask(), 0);

    // Entry split: map sector 0 holds logicals 0..2044, then 2048 per
    // sector.
    for (logical, expect) in [(0u16, 0usize), (2043, 0), (2044, 1), (2044 + 2048, 2), (30_715, 14)] {
        fs.write_sector(logical, &block(0x5A)).unwrap();
        assert_eq!(fs.dirty_mask(), 1 << expect, "logical {logical}");
        fs.sync().unwrap();
        assert_eq!(fs.dirty_mask(), 0);
    }
}

#[test]
fn unsynced_map_changes_roll_back_on_power_loss() {
    let mut bufs = FsBuffers::new();
    let mut fs = FlashFs::new(SimFlash::new(), &mut bufs);
    fs.create().unwrap();

    fs.write_sector(5, &block(0x11)).unwrap();
    fs.sync().unwrap();
    fs.write_sector(5, &block(0x22)).unwrap();
    assert!(fs.is_dirty());
    // No sync - power is lost here.

    let mut bufs2 = FsBuffers::new();
    let mut fs = remount(fs, &mut bufs2);
    let mut out = [0u8; BLOCK_SIZE];
    fs.read_sector(5, &mut out).unwrap();
    assert_eq!(out, block(0x11));
}

#[test]
fn allocator_reclaims_partial_sectors_without_losing_live_data() {
    let mut bufs = FsBuffers::new();
    let mut fs = FlashFs::new(SimFlash::new(), &mut bufs);
    fs.create().unwrap();

    // Fill the first data sector (physical 15) with logicals 0..8.
    for l in 0..8u16 {
        fs.write_sector(l, &pattern(l, 1)).unwrap();
        assert_eq!(fs.location_of(l), Some((15, l as u8)));
    }

    // Move half of them elsewhere, leaving sector 15 half-live.  They land
    // on a fresh sector (16), taking four of its slots.
    for l in 0..4u16 {
        fs.write_sector(l, &pattern(l, 2)).unwrap();
        assert_eq!(fs.location_of(l).unwrap().0, 16);
    }

    // Exhaust the remaining slots of 16 and every fully-free sector, so the
    // allocator has to fall back to erase-with-copy on the half-live one.
    let mut logical = 8u16;
    for _ in 0..(NUM_FLASH_SECTORS - MAP_SECTORS - 2) * 8 + 4 {
        fs.write_sector(logical, &pattern(logical, 1)).unwrap();
        logical += 1;
    }
    assert_ne!(fs.location_of(logical - 1).unwrap().0, 15);

    // This one forces the reclaim.
    fs.write_sector(30_600, &pattern(30_600, 7)).unwrap();
    assert_eq!(fs.location_of(30_600), Some((15, 0)));

    // The four logicals still living on sector 15 survived the copy.
    let mut out = [0u8; BLOCK_SIZE];
    for l in 4..8u16 {
        assert_eq!(fs.location_of(l), Some((15, l as u8)));
        fs.read_sector(l, &mut out).unwrap();
        assert_eq!(out, pattern(l, 1), "logical {l} lost in reclaim");
    }

    let flash = fs.release();
    // Opened once at the start, erased once more for the copy.
    assert_eq!(flash.erase_count(15), 2);
}

#[test]
fn out_of_range_sectors_are_rejected() {
    let mut bufs = FsBuffers::new();
    let mut fs = FlashFs::new(SimFlash::new(), &mut bufs);
    fs.create().unwrap();

    let mut out = [0u8; BLOCK_SIZE];
    assert!(matches!(
        fs.read_sector(NUM_FAT_SECTORS as u16, &mut out),
        Err(Error::OutOfRange { .. })
    ));
    assert!(matches!(
        fs.write_sector(NUM_FAT_SECTORS as u16, &block(0)),
        Err(Error::OutOfRange { .. })
    ));
}

#[test]
fn verify_catches_stuck_bits() {
    let mut bufs = FsBuffers::new();
    let mut flash = SimFlash::new();
    // First data slot the allocator will hand out: physical 15, slot 0.
    flash.stick_byte(15, 3);
    let mut fs = FlashFs::new(flash, &mut bufs);
    fs.create().unwrap();

    let data = block(0xA5);
    fs.write_sector(100, &data).unwrap();
    assert!(!fs.verify_sector(100, &data).unwrap());
    assert!(fs.verify_sector(101, &block(0)).unwrap());
}
