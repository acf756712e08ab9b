// Copyright (c) 2025 Robin Edwards
//
// MIT licence

//! Built-in binary assets.

pub const MENU_ROM_SIZE: usize = 8192;
pub const OS_ROM_SIZE: usize = 16384;

/// The 6502 menu program, served at S5 while the command channel runs.
/// Built separately from the 6502 sources; keep in step with
/// `a8pico-protocol`.
pub static MENU_ROM: &[u8; MENU_ROM_SIZE] = include_bytes!("../data/menu.rom");

/// Fallback patched OS image for `LOAD_SOFT_OS` when `UNO_OS.ROM` is not on
/// the drive.
pub static OS_ROM: &[u8; OS_ROM_SIZE] = include_bytes!("../data/os.rom");
