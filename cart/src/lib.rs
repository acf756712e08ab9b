// Copyright (c) 2025 Robin Edwards
//
// MIT License

//! Cartridge-side services for the A8 Pico Cart menu: loading cartridge
//! images into the shared RAM buffer, serving mounted ATR disk images, and
//! building the directory listings the menu ROM pages through.
//!
//! Everything here runs on the menu path: the host 6502 is parked in RAM
//! waiting for the command channel, so these routines are free to walk the
//! FAT volume and block on flash.  None of it is reachable once a mapper
//! loop owns the bus.

#![no_std]

extern crate alloc;

mod atr;
mod dir;
mod error;
mod loader;
mod path;
mod types;

pub use atr::{ATR_HEADER_SIZE, AtrError, AtrHeader, AtrIoError, AtrSession, sector_offset};
pub use dir::{DIR_ENTRY_SIZE, DirEntry, MAX_DIR_ENTRIES, read_directory, search_directory};
pub use error::MenuError;
pub use loader::{CART_RAM_SIZE, load_file};
pub use types::MapperKind;
