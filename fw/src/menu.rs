// Copyright (c) 2025 Robin Edwards
//
// MIT licence

//! The menu-side command dispatcher.
//!
//! Alternates between two worlds: the boot-ROM bus loop (which owns the
//! machine while the 6502 executes) and the command handlers here (which
//! own it while the 6502 spins on the ready marker).  The shared RAM buffer
//! holds whichever of the three payloads the current state needs - a
//! directory listing, a cartridge image or an XEX payload - and the
//! register bank carries parameters in and results out.

use alloc::string::String;

use a8pico_cart::{
    AtrSession, CART_RAM_SIZE, DirEntry, MapperKind, MenuError, load_file, read_directory,
    search_directory,
};
use a8pico_flashfs::{NullTime, mkfs};
use a8pico_protocol::{BANK_SIZE, Command, open_status};
use embedded_sdmmc::VolumeManager;
use log::warn;

use crate::flash::PicoDisk;
use crate::rom::{MENU_ROM_SIZE, OS_ROM_SIZE};
use crate::{bootrom, mapper};

pub struct Menu<'a, 'd> {
    disk: &'a PicoDisk<'d>,
    ram: &'a mut [u8; CART_RAM_SIZE],
    bank: [u8; BANK_SIZE],
    atr: AtrSession<&'a PicoDisk<'d>, NullTime>,
    cur_path: String,
    /// Full path of the last opened file, for activation.
    path: String,
    cart_type: Option<MapperKind>,
    atr_mode: bool,
}

impl<'a, 'd> Menu<'a, 'd> {
    pub fn new(disk: &'a PicoDisk<'d>, ram: &'a mut [u8; CART_RAM_SIZE]) -> Self {
        Self {
            disk,
            ram,
            bank: [0; BANK_SIZE],
            atr: AtrSession::new(VolumeManager::new(disk, NullTime)),
            cur_path: String::new(),
            path: String::new(),
            cart_type: None,
            atr_mode: false,
        }
    }

    /// Serve the menu until the host activates a cartridge; never returns.
    pub fn run(
        mut self,
        menu_rom: &'static [u8; MENU_ROM_SIZE],
        os_rom: &'static [u8; OS_ROM_SIZE],
    ) -> ! {
        loop {
            let cmd = bootrom::serve(&mut self.bank, menu_rom, self.atr_mode);
            match Command::from_byte(cmd) {
                Some(Command::OpenItem) => self.open_item(),
                Some(Command::ReadCurDir) => self.read_cur_dir(),
                Some(Command::GetDirEntry) => self.get_dir_entry(),
                Some(Command::UpDir) => {
                    if let Some(at) = self.cur_path.rfind('/') {
                        self.cur_path.truncate(at);
                    } else {
                        self.cur_path.clear();
                    }
                }
                Some(Command::RootDir) => self.cur_path.clear(),
                Some(Command::Search) => self.search(),
                Some(Command::LoadSoftOs) => self.load_soft_os(os_rom),
                Some(Command::SoftOsChunk) => self.soft_os_chunk(),
                Some(Command::ReadAtrSector) => self.read_atr_sector(),
                Some(Command::WriteAtrSector) => self.write_atr_sector(),
                Some(Command::AtrHeader) => self.atr_header(),
                Some(Command::ResetFlash) => self.reset_flash(),
                Some(Command::NoCart) => self.cart_type = None,
                Some(Command::ActivateCart) => self.activate(),
                None => warn!("unknown command {cmd:#04X}"),
            }
        }
    }

    /// NUL-terminated message into the bank at `at`.
    fn put_str(&mut self, at: usize, s: &str) {
        let n = s.len().min(BANK_SIZE - at - 1);
        self.bank[at..at + n].copy_from_slice(&s.as_bytes()[..n]);
        self.bank[at + n] = 0;
    }

    fn put_error(&mut self, e: MenuError) {
        self.bank[0x01] = 1;
        self.put_str(0x02, e.message());
    }

    fn open_item(&mut self) {
        let n = self.bank[0x00] as usize;
        let entry = DirEntry::parse(self.ram, n);
        if entry.is_dir {
            self.cur_path.push('/');
            self.cur_path.push_str(entry.short_name());
            self.bank[0x01] = open_status::PATH_CHANGED;
            return;
        }

        // Search results carry their own directory; plain listings are
        // relative to the current one.
        self.path.clear();
        if entry.full_path().is_empty() {
            self.path.push_str(&self.cur_path);
        } else {
            self.path.push_str(entry.full_path());
        }
        self.path.push('/');
        self.path.push_str(entry.short_name());

        if entry.short_name().len() >= 4
            && entry.short_name()[entry.short_name().len() - 4..].eq_ignore_ascii_case(".ATR")
        {
            self.cart_type = Some(MapperKind::Atr);
            self.bank[0x01] = open_status::ATR_SELECTED;
            return;
        }

        let volume_mgr = VolumeManager::new(self.disk, NullTime);
        match load_file(&volume_mgr, &self.path, self.ram) {
            Ok(kind) => {
                self.cart_type = Some(kind);
                self.bank[0x01] = if kind == MapperKind::Xex {
                    open_status::XEX_LOADED
                } else {
                    open_status::CART_LOADED
                };
            }
            Err(e) => {
                self.cart_type = None;
                self.bank[0x01] = open_status::ERROR;
                self.put_str(0x02, e.message());
            }
        }
    }

    fn read_cur_dir(&mut self) {
        let volume_mgr = VolumeManager::new(self.disk, NullTime);
        match read_directory(&volume_mgr, &self.cur_path, self.ram) {
            Ok(count) => {
                self.bank[0x01] = 0;
                self.bank[0x02] = count as u8;
            }
            Err(e) => self.put_error(e),
        }
    }

    fn get_dir_entry(&mut self) {
        let n = self.bank[0x00] as usize;
        let entry = DirEntry::parse(self.ram, n);
        self.bank[0x01] = entry.is_dir as u8;
        self.put_str(0x02, entry.long_name());
    }

    fn search(&mut self) {
        let needle_end = self.bank[..0x20]
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(0x20);
        let needle = match core::str::from_utf8(&self.bank[..needle_end]) {
            Ok(s) => String::from(s),
            Err(_) => String::new(),
        };
        let volume_mgr = VolumeManager::new(self.disk, NullTime);
        match search_directory(&volume_mgr, &self.cur_path, &needle, self.ram) {
            Ok(count) => {
                self.bank[0x01] = 0;
                self.bank[0x02] = count as u8;
            }
            Err(e) => self.put_error(e),
        }
    }

    fn load_soft_os(&mut self, os_rom: &[u8; OS_ROM_SIZE]) {
        let volume_mgr = VolumeManager::new(self.disk, NullTime);
        if load_file(&volume_mgr, "UNO_OS.ROM", self.ram).is_err() {
            // No soft OS on the drive; fall back to the built-in image.
            self.ram[..OS_ROM_SIZE].copy_from_slice(os_rom);
        }
        self.bank[0x01] = 0;
    }

    fn soft_os_chunk(&mut self) {
        let n = self.bank[0x00] as usize;
        let chunk = &self.ram[n * 128..n * 128 + 128];
        self.bank[0x01..0x81].copy_from_slice(chunk);
    }

    fn read_atr_sector(&mut self) {
        let sector = u16::from_le_bytes([self.bank[0x01], self.bank[0x02]]);
        let page = self.bank[0x03];
        let mut data = [0u8; 128];
        match self.atr.read_sector(sector, page, &mut data) {
            Ok(()) => {
                self.bank[0x01] = 0;
                self.bank[0x02..0x82].copy_from_slice(&data);
            }
            Err(e) => self.bank[0x01] = e as u8,
        }
    }

    fn write_atr_sector(&mut self) {
        let sector = u16::from_le_bytes([self.bank[0x01], self.bank[0x02]]);
        let page = self.bank[0x03];
        let mut data = [0u8; 128];
        data.copy_from_slice(&self.bank[0x04..0x84]);
        self.bank[0x01] = match self.atr.write_sector(sector, page, &data) {
            Ok(()) => 0,
            Err(e) => e as u8,
        };
    }

    fn atr_header(&mut self) {
        match self.atr.header() {
            Some(header) => {
                let raw = header.to_bytes();
                self.bank[0x02..0x12].copy_from_slice(&raw);
                self.bank[0x01] = 0;
            }
            None => self.bank[0x01] = 1,
        }
    }

    /// Re-create the flash filesystem (boot with the joystick fire button
    /// held down).
    fn reset_flash(&mut self) {
        self.atr.unmount();
        if self.disk.create().is_err() {
            warn!("flash reset failed");
            return;
        }
        let _ = mkfs::format(self.disk);
        let _ = mkfs::write_welcome(self.disk);
        let _ = self.disk.sync();
    }

    fn activate(&mut self) {
        if self.cart_type == Some(MapperKind::Atr) {
            self.atr_mode = true;
            match self.atr.mount(&self.path) {
                Ok(header) => {
                    let raw = header.to_bytes();
                    self.bank[0x02..0x12].copy_from_slice(&raw);
                    self.bank[0x01] = 0;
                }
                Err(e) => self.bank[0x01] = e as u8,
            }
            // Stay in the menu loop: the OS boots from the disk image and
            // keeps issuing ATR sector commands.
            return;
        }
        mapper::activate(self.cart_type, self.ram);
    }
}
