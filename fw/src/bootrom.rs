// Copyright (c) 2025 Robin Edwards
//
// MIT licence

//! The boot-ROM bus loop behind the menu.
//!
//! While the menu 6502 program runs, the cartridge serves two things on the
//! bus: the menu ROM itself at S5, and the 256 byte command-channel register
//! bank at CCTL.  The host parks itself in RAM, writes parameters into the
//! bank, then writes the command byte to `$D5DF`; that write ends this loop
//! and hands the byte to the dispatcher.  When the dispatcher is done it
//! re-enters here, which re-arms `[0x00]` with the ready marker the host is
//! polling for.

use a8pico_protocol::{BANK_SIZE, CMD_STROBE, STATUS_READY};

use crate::bus;
use crate::bus::{ADDR_MASK, CCTL_MASK, PHI2_MASK, RW_MASK, S5_MASK};
use crate::rom::MENU_ROM_SIZE;

/// Serve the bus until the host strobes a command; returns the command
/// byte.  In ATR mode RD5 stays low - the OS boots from the disk image, not
/// from cartridge ROM.
#[inline(never)]
#[link_section = ".data.ram_func"]
pub fn serve(bank: &mut [u8; BANK_SIZE], menu_rom: &[u8; MENU_ROM_SIZE], atr_mode: bool) -> u8 {
    if atr_mode {
        bus::rd5_low();
    } else {
        bus::rd5_high();
    }
    bus::rd4_low();

    // signal that we are here
    bank[0] = STATUS_READY;

    loop {
        let mut pins = bus::pins();
        while pins & PHI2_MASK == 0 {
            pins = bus::pins();
        }

        if pins & CCTL_MASK == 0 {
            if pins & RW_MASK != 0 {
                // host reads a register
                bus::data_mode_out();
                let addr = (pins & ADDR_MASK) as usize;
                bus::data_out(bank[addr & (BANK_SIZE - 1)]);
                while bus::pins() & PHI2_MASK != 0 {}
                bus::data_mode_in();
            } else {
                // host writes a register; the data bus is valid on the
                // falling edge of PHI2
                let addr = (pins & 0xFF) as usize;
                let mut last = pins;
                loop {
                    let now = bus::pins();
                    if now & PHI2_MASK == 0 {
                        break;
                    }
                    last = now;
                }
                let data = ((last & bus::DATA_MASK) >> bus::DATA_SHIFT) as u8;
                bank[addr] = data;
                if addr == CMD_STROBE as usize {
                    return data;
                }
            }
        } else if pins & S5_MASK == 0 {
            // menu ROM read
            bus::data_mode_out();
            let addr = (pins & ADDR_MASK) as usize;
            bus::data_out(menu_rom[addr & (MENU_ROM_SIZE - 1)]);
            while bus::pins() & PHI2_MASK != 0 {}
            bus::data_mode_in();
        }
    }
}
