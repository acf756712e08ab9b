// Copyright (c) 2025 Robin Edwards
//
// MIT licence

//! The cartridge emulation loops, one per mapper family.
//!
//! Each loop spins on PHI2, decodes one GPIO snapshot per bus cycle and
//! either serves a byte from the image buffer or applies the mapper's
//! bank-select side effects.  The contract with the host is unforgiving:
//! between successive PHI2 rising edges the loop must be back at its wait
//! point, and the data lines must be tristated again before a write cycle
//! follows.  Every function here is pinned into SRAM - an XIP fetch stall
//! while the flash controller is busy would blow the response window.
//!
//! Attempts to get S4/S5, RD4/RD5 MMU behaviour correct on the 400/800:
//! after a disable write the relevant RD line is driven low and the window
//! is not served until re-enabled.

use a8pico_cart::{CART_RAM_SIZE, MapperKind};

use crate::bus::{
    ADDR_MASK, CCTL_MASK, CCTL_RW_MASK, DATA_MASK, DATA_SHIFT, PHI2_MASK, RW_MASK, S4_MASK,
    S4_S5_MASK, S5_MASK,
};
use crate::bus;

// Index masking keeps every buffer access provably in bounds, so the serve
// path carries no bounds-check branch.
const RAM_MASK: usize = CART_RAM_SIZE - 1;

/// Spin until PHI2 rises, returning the snapshot that saw it high.
#[inline(always)]
fn wait_phi2_high() -> u32 {
    let mut pins = bus::pins();
    while pins & PHI2_MASK == 0 {
        pins = bus::pins();
    }
    pins
}

/// Spin until PHI2 falls.
#[inline(always)]
fn wait_phi2_low() {
    while bus::pins() & PHI2_MASK != 0 {}
}

/// The data bus is captured on the falling edge of PHI2: sample while it is
/// still high, the last sample is the valid one.
#[inline(always)]
fn capture_data_bus(pins_at_high: u32) -> u8 {
    let mut last = pins_at_high;
    loop {
        let now = bus::pins();
        if now & PHI2_MASK == 0 {
            break;
        }
        last = now;
    }
    ((last & DATA_MASK) >> DATA_SHIFT) as u8
}

/// Drive one byte for the rest of this cycle, then tristate.
#[inline(always)]
fn serve_byte(value: u8) {
    bus::data_mode_out();
    bus::data_out(value);
    wait_phi2_low();
    bus::data_mode_in();
}

/// Hand the bus to the chosen mapper loop.  Never returns; the host owns
/// the cartridge until power-off.
pub fn activate(kind: Option<MapperKind>, ram: &[u8; CART_RAM_SIZE]) -> ! {
    use MapperKind::*;
    match kind {
        // 2K and 4K images were relocated at load time so the plain 8K
        // loop serves them.
        Some(Std8k | Std4k | Std2k) => standard_8k(ram),
        Some(Std16k) => standard_16k(ram),
        Some(Xegs32k) => xegs(ram, 0x3, false),
        Some(Xegs64k) => xegs(ram, 0x7, false),
        Some(Xegs128k) => xegs(ram, 0xF, false),
        Some(SwXegs32k) => xegs(ram, 0x3, true),
        Some(SwXegs64k) => xegs(ram, 0x7, true),
        Some(SwXegs128k) => xegs(ram, 0xF, true),
        Some(Megacart16k) => megacart(ram, 0x0),
        Some(Megacart32k) => megacart(ram, 0x1),
        Some(Megacart64k) => megacart(ram, 0x3),
        Some(Megacart128k) => megacart(ram, 0x7),
        Some(BountyBob) => bounty_bob(ram),
        Some(Atarimax1Mbit) => atarimax_128k(ram),
        Some(Williams64k) => williams(ram),
        Some(Oss16kTypeB | Oss8k) => oss_type_b(ram),
        Some(Oss16k034M) => oss_type_a(ram, true),
        Some(Oss16k043M) => oss_type_a(ram, false),
        Some(Sic128k) => sic(ram),
        Some(Sdx64k) => sdx(ram, false),
        Some(Sdx128k) => sdx(ram, true),
        Some(Diamond64k) => diamond_express(ram, 0xD0),
        Some(Express64k) => diamond_express(ram, 0x70),
        Some(Blizzard16k) => blizzard_16k(ram),
        // Blizzard 4K was mirrored at load time; Phoenix behaviour fits.
        Some(Phoenix8k | Blizzard4k) => phoenix_8k(ram),
        Some(Turbosoft64k) => turbosoft(ram, 0x7),
        Some(Turbosoft128k) => turbosoft(ram, 0xF),
        Some(Atrax128k) => atrax(ram),
        Some(Microcalc) => microcalc(ram),
        Some(Adawliah32k) => adawliah_32k(ram),
        Some(Xex) => xex_feeder(ram),
        // ATR activation never reaches here - the menu keeps running for
        // disk service.  Anything else presents an empty slot.
        Some(Atr) | None => no_cartridge(),
    }
}

#[inline(never)]
#[link_section = ".data.ram_func"]
fn standard_8k(ram: &[u8; CART_RAM_SIZE]) -> ! {
    bus::rd4_low();
    bus::rd5_high();

    loop {
        // wait for s5 low
        let mut pins = bus::pins();
        while pins & S5_MASK != 0 {
            pins = bus::pins();
        }
        bus::data_mode_out();
        // drive continuously while s5 is low
        loop {
            pins = bus::pins();
            if pins & S5_MASK != 0 {
                break;
            }
            bus::data_out(ram[(pins & ADDR_MASK) as usize]);
        }
        bus::data_mode_in();
    }
}

#[inline(never)]
#[link_section = ".data.ram_func"]
fn standard_16k(ram: &[u8; CART_RAM_SIZE]) -> ! {
    bus::rd4_high();
    bus::rd5_high();

    loop {
        // wait for either s4 or s5 low
        let mut pins = bus::pins();
        while pins & S4_S5_MASK == S4_S5_MASK {
            pins = bus::pins();
        }
        bus::data_mode_out();
        if pins & S4_MASK == 0 {
            loop {
                pins = bus::pins();
                if pins & S4_MASK != 0 {
                    break;
                }
                bus::data_out(ram[(pins & ADDR_MASK) as usize]);
            }
        } else {
            loop {
                pins = bus::pins();
                if pins & S5_MASK != 0 {
                    break;
                }
                bus::data_out(ram[(0x2000 | (pins & ADDR_MASK)) as usize]);
            }
        }
        bus::data_mode_in();
    }
}

/// XEGS 32K/64K/128K; the switchable variants pull both RD lines low when
/// bit 7 is written.
#[inline(never)]
#[link_section = ".data.ram_func"]
fn xegs(ram: &[u8; CART_RAM_SIZE], bank_mask: u32, switchable: bool) -> ! {
    bus::rd4_high();
    bus::rd5_high();

    // The last bank is fixed at S5.
    let fixed_base = (bank_mask as usize) * 0x2000;
    let mut bank_base = 0usize;
    let (mut rd4_high, mut rd5_high) = (true, true);

    loop {
        let pins = wait_phi2_high();

        if pins & S4_MASK == 0 && rd4_high {
            let addr = (pins & ADDR_MASK) as usize;
            serve_byte(ram[(bank_base + addr) & RAM_MASK]);
        } else if pins & S5_MASK == 0 && rd5_high {
            let addr = (pins & ADDR_MASK) as usize;
            serve_byte(ram[(fixed_base | addr) & RAM_MASK]);
        } else if pins & CCTL_RW_MASK == 0 {
            // bank select write
            let data = capture_data_bus(pins) as u32;
            bank_base = ((data & bank_mask) as usize) * 0x2000;
            if switchable {
                if data & 0x80 != 0 {
                    bus::rd4_low();
                    bus::rd5_low();
                    rd4_high = false;
                    rd5_high = false;
                } else {
                    bus::rd4_high();
                    bus::rd5_high();
                    rd4_high = true;
                    rd5_high = true;
                }
            }
        }
    }
}

/// Bounty Bob Strikes Back: two independently banked 4K halves at S4,
/// switched by reads of the magic addresses, plus a fixed 8K at S5.
#[inline(never)]
#[link_section = ".data.ram_func"]
fn bounty_bob(ram: &[u8; CART_RAM_SIZE]) -> ! {
    bus::rd4_high();
    bus::rd5_high();

    let mut bank1 = 0usize;
    let mut bank2 = 0x4000usize;

    loop {
        let pins = wait_phi2_high();

        if pins & S4_MASK == 0 {
            bus::data_mode_out();
            let addr = (pins & ADDR_MASK) as usize;
            if addr & 0x1000 != 0 {
                bus::data_out(ram[(bank2 + (addr & 0xFFF)) & RAM_MASK]);
                match addr {
                    0x1FF6 => bank2 = 0x4000,
                    0x1FF7 => bank2 = 0x5000,
                    0x1FF8 => bank2 = 0x6000,
                    0x1FF9 => bank2 = 0x7000,
                    _ => {}
                }
            } else {
                bus::data_out(ram[(bank1 + (addr & 0xFFF)) & RAM_MASK]);
                match addr {
                    0x0FF6 => bank1 = 0,
                    0x0FF7 => bank1 = 0x1000,
                    0x0FF8 => bank1 = 0x2000,
                    0x0FF9 => bank1 = 0x3000,
                    _ => {}
                }
            }
        } else if pins & S5_MASK == 0 {
            bus::data_mode_out();
            let addr = (pins & ADDR_MASK) as usize;
            bus::data_out(ram[0x8000 | addr]);
        }
        wait_phi2_low();
        bus::data_mode_in();
    }
}

/// Atarimax 1Mbit: the CCTL address encodes both bank and enable.
#[inline(never)]
#[link_section = ".data.ram_func"]
fn atarimax_128k(ram: &[u8; CART_RAM_SIZE]) -> ! {
    bus::rd4_low();
    bus::rd5_high();

    let mut bank = 0u32;
    let mut rd5_high = true;

    loop {
        let bank_base = (bank & 0xF) as usize * 0x2000;
        let pins = wait_phi2_high();

        if pins & S5_MASK == 0 && rd5_high {
            bus::data_mode_out();
            let addr = (pins & ADDR_MASK) as usize;
            bus::data_out(ram[(bank_base + addr) & RAM_MASK]);
        } else if pins & CCTL_MASK == 0 {
            let addr = pins & ADDR_MASK;
            if addr & 0xE0 == 0 {
                bank = addr & 0xF;
                if addr & 0x10 != 0 {
                    bus::rd5_low();
                    rd5_high = false;
                } else {
                    bus::rd5_high();
                    rd5_high = true;
                }
            }
        }
        wait_phi2_low();
        bus::data_mode_in();
    }
}

/// Williams 32K/64K.
#[inline(never)]
#[link_section = ".data.ram_func"]
fn williams(ram: &[u8; CART_RAM_SIZE]) -> ! {
    bus::rd4_low();
    bus::rd5_high();

    let mut bank = 0u32;
    let mut rd5_high = true;

    loop {
        let bank_base = bank as usize * 0x2000;
        let pins = wait_phi2_high();

        if pins & S5_MASK == 0 && rd5_high {
            bus::data_mode_out();
            let addr = (pins & ADDR_MASK) as usize;
            bus::data_out(ram[(bank_base + addr) & RAM_MASK]);
        } else if pins & CCTL_MASK == 0 {
            let addr = pins & ADDR_MASK;
            if addr & 0xF0 == 0 {
                bank = addr & 0x07;
                if addr & 0x08 != 0 {
                    bus::rd5_low();
                    rd5_high = false;
                } else {
                    bus::rd5_high();
                    rd5_high = true;
                }
            }
        }
        wait_phi2_low();
        bus::data_mode_in();
    }
}

/// OSS type B (also serves the 8K OSS carts).
#[inline(never)]
#[link_section = ".data.ram_func"]
fn oss_type_b(ram: &[u8; CART_RAM_SIZE]) -> ! {
    bus::rd5_high();
    bus::rd4_low();

    let mut bank = 1usize;
    let mut rd5_high = true;

    loop {
        let bank_base = bank * 0x1000;
        let pins = wait_phi2_high();

        if pins & S5_MASK == 0 && rd5_high {
            bus::data_mode_out();
            let addr = (pins & ADDR_MASK) as usize;
            if addr & 0x1000 != 0 {
                bus::data_out(ram[addr & 0xFFF]);
            } else {
                bus::data_out(ram[(bank_base + addr) & RAM_MASK]);
            }
        } else if pins & CCTL_MASK == 0 {
            let addr = pins & ADDR_MASK;
            let a0 = addr & 1 != 0;
            let a3 = addr & 8 != 0;
            if a3 && !a0 {
                bus::rd5_low();
                rd5_high = false;
            } else {
                bus::rd5_high();
                rd5_high = true;
                if !a3 && !a0 {
                    bank = 1;
                } else if !a3 && a0 {
                    bank = 3;
                } else if a3 && a0 {
                    bank = 2;
                }
            }
        }
        wait_phi2_low();
        bus::data_mode_in();
    }
}

/// OSS type A: 034M and 043M differ only in which bank codes pick which
/// 4K block; the `$Bxxx` window is always the highest bank.
#[inline(never)]
#[link_section = ".data.ram_func"]
fn oss_type_a(ram: &[u8; CART_RAM_SIZE], is_034m: bool) -> ! {
    bus::rd5_high();
    bus::rd4_low();

    let mut bank = 0usize;
    let mut rd5_high = true;

    loop {
        let bank_base = bank * 0x1000;
        let pins = wait_phi2_high();

        if pins & S5_MASK == 0 && rd5_high {
            bus::data_mode_out();
            let addr = (pins & ADDR_MASK) as usize;
            if addr & 0x1000 != 0 {
                bus::data_out(ram[addr | 0x2000]);
            } else {
                bus::data_out(ram[(bank_base + addr) & RAM_MASK]);
            }
        } else if pins & CCTL_MASK == 0 {
            let addr = pins & 0xF;
            if addr & 0x8 != 0 {
                bus::rd5_low();
                rd5_high = false;
            } else {
                bus::rd5_high();
                rd5_high = true;
                if addr == 0x0 {
                    bank = 0;
                }
                if addr == 0x3 || addr == 0x7 {
                    bank = if is_034m { 1 } else { 2 };
                }
                if addr == 0x4 {
                    bank = if is_034m { 2 } else { 1 };
                }
            }
        }
        wait_phi2_low();
        bus::data_mode_in();
    }
}

/// MegaCart 16K-128K: 16K banks spanning both windows.
#[inline(never)]
#[link_section = ".data.ram_func"]
fn megacart(ram: &[u8; CART_RAM_SIZE], bank_mask: u32) -> ! {
    bus::rd4_high();
    bus::rd5_high();

    let mut bank_base = 0usize;
    let (mut rd4_high, mut rd5_high) = (true, true);

    loop {
        let pins = wait_phi2_high();

        if pins & S4_MASK == 0 && rd4_high {
            let addr = (pins & ADDR_MASK) as usize;
            serve_byte(ram[(bank_base + addr) & RAM_MASK]);
        } else if pins & S5_MASK == 0 && rd5_high {
            let addr = (pins & ADDR_MASK) as usize;
            serve_byte(ram[(bank_base + (addr | 0x2000)) & RAM_MASK]);
        } else if pins & CCTL_RW_MASK == 0 {
            let data = capture_data_bus(pins) as u32;
            let bank = data & bank_mask;
            bank_base = (bank & 0x7) as usize * 0x4000;
            if data & 0x80 != 0 {
                bus::rd4_low();
                bus::rd5_low();
                rd4_high = false;
                rd5_high = false;
            } else {
                bus::rd4_high();
                bus::rd5_high();
                rd4_high = true;
                rd5_high = true;
            }
        }
    }
}

/// SIC 128K: the control byte is readable back, bit 6 drops RD5, bit 5
/// raises RD4, bits 0-2 pick a 16K bank.
#[inline(never)]
#[link_section = ".data.ram_func"]
fn sic(ram: &[u8; CART_RAM_SIZE]) -> ! {
    bus::rd5_high();
    bus::rd4_low();

    let mut sic_byte = 0u8;
    let mut bank_base = 0usize;
    let (mut rd4_high, mut rd5_high) = (false, true);

    loop {
        let pins = wait_phi2_high();

        if pins & S4_MASK == 0 && rd4_high {
            let addr = (pins & ADDR_MASK) as usize;
            serve_byte(ram[(bank_base + addr) & RAM_MASK]);
        } else if pins & S5_MASK == 0 && rd5_high {
            let addr = (pins & ADDR_MASK) as usize;
            serve_byte(ram[(bank_base + (addr | 0x2000)) & RAM_MASK]);
        } else if pins & CCTL_MASK == 0 {
            let addr = pins & ADDR_MASK;
            if addr & 0xE0 == 0 {
                if pins & RW_MASK != 0 {
                    // control byte read back
                    serve_byte(sic_byte);
                } else {
                    sic_byte = capture_data_bus(pins);
                    bank_base = (sic_byte & 0x7) as usize * 0x4000;
                    if sic_byte & 0x40 != 0 {
                        bus::rd5_low();
                        rd5_high = false;
                    } else {
                        bus::rd5_high();
                        rd5_high = true;
                    }
                    if sic_byte & 0x20 != 0 {
                        bus::rd4_high();
                        rd4_high = true;
                    } else {
                        bus::rd4_low();
                        rd4_high = false;
                    }
                }
            }
        }
    }
}

/// Sparta DOS X 64K/128K; `$D5Ex` picks the lower 64K, `$D5Fx` (128K
/// boards only) the upper, with the bank bits inverted.
#[inline(never)]
#[link_section = ".data.ram_func"]
fn sdx(ram: &[u8; CART_RAM_SIZE], is_128k: bool) -> ! {
    bus::rd5_high();
    bus::rd4_low();

    let mut bank_base = 0usize;
    let mut rd5_high = true;

    loop {
        let pins = wait_phi2_high();

        if pins & S5_MASK == 0 && rd5_high {
            bus::data_mode_out();
            let addr = (pins & ADDR_MASK) as usize;
            bus::data_out(ram[(bank_base + addr) & RAM_MASK]);
        } else if pins & CCTL_MASK == 0 {
            let addr = pins & ADDR_MASK;
            if addr & 0xF0 == 0xE0 {
                let base = if is_128k { 0x10000 } else { 0 };
                bank_base = base + ((!addr) & 0x7) as usize * 0x2000;
                if addr & 0x8 != 0 {
                    bus::rd5_low();
                    rd5_high = false;
                } else {
                    bus::rd5_high();
                    rd5_high = true;
                }
            }
            if is_128k && addr & 0xF0 == 0xF0 {
                bank_base = ((!addr) & 0x7) as usize * 0x2000;
                if addr & 0x8 != 0 {
                    bus::rd5_low();
                    rd5_high = false;
                } else {
                    bus::rd5_high();
                    rd5_high = true;
                }
            }
        }
        wait_phi2_low();
        bus::data_mode_in();
    }
}

/// Diamond and Express 64K: the SDX lower-bank scheme behind a different
/// CCTL address prefix.
#[inline(never)]
#[link_section = ".data.ram_func"]
fn diamond_express(ram: &[u8; CART_RAM_SIZE], cctl_hi: u32) -> ! {
    bus::rd5_high();
    bus::rd4_low();

    let mut bank_base = 0usize;
    let mut rd5_high = true;

    loop {
        let pins = wait_phi2_high();

        if pins & S5_MASK == 0 && rd5_high {
            bus::data_mode_out();
            let addr = (pins & ADDR_MASK) as usize;
            bus::data_out(ram[(bank_base + addr) & RAM_MASK]);
        } else if pins & CCTL_MASK == 0 {
            let addr = pins & ADDR_MASK;
            if addr & 0xF0 == cctl_hi {
                bank_base = ((!addr) & 0x7) as usize * 0x2000;
                if addr & 0x8 != 0 {
                    bus::rd5_low();
                    rd5_high = false;
                } else {
                    bus::rd5_high();
                    rd5_high = true;
                }
            }
        }
        wait_phi2_low();
        bus::data_mode_in();
    }
}

/// Blizzard 16K: any CCTL access switches the cartridge off for good.
#[inline(never)]
#[link_section = ".data.ram_func"]
fn blizzard_16k(ram: &[u8; CART_RAM_SIZE]) -> ! {
    bus::rd4_high();
    bus::rd5_high();
    let (mut rd4_high, mut rd5_high) = (true, true);

    loop {
        let pins = wait_phi2_high();

        if pins & S4_MASK == 0 && rd4_high {
            bus::data_mode_out();
            let addr = (pins & ADDR_MASK) as usize;
            bus::data_out(ram[addr]);
        } else if pins & S5_MASK == 0 && rd5_high {
            bus::data_mode_out();
            let addr = (pins & ADDR_MASK) as usize;
            bus::data_out(ram[0x2000 | addr]);
        } else if pins & CCTL_MASK == 0 {
            bus::rd4_low();
            bus::rd5_low();
            rd4_high = false;
            rd5_high = false;
        }
        wait_phi2_low();
        bus::data_mode_in();
    }
}

/// Turbosoft 64K/128K.
#[inline(never)]
#[link_section = ".data.ram_func"]
fn turbosoft(ram: &[u8; CART_RAM_SIZE], bank_mask: u32) -> ! {
    bus::rd4_low();
    bus::rd5_high();

    let mut bank = 0u32;
    let mut rd5_high = true;

    loop {
        let bank_base = bank as usize * 0x2000;
        let pins = wait_phi2_high();

        if pins & S5_MASK == 0 && rd5_high {
            bus::data_mode_out();
            let addr = (pins & ADDR_MASK) as usize;
            bus::data_out(ram[(bank_base + addr) & RAM_MASK]);
        } else if pins & CCTL_MASK == 0 {
            let addr = pins & ADDR_MASK;
            bank = addr & bank_mask;
            if addr & 0x10 != 0 {
                bus::rd5_low();
                rd5_high = false;
            } else {
                bus::rd5_high();
                rd5_high = true;
            }
        }
        wait_phi2_low();
        bus::data_mode_in();
    }
}

/// Atrax 128K: bank select by data byte, bit 7 disables.
#[inline(never)]
#[link_section = ".data.ram_func"]
fn atrax(ram: &[u8; CART_RAM_SIZE]) -> ! {
    bus::rd4_low();
    bus::rd5_high();

    let mut bank_base = 0usize;
    let mut rd5_high = true;

    loop {
        let pins = wait_phi2_high();

        if pins & S5_MASK == 0 && rd5_high {
            let addr = (pins & ADDR_MASK) as usize;
            serve_byte(ram[(bank_base + addr) & RAM_MASK]);
        } else if pins & CCTL_RW_MASK == 0 {
            let data = capture_data_bus(pins) as u32;
            bank_base = (data & 0xF) as usize * 0x2000;
            if data & 0x80 != 0 {
                bus::rd5_low();
                rd5_high = false;
            } else {
                bus::rd5_high();
                rd5_high = true;
            }
        }
    }
}

/// Microcalc/Utracart: each CCTL access steps the bank counter modulo 5;
/// the fifth state parks the cartridge with RD5 low until the counter
/// wraps.
#[inline(never)]
#[link_section = ".data.ram_func"]
fn microcalc(ram: &[u8; CART_RAM_SIZE]) -> ! {
    bus::rd4_low();
    bus::rd5_high();

    let mut bank = 0u32;
    let mut rd5_high = true;

    loop {
        let bank_base = bank as usize * 0x2000;
        let pins = wait_phi2_high();

        if pins & S5_MASK == 0 && rd5_high {
            bus::data_mode_out();
            let addr = (pins & ADDR_MASK) as usize;
            bus::data_out(ram[(bank_base + addr) & RAM_MASK]);
        } else if pins & CCTL_MASK == 0 {
            bank = (bank + 1) % 5;
            if bank == 4 {
                bus::rd5_low();
                rd5_high = false;
            } else {
                bus::rd5_high();
                rd5_high = true;
            }
        }
        wait_phi2_low();
        bus::data_mode_in();
    }
}

/// Phoenix 8K (and relocated Blizzard 4K): any CCTL access disables
/// permanently.
#[inline(never)]
#[link_section = ".data.ram_func"]
fn phoenix_8k(ram: &[u8; CART_RAM_SIZE]) -> ! {
    bus::rd4_low();
    bus::rd5_high();

    let mut rd5_high = true;

    loop {
        let pins = wait_phi2_high();

        if pins & S5_MASK == 0 && rd5_high {
            bus::data_mode_out();
            let addr = (pins & ADDR_MASK) as usize;
            bus::data_out(ram[addr]);
        } else if pins & CCTL_MASK == 0 {
            bus::rd5_low();
            rd5_high = false;
        }
        wait_phi2_low();
        bus::data_mode_in();
    }
}

/// AD&D Adawliah 32K: CCTL accesses step the bank counter.
#[inline(never)]
#[link_section = ".data.ram_func"]
fn adawliah_32k(ram: &[u8; CART_RAM_SIZE]) -> ! {
    bus::rd4_low();
    bus::rd5_high();

    let mut bank = 0u32;
    let mut rd5_high = true;

    loop {
        let bank_base = bank as usize * 0x2000;
        let pins = wait_phi2_high();

        if pins & S5_MASK == 0 && rd5_high {
            bus::data_mode_out();
            let addr = (pins & ADDR_MASK) as usize;
            bus::data_out(ram[(bank_base + addr) & RAM_MASK]);
        } else if pins & CCTL_MASK == 0 {
            bank = (bank + 1) & 3;
            if bank == 4 {
                // Unreachable with the 2-bit mask above; kept to match the
                // boards observed in the wild, which never disable.
                bus::rd5_low();
                rd5_high = false;
            } else {
                bus::rd5_high();
                rd5_high = true;
            }
        }
        wait_phi2_low();
        bus::data_mode_in();
    }
}

/// The XEX bootstrap feeder: both RD lines stay low, the 6502-side stub
/// pages the payload through a 256 byte CCTL window by writing a 16 bit
/// paragraph pointer to addresses 0 and 1.
#[inline(never)]
#[link_section = ".data.ram_func"]
fn xex_feeder(ram: &[u8; CART_RAM_SIZE]) -> ! {
    bus::rd4_low();
    bus::rd5_low();

    let mut bank = 0u32;

    loop {
        let page_base = (bank & 0x01FF) as usize * 256;
        let pins = wait_phi2_high();

        if pins & CCTL_MASK == 0 {
            if pins & RW_MASK != 0 {
                bus::data_mode_out();
                let addr = (pins & ADDR_MASK) as usize;
                bus::data_out(ram[(page_base + (addr & 0xFF)) & RAM_MASK]);
            } else {
                let addr = pins & 0xFF;
                let data = capture_data_bus(pins) as u32;
                if addr == 0 {
                    bank = (bank & 0xFF00) | data;
                } else if addr == 1 {
                    bank = (bank & 0x00FF) | ((data << 8) & 0xFF00);
                }
            }
        }
        wait_phi2_low();
        bus::data_mode_in();
    }
}

/// Empty slot: both RD lines low, never respond.
#[inline(never)]
#[link_section = ".data.ram_func"]
fn no_cartridge() -> ! {
    bus::rd4_low();
    bus::rd5_low();
    loop {
        cortex_m::asm::nop();
    }
}
