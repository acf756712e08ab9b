// Copyright (c) 2025 Robin Edwards
//
// MIT licence

//! The cartridge bus: pin assignments and the raw SIO accesses the
//! emulation loops are built from.
//!
//! GPIO 0-12 carry ADDR, 13-20 carry DATA, then CCTL#, PHI2, R/W, S4#, S5#
//! on 21-25 and the RD4/RD5 outputs on 26-27.  The hot loops read and drive
//! the whole bank through SIO in single accesses; the helpers here must all
//! inline into the RAM-resident loops so no flash fetch ever lands between
//! PHI2 edges.

use embassy_rp::gpio::{Flex, Output};

pub const ADDR_MASK: u32 = 0x0000_1FFF;
pub const DATA_MASK: u32 = 0x001F_E000;
pub const DATA_SHIFT: u32 = 13;
pub const CCTL_MASK: u32 = 1 << 21;
pub const PHI2_MASK: u32 = 1 << 22;
pub const RW_MASK: u32 = 1 << 23;
pub const S4_MASK: u32 = 1 << 24;
pub const S5_MASK: u32 = 1 << 25;
pub const S4_S5_MASK: u32 = S4_MASK | S5_MASK;
pub const CCTL_RW_MASK: u32 = CCTL_MASK | RW_MASK;

const RD4_MASK: u32 = 1 << 26;
const RD5_MASK: u32 = 1 << 27;

// SIO register block, RP2040 datasheet 2.3.1.7.
const SIO_BASE: u32 = 0xD000_0000;
const GPIO_IN: u32 = 0x004;
const GPIO_OUT: u32 = 0x010;
const GPIO_OUT_SET: u32 = 0x014;
const GPIO_OUT_CLR: u32 = 0x018;
const GPIO_OUT_XOR: u32 = 0x01C;
const GPIO_OE_SET: u32 = 0x024;
const GPIO_OE_CLR: u32 = 0x028;

#[inline(always)]
fn reg(offset: u32) -> *mut u32 {
    (SIO_BASE + offset) as *mut u32
}

/// One snapshot of every bus line.
#[inline(always)]
pub fn pins() -> u32 {
    unsafe { reg(GPIO_IN).read_volatile() }
}

/// Drive the data lines; direction must already be out.
#[inline(always)]
pub fn data_out(value: u8) {
    unsafe {
        let out = reg(GPIO_OUT).read_volatile();
        reg(GPIO_OUT_XOR).write_volatile((out ^ ((value as u32) << DATA_SHIFT)) & DATA_MASK);
    }
}

#[inline(always)]
pub fn data_mode_out() {
    unsafe { reg(GPIO_OE_SET).write_volatile(DATA_MASK) }
}

#[inline(always)]
pub fn data_mode_in() {
    unsafe { reg(GPIO_OE_CLR).write_volatile(DATA_MASK) }
}

#[inline(always)]
pub fn rd4_high() {
    unsafe { reg(GPIO_OUT_SET).write_volatile(RD4_MASK) }
}

#[inline(always)]
pub fn rd4_low() {
    unsafe { reg(GPIO_OUT_CLR).write_volatile(RD4_MASK) }
}

#[inline(always)]
pub fn rd5_high() {
    unsafe { reg(GPIO_OUT_SET).write_volatile(RD5_MASK) }
}

#[inline(always)]
pub fn rd5_low() {
    unsafe { reg(GPIO_OUT_CLR).write_volatile(RD5_MASK) }
}

/// Holds every bus pin configured for cartridge service.
///
/// The GPIO driver objects are kept alive here so their pad configuration
/// survives; once this exists the hot loops own the bus through the raw
/// accessors above.
pub struct CartBus<'d> {
    _inputs: [Flex<'d>; 26],
    _rd4: Output<'d>,
    _rd5: Output<'d>,
}

impl<'d> CartBus<'d> {
    pub fn new(mut inputs: [Flex<'d>; 26], rd4: Output<'d>, rd5: Output<'d>) -> Self {
        for pin in &mut inputs {
            pin.set_as_input();
        }
        Self {
            _inputs: inputs,
            _rd4: rd4,
            _rd5: rd5,
        }
    }
}
