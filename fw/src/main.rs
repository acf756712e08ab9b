//! A8 Pico Cart firmware
//!
//! Atari 8-bit cartridge on a Raspberry Pi Pico (16 MB clone with all GPIO).
//!
//! One binary, two lives.  Plugged into an Atari, PHI2 is ticking within
//! the first 100 ms and the firmware becomes a cartridge: the menu ROM and
//! command channel first, then whichever mapper emulation the user picks.
//! On a USB lead instead, it becomes a FAT-formatted flash drive plus a
//! serial diagnostic port.
//!
//! Needs to be a release build for the cartridge emulation to make timing.

// Copyright (c) 2025 Robin Edwards
//
// MIT licence

#![no_std]
#![no_main]

extern crate alloc;

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use core::ptr::addr_of_mut;

use embassy_executor::Spawner;
use embassy_executor::main as embassy_main;
use embassy_rp::Peripherals;
use embassy_rp::clocks::ClockConfig;
use embassy_rp::flash::Flash;
use embassy_rp::gpio::{Flex, Input, Level, Output, Pull};
use embassy_time::{Duration, Instant};
use embedded_alloc::LlffHeap as Heap;
use panic_rtt_target as _;

use a8pico_cart::CART_RAM_SIZE;
use a8pico_flashfs::{FlashDisk, FlashFs, FsBuffers, mkfs};

mod bootrom;
mod bus;
mod flash;
mod logs;
mod mapper;
mod menu;
mod msc;
mod rom;
mod usb;

use flash::PicoFlash;
use menu::Menu;

#[global_allocator]
static HEAP: Heap = Heap::empty();

/// The shared buffer: directory listing, cartridge image or XEX payload,
/// depending on what the menu last did with it.
static mut CART_RAM: [u8; CART_RAM_SIZE] = [0; CART_RAM_SIZE];

/// Backing store for the flash filesystem's in-RAM sector map.
static mut FS_BUFFERS: FsBuffers = FsBuffers::new();

#[embassy_main]
async fn main(_spawner: Spawner) {
    // Initialize the heap allocator; only the menu path allocates (path
    // strings), the emulation loops never do.
    {
        use core::mem::MaybeUninit;
        const HEAP_SIZE: usize = 16 * 1024;
        static mut HEAP_MEM: [MaybeUninit<u8>; HEAP_SIZE] = [MaybeUninit::uninit(); HEAP_SIZE];
        unsafe { HEAP.init(&raw mut HEAP_MEM as usize, HEAP_SIZE) }
    }

    // Overclock to 250 MHz: the wide-address mappers don't meet the
    // PHI2-to-data-valid window at the stock clock.  The USB PLL is
    // independent, so this holds for both modes.
    let config = embassy_rp::config::Config::new(ClockConfig::system_freq(250_000_000));
    let mut p = embassy_rp::init(config);

    // Check if we are plugged into an Atari by watching for PHI2 activity
    // for 100 ms after power-on.  Any high sample decides it.
    let cart_detected = {
        let phi2 = Input::new(p.PIN_22.reborrow(), Pull::None);
        let deadline = Instant::now() + Duration::from_millis(100);
        let mut seen = false;
        while Instant::now() < deadline {
            if phi2.is_high() {
                seen = true;
                break;
            }
        }
        seen
    };

    if cart_detected {
        cart_main(p);
    } else {
        usb_main(p).await;
    }
}

/// Cartridge mode; never returns, runs until power-off.
fn cart_main(p: Peripherals) -> ! {
    // ADDR on 0-12, DATA on 13-20, then CCTL#, PHI2, R/W, S4#, S5#.
    let input_pins = [
        Flex::new(p.PIN_0),
        Flex::new(p.PIN_1),
        Flex::new(p.PIN_2),
        Flex::new(p.PIN_3),
        Flex::new(p.PIN_4),
        Flex::new(p.PIN_5),
        Flex::new(p.PIN_6),
        Flex::new(p.PIN_7),
        Flex::new(p.PIN_8),
        Flex::new(p.PIN_9),
        Flex::new(p.PIN_10),
        Flex::new(p.PIN_11),
        Flex::new(p.PIN_12),
        Flex::new(p.PIN_13),
        Flex::new(p.PIN_14),
        Flex::new(p.PIN_15),
        Flex::new(p.PIN_16),
        Flex::new(p.PIN_17),
        Flex::new(p.PIN_18),
        Flex::new(p.PIN_19),
        Flex::new(p.PIN_20),
        Flex::new(p.PIN_21),
        Flex::new(p.PIN_22),
        Flex::new(p.PIN_23),
        Flex::new(p.PIN_24),
        Flex::new(p.PIN_25),
    ];
    let _bus = bus::CartBus::new(
        input_pins,
        Output::new(p.PIN_26, Level::Low),
        Output::new(p.PIN_27, Level::Low),
    );

    let bufs = unsafe { &mut *addr_of_mut!(FS_BUFFERS) };
    let fs = FlashFs::new(PicoFlash::new(Flash::new_blocking(p.FLASH)), bufs);
    let disk = FlashDisk::new(fs);
    ensure_filesystem(&disk);

    let ram = unsafe { &mut *addr_of_mut!(CART_RAM) };
    Menu::new(&disk, ram).run(rom::MENU_ROM, rom::OS_ROM)
}

/// USB drive mode; never returns.
async fn usb_main(p: Peripherals) -> ! {
    logs::init_rtt();
    info!("-----");
    info!("A8 Pico Cart - USB drive mode");

    let bufs = unsafe { &mut *addr_of_mut!(FS_BUFFERS) };
    let fs = FlashFs::new(PicoFlash::new(Flash::new_blocking(p.FLASH)), bufs);
    let disk = FlashDisk::new(fs);
    ensure_filesystem(&disk);

    usb::run(p.USB, &disk).await
}

/// Mount the flash filesystem, formatting it on first boot.
fn ensure_filesystem(disk: &flash::PicoDisk<'_>) {
    match disk.mount() {
        Ok(true) => {}
        Ok(false) => {
            info!("no filesystem, creating one");
            if disk.create().is_ok() {
                let _ = mkfs::format(disk);
                let _ = mkfs::write_welcome(disk);
                let _ = disk.sync();
            }
        }
        Err(e) => error!("flash filesystem mount failed: {e:?}"),
    }
}
