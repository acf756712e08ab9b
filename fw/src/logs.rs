// Copyright (c) 2025 Robin Edwards
//
// MIT licence

//! RTT logging; only the USB path logs, the cartridge loops never do.

use log::{LevelFilter, Metadata, Record};
use rtt_target::{rprintln, rtt_init_print};

struct RttLogger;

impl log::Log for RttLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        rprintln!("{} - {}", record.level(), record.args());
    }

    fn flush(&self) {}
}

static LOGGER: RttLogger = RttLogger;

pub fn init_rtt() {
    rtt_init_print!();
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(LevelFilter::Debug);
    }
}
