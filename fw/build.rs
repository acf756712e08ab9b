// Copyright (c) 2025 Robin Edwards
//
// MIT licence

use std::env;
use std::fs;
use std::path::Path;

fn main() {
    // Set up Cortex-M linking
    println!("cargo:rustc-link-arg-bins=--nmagic");
    println!("cargo:rustc-link-arg-bins=-Tlink.x");
    println!("cargo:rustc-link-arg-bins=-Tlink-rp.x");

    // Re-run if the ROM assets change
    println!("cargo:rerun-if-changed=data");

    generate_rp2040_memory_x();
}

// Memory layout for the Pico clone this cartridge is built around: 16 MiB
// of QSPI flash (the filesystem region sits 1 MiB in) and the stock 264 KiB
// of striped SRAM.  Mapper loops and the flash programming inner ops live in
// .data.ram_func, which cortex-m-rt copies into RAM with the rest of .data
// at startup.
fn generate_rp2040_memory_x() {
    let memory_x = r#"
MEMORY {
    BOOT2 : ORIGIN = 0x10000000, LENGTH = 0x100
    FLASH : ORIGIN = 0x10000100, LENGTH = 16384K - 0x100
    RAM   : ORIGIN = 0x20000000, LENGTH = 264K
}
"#;

    let out_dir = env::var("OUT_DIR").unwrap();
    let memory_path = Path::new(&out_dir).join("memory.x");
    fs::write(memory_path, memory_x).unwrap();
    println!("cargo:rustc-link-search={out_dir}");
}
