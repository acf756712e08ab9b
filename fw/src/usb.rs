// Copyright (c) 2025 Robin Edwards
//
// MIT licence

//! USB composite device: mass storage over the flash filesystem plus a
//! CDC-ACM diagnostic port that echoes whatever a terminal types at it.

#![allow(static_mut_refs)]

use a8pico_flashfs::SectorFlash;
use embassy_futures::join::join3;
use embassy_rp::peripherals::USB;
use embassy_rp::usb::{Driver, InterruptHandler};
use embassy_rp::{Peri, bind_interrupts, peripherals};
use embassy_usb::class::cdc_acm::{CdcAcmClass, State as CdcState};
use embassy_usb::{Builder, Config as UsbConfig};
use log::info;

use crate::msc::{MassStorageClass, State as MscState};
use a8pico_flashfs::FlashDisk;

bind_interrupts!(struct Irqs {
    USBCTRL_IRQ => InterruptHandler<peripherals::USB>;
});

// Static buffers for USB
static mut CONFIG_DESCRIPTOR: [u8; 256] = [0; 256];
static mut BOS_DESCRIPTOR: [u8; 256] = [0; 256];
static mut CONTROL_BUF: [u8; 64] = [0; 64];
static mut CDC_STATE: CdcState = CdcState::new();
static mut MSC_STATE: MscState = MscState::new();

/// Bring the composite device up and service it forever.
pub async fn run<F: SectorFlash>(usb: Peri<'static, USB>, disk: &FlashDisk<'_, F>) -> ! {
    let driver = Driver::new(usb, Irqs);

    let mut config = UsbConfig::new(0x2E8A, 0xA8C0);
    config.manufacturer = Some("Electrotrains");
    config.product = Some("A8-PicoCart");
    config.serial_number = Some("A8PICO");

    // Required for Windows to bind the CDC driver on a composite device
    config.device_class = 0xEF;
    config.device_sub_class = 0x02;
    config.device_protocol = 0x01;
    config.composite_with_iads = true;

    let mut builder = Builder::new(
        driver,
        config,
        unsafe { &mut CONFIG_DESCRIPTOR },
        unsafe { &mut BOS_DESCRIPTOR },
        &mut [],
        unsafe { &mut CONTROL_BUF },
    );

    let mut cdc = CdcAcmClass::new(&mut builder, unsafe { &mut CDC_STATE }, 64);
    let mut msc = MassStorageClass::new(&mut builder, unsafe { &mut MSC_STATE }, 64);

    let mut device = builder.build();
    info!("USB device up");

    join3(device.run(), msc.run(disk), echo(&mut cdc)).await;
    unreachable!()
}

/// The original firmware's serial loopback, kept as a liveness check.
async fn echo(class: &mut CdcAcmClass<'static, Driver<'static, USB>>) -> ! {
    loop {
        class.wait_connection().await;
        info!("CDC terminal connected");
        let mut buf = [0u8; 64];
        loop {
            match class.read_packet(&mut buf).await {
                Ok(n) => {
                    let _ = class.write_packet(&buf[..n]).await;
                }
                Err(_) => break,
            }
        }
    }
}
