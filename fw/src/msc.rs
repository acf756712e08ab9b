// Copyright (c) 2025 Robin Edwards
//
// MIT licence

//! USB mass-storage class (bulk-only transport, transparent SCSI).
//!
//! The device stack provides the bus plumbing but no storage class, so this
//! implements the class function against its builder API, the same way the
//! stack's own CDC-ACM class is put together: a `State` holding the control
//! handler, a class struct owning the two bulk endpoints, and a run loop
//! that turns SCSI commands into 512 byte block traffic against the flash
//! disk.
//!
//! Every WRITE(10) is followed by a filesystem sync before its status goes
//! back to the host, so a surprise unplug can only lose traffic the host
//! has not been told was safe.

use core::mem::MaybeUninit;

use a8pico_flashfs::{BLOCK_SIZE, FlashDisk, NUM_FAT_SECTORS, SectorFlash};
use embassy_usb::control::{InResponse, OutResponse, Recipient, Request, RequestType};
use embassy_usb::driver::{Driver, Endpoint, EndpointError, EndpointIn, EndpointOut};
use embassy_usb::types::InterfaceNumber;
use embassy_usb::{Builder, Handler};
use log::{debug, warn};

const USB_CLASS_MSC: u8 = 0x08;
const MSC_SUBCLASS_SCSI: u8 = 0x06;
const MSC_PROTOCOL_BULK_ONLY: u8 = 0x50;

const REQ_GET_MAX_LUN: u8 = 0xFE;
const REQ_BULK_ONLY_RESET: u8 = 0xFF;

const CBW_SIGNATURE: u32 = 0x4342_5355; // "USBC"
const CSW_SIGNATURE: u32 = 0x5342_5355; // "USBS"
const CBW_LEN: usize = 31;

const STATUS_GOOD: u8 = 0x00;
const STATUS_FAILED: u8 = 0x01;

// SCSI operation codes, the set the host actually uses against a flash
// drive.
const SCSI_TEST_UNIT_READY: u8 = 0x00;
const SCSI_REQUEST_SENSE: u8 = 0x03;
const SCSI_INQUIRY: u8 = 0x12;
const SCSI_MODE_SENSE_6: u8 = 0x1A;
const SCSI_START_STOP_UNIT: u8 = 0x1B;
const SCSI_PREVENT_ALLOW_REMOVAL: u8 = 0x1E;
const SCSI_READ_FORMAT_CAPACITIES: u8 = 0x23;
const SCSI_READ_CAPACITY_10: u8 = 0x25;
const SCSI_READ_10: u8 = 0x28;
const SCSI_WRITE_10: u8 = 0x2A;
const SCSI_SYNCHRONIZE_CACHE_10: u8 = 0x35;

// Fixed-format sense data: (key, additional sense code, qualifier).
const SENSE_NONE: (u8, u8, u8) = (0x00, 0x00, 0x00);
const SENSE_ILLEGAL_REQUEST: (u8, u8, u8) = (0x05, 0x20, 0x00);
const SENSE_MEDIUM_ERROR: (u8, u8, u8) = (0x03, 0x11, 0x00);

/// Shared state for the class; lives as long as the USB device.
pub struct State {
    control: MaybeUninit<Control>,
}

impl State {
    pub const fn new() -> Self {
        Self {
            control: MaybeUninit::uninit(),
        }
    }
}

struct Control {
    if_num: InterfaceNumber,
}

impl Handler for Control {
    fn control_out(&mut self, req: Request, _buf: &[u8]) -> Option<OutResponse> {
        if req.request_type != RequestType::Class
            || req.recipient != Recipient::Interface
            || req.index != u8::from(self.if_num) as u16
        {
            return None;
        }
        match req.request {
            // Bulk-only reset: the run loop re-synchronises on the next CBW.
            REQ_BULK_ONLY_RESET => Some(OutResponse::Accepted),
            _ => Some(OutResponse::Rejected),
        }
    }

    fn control_in<'a>(&'a mut self, req: Request, buf: &'a mut [u8]) -> Option<InResponse<'a>> {
        if req.request_type != RequestType::Class
            || req.recipient != Recipient::Interface
            || req.index != u8::from(self.if_num) as u16
        {
            return None;
        }
        match req.request {
            REQ_GET_MAX_LUN => {
                buf[0] = 0; // single LUN
                Some(InResponse::Accepted(&buf[..1]))
            }
            _ => Some(InResponse::Rejected),
        }
    }
}

/// One command block wrapper off the wire.
struct Cbw {
    tag: u32,
    data_len: u32,
    command: [u8; 16],
}

impl Cbw {
    fn parse(raw: &[u8]) -> Option<Self> {
        if raw.len() < CBW_LEN {
            return None;
        }
        let signature = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
        if signature != CBW_SIGNATURE {
            return None;
        }
        let cb_len = (raw[14] & 0x1F) as usize;
        if cb_len == 0 || cb_len > 16 {
            return None;
        }
        let mut command = [0u8; 16];
        command[..cb_len].copy_from_slice(&raw[15..15 + cb_len]);
        Some(Self {
            tag: u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]),
            data_len: u32::from_le_bytes([raw[8], raw[9], raw[10], raw[11]]),
            command,
        })
    }
}

pub struct MassStorageClass<'d, D: Driver<'d>> {
    read_ep: D::EndpointOut,
    write_ep: D::EndpointIn,
    max_packet_size: usize,
    sense: (u8, u8, u8),
}

impl<'d, D: Driver<'d>> MassStorageClass<'d, D> {
    pub fn new(builder: &mut Builder<'d, D>, state: &'d mut State, max_packet_size: u16) -> Self {
        let mut func = builder.function(USB_CLASS_MSC, MSC_SUBCLASS_SCSI, MSC_PROTOCOL_BULK_ONLY);
        let mut iface = func.interface();
        let if_num = iface.interface_number();
        let mut alt = iface.alt_setting(USB_CLASS_MSC, MSC_SUBCLASS_SCSI, MSC_PROTOCOL_BULK_ONLY, None);
        let read_ep = alt.endpoint_bulk_out(max_packet_size);
        let write_ep = alt.endpoint_bulk_in(max_packet_size);
        drop(func);

        let control = state.control.write(Control { if_num });
        builder.handler(control);

        Self {
            read_ep,
            write_ep,
            max_packet_size: max_packet_size as usize,
            sense: SENSE_NONE,
        }
    }

    /// Serve SCSI over the bulk pipes forever.
    pub async fn run<F: SectorFlash>(&mut self, disk: &FlashDisk<'_, F>) -> ! {
        loop {
            self.read_ep.wait_enabled().await;
            debug!("MSC endpoints enabled");
            loop {
                let mut raw = [0u8; 64];
                let n = match self.read_ep.read(&mut raw).await {
                    Ok(n) => n,
                    Err(EndpointError::Disabled) => break,
                    Err(_) => continue,
                };
                let Some(cbw) = Cbw::parse(&raw[..n]) else {
                    warn!("bad CBW ({n} bytes)");
                    continue;
                };
                if self.handle_command(&cbw, disk).await.is_err() {
                    break;
                }
            }
        }
    }

    async fn handle_command<F: SectorFlash>(
        &mut self,
        cbw: &Cbw,
        disk: &FlashDisk<'_, F>,
    ) -> Result<(), EndpointError> {
        let opcode = cbw.command[0];
        let mut reply = [0u8; 36];
        let status = match opcode {
            SCSI_TEST_UNIT_READY
            | SCSI_START_STOP_UNIT
            | SCSI_PREVENT_ALLOW_REMOVAL => {
                self.sense = SENSE_NONE;
                self.send_csw(cbw, cbw.data_len, STATUS_GOOD).await?;
                return Ok(());
            }
            SCSI_SYNCHRONIZE_CACHE_10 => {
                let status = if disk.sync().is_ok() {
                    self.sense = SENSE_NONE;
                    STATUS_GOOD
                } else {
                    self.sense = SENSE_MEDIUM_ERROR;
                    STATUS_FAILED
                };
                self.send_csw(cbw, cbw.data_len, status).await?;
                return Ok(());
            }
            SCSI_INQUIRY => {
                reply[1] = 0x80; // removable
                reply[2] = 0x02; // SPC-2
                reply[3] = 0x02; // response data format
                reply[4] = 31; // additional length
                reply[8..16].copy_from_slice(b"A8PICO  ");
                reply[16..32].copy_from_slice(b"PicoCart Flash  ");
                reply[32..36].copy_from_slice(b"1.0 ");
                return self.send_data_and_csw(cbw, &reply[..36]).await;
            }
            SCSI_REQUEST_SENSE => {
                reply[0] = 0x70; // fixed format, current errors
                reply[2] = self.sense.0;
                reply[7] = 10; // additional length
                reply[12] = self.sense.1;
                reply[13] = self.sense.2;
                return self.send_data_and_csw(cbw, &reply[..18]).await;
            }
            SCSI_MODE_SENSE_6 => {
                reply[0] = 3; // length of the rest
                return self.send_data_and_csw(cbw, &reply[..4]).await;
            }
            SCSI_READ_CAPACITY_10 => {
                reply[0..4].copy_from_slice(&(NUM_FAT_SECTORS as u32 - 1).to_be_bytes());
                reply[4..8].copy_from_slice(&(BLOCK_SIZE as u32).to_be_bytes());
                return self.send_data_and_csw(cbw, &reply[..8]).await;
            }
            SCSI_READ_FORMAT_CAPACITIES => {
                reply[3] = 8; // capacity list length
                reply[4..8].copy_from_slice(&(NUM_FAT_SECTORS as u32).to_be_bytes());
                reply[8] = 0x02; // formatted media
                reply[9..12].copy_from_slice(&(BLOCK_SIZE as u32).to_be_bytes()[1..]);
                return self.send_data_and_csw(cbw, &reply[..12]).await;
            }
            SCSI_READ_10 => return self.read_10(cbw, disk).await,
            SCSI_WRITE_10 => return self.write_10(cbw, disk).await,
            _ => {
                debug!("unsupported SCSI opcode {opcode:#04X}");
                self.sense = SENSE_ILLEGAL_REQUEST;
                STATUS_FAILED
            }
        };
        self.send_csw(cbw, cbw.data_len, status).await
    }

    async fn read_10<F: SectorFlash>(
        &mut self,
        cbw: &Cbw,
        disk: &FlashDisk<'_, F>,
    ) -> Result<(), EndpointError> {
        let lba = u32::from_be_bytes([cbw.command[2], cbw.command[3], cbw.command[4], cbw.command[5]]);
        let count = u16::from_be_bytes([cbw.command[7], cbw.command[8]]) as u32;

        let mut sent = 0u32;
        let mut block = [0u8; BLOCK_SIZE];
        for i in 0..count {
            if disk.read_blocks(&mut block, lba + i).is_err() {
                self.sense = SENSE_MEDIUM_ERROR;
                return self.send_csw(cbw, cbw.data_len - sent, STATUS_FAILED).await;
            }
            self.send_chunked(&block).await?;
            sent += BLOCK_SIZE as u32;
        }
        self.sense = SENSE_NONE;
        self.send_csw(cbw, cbw.data_len.saturating_sub(sent), STATUS_GOOD)
            .await
    }

    async fn write_10<F: SectorFlash>(
        &mut self,
        cbw: &Cbw,
        disk: &FlashDisk<'_, F>,
    ) -> Result<(), EndpointError> {
        let lba = u32::from_be_bytes([cbw.command[2], cbw.command[3], cbw.command[4], cbw.command[5]]);
        let count = u16::from_be_bytes([cbw.command[7], cbw.command[8]]) as u32;

        let mut received = 0u32;
        let mut failed = false;
        let mut block = [0u8; BLOCK_SIZE];
        for i in 0..count {
            let mut at = 0;
            while at < BLOCK_SIZE {
                at += self.read_ep.read(&mut block[at..]).await?;
            }
            received += BLOCK_SIZE as u32;
            // Write-and-verify; a mismatch fails the whole transfer rather
            // than letting bit rot into the FAT.
            if !failed && disk.write_blocks(&block, lba + i).is_err() {
                failed = true;
            }
        }

        // Nothing is acknowledged until the map is on flash.
        if disk.sync().is_err() {
            failed = true;
        }
        let status = if failed {
            self.sense = SENSE_MEDIUM_ERROR;
            STATUS_FAILED
        } else {
            self.sense = SENSE_NONE;
            STATUS_GOOD
        };
        self.send_csw(cbw, cbw.data_len.saturating_sub(received), status)
            .await
    }

    /// Send a data-in payload capped at what the host asked for, then the
    /// status.
    async fn send_data_and_csw(&mut self, cbw: &Cbw, data: &[u8]) -> Result<(), EndpointError> {
        let len = (cbw.data_len as usize).min(data.len());
        self.send_chunked(&data[..len]).await?;
        self.sense = SENSE_NONE;
        self.send_csw(cbw, cbw.data_len - len as u32, STATUS_GOOD).await
    }

    async fn send_chunked(&mut self, data: &[u8]) -> Result<(), EndpointError> {
        for chunk in data.chunks(self.max_packet_size) {
            self.write_ep.write(chunk).await?;
        }
        Ok(())
    }

    async fn send_csw(&mut self, cbw: &Cbw, residue: u32, status: u8) -> Result<(), EndpointError> {
        let mut csw = [0u8; 13];
        csw[0..4].copy_from_slice(&CSW_SIGNATURE.to_le_bytes());
        csw[4..8].copy_from_slice(&cbw.tag.to_le_bytes());
        csw[8..12].copy_from_slice(&residue.to_le_bytes());
        csw[12] = status;
        self.write_ep.write(&csw).await
    }
}
