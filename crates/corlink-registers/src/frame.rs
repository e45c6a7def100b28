// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Vendor framing for holding-register reads. The custom frame wraps the
// usual function 0x03 request body (`unit | fc | address | count`):
//
//   AA FE 55 00 00 01 | len:u32 | body
//
// All multi-byte fields are big-endian. Standard Modbus-TCP framing is left
// to tokio-modbus.

/// Read Holding Registers.
pub const FC_READ_HOLDING_REGISTERS: u8 = 0x03;

/// Protocol limit for one FC03 read: (253 - 2) / 2.
pub const MAX_READ_REGISTERS: u16 = 125;

/// Vendor prefix of the custom raw frame.
pub const CUSTOM_PREFIX: [u8; 6] = [0xAA, 0xFE, 0x55, 0x00, 0x00, 0x01];

/// Length of a custom read request.
pub const CUSTOM_FRAME_LEN: usize = 16;

/// Bytes following the length field in a read request.
const READ_BODY_LEN: u16 = 6;

/// Build the custom raw read request.
pub fn custom_read_frame(unit_id: u8, address: u16, count: u16) -> [u8; CUSTOM_FRAME_LEN] {
    let mut frame = [0u8; CUSTOM_FRAME_LEN];
    frame[..6].copy_from_slice(&CUSTOM_PREFIX);
    frame[6..10].copy_from_slice(&u32::from(READ_BODY_LEN).to_be_bytes());
    frame[10] = unit_id;
    frame[11] = FC_READ_HOLDING_REGISTERS;
    frame[12..14].copy_from_slice(&address.to_be_bytes());
    frame[14..16].copy_from_slice(&count.to_be_bytes());
    frame
}
