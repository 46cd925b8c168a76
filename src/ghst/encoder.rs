//! # GHST Frame Encoder
//!
//! Builds GHST wire frames for the downlink (telemetry) direction. Uplink RC
//! frame builders, as a receiver would send them, are test fixtures.

use super::crc::frame_crc;
use super::protocol::*;
use crate::error::{FrameError, Result};

/// Largest raw value a 12-bit wire field can carry after the 1-bit shift
#[cfg(test)]
const RAW_PRIMARY_MAX: u16 = 0x7FF;

/// Clamp a raw primary channel value to the 11-bit range the wire carries
///
/// # Arguments
///
/// * `value` - Raw channel value
///
/// # Returns
///
/// * `u16` - Value clamped to 0-2047
#[cfg(test)]
pub fn clamp_channel_value(value: u16) -> u16 {
    value.min(RAW_PRIMARY_MAX)
}

/// Pack an uplink RC payload
///
/// Channels 1-4 are stored as 12-bit little-endian bitfields holding
/// `raw << 1`; the four trailing bytes are copied verbatim (aux channels as
/// `raw >> 3`, or link statistics for the RSSI subtype).
///
/// # Arguments
///
/// * `primary` - Raw values for channels 1-4 (0-2047)
/// * `extra` - Trailing four payload bytes
///
/// # Returns
///
/// * `[u8; GHST_UL_RC_PAYLOAD_SIZE]` - Packed payload
#[cfg(test)]
pub fn pack_rc_payload(primary: [u16; 4], extra: [u8; 4]) -> [u8; GHST_UL_RC_PAYLOAD_SIZE] {
    let wire = primary.map(|ch| clamp_channel_value(ch) << 1);
    let mut payload = [0u8; GHST_UL_RC_PAYLOAD_SIZE];

    for (pair, chunk) in wire.chunks(2).zip(payload[..6].chunks_mut(3)) {
        let (a, b) = (pair[0], pair[1]);
        chunk[0] = a as u8;
        chunk[1] = ((a >> 8) & 0x0F) as u8 | ((b & 0x0F) << 4) as u8;
        chunk[2] = (b >> 4) as u8;
    }

    payload[6..].copy_from_slice(&extra);
    payload
}

/// Encode a complete frame with CRC
///
/// # Arguments
///
/// * `address` - Destination address
/// * `frame_type` - Frame type byte
/// * `payload` - Payload data (max [`GHST_PAYLOAD_SIZE_MAX`] bytes)
///
/// # Errors
///
/// Returns `FrameError::InvalidLength` if the payload does not fit a frame
pub fn encode_frame(address: u8, frame_type: u8, payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > GHST_PAYLOAD_SIZE_MAX {
        let len = (payload.len() + GHST_FRAME_LENGTH_TYPE_CRC).min(u8::MAX as usize) as u8;
        return Err(FrameError::InvalidLength(len).into());
    }

    let length = (payload.len() + GHST_FRAME_LENGTH_TYPE_CRC) as u8;
    let mut frame = Vec::with_capacity(full_frame_length(length));
    frame.push(address);
    frame.push(length);
    frame.push(frame_type);
    frame.extend_from_slice(payload);
    frame.push(frame_crc(frame_type, payload));

    Ok(frame)
}

/// Encode a downlink telemetry frame addressed to the receiver
///
/// # Errors
///
/// Returns `FrameError::InvalidLength` if the payload does not fit a frame
pub fn encode_telemetry_frame(kind: DownlinkType, payload: &[u8]) -> Result<Vec<u8>> {
    encode_frame(GhstAddress::Receiver as u8, kind as u8, payload)
}

/// Encode an uplink RC frame addressed to the flight controller
#[cfg(test)]
pub fn encode_rc_frame(subtype: UplinkSubtype, primary: [u16; 4], extra: [u8; 4]) -> Vec<u8> {
    encode_rc_frame_with_type(subtype as u8, primary, extra)
}

/// Encode an uplink RC-shaped frame with an arbitrary type byte
#[cfg(test)]
pub fn encode_rc_frame_with_type(frame_type: u8, primary: [u16; 4], extra: [u8; 4]) -> Vec<u8> {
    let payload = pack_rc_payload(primary, extra);

    let mut frame = Vec::with_capacity(GHST_FRAME_SIZE);
    frame.push(GHST_ADDR_FC);
    frame.push(GHST_UL_RC_CHANS_SIZE);
    frame.push(frame_type);
    frame.extend_from_slice(&payload);
    frame.push(frame_crc(frame_type, &payload));
    frame
}
