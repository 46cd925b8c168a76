//! # GHST Channel Decoder
//!
//! Maps uplink RC payloads onto the 16-entry channel array.
//!
//! Every uplink RC frame carries channels 1-4 at 12-bit resolution. The
//! remaining four bytes rotate between CH5-8, CH9-12 and CH13-16 (8-bit), or
//! carry link statistics for the RSSI subtype.

use super::protocol::*;
use crate::error::FrameError;

/// Link statistics carried by the RSSI subtype
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct LinkStats {
    /// Link quality (0-100%)
    pub link_quality: u8,
    /// Received signal strength in dBm (wire value is sign inverted)
    pub rssi_dbm: i16,
    /// RF protocol / mode identifier
    pub rf_protocol: u8,
    /// Transmitter power in dBm
    pub tx_power_dbm: i8,
}

impl LinkStats {
    /// Link quality scaled from 0-100 onto 0-[`RSSI_MAX_VALUE`]
    pub fn scaled_link_quality(&self) -> u16 {
        let lq = self.link_quality.min(100) as u32;
        (lq * RSSI_MAX_VALUE as u32 / 100) as u16
    }
}

/// Four channels written starting at `start`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuxChannels {
    pub start: usize,
    pub values: [u16; 4],
}

/// Channel changes carried by one uplink RC frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelUpdate {
    /// Raw values for channels 1-4
    pub primary: [u16; 4],
    /// Rotating aux quartet, if the subtype carries one
    pub aux: Option<AuxChannels>,
    /// Link statistics, for the RSSI subtype
    pub link: Option<LinkStats>,
}

/// Decode the payload of an uplink RC frame
///
/// # Arguments
///
/// * `frame_type` - Frame type byte, must be in the uplink RC range
/// * `payload` - Frame payload (at least 10 bytes)
///
/// # Returns
///
/// * `Result<Option<ChannelUpdate>, FrameError>` - `None` for frame types
///   outside the uplink RC range
///
/// # Errors
///
/// Returns `FrameError::PayloadTooShort` for an uplink RC frame with fewer
/// than 10 payload bytes
pub fn decode_channels(frame_type: u8, payload: &[u8]) -> Result<Option<ChannelUpdate>, FrameError> {
    if !is_uplink_rc_frame(frame_type) {
        return Ok(None);
    }

    if payload.len() < GHST_UL_RC_PAYLOAD_SIZE {
        return Err(FrameError::PayloadTooShort { frame_type, len: payload.len() });
    }

    let primary = unpack_primary(&payload[..6]);
    let extra = [payload[6], payload[7], payload[8], payload[9]];

    let subtype = UplinkSubtype::from_frame_type(frame_type);

    let aux = subtype.and_then(UplinkSubtype::aux_start).map(|start| AuxChannels {
        start,
        values: extra.map(|b| (b as u16) << 3),
    });

    let link = match subtype {
        Some(UplinkSubtype::Rssi) => Some(LinkStats {
            link_quality: extra[0],
            rssi_dbm: -(extra[1] as i16),
            rf_protocol: extra[2],
            tx_power_dbm: extra[3] as i8,
        }),
        _ => None,
    };

    Ok(Some(ChannelUpdate { primary, aux, link }))
}

/// Unpack four 12-bit little-endian bitfields, scaled down by one bit
fn unpack_primary(bytes: &[u8]) -> [u16; 4] {
    let field = |lo: u8, mid: u8, high_nibble: bool| -> u16 {
        if high_nibble {
            ((lo as u16) >> 4) | ((mid as u16) << 4)
        } else {
            (lo as u16) | (((mid & 0x0F) as u16) << 8)
        }
    };

    [
        field(bytes[0], bytes[1], false) >> 1,
        field(bytes[1], bytes[2], true) >> 1,
        field(bytes[3], bytes[4], false) >> 1,
        field(bytes[4], bytes[5], true) >> 1,
    ]
}

/// Convert a raw channel value to microseconds
///
/// ```text
///      OpenTx   raw    PWM
/// min  -1024    172    988us
/// ctr  0        992    1500us
/// max  1024     1811   2012us
/// ```
pub fn raw_to_us(raw: u16) -> u16 {
    ((5 * (raw as u32 + 1)) / 8 + 880) as u16
}

/// Last-known raw value of every channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelArray {
    values: RcChannels,
}

impl Default for ChannelArray {
    fn default() -> Self {
        Self { values: [GHST_CHANNEL_VALUE_CENTER; GHST_MAX_NUM_CHANNELS] }
    }
}

impl ChannelArray {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write the channels carried by `update`, leaving the rest untouched
    pub fn apply(&mut self, update: &ChannelUpdate) {
        self.values[..4].copy_from_slice(&update.primary);

        if let Some(aux) = update.aux {
            self.values[aux.start..aux.start + 4].copy_from_slice(&aux.values);
        }
    }

    /// Raw value of `index`, `None` past the last channel
    pub fn raw(&self, index: usize) -> Option<u16> {
        self.values.get(index).copied()
    }

    pub fn as_raw(&self) -> &RcChannels {
        &self.values
    }

    /// All channels converted to microseconds
    pub fn to_us(&self) -> RcChannels {
        self.values.map(raw_to_us)
    }
}
