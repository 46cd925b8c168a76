//! # GHST Protocol Constants and Types
//!
//! Core protocol definitions for GHST (ImmersionRC Ghost) communication.
//!
//! Frame structure: `addr(1) + length(1) + type(1) + payload(N) + crc(1)`,
//! where `length` counts type + payload + crc.

/// GHST receiver baud rate (single wire, half duplex)
pub const GHST_RX_BAUDRATE: u32 = 420_000;

/// Width of the address field
pub const GHST_FRAME_LENGTH_ADDRESS: usize = 1;

/// Width of the length field
pub const GHST_FRAME_LENGTH_FRAMELENGTH: usize = 1;

/// Bytes counted by the length field besides the payload (type + crc)
pub const GHST_FRAME_LENGTH_TYPE_CRC: usize = 2;

/// Uplink RC frame size, including addr, len, type, payload and crc
pub const GHST_FRAME_SIZE: usize = 14;

/// Largest frame the receive buffer holds
pub const GHST_FRAME_SIZE_MAX: usize = 24;

/// Largest payload that fits a maximum-size frame
pub const GHST_PAYLOAD_SIZE_MAX: usize =
    GHST_FRAME_SIZE_MAX - GHST_FRAME_LENGTH_ADDRESS - GHST_FRAME_LENGTH_FRAMELENGTH - GHST_FRAME_LENGTH_TYPE_CRC;

/// Length field value of an uplink RC frame (1 type + 10 data + 1 crc)
pub const GHST_UL_RC_CHANS_SIZE: u8 = 12;

/// Uplink RC payload size (4x 12-bit + 4x 8-bit)
pub const GHST_UL_RC_PAYLOAD_SIZE: usize = 10;

/// Frame length assumed until the length field has been received
pub const GHST_PROVISIONAL_FRAME_LENGTH: usize = 5;

/// One byte (8N1, 10 bits) @ 420k, rounded up
pub const GHST_BYTE_TIME_US: u32 = 24;

/// 14 bytes @ 420k is ~450us
pub const GHST_MAX_FRAME_TIME_US: u32 = 500;

/// Fastest frame rate is 222.22Hz
pub const GHST_TIME_BETWEEN_FRAMES_US: u32 = 4_500;

/// Earliest point after an uplink frame ends at which telemetry may be sent
pub const GHST_RX_TO_TELEMETRY_MIN_US: u32 = 1_000;

/// Latest point after an uplink frame ends at which telemetry may be sent
pub const GHST_RX_TO_TELEMETRY_MAX_US: u32 = 2_000;

/// Per-subtype timeout, long enough for the 12Hz long range mode
pub const GHST_RC_FRAME_TIMEOUT_MS: u32 = 300;

/// On-time frames required per subtype before failsafe clears
pub const GHST_RC_FRAME_COUNT_THRESHOLD: u8 = 4;

/// Number of logical RC channels
pub const GHST_MAX_NUM_CHANNELS: usize = 16;

/// Raw channel value at stick center (1500us)
pub const GHST_CHANNEL_VALUE_CENTER: u16 = 992;

/// Raw channel value at stick minimum (988us)
pub const GHST_CHANNEL_VALUE_MIN: u16 = 172;

/// Raw channel value at stick maximum (2012us)
pub const GHST_CHANNEL_VALUE_MAX: u16 = 1_811;

/// Upper end of the link quality scale handed to the consumer
pub const RSSI_MAX_VALUE: u16 = 1_023;

/// First frame type carrying the 4 primary channels
pub const GHST_UL_RC_CHANS_HS4_FIRST: u8 = 0x10;

/// Last frame type carrying the 4 primary channels
pub const GHST_UL_RC_CHANS_HS4_LAST: u8 = 0x1F;

/// Number of uplink subtypes tracked for failsafe
pub const GHST_UL_RC_CHANS_FRAME_COUNT: usize = 4;

/// Raw channel array type (16 channels)
pub type RcChannels = [u16; GHST_MAX_NUM_CHANNELS];

/// Device addresses on the GHST bus
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GhstAddress {
    Radio = 0x80,
    /// Symmetrical, 400k pulses, 400k telemetry
    TxModuleSym = 0x81,
    FlightController = 0x82,
    Goggles = 0x83,
    /// Asymmetrical, 400k pulses, 115k telemetry
    TxModuleAsym = 0x88,
    Receiver = 0x89,
}

/// Destination address every accepted uplink frame must carry
pub const GHST_ADDR_FC: u8 = GhstAddress::FlightController as u8;

/// Uplink RC frame subtypes tracked individually by the failsafe logic
///
/// Every subtype carries channels 1-4; the remaining four bytes carry a
/// rotating quartet of aux channels, or link statistics.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UplinkSubtype {
    /// CH1-4 (12 bit) plus CH5-8 (8 bit)
    Channels5To8 = 0x10,
    /// CH1-4 plus CH9-12
    Channels9To12 = 0x11,
    /// CH1-4 plus CH13-16
    Channels13To16 = 0x12,
    /// CH1-4 plus LQ, RSSI, RF protocol and TX power
    Rssi = 0x13,
}

impl UplinkSubtype {
    /// All tracked subtypes in index order
    pub const ALL: [UplinkSubtype; GHST_UL_RC_CHANS_FRAME_COUNT] = [
        UplinkSubtype::Channels5To8,
        UplinkSubtype::Channels9To12,
        UplinkSubtype::Channels13To16,
        UplinkSubtype::Rssi,
    ];

    /// Map a frame type onto a tracked subtype
    ///
    /// Types inside the uplink RC range but past the tracked subtypes
    /// return `None`.
    pub fn from_frame_type(frame_type: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|s| *s as u8 == frame_type)
    }

    /// Offset of this subtype from the first uplink RC type
    pub fn index(self) -> usize {
        (self as u8 - GHST_UL_RC_CHANS_HS4_FIRST) as usize
    }

    /// First logical channel of the aux quartet carried by this subtype
    pub fn aux_start(self) -> Option<usize> {
        match self {
            UplinkSubtype::Channels5To8 => Some(4),
            UplinkSubtype::Channels9To12 => Some(8),
            UplinkSubtype::Channels13To16 => Some(12),
            UplinkSubtype::Rssi => None,
        }
    }
}

/// Whether a frame type carries the 4 primary channels
pub fn is_uplink_rc_frame(frame_type: u8) -> bool {
    (GHST_UL_RC_CHANS_HS4_FIRST..=GHST_UL_RC_CHANS_HS4_LAST).contains(&frame_type)
}

/// Downlink (telemetry) frame types
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownlinkType {
    OpenTxSync = 0x20,
    LinkStat = 0x21,
    VtxStat = 0x22,
    /// Battery (pack) status
    PackStat = 0x23,
    GpsPrimary = 0x25,
    GpsSecondary = 0x26,
}

/// A complete GHST frame held in a fixed-size buffer
///
/// Accessors assume the frame has passed through the assembler, which only
/// produces frames whose length field fits the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GhstFrame {
    bytes: [u8; GHST_FRAME_SIZE_MAX],
    len: usize,
}

impl GhstFrame {
    /// Wrap raw frame bytes
    ///
    /// # Returns
    ///
    /// * `Option<GhstFrame>` - `None` if `bytes` is shorter than the minimum
    ///   frame or longer than the frame buffer
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < full_frame_length(0) + GHST_FRAME_LENGTH_TYPE_CRC || bytes.len() > GHST_FRAME_SIZE_MAX {
            return None;
        }
        let mut buf = [0u8; GHST_FRAME_SIZE_MAX];
        buf[..bytes.len()].copy_from_slice(bytes);
        Some(Self { bytes: buf, len: bytes.len() })
    }

    pub fn address(&self) -> u8 {
        self.bytes[0]
    }

    /// Raw length field (type + payload + crc)
    pub fn length_field(&self) -> u8 {
        self.bytes[1]
    }

    pub fn frame_type(&self) -> u8 {
        self.bytes[2]
    }

    /// Payload bytes between type and crc, as described by the length field
    pub fn payload(&self) -> &[u8] {
        let end = self.crc_offset().max(3);
        &self.bytes[3..end]
    }

    /// Trailing CRC byte
    pub fn crc(&self) -> u8 {
        self.bytes[self.crc_offset()]
    }

    /// Complete frame bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    fn crc_offset(&self) -> usize {
        let full = full_frame_length(self.length_field()).min(self.len);
        full.saturating_sub(1).max(2)
    }
}

/// Full on-wire frame length for a given length field
pub fn full_frame_length(length_field: u8) -> usize {
    length_field as usize + GHST_FRAME_LENGTH_ADDRESS + GHST_FRAME_LENGTH_FRAMELENGTH
}

/// Whether a length field describes a frame the receive buffer can hold
pub fn is_valid_length_field(length_field: u8) -> bool {
    (length_field as usize) >= GHST_FRAME_LENGTH_TYPE_CRC
        && full_frame_length(length_field) <= GHST_FRAME_SIZE_MAX
}
