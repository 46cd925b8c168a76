//! # Error Types
//!
//! Custom error types for the GHST receiver using `thiserror`.

use thiserror::Error;

/// Reasons a completed frame is refused by the validator
///
/// None of these propagate past the driver: a refused frame is reported once
/// as a dropped frame and forgotten, the protocol has no retransmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Trailing CRC byte does not match the CRC computed over type + payload
    #[error("CRC mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    ChecksumMismatch { expected: u8, actual: u8 },

    /// Frame is addressed to some other device on the bus
    #[error("frame addressed to 0x{0:02X}, not the flight controller")]
    WrongAddress(u8),

    /// Length field cannot describe a frame that fits the frame buffer
    #[error("invalid frame length field {0}")]
    InvalidLength(u8),

    /// Payload is shorter than the frame type requires
    #[error("payload too short for frame type 0x{frame_type:02X}: {len} bytes")]
    PayloadTooShort { frame_type: u8, len: usize },
}

/// Main error type for the GHST receiver
#[derive(Debug, Error)]
pub enum GhstError {
    /// GHST framing / validation errors
    #[error("GHST frame error: {0}")]
    Frame(#[from] FrameError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port errors
    #[error("Serial port error: {0}")]
    Serial(String),

    /// No serial port is configured for the receiver
    #[error("no serial port configured for the GHST receiver")]
    NoTransport,

    /// Channel recorder serialization errors
    #[error("Recorder error: {0}")]
    Recorder(#[from] serde_json::Error),
}

/// Result type alias for the GHST receiver
pub type Result<T> = std::result::Result<T, GhstError>;
