//! # GHST Frame Validator
//!
//! Checks a completed frame's CRC and destination address.

use super::assembler::RxLink;
use super::crc::frame_crc;
use super::handoff::Take;
use super::protocol::*;
use crate::error::FrameError;

/// Result of polling the shared frame slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// CRC and address are good, frame is ready for decode
    Accepted(GhstFrame),
    /// Frame failed validation and was dropped
    Rejected(FrameError),
    /// No new frame since the last poll
    NotReady,
}

/// Validate a completed frame
///
/// # Arguments
///
/// * `bytes` - Complete frame bytes (addr, length, type, payload, crc)
///
/// # Returns
///
/// * `Result<GhstFrame, FrameError>` - The frame if CRC and address check out
///
/// # Errors
///
/// Returns error if:
/// - The length field does not match a frame of `bytes.len()` bytes
/// - CRC over type + payload does not match the trailing byte
/// - Destination is not the flight controller
pub fn validate_frame(bytes: &[u8]) -> Result<GhstFrame, FrameError> {
    if bytes.len() < 2 {
        return Err(FrameError::InvalidLength(0));
    }

    let length_field = bytes[1];
    if !is_valid_length_field(length_field) || full_frame_length(length_field) != bytes.len() {
        return Err(FrameError::InvalidLength(length_field));
    }

    let frame = GhstFrame::from_bytes(bytes).ok_or(FrameError::InvalidLength(length_field))?;

    let expected = frame_crc(frame.frame_type(), frame.payload());
    if expected != frame.crc() {
        return Err(FrameError::ChecksumMismatch { expected, actual: frame.crc() });
    }

    if frame.address() != GHST_ADDR_FC {
        return Err(FrameError::WrongAddress(frame.address()));
    }

    Ok(frame)
}

/// Take and validate the frame most recently completed by the assembler
///
/// A copy torn by a concurrent publish reports `NotReady`: the frame that
/// overwrote it is already flagged and will be picked up by the next poll.
pub fn poll_frame(link: &RxLink) -> Verdict {
    match link.take_frame() {
        None | Some(Take::Torn) => Verdict::NotReady,
        Some(Take::Value(bytes, len)) => match validate_frame(&bytes[..len]) {
            Ok(frame) => Verdict::Accepted(frame),
            Err(e) => Verdict::Rejected(e),
        },
    }
}
