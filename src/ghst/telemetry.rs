//! # GHST Telemetry Scheduling
//!
//! The wire is half duplex: telemetry may only be injected in the quiet
//! period after an uplink frame ends and before the next one is due.
//!
//! The outbound buffer holds at most one payload. Writing replaces anything
//! not yet sent.

use std::sync::Arc;

use super::encoder::encode_telemetry_frame;
use super::handoff::{HandoffSlot, Take};
use super::protocol::{DownlinkType, GHST_FRAME_SIZE_MAX, GHST_RX_TO_TELEMETRY_MAX_US, GHST_RX_TO_TELEMETRY_MIN_US};
use crate::error::Result;

/// Single pending telemetry payload
#[derive(Debug, Default)]
pub struct TelemetryBuffer {
    slot: HandoffSlot<GHST_FRAME_SIZE_MAX>,
}

impl TelemetryBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a payload for the next send window, replacing any unsent one
    ///
    /// # Returns
    ///
    /// * `usize` - Bytes stored (payloads longer than a frame are truncated)
    pub fn write(&self, data: &[u8]) -> usize {
        self.slot.publish(data)
    }

    /// Whether a non-empty payload is waiting
    pub fn is_pending(&self) -> bool {
        self.slot.is_available()
    }

    /// Take the pending payload, leaving the buffer empty
    pub fn take(&self) -> Option<Vec<u8>> {
        match self.slot.take()? {
            Take::Value(bytes, len) if len > 0 => Some(bytes[..len].to_vec()),
            Take::Value(..) | Take::Torn => None,
        }
    }
}

/// Producer handle given to the telemetry module
///
/// Cheap to clone; every clone writes into the same single-slot buffer and
/// concurrent writes are serialized by the slot.
#[derive(Debug, Clone)]
pub struct TelemetryWriter {
    buffer: Arc<TelemetryBuffer>,
}

impl TelemetryWriter {
    pub fn new(buffer: Arc<TelemetryBuffer>) -> Self {
        Self { buffer }
    }

    /// Queue a payload for transmission, replacing any unsent one
    pub fn write_telemetry_payload(&self, data: &[u8]) -> usize {
        if data.is_empty() {
            return 0;
        }
        self.buffer.write(data)
    }

    /// Frame `payload` as a downlink telemetry frame and queue it
    ///
    /// # Errors
    ///
    /// Returns `GhstError::Frame` if the payload does not fit a frame
    pub fn write_telemetry_frame(&self, kind: DownlinkType, payload: &[u8]) -> Result<usize> {
        let frame = encode_telemetry_frame(kind, payload)?;
        Ok(self.buffer.write(&frame))
    }
}

/// Decides when the pending payload may go out on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryScheduler {
    min_gap_us: u32,
    max_gap_us: u32,
}

impl Default for TelemetryScheduler {
    fn default() -> Self {
        Self::new(GHST_RX_TO_TELEMETRY_MIN_US, GHST_RX_TO_TELEMETRY_MAX_US)
    }
}

impl TelemetryScheduler {
    /// # Arguments
    ///
    /// * `min_gap_us` - Earliest send time after an uplink frame ends
    /// * `max_gap_us` - Latest send time after an uplink frame ends
    pub fn new(min_gap_us: u32, max_gap_us: u32) -> Self {
        Self { min_gap_us, max_gap_us }
    }

    /// Whether `now_us` falls strictly inside the window after `frame_end_us`
    pub fn window_open(&self, now_us: u32, frame_end_us: u32) -> bool {
        let since_frame_end = now_us.wrapping_sub(frame_end_us) as i32;
        since_frame_end > self.min_gap_us as i32 && since_frame_end < self.max_gap_us as i32
    }

    /// Whether a payload is pending and the window is open
    pub fn should_send(&self, buffer: &TelemetryBuffer, now_us: u32, frame_end_us: u32) -> bool {
        buffer.is_pending() && self.window_open(now_us, frame_end_us)
    }
}
