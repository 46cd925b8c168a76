//! # GHST Byte Assembler
//!
//! Turns the raw byte stream from the serial transport into complete frames.
//!
//! Runs in the byte-receive context: one call per received byte, no blocking,
//! no allocation, no CRC or address checks. A completed frame is published to
//! the shared [`RxLink`] for the polling side to validate.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tracing::trace;

use super::handoff::{HandoffSlot, Take};
use super::protocol::*;

/// State shared between the byte-receive context and the polling context
#[derive(Debug, Default)]
pub struct RxLink {
    /// Last completed, not yet validated, frame
    frame: HandoffSlot<GHST_FRAME_SIZE_MAX>,
    /// Timestamp (us) at which the last frame's final byte arrived
    frame_end_us: AtomicU32,
}

impl RxLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the last completed frame, if one arrived since the previous call
    pub fn take_frame(&self) -> Option<Take<GHST_FRAME_SIZE_MAX>> {
        self.frame.take()
    }

    pub fn frame_end_us(&self) -> u32 {
        self.frame_end_us.load(Ordering::Acquire)
    }

    fn publish_frame(&self, bytes: &[u8], end_us: u32) {
        self.frame_end_us.store(end_us, Ordering::Release);
        self.frame.publish(bytes);
    }
}

/// Byte-at-a-time frame assembler
///
/// Owns the incoming frame buffer exclusively.
#[derive(Debug)]
pub struct ByteAssembler {
    buf: [u8; GHST_FRAME_SIZE_MAX],
    idx: usize,
    frame_start_us: u32,
    link: Arc<RxLink>,
}

impl ByteAssembler {
    pub fn new(link: Arc<RxLink>) -> Self {
        Self {
            buf: [0; GHST_FRAME_SIZE_MAX],
            idx: 0,
            frame_start_us: 0,
            link,
        }
    }

    /// Feed one received byte
    ///
    /// # Arguments
    ///
    /// * `byte` - Byte read from the wire
    /// * `now_us` - Monotonic microsecond timestamp of reception
    ///
    /// # Returns
    ///
    /// * `bool` - true if this byte completed a frame
    pub fn receive(&mut self, byte: u8, now_us: u32) -> bool {
        if now_us.wrapping_sub(self.frame_start_us) > GHST_MAX_FRAME_TIME_US {
            // Byte arrived after the max frame time: start of a new frame
            if self.idx != 0 {
                trace!(discarded = self.idx, "GHST frame timed out, resyncing");
            }
            self.idx = 0;
        }

        if self.idx == 0 {
            self.frame_start_us = now_us;
        }

        // Assume the provisional length until the length field is in
        let full_frame_len = if self.idx < 3 {
            GHST_PROVISIONAL_FRAME_LENGTH
        } else {
            full_frame_length(self.buf[1])
        };

        self.buf[self.idx] = byte;
        self.idx += 1;

        if self.idx == GHST_FRAME_LENGTH_ADDRESS + GHST_FRAME_LENGTH_FRAMELENGTH && !is_valid_length_field(byte) {
            trace!(length = byte, "GHST length field out of range, resyncing");
            self.idx = 0;
            return false;
        }

        if self.idx >= full_frame_len {
            self.idx = 0;
            self.link.publish_frame(&self.buf[..full_frame_len], now_us);
            return true;
        }

        false
    }

    /// Number of bytes of the frame currently being assembled
    pub fn pending_len(&self) -> usize {
        self.idx
    }
}
