//! # Single-Slot Handoff
//!
//! Lock-free single-producer / single-consumer cell used to pass a frame from
//! the byte-receive context to the polling context (and a telemetry payload
//! the other way).
//!
//! Ordering contract:
//! - A producer claims the slot by moving the sequence counter from even to
//!   odd with a compare-exchange, writes the bytes, then sets `available`
//!   with release ordering. Concurrent producers wait for the claim.
//! - The consumer swaps `available` to false with acquire ordering *before*
//!   copying, so a frame published afterwards is flagged again.
//! - A sequence counter (odd while a write is in progress) lets the consumer
//!   detect that the producer overwrote the slot mid-copy. A torn copy is
//!   discarded; the overwriting frame is already flagged as available.
//!
//! There is no queue: publishing over an unconsumed value replaces it.

use std::sync::atomic::{fence, AtomicBool, AtomicU32, AtomicU8, AtomicUsize, Ordering};

/// Outcome of taking from a slot that was flagged available
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Take<const N: usize> {
    /// Consistent copy of the published bytes
    Value([u8; N], usize),
    /// The producer overwrote the slot while it was being copied
    Torn,
}

/// Single-slot, newest-wins byte cell
#[derive(Debug)]
pub struct HandoffSlot<const N: usize> {
    seq: AtomicU32,
    available: AtomicBool,
    len: AtomicUsize,
    bytes: [AtomicU8; N],
}

impl<const N: usize> Default for HandoffSlot<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> HandoffSlot<N> {
    pub fn new() -> Self {
        Self {
            seq: AtomicU32::new(0),
            available: AtomicBool::new(false),
            len: AtomicUsize::new(0),
            bytes: std::array::from_fn(|_| AtomicU8::new(0)),
        }
    }

    /// Publish `data`, truncated to the slot capacity
    ///
    /// Safe to call from several producers; a publish waits for any write
    /// already in progress.
    ///
    /// # Returns
    ///
    /// * `usize` - Number of bytes stored
    pub fn publish(&self, data: &[u8]) -> usize {
        let seq = loop {
            match self.try_claim() {
                Some(seq) => break seq,
                None => std::hint::spin_loop(),
            }
        };

        let len = self.write_claimed(data);
        self.release(seq);
        len
    }

    /// Mark a write in progress, `None` if another producer holds the slot
    fn try_claim(&self) -> Option<u32> {
        let seq = self.seq.load(Ordering::Relaxed);
        if seq & 1 == 1 {
            return None;
        }

        self.seq
            .compare_exchange(seq, seq.wrapping_add(1), Ordering::Acquire, Ordering::Relaxed)
            .ok()?;
        fence(Ordering::Release);
        Some(seq)
    }

    fn write_claimed(&self, data: &[u8]) -> usize {
        let len = data.len().min(N);
        for (dst, &byte) in self.bytes.iter().zip(&data[..len]) {
            dst.store(byte, Ordering::Relaxed);
        }
        self.len.store(len, Ordering::Relaxed);
        len
    }

    fn release(&self, claimed_seq: u32) {
        self.seq.store(claimed_seq.wrapping_add(2), Ordering::Release);
        self.available.store(true, Ordering::Release);
    }

    /// Whether an unconsumed value is waiting
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    /// Take the pending value, clearing the available flag first
    ///
    /// # Returns
    ///
    /// * `None` - nothing new since the last take
    /// * `Some(Take::Value(bytes, len))` - consistent copy
    /// * `Some(Take::Torn)` - overwritten mid-copy, a newer value is pending
    pub fn take(&self) -> Option<Take<N>> {
        if !self.available.swap(false, Ordering::Acquire) {
            return None;
        }

        let before = self.seq.load(Ordering::Acquire);

        let mut out = [0u8; N];
        for (dst, src) in out.iter_mut().zip(&self.bytes) {
            *dst = src.load(Ordering::Relaxed);
        }
        let len = self.len.load(Ordering::Relaxed);

        fence(Ordering::Acquire);
        let after = self.seq.load(Ordering::Relaxed);

        if before & 1 == 1 || before != after {
            return Some(Take::Torn);
        }

        Some(Take::Value(out, len))
    }

    /// Drop any pending value
    pub fn clear(&self) {
        self.available.store(false, Ordering::Release);
    }
}
