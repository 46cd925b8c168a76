//! Trait abstractions for the serial transport and time source, so the
//! receiver can be driven by a real port or by tests

use std::io;
use std::sync::Arc;
use std::time::Instant;

use crate::error::Result;
use crate::ghst::assembler::ByteAssembler;

/// Outbound half of the serial transport, as seen by the polling side
#[cfg_attr(test, mockall::automock)]
pub trait Transport: Send {
    /// Queue bytes for transmission without blocking
    fn write(&mut self, data: &[u8]) -> io::Result<()>;

    /// Whether everything queued so far has left the transmitter
    fn is_idle(&self) -> bool;
}

/// Monotonic time source with wrapping 32-bit timestamps
pub trait Clock: Send + Sync {
    fn micros(&self) -> u32;

    fn millis(&self) -> u32;
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn micros(&self) -> u32 {
        (**self).micros()
    }

    fn millis(&self) -> u32 {
        (**self).millis()
    }
}

/// Clock counting from its own creation
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    start: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }
}

impl Clock for MonotonicClock {
    fn micros(&self) -> u32 {
        self.start.elapsed().as_micros() as u32
    }

    fn millis(&self) -> u32 {
        self.start.elapsed().as_millis() as u32
    }
}

/// Serial port settings for the receiver
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortConfig {
    /// Device path, `None` when no port is assigned to the receiver
    pub path: Option<String>,
    /// Receiver line is inverted; advisory, the adapter must invert it
    pub inverted: bool,
}

/// Opens the transport and wires its byte-receive path to the assembler
pub trait TransportOpener {
    type Transport: Transport;

    /// # Errors
    ///
    /// Returns `GhstError::NoTransport` when `config` names no port, or the
    /// underlying error when the port cannot be opened
    fn open(&mut self, config: &PortConfig, assembler: ByteAssembler) -> Result<Self::Transport>;
}
