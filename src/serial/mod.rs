//! # Serial Communication Module
//!
//! Serial transport for the GHST receiver.
//!
//! This module handles:
//! - Opening the receiver port at 420,000 baud, 8N1
//! - A reader task feeding every received byte to the frame assembler
//! - A writer task draining queued telemetry without blocking the poller
//! - Transmit idle tracking for the half-duplex line

pub mod port_trait;

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

use crate::error::{GhstError, Result};
use crate::ghst::assembler::ByteAssembler;
use crate::ghst::protocol::{GHST_BYTE_TIME_US, GHST_RX_BAUDRATE};
use port_trait::{Clock, PortConfig, Transport, TransportOpener};

/// Outbound frames that may wait for the writer task
const WRITE_QUEUE_DEPTH: usize = 4;

/// Read chunk size; several frames at 420k baud
const READ_CHUNK_SIZE: usize = 64;

/// Open a serial port with GHST settings
///
/// # Arguments
///
/// * `path` - Device path (e.g., "/dev/ttyUSB0")
///
/// # Returns
///
/// * `Result<SerialStream>` - Opened serial port
pub fn open_port(path: &str) -> Result<tokio_serial::SerialStream> {
    let port = tokio_serial::new(path, GHST_RX_BAUDRATE)
        .data_bits(tokio_serial::DataBits::Eight)
        .parity(tokio_serial::Parity::None)
        .stop_bits(tokio_serial::StopBits::One)
        .flow_control(tokio_serial::FlowControl::None)
        .open_native_async()
        .map_err(|e| GhstError::Serial(format!("Failed to open {}: {}", path, e)))?;

    Ok(port)
}

/// Estimate when a byte came off the wire
///
/// The last byte of a read arrived when the read completed; earlier bytes
/// are spaced one byte time apart before it. A byte never arrives before the
/// previous read's last byte plus one byte time.
///
/// # Arguments
///
/// * `read_done_us` - Time the read completed
/// * `bytes_after` - Number of bytes following this one in the same read
/// * `prev_byte_us` - Timestamp given to the previous byte, if any
pub fn wire_timestamp(read_done_us: u32, bytes_after: usize, prev_byte_us: Option<u32>) -> u32 {
    let backdated = read_done_us.wrapping_sub(bytes_after as u32 * GHST_BYTE_TIME_US);
    let Some(prev) = prev_byte_us else {
        return backdated;
    };

    let mut byte_us = backdated;
    if is_before(byte_us, prev.wrapping_add(GHST_BYTE_TIME_US)) {
        byte_us = prev.wrapping_add(GHST_BYTE_TIME_US);
    }
    if is_before(read_done_us, byte_us) {
        byte_us = read_done_us;
    }
    if is_before(byte_us, prev) {
        byte_us = prev;
    }
    byte_us
}

/// Wrapping `a < b` for microsecond timestamps
fn is_before(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) < 0
}

/// Feed every byte read from `reader` to the assembler
///
/// Bytes are timestamped by [`wire_timestamp`], backdated from the time the
/// read that delivered them completed.
///
/// # Returns
///
/// * `io::Result<u64>` - Number of frames completed before end of stream
pub async fn pump_bytes<R, C>(mut reader: R, mut assembler: ByteAssembler, clock: C) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    C: Clock,
{
    let mut buf = [0u8; READ_CHUNK_SIZE];
    let mut frames = 0u64;
    let mut prev_byte_us = None;

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(frames);
        }

        let read_done_us = clock.micros();
        for (i, &byte) in buf[..n].iter().enumerate() {
            let byte_us = wire_timestamp(read_done_us, n - 1 - i, prev_byte_us);
            prev_byte_us = Some(byte_us);
            if assembler.receive(byte, byte_us) {
                frames += 1;
            }
        }
    }
}

/// Write queued packets to `writer` until every sender is gone
///
/// `in_flight` is decremented once each packet has been flushed (or failed).
pub async fn drain_writes<W>(mut writer: W, mut rx: mpsc::Receiver<Bytes>, in_flight: Arc<AtomicUsize>) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(packet) = rx.recv().await {
        let result = match writer.write_all(&packet).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };
        in_flight.fetch_sub(1, Ordering::AcqRel);
        result?;

        debug!("Sent GHST telemetry ({} bytes)", packet.len());
    }

    Ok(())
}

/// Queue-backed serial transport
///
/// Owns the reader and writer tasks; dropping it stops both.
pub struct SerialTransport {
    tx: mpsc::Sender<Bytes>,
    in_flight: Arc<AtomicUsize>,
    device_path: String,
    tasks: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("device_path", &self.device_path)
            .field("in_flight", &self.in_flight.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl SerialTransport {
    /// Build a transport writing through `tx`, without any tasks attached
    pub fn from_parts(tx: mpsc::Sender<Bytes>, in_flight: Arc<AtomicUsize>, device_path: impl Into<String>) -> Self {
        Self {
            tx,
            in_flight,
            device_path: device_path.into(),
            tasks: Vec::new(),
        }
    }

    /// Get the device path of the opened serial port
    pub fn device_path(&self) -> &str {
        &self.device_path
    }
}

impl Transport for SerialTransport {
    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.in_flight.fetch_add(1, Ordering::AcqRel);

        self.tx.try_send(Bytes::copy_from_slice(data)).map_err(|e| {
            self.in_flight.fetch_sub(1, Ordering::AcqRel);
            match e {
                mpsc::error::TrySendError::Full(_) => {
                    io::Error::new(io::ErrorKind::WouldBlock, "serial write queue full")
                }
                mpsc::error::TrySendError::Closed(_) => {
                    io::Error::new(io::ErrorKind::BrokenPipe, "serial writer stopped")
                }
            }
        })
    }

    fn is_idle(&self) -> bool {
        self.in_flight.load(Ordering::Acquire) == 0
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
        if !self.tasks.is_empty() {
            info!("Closed GHST serial port {}", self.device_path);
        }
    }
}

/// Opens [`SerialTransport`]s on real serial ports
///
/// Must be used from within a tokio runtime.
#[derive(Debug, Clone)]
pub struct SerialOpener<C> {
    clock: C,
}

impl<C: Clock + Clone + 'static> SerialOpener<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock + Clone + 'static> TransportOpener for SerialOpener<C> {
    type Transport = SerialTransport;

    fn open(&mut self, config: &PortConfig, assembler: ByteAssembler) -> Result<SerialTransport> {
        let path = config.path.as_deref().ok_or(GhstError::NoTransport)?;

        if config.inverted {
            // Host UARTs expose no inversion control
            warn!("Line inversion requested for {}; it must be provided by the adapter hardware", path);
        }

        let port = open_port(path)?;
        info!("Opened GHST receiver port {} at {} baud", path, GHST_RX_BAUDRATE);

        let (read_half, write_half) = tokio::io::split(port);
        let (tx, rx) = mpsc::channel(WRITE_QUEUE_DEPTH);
        let in_flight = Arc::new(AtomicUsize::new(0));

        let clock = self.clock.clone();
        let reader_path = path.to_string();
        let reader = tokio::spawn(async move {
            match pump_bytes(read_half, assembler, clock).await {
                Ok(frames) => info!("GHST port {} closed after {} frames", reader_path, frames),
                Err(e) => warn!("GHST read error on {}: {}", reader_path, e),
            }
        });

        let writer_in_flight = Arc::clone(&in_flight);
        let writer = tokio::spawn(async move {
            if let Err(e) = drain_writes(write_half, rx, writer_in_flight).await {
                warn!("GHST write error: {}", e);
            }
        });

        let mut transport = SerialTransport::from_parts(tx, in_flight, path);
        transport.tasks = vec![reader, writer];
        Ok(transport)
    }
}
