//! # GHST Receiver Driver
//!
//! Facade tying the assembler, validator, failsafe tracker, telemetry
//! scheduler and channel decoder into the contract the RC input layer polls:
//!
//! 1. [`GhstReceiver::frame_status`] once per tick
//! 2. [`GhstReceiver::process_frame`] when the status asks for processing
//! 3. [`GhstReceiver::read_channel`] at any time (last known value)
//!
//! The byte-receive path lives in the transport, which feeds the
//! [`ByteAssembler`] handed to it by [`GhstReceiver::init`].

use std::fmt;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info, trace, warn};

use crate::error::{GhstError, Result};
use crate::ghst::assembler::{ByteAssembler, RxLink};
use crate::ghst::channels::{decode_channels, raw_to_us, ChannelArray, LinkStats};
use crate::ghst::failsafe::FailsafeTracker;
use crate::ghst::protocol::{DownlinkType, GhstFrame, UplinkSubtype, GHST_MAX_NUM_CHANNELS};
use crate::ghst::telemetry::{TelemetryBuffer, TelemetryScheduler, TelemetryWriter};
use crate::ghst::validator::{poll_frame, Verdict};
use crate::serial::port_trait::{Clock, PortConfig, Transport, TransportOpener};

/// Nothing new
pub const RX_FRAME_PENDING: u8 = 0;
/// A valid frame arrived
pub const RX_FRAME_COMPLETE: u8 = 1 << 0;
/// Signal loss detected
pub const RX_FRAME_FAILSAFE: u8 = 1 << 1;
/// `process_frame` has work to do
pub const RX_FRAME_PROCESSING_REQUIRED: u8 = 1 << 2;
/// A frame failed validation
pub const RX_FRAME_DROPPED: u8 = 1 << 3;

/// Frame outcome of one status poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Pending,
    Dropped,
    Complete,
}

/// Result of [`GhstReceiver::frame_status`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameStatus {
    pub state: FrameState,
    pub processing_required: bool,
    pub failsafe: bool,
}

impl FrameStatus {
    pub fn new(state: FrameState, processing_required: bool, failsafe: bool) -> Self {
        Self { state, processing_required, failsafe }
    }

    /// Status as RX layer flag bits
    pub fn bits(&self) -> u8 {
        let mut bits = match self.state {
            FrameState::Pending => RX_FRAME_PENDING,
            FrameState::Dropped => RX_FRAME_DROPPED,
            FrameState::Complete => RX_FRAME_COMPLETE,
        };
        if self.processing_required {
            bits |= RX_FRAME_PROCESSING_REQUIRED;
        }
        if self.failsafe {
            bits |= RX_FRAME_FAILSAFE;
        }
        bits
    }
}

impl fmt::Display for FrameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.state)?;
        if self.processing_required {
            write!(f, "+processing")?;
        }
        if self.failsafe {
            write!(f, "+failsafe")?;
        }
        Ok(())
    }
}

/// Receives the link quality carried by the RSSI subtype
#[cfg_attr(test, mockall::automock)]
pub trait LinkQualitySink: Send {
    /// Link quality on the 0-1023 scale
    fn set_link_quality(&mut self, value: u16);
}

/// Shared link quality value, readable from any thread
#[derive(Debug, Clone, Default)]
pub struct LinkQuality(Arc<AtomicU16>);

impl LinkQuality {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> u16 {
        self.0.load(Ordering::Relaxed)
    }
}

impl LinkQualitySink for LinkQuality {
    fn set_link_quality(&mut self, value: u16) {
        self.0.store(value, Ordering::Relaxed);
    }
}

/// GHST receiver driver
///
/// Starts uninitialized; [`init`](Self::init) makes it active if a transport
/// can be opened. An inactive driver reports `Pending` and never touches the
/// channel array.
pub struct GhstReceiver<T: Transport, C: Clock> {
    clock: C,
    transport: Option<T>,
    link: Arc<RxLink>,
    /// Accepted frame awaiting decode, consumed by `process_frame`
    validated: Option<GhstFrame>,
    failsafe: FailsafeTracker,
    failsafe_active: bool,
    channels: ChannelArray,
    telemetry: Arc<TelemetryBuffer>,
    scheduler: TelemetryScheduler,
    transmitting_telemetry: bool,
    link_stats: Option<LinkStats>,
    lq_sink: Option<Box<dyn LinkQualitySink>>,
}

impl<T: Transport, C: Clock> fmt::Debug for GhstReceiver<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GhstReceiver")
            .field("active", &self.is_active())
            .field("failsafe_active", &self.failsafe_active)
            .field("channels", &self.channels)
            .field("link_stats", &self.link_stats)
            .finish_non_exhaustive()
    }
}

impl<T: Transport, C: Clock> GhstReceiver<T, C> {
    /// Create an uninitialized receiver with protocol default timings
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            transport: None,
            link: Arc::new(RxLink::new()),
            validated: None,
            failsafe: FailsafeTracker::default(),
            failsafe_active: false,
            channels: ChannelArray::new(),
            telemetry: Arc::new(TelemetryBuffer::new()),
            scheduler: TelemetryScheduler::default(),
            transmitting_telemetry: false,
            link_stats: None,
            lq_sink: None,
        }
    }

    /// Use a tracker with non-default timeout / recovery threshold
    pub fn with_failsafe(mut self, failsafe: FailsafeTracker) -> Self {
        self.failsafe = failsafe;
        self
    }

    /// Use a non-default telemetry window
    pub fn with_scheduler(mut self, scheduler: TelemetryScheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Forward link quality from RSSI frames to `sink`
    pub fn with_link_quality_sink(mut self, sink: impl LinkQualitySink + 'static) -> Self {
        self.lq_sink = Some(Box::new(sink));
        self
    }

    /// Open the transport and start receiving
    ///
    /// # Returns
    ///
    /// * `bool` - true if the receiver is active; false if no port is
    ///   configured or it could not be opened, in which case the receiver
    ///   stays inert
    pub fn init<O>(&mut self, opener: &mut O, config: &PortConfig) -> bool
    where
        O: TransportOpener<Transport = T>,
    {
        if self.transport.is_some() {
            warn!("GHST receiver already initialized");
            return true;
        }

        let link = Arc::new(RxLink::new());
        match opener.open(config, ByteAssembler::new(Arc::clone(&link))) {
            Ok(transport) => {
                self.link = link;
                self.validated = None;
                self.transport = Some(transport);
                info!("GHST receiver active ({} channels)", GHST_MAX_NUM_CHANNELS);
                true
            }
            Err(GhstError::NoTransport) => {
                warn!("No serial port assigned to the GHST receiver");
                false
            }
            Err(e) => {
                error!("Failed to start GHST receiver: {}", e);
                false
            }
        }
    }

    /// Close the transport; channel values are kept
    pub fn shutdown(&mut self) {
        if self.transport.take().is_some() {
            self.validated = None;
            self.transmitting_telemetry = false;
            info!("GHST receiver stopped");
        }
    }

    pub fn is_active(&self) -> bool {
        self.transport.is_some()
    }

    /// Poll for a new frame
    ///
    /// Validates the frame completed since the last poll, if any, and
    /// evaluates failsafe. Processing is also requested when a telemetry
    /// payload may be sent.
    pub fn frame_status(&mut self) -> FrameStatus {
        let Some(transport) = self.transport.as_ref() else {
            return FrameStatus::new(FrameState::Pending, false, false);
        };

        if self.transmitting_telemetry && transport.is_idle() {
            self.transmitting_telemetry = false;
        }

        let failsafe = self.failsafe.detect_failsafe(self.clock.millis());
        if failsafe != self.failsafe_active {
            if failsafe {
                warn!("GHST signal lost");
            } else {
                info!("GHST signal recovered");
            }
            self.failsafe_active = failsafe;
        }

        match poll_frame(&self.link) {
            Verdict::Accepted(frame) => {
                self.validated = Some(frame);
                return FrameStatus::new(FrameState::Complete, true, failsafe);
            }
            Verdict::Rejected(e) => {
                debug!("Dropping GHST frame: {}", e);
                return FrameStatus::new(FrameState::Dropped, false, failsafe);
            }
            Verdict::NotReady => {}
        }

        let telemetry_due = self.telemetry_due();
        FrameStatus::new(FrameState::Pending, telemetry_due, failsafe)
    }

    /// Decode the accepted frame and/or send pending telemetry
    ///
    /// # Returns
    ///
    /// * `bool` - false only when the receiver is not active
    pub fn process_frame(&mut self) -> bool {
        if self.transport.is_none() {
            return false;
        }

        if self.telemetry_due() {
            self.send_telemetry();
        }

        if let Some(frame) = self.validated.take() {
            self.apply_frame(&frame);
        }

        true
    }

    /// Channel value in microseconds, `None` past the last channel
    pub fn read_channel(&self, index: usize) -> Option<u16> {
        self.channels.raw(index).map(raw_to_us)
    }

    /// Raw protocol value of a channel
    pub fn raw_channel(&self, index: usize) -> Option<u16> {
        self.channels.raw(index)
    }

    pub fn channels(&self) -> &ChannelArray {
        &self.channels
    }

    pub fn channel_count(&self) -> usize {
        GHST_MAX_NUM_CHANNELS
    }

    /// Link statistics from the most recent RSSI frame
    pub fn link_stats(&self) -> Option<LinkStats> {
        self.link_stats
    }

    pub fn failsafe_tracker(&self) -> &FailsafeTracker {
        &self.failsafe
    }

    /// Whether telemetry was sent and the transmitter has not gone idle yet
    pub fn is_transmitting_telemetry(&self) -> bool {
        self.transmitting_telemetry
    }

    /// Producer handle for the telemetry module
    pub fn telemetry_writer(&self) -> TelemetryWriter {
        TelemetryWriter::new(Arc::clone(&self.telemetry))
    }

    /// Queue a telemetry payload for the next send window
    pub fn write_telemetry_payload(&self, data: &[u8]) -> usize {
        self.telemetry_writer().write_telemetry_payload(data)
    }

    /// Frame and queue a downlink telemetry frame for the next send window
    ///
    /// # Errors
    ///
    /// Returns `GhstError::Frame` if the payload does not fit a frame
    pub fn write_telemetry_frame(&self, kind: DownlinkType, payload: &[u8]) -> Result<usize> {
        self.telemetry_writer().write_telemetry_frame(kind, payload)
    }

    fn telemetry_due(&self) -> bool {
        self.scheduler
            .should_send(&self.telemetry, self.clock.micros(), self.link.frame_end_us())
    }

    fn send_telemetry(&mut self) {
        let (Some(transport), Some(payload)) = (self.transport.as_mut(), self.telemetry.take()) else {
            return;
        };

        self.transmitting_telemetry = true;
        match transport.write(&payload) {
            Ok(()) => trace!("Queued GHST telemetry ({} bytes)", payload.len()),
            Err(e) => warn!("Failed to send GHST telemetry: {}", e),
        }
    }

    fn apply_frame(&mut self, frame: &GhstFrame) {
        let update = match decode_channels(frame.frame_type(), frame.payload()) {
            Ok(Some(update)) => update,
            Ok(None) => {
                trace!("Ignoring GHST frame type 0x{:02X}", frame.frame_type());
                return;
            }
            Err(e) => {
                debug!("Undecodable GHST frame: {}", e);
                return;
            }
        };

        if let Some(subtype) = UplinkSubtype::from_frame_type(frame.frame_type()) {
            self.failsafe.record_arrival(subtype, self.clock.millis());
        }

        self.channels.apply(&update);

        if let Some(link) = update.link {
            self.link_stats = Some(link);
            if let Some(sink) = self.lq_sink.as_mut() {
                sink.set_link_quality(link.scaled_link_quality());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::ghst::crc::frame_crc;
    use crate::ghst::encoder::{encode_frame, encode_rc_frame, encode_rc_frame_with_type, encode_telemetry_frame};
    use crate::ghst::protocol::*;
    use crate::serial::port_trait::mocks::ManualClock;
    use crate::serial::port_trait::MockTransport;
    use mockall::predicate::eq;
    use std::sync::atomic::AtomicBool;

    /// One byte at 420k baud, rounded up
    const BYTE_TIME_US: u64 = 24;

    struct TestOpener {
        transport: Option<MockTransport>,
        assembler: Option<ByteAssembler>,
    }

    impl TestOpener {
        fn new(transport: MockTransport) -> Self {
            Self { transport: Some(transport), assembler: None }
        }
    }

    impl TransportOpener for TestOpener {
        type Transport = MockTransport;

        fn open(&mut self, config: &PortConfig, assembler: ByteAssembler) -> Result<MockTransport> {
            if config.path.is_none() {
                return Err(GhstError::NoTransport);
            }
            let transport = self
                .transport
                .take()
                .ok_or_else(|| GhstError::Serial("port busy".to_string()))?;
            self.assembler = Some(assembler);
            Ok(transport)
        }
    }

    fn port() -> PortConfig {
        PortConfig { path: Some("/dev/ttyGHST".to_string()), inverted: false }
    }

    fn idle_transport() -> MockTransport {
        let mut transport = MockTransport::new();
        transport.expect_is_idle().return_const(true);
        transport
    }

    struct Rig {
        rx: GhstReceiver<MockTransport, ManualClock>,
        clock: ManualClock,
        opener: TestOpener,
    }

    impl Rig {
        fn with_receiver(
            transport: MockTransport,
            build: impl FnOnce(GhstReceiver<MockTransport, ManualClock>) -> GhstReceiver<MockTransport, ManualClock>,
        ) -> Self {
            let clock = ManualClock::starting_at_ms(1_000);
            let mut rx = build(GhstReceiver::new(clock.clone()));
            let mut opener = TestOpener::new(transport);
            assert!(rx.init(&mut opener, &port()));
            Self { rx, clock, opener }
        }

        fn new(transport: MockTransport) -> Self {
            Self::with_receiver(transport, |rx| rx)
        }

        /// Clock a frame onto the wire, one byte time per byte
        fn feed(&mut self, bytes: &[u8]) {
            let assembler = self.opener.assembler.as_mut().expect("receiver not initialized");
            for &byte in bytes {
                assembler.receive(byte, self.clock.micros());
                self.clock.advance_us(BYTE_TIME_US);
            }
        }

        fn receive(&mut self, bytes: &[u8]) -> FrameStatus {
            self.feed(bytes);
            self.rx.frame_status()
        }

        /// Receive and process one frame, then let the next frame interval pass
        fn deliver(&mut self, bytes: &[u8]) -> FrameStatus {
            let status = self.receive(bytes);
            assert!(self.rx.process_frame());
            self.clock.advance_ms(5);
            status
        }

        fn raw_channels(&self) -> RcChannels {
            *self.rx.channels().as_raw()
        }
    }

    fn centered_except(changes: &[(usize, u16)]) -> RcChannels {
        let mut expected = [GHST_CHANNEL_VALUE_CENTER; GHST_MAX_NUM_CHANNELS];
        for &(idx, value) in changes {
            expected[idx] = value;
        }
        expected
    }

    #[test]
    fn test_init_without_port_stays_inert() {
        let mut rx: GhstReceiver<MockTransport, _> = GhstReceiver::new(ManualClock::starting_at_ms(1_000));
        let mut opener = TestOpener::new(MockTransport::new());

        assert!(!rx.init(&mut opener, &PortConfig::default()));
        assert!(!rx.is_active());
        assert!(opener.assembler.is_none());

        assert_eq!(rx.frame_status().bits(), RX_FRAME_PENDING);
        assert!(!rx.process_frame());
        assert_eq!(rx.read_channel(0), Some(1500));
    }

    #[test]
    fn test_init_open_failure_stays_inert() {
        let mut rx: GhstReceiver<MockTransport, _> = GhstReceiver::new(ManualClock::default());
        let mut opener = TestOpener { transport: None, assembler: None };

        assert!(!rx.init(&mut opener, &port()));
        assert!(!rx.is_active());
    }

    #[test]
    fn test_init_twice_keeps_first_transport() {
        let mut rig = Rig::new(idle_transport());
        let mut second = TestOpener::new(MockTransport::new());

        assert!(rig.rx.init(&mut second, &port()));
        assert!(second.assembler.is_none());
    }

    #[test]
    fn test_end_to_end_primary_frame() {
        let mut rig = Rig::new(idle_transport());

        // ch1 = 0x7C0, ch2 = 0x158, ch3 = 0xE26, ch4 = 0x7C0 (12-bit wire values)
        let payload = [0xC0, 0x87, 0x15, 0x26, 0x0E, 0x7C, 0x10, 0x20, 0x30, 0x40];
        let mut frame = vec![GHST_ADDR_FC, GHST_UL_RC_CHANS_SIZE, 0x10];
        frame.extend_from_slice(&payload);
        frame.push(frame_crc(0x10, &payload));
        assert_eq!(frame.len(), 14);

        let status = rig.receive(&frame);
        assert_eq!(status.state, FrameState::Complete);
        assert_eq!(status.bits(), RX_FRAME_COMPLETE | RX_FRAME_PROCESSING_REQUIRED);

        assert!(rig.rx.process_frame());

        assert_eq!(rig.rx.raw_channel(0), Some(0x7C0 >> 1));
        assert_eq!(rig.rx.raw_channel(1), Some(0x158 >> 1));
        assert_eq!(rig.rx.raw_channel(2), Some(0xE26 >> 1));
        assert_eq!(rig.rx.raw_channel(3), Some(0x7C0 >> 1));
        assert_eq!(&rig.raw_channels()[4..8], &[0x80, 0x100, 0x180, 0x200]);

        assert_eq!(rig.rx.read_channel(0), Some(1500));
        assert_eq!(rig.rx.read_channel(1), Some(988));
        assert_eq!(rig.rx.read_channel(2), Some(2012));
        assert_eq!(rig.rx.read_channel(GHST_MAX_NUM_CHANNELS), None);

        // Frame is consumed; nothing new on the next poll
        assert_eq!(rig.rx.frame_status().state, FrameState::Pending);
    }

    #[test]
    fn test_each_subtype_updates_only_its_channels() {
        for (subtype, start) in [
            (UplinkSubtype::Channels5To8, 4),
            (UplinkSubtype::Channels9To12, 8),
            (UplinkSubtype::Channels13To16, 12),
        ] {
            let mut rig = Rig::new(idle_transport());
            rig.deliver(&encode_rc_frame(subtype, [100, 200, 300, 400], [1, 2, 3, 4]));

            let expected = centered_except(&[
                (0, 100),
                (1, 200),
                (2, 300),
                (3, 400),
                (start, 8),
                (start + 1, 16),
                (start + 2, 24),
                (start + 3, 32),
            ]);
            assert_eq!(rig.raw_channels(), expected, "subtype {:?}", subtype);
        }
    }

    #[test]
    fn test_round_robin_accumulates_all_channels() {
        let mut rig = Rig::new(idle_transport());

        rig.deliver(&encode_rc_frame(UplinkSubtype::Channels5To8, [172; 4], [0x10; 4]));
        rig.deliver(&encode_rc_frame(UplinkSubtype::Channels9To12, [172; 4], [0x20; 4]));
        rig.deliver(&encode_rc_frame(UplinkSubtype::Channels13To16, [1811; 4], [0x30; 4]));

        let channels = rig.raw_channels();
        assert_eq!(&channels[..4], &[1811; 4]);
        assert_eq!(&channels[4..8], &[0x80; 4]);
        assert_eq!(&channels[8..12], &[0x100; 4]);
        assert_eq!(&channels[12..], &[0x180; 4]);
    }

    #[test]
    fn test_rssi_frame_feeds_link_quality() {
        let mut sink = MockLinkQualitySink::new();
        sink.expect_set_link_quality().with(eq(511)).times(1).return_const(());

        let mut rig = Rig::with_receiver(idle_transport(), |rx| rx.with_link_quality_sink(sink));
        rig.deliver(&encode_rc_frame(UplinkSubtype::Rssi, [500, 600, 700, 800], [50, 70, 2, 20]));

        assert_eq!(rig.raw_channels(), centered_except(&[(0, 500), (1, 600), (2, 700), (3, 800)]));
        assert_eq!(
            rig.rx.link_stats(),
            Some(LinkStats { link_quality: 50, rssi_dbm: -70, rf_protocol: 2, tx_power_dbm: 20 })
        );
    }

    #[test]
    fn test_shared_link_quality_value() {
        let lq = LinkQuality::new();
        let mut rig = Rig::with_receiver(idle_transport(), |rx| rx.with_link_quality_sink(lq.clone()));

        rig.deliver(&encode_rc_frame(UplinkSubtype::Rssi, [992; 4], [100, 40, 0, 0]));

        assert_eq!(lq.get(), RSSI_MAX_VALUE);
    }

    #[test]
    fn test_single_bit_flips_report_dropped() {
        let mut rig = Rig::new(idle_transport());
        let good = encode_rc_frame(UplinkSubtype::Channels5To8, [300, 400, 500, 600], [9, 9, 9, 9]);
        rig.deliver(&good);
        let before = rig.raw_channels();

        for byte_idx in 2..good.len() {
            for bit in 0..8 {
                let mut corrupted = good.clone();
                corrupted[byte_idx] ^= 1 << bit;

                let status = rig.receive(&corrupted);
                assert_eq!(status.state, FrameState::Dropped, "byte {} bit {}", byte_idx, bit);
                assert!(!status.processing_required);
                assert_ne!(status.bits() & RX_FRAME_DROPPED, 0);

                assert!(rig.rx.process_frame());
                rig.clock.advance_ms(1);
            }
        }

        assert_eq!(rig.raw_channels(), before);
    }

    #[test]
    fn test_frame_for_other_device_is_dropped() {
        let mut rig = Rig::new(idle_transport());
        let payload = crate::ghst::encoder::pack_rc_payload([1, 2, 3, 4], [0; 4]);
        let frame = encode_frame(GhstAddress::Receiver as u8, 0x10, &payload).unwrap();

        assert_eq!(rig.receive(&frame).state, FrameState::Dropped);
        rig.rx.process_frame();
        assert_eq!(rig.raw_channels(), centered_except(&[]));
    }

    #[test]
    fn test_failsafe_flag_lifecycle() {
        let mut rig = Rig::new(idle_transport());
        let frame = encode_rc_frame(UplinkSubtype::Channels5To8, [992; 4], [0x7C; 4]);

        // Nothing seen yet when the first frame is polled
        assert!(!rig.deliver(&frame).failsafe);

        // Recovery needs the on-time threshold
        for _ in 1..GHST_RC_FRAME_COUNT_THRESHOLD {
            assert!(rig.deliver(&frame).failsafe);
        }

        let status = rig.rx.frame_status();
        assert!(!status.failsafe);
        assert_eq!(status.bits(), RX_FRAME_PENDING);

        rig.clock.advance_ms(GHST_RC_FRAME_TIMEOUT_MS as u64);
        let status = rig.rx.frame_status();
        assert!(status.failsafe);
        assert_eq!(status.bits(), RX_FRAME_FAILSAFE);
        assert_eq!(
            rig.rx.failsafe_tracker().entry(UplinkSubtype::Channels5To8).on_time_counter,
            0
        );

        // Channels keep their last known value through failsafe
        assert_eq!(rig.rx.read_channel(0), Some(1500));
    }

    #[test]
    fn test_failsafe_reported_with_dropped_frame() {
        let mut rig = Rig::new(idle_transport());
        let frame = encode_rc_frame(UplinkSubtype::Channels5To8, [992; 4], [0x7C; 4]);
        rig.deliver(&frame);

        let mut bad = frame.clone();
        bad[13] ^= 0x01;
        let status = rig.receive(&bad);

        assert_eq!(status.bits(), RX_FRAME_DROPPED | RX_FRAME_FAILSAFE);
    }

    #[test]
    fn test_untracked_rc_type_updates_primary_only() {
        let mut rig = Rig::new(idle_transport());
        rig.deliver(&encode_rc_frame_with_type(0x15, [10, 20, 30, 40], [1, 2, 3, 4]));

        assert_eq!(rig.raw_channels(), centered_except(&[(0, 10), (1, 20), (2, 30), (3, 40)]));
        for subtype in UplinkSubtype::ALL {
            assert_eq!(rig.rx.failsafe_tracker().entry(subtype).last_seen_ms, None);
        }
        assert!(!rig.rx.frame_status().failsafe);
    }

    #[test]
    fn test_unprocessed_frame_is_overwritten_by_newer() {
        let mut rig = Rig::new(idle_transport());

        rig.feed(&encode_rc_frame(UplinkSubtype::Channels5To8, [172; 4], [0; 4]));
        rig.clock.advance_ms(4);
        rig.feed(&encode_rc_frame(UplinkSubtype::Channels5To8, [1811; 4], [0; 4]));

        assert_eq!(rig.rx.frame_status().state, FrameState::Complete);
        rig.rx.process_frame();
        assert_eq!(rig.rx.raw_channel(0), Some(1811));
        assert_eq!(rig.rx.frame_status().state, FrameState::Pending);
    }

    #[test]
    fn test_telemetry_sent_inside_window() {
        let payload = [0x89, 0x03, 0x23, 0x00, 0x00];

        let idle = Arc::new(AtomicBool::new(false));
        let mut transport = MockTransport::new();
        let idle_flag = Arc::clone(&idle);
        transport.expect_is_idle().returning(move || idle_flag.load(Ordering::SeqCst));
        transport
            .expect_write()
            .withf(move |data| data.to_vec() == payload.to_vec())
            .times(1)
            .returning(|_| Ok(()));

        let mut rig = Rig::new(transport);
        rig.receive(&encode_rc_frame(UplinkSubtype::Channels5To8, [992; 4], [0; 4]));
        rig.rx.process_frame();
        let frame_end_us = rig.clock.micros() - BYTE_TIME_US as u32;

        rig.rx.write_telemetry_payload(&payload);

        // Too early: the receiver may still be talking
        assert!(!rig.rx.frame_status().processing_required);
        rig.rx.process_frame();

        rig.clock.advance_us((frame_end_us + 1_500 - rig.clock.micros()) as u64);
        let status = rig.rx.frame_status();
        assert_eq!(status.state, FrameState::Pending);
        assert!(status.processing_required);

        assert!(rig.rx.process_frame());
        assert!(rig.rx.is_transmitting_telemetry());

        // Sent once; the buffer is empty again
        assert!(!rig.rx.frame_status().processing_required);
        assert!(rig.rx.is_transmitting_telemetry());

        idle.store(true, Ordering::SeqCst);
        rig.rx.frame_status();
        assert!(!rig.rx.is_transmitting_telemetry());
    }

    #[test]
    fn test_framed_telemetry_sent_inside_window() {
        let expected = encode_telemetry_frame(DownlinkType::PackStat, &[0x64, 0x00, 0x10]).unwrap();
        let mut transport = idle_transport();
        let sent = expected.clone();
        transport
            .expect_write()
            .withf(move |data| data.to_vec() == sent)
            .times(1)
            .returning(|_| Ok(()));

        let mut rig = Rig::new(transport);
        rig.receive(&encode_rc_frame(UplinkSubtype::Channels5To8, [992; 4], [0; 4]));
        rig.rx.process_frame();

        assert_eq!(rig.rx.write_telemetry_frame(DownlinkType::PackStat, &[0x64, 0x00, 0x10]).unwrap(), expected.len());
        assert!(rig.rx.write_telemetry_frame(DownlinkType::PackStat, &[0; 21]).is_err());

        rig.clock.advance_us(1_500);
        assert!(rig.rx.frame_status().processing_required);
        assert!(rig.rx.process_frame());
    }

    #[test]
    fn test_telemetry_not_sent_after_window() {
        let mut transport = idle_transport();
        transport.expect_write().never();

        let mut rig = Rig::new(transport);
        rig.receive(&encode_rc_frame(UplinkSubtype::Channels5To8, [992; 4], [0; 4]));
        rig.rx.process_frame();

        rig.rx.write_telemetry_payload(&[1, 2, 3]);
        rig.clock.advance_us(2_100);

        assert!(!rig.rx.frame_status().processing_required);
        rig.rx.process_frame();
        assert!(!rig.rx.is_transmitting_telemetry());
    }

    #[test]
    fn test_telemetry_write_error_is_not_fatal() {
        let mut transport = idle_transport();
        transport
            .expect_write()
            .times(1)
            .returning(|_| Err(std::io::Error::new(std::io::ErrorKind::WouldBlock, "queue full")));

        let mut rig = Rig::new(transport);
        rig.receive(&encode_rc_frame(UplinkSubtype::Channels5To8, [992; 4], [0; 4]));
        rig.rx.process_frame();

        rig.rx.telemetry_writer().write_telemetry_payload(&[7; 8]);
        rig.clock.advance_us(1_500);

        assert!(rig.rx.frame_status().processing_required);
        assert!(rig.rx.process_frame());
        assert!(rig.rx.is_active());
    }

    #[test]
    fn test_telemetry_pass_does_not_redecode_frame() {
        let mut transport = idle_transport();
        transport.expect_write().times(1).returning(|_| Ok(()));

        let mut rig = Rig::new(transport);
        rig.receive(&encode_rc_frame(UplinkSubtype::Channels9To12, [992; 4], [0; 4]));
        rig.rx.process_frame();

        rig.rx.write_telemetry_payload(&[1, 2, 3, 4]);
        rig.clock.advance_us(1_500);
        assert!(rig.rx.frame_status().processing_required);
        rig.rx.process_frame();

        assert_eq!(
            rig.rx.failsafe_tracker().entry(UplinkSubtype::Channels9To12).on_time_counter,
            1
        );
    }

    #[test]
    fn test_shutdown_keeps_channels() {
        let mut rig = Rig::new(idle_transport());
        rig.deliver(&encode_rc_frame(UplinkSubtype::Channels5To8, [172; 4], [0; 4]));

        rig.rx.shutdown();

        assert!(!rig.rx.is_active());
        assert_eq!(rig.rx.frame_status().bits(), RX_FRAME_PENDING);
        assert!(!rig.rx.process_frame());
        assert_eq!(rig.rx.read_channel(0), Some(988));
    }

    #[test]
    fn test_status_bits_and_display() {
        let status = FrameStatus::new(FrameState::Complete, true, true);
        assert_eq!(status.bits(), 0x07);
        assert_eq!(status.to_string(), "Complete+processing+failsafe");

        let status = FrameStatus::new(FrameState::Dropped, false, false);
        assert_eq!(status.bits(), 0x08);
        assert_eq!(status.to_string(), "Dropped");
    }

    #[test]
    fn test_channel_count() {
        let rx: GhstReceiver<MockTransport, _> = GhstReceiver::new(ManualClock::default());
        assert_eq!(rx.channel_count(), 16);
        assert_eq!(rx.link_stats(), None);
    }
}
