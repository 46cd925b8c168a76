//! # GHST Protocol Module
//!
//! Receiver-side implementation of the GHST (ImmersionRC Ghost) protocol.
//!
//! This module handles:
//! - Byte-by-byte frame assembly with timeout resync
//! - CRC8-DVB-S2 checksum and destination address validation
//! - Decoding of the 12-bit / 8-bit packed uplink channel frames
//! - Per-subtype failsafe detection
//! - Scheduling telemetry into the half-duplex quiet window

pub mod assembler;
pub mod channels;
pub mod crc;
pub mod encoder;
pub mod failsafe;
pub mod handoff;
pub mod protocol;
pub mod telemetry;
pub mod validator;
