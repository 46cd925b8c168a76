//! # GHST RX Library
//!
//! Receiver-side link layer for the GHST single-wire RC protocol.
//!
//! This library reassembles uplink frames from the serial byte stream,
//! validates them, tracks signal loss, decodes the 16 RC channels and
//! schedules telemetry into the quiet period between uplink frames.

pub mod config;
pub mod driver;
pub mod error;
pub mod ghst;
pub mod recorder;
pub mod serial;
