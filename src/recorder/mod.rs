//! # Channel Recorder
//!
//! Optional log of decoded receiver state.
//!
//! This module handles:
//! - Snapshotting channels, failsafe and link statistics
//! - Formatting as JSONL (JSON Lines)
//! - Writing to rotating log files (max N records per file)
//! - Retaining only the last M files

pub mod logger;
pub mod types;

pub use logger::ChannelRecorder;
pub use types::ChannelRecord;
