//! Record types written by the channel recorder

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::driver::FrameStatus;
use crate::ghst::channels::{ChannelArray, LinkStats};
use crate::ghst::protocol::GHST_MAX_NUM_CHANNELS;

/// One line of the recorder log
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelRecord {
    pub timestamp: DateTime<Utc>,
    /// Channel values in microseconds
    pub channels_us: [u16; GHST_MAX_NUM_CHANNELS],
    pub failsafe: bool,
    /// Last frame status, e.g. `Complete+processing`
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<LinkStats>,
}

impl ChannelRecord {
    pub fn new(
        timestamp: DateTime<Utc>,
        channels: &ChannelArray,
        status: FrameStatus,
        link: Option<LinkStats>,
    ) -> Self {
        Self {
            timestamp,
            channels_us: channels.to_us(),
            failsafe: status.failsafe,
            status: status.to_string(),
            link,
        }
    }

    /// Snapshot taken now
    pub fn now(channels: &ChannelArray, status: FrameStatus, link: Option<LinkStats>) -> Self {
        Self::new(Utc::now(), channels, status, link)
    }
}
