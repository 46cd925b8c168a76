//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{GhstError, Result};
use crate::ghst::failsafe::FailsafeTracker;
use crate::ghst::protocol::{
    GHST_RC_FRAME_COUNT_THRESHOLD, GHST_RC_FRAME_TIMEOUT_MS, GHST_RX_TO_TELEMETRY_MAX_US,
    GHST_RX_TO_TELEMETRY_MIN_US, GHST_TIME_BETWEEN_FRAMES_US,
};
use crate::ghst::telemetry::TelemetryScheduler;
use crate::serial::port_trait::PortConfig;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub receiver: ReceiverConfig,
    #[serde(default)]
    pub failsafe: FailsafeConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub recorder: RecorderConfig,
}

/// Serial port configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct SerialConfig {
    /// Receiver port, the receiver stays inactive without one
    #[serde(default)]
    pub port: Option<String>,

    /// Advisory only: host UARTs cannot invert the line, so inversion must be
    /// done by the adapter. Setting it logs a warning when the port opens.
    #[serde(default)]
    pub inverted: bool,
}

/// Poll loop configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ReceiverConfig {
    #[serde(default = "default_poll_rate_hz")]
    pub poll_rate_hz: u32,

    #[serde(default = "default_status_log_interval_ms")]
    pub status_log_interval_ms: u64,
}

/// Signal loss detection
#[derive(Debug, Deserialize, Clone)]
pub struct FailsafeConfig {
    #[serde(default = "default_frame_timeout_ms")]
    pub frame_timeout_ms: u32,

    #[serde(default = "default_recovery_frames")]
    pub recovery_frames: u8,
}

/// Telemetry send window, relative to the end of an uplink frame
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default = "default_window_min_us")]
    pub window_min_us: u32,

    #[serde(default = "default_window_max_us")]
    pub window_max_us: u32,
}

/// Channel recorder configuration
#[derive(Debug, Deserialize, Clone)]
pub struct RecorderConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_max_records_per_file")]
    pub max_records_per_file: usize,

    #[serde(default = "default_max_files_to_keep")]
    pub max_files_to_keep: usize,

    #[serde(default = "default_log_interval_ms")]
    pub log_interval_ms: u64,

    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_poll_rate_hz() -> u32 { 1000 }
fn default_status_log_interval_ms() -> u64 { 5000 }

fn default_frame_timeout_ms() -> u32 { GHST_RC_FRAME_TIMEOUT_MS }
fn default_recovery_frames() -> u8 { GHST_RC_FRAME_COUNT_THRESHOLD }

fn default_window_min_us() -> u32 { GHST_RX_TO_TELEMETRY_MIN_US }
fn default_window_max_us() -> u32 { GHST_RX_TO_TELEMETRY_MAX_US }

fn default_log_dir() -> String { "./logs".to_string() }
fn default_max_records_per_file() -> usize { 10000 }
fn default_max_files_to_keep() -> usize { 10 }
fn default_log_interval_ms() -> u64 { 100 }
fn default_log_format() -> String { "jsonl".to_string() }

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            poll_rate_hz: default_poll_rate_hz(),
            status_log_interval_ms: default_status_log_interval_ms(),
        }
    }
}

impl Default for FailsafeConfig {
    fn default() -> Self {
        Self {
            frame_timeout_ms: default_frame_timeout_ms(),
            recovery_frames: default_recovery_frames(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            window_min_us: default_window_min_us(),
            window_max_us: default_window_max_us(),
        }
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            log_dir: default_log_dir(),
            max_records_per_file: default_max_records_per_file(),
            max_files_to_keep: default_max_files_to_keep(),
            log_interval_ms: default_log_interval_ms(),
            format: default_log_format(),
        }
    }
}

fn invalid(msg: impl std::fmt::Display) -> GhstError {
    GhstError::Config(toml::de::Error::custom(msg))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use ghst_rx::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if let Some(port) = &self.serial.port {
            if port.is_empty() {
                return Err(invalid("serial port cannot be empty (omit it to run without a port)"));
            }
        }

        if !(100..=4000).contains(&self.receiver.poll_rate_hz) {
            return Err(invalid("poll_rate_hz must be between 100 and 4000"));
        }

        if self.receiver.status_log_interval_ms == 0 || self.receiver.status_log_interval_ms > 3_600_000 {
            return Err(invalid("status_log_interval_ms must be between 1 and 3600000"));
        }

        if self.failsafe.frame_timeout_ms == 0 || self.failsafe.frame_timeout_ms > 60000 {
            return Err(invalid("frame_timeout_ms must be between 1 and 60000"));
        }

        if self.failsafe.recovery_frames == 0 {
            return Err(invalid("recovery_frames must be greater than 0"));
        }

        if self.telemetry.window_min_us >= self.telemetry.window_max_us {
            return Err(invalid("window_min_us must be less than window_max_us"));
        }

        // Telemetry must finish before the next uplink frame at the fastest rate
        if self.telemetry.window_max_us > GHST_TIME_BETWEEN_FRAMES_US {
            return Err(invalid(format!(
                "window_max_us must not exceed {} (fastest frame interval)",
                GHST_TIME_BETWEEN_FRAMES_US
            )));
        }

        if self.recorder.enabled && self.recorder.log_dir.is_empty() {
            return Err(invalid("recorder log_dir cannot be empty when enabled"));
        }

        if self.recorder.max_records_per_file == 0 {
            return Err(invalid("max_records_per_file must be greater than 0"));
        }

        if self.recorder.max_files_to_keep == 0 {
            return Err(invalid("max_files_to_keep must be greater than 0"));
        }

        if self.recorder.log_interval_ms == 0 || self.recorder.log_interval_ms > 60000 {
            return Err(invalid("log_interval_ms must be between 1 and 60000"));
        }

        if self.recorder.format != "jsonl" {
            return Err(invalid("log format must be 'jsonl' (only supported format)"));
        }

        Ok(())
    }

    /// Serial settings handed to the transport opener
    pub fn port_config(&self) -> PortConfig {
        PortConfig {
            path: self.serial.port.clone(),
            inverted: self.serial.inverted,
        }
    }

    pub fn failsafe_tracker(&self) -> FailsafeTracker {
        FailsafeTracker::new(self.failsafe.frame_timeout_ms, self.failsafe.recovery_frames)
    }

    pub fn scheduler(&self) -> TelemetryScheduler {
        TelemetryScheduler::new(self.telemetry.window_min_us, self.telemetry.window_max_us)
    }
}
