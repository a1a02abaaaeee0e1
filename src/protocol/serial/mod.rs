// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Serial transport for UDIN USB relay cards.
//!
//! The card speaks a line-oriented ASCII protocol at 9600 baud 8N1. Each
//! command is echoed back before any response, which is how the link
//! detects that it is still in step with the device.

mod command;
mod link;
mod model;

pub use command::SerialCommand;
pub use link::{SerialLine, SerialLink};
pub use model::{lookup_model, DeviceModel, KNOWN_MODELS, MAX_RELAYS};

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Configuration for a serial relay card.
///
/// # Examples
///
/// ```
/// use relayfs::protocol::serial::SerialConfig;
/// use std::time::Duration;
///
/// let config = SerialConfig::new("/dev/ttyUSB0").with_reset_on_init(false);
/// assert_eq!(config.baud_rate(), 9600);
/// assert_eq!(config.read_timeout(), Duration::from_secs(1));
/// assert!(!config.reset_on_init());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SerialConfig {
    device: PathBuf,
    #[serde(default = "default_baud_rate")]
    baud_rate: u32,
    #[serde(default = "default_poll_interval_ms")]
    poll_interval_ms: u64,
    #[serde(default = "default_read_timeout_ms")]
    read_timeout_ms: u64,
    #[serde(default = "default_reset_on_init")]
    reset_on_init: bool,
}

fn default_baud_rate() -> u32 {
    SerialConfig::DEFAULT_BAUD_RATE
}

fn default_poll_interval_ms() -> u64 {
    SerialConfig::DEFAULT_POLL_INTERVAL_MS
}

fn default_read_timeout_ms() -> u64 {
    SerialConfig::DEFAULT_READ_TIMEOUT_MS
}

fn default_reset_on_init() -> bool {
    true
}

impl SerialConfig {
    /// Line speed of UDIN cards.
    pub const DEFAULT_BAUD_RATE: u32 = 9600;
    /// Delay between polls while waiting for input.
    pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10;
    /// Longest wait for one line.
    pub const DEFAULT_READ_TIMEOUT_MS: u64 = 1000;

    /// Creates a configuration for the card at `device`.
    #[must_use]
    pub fn new(device: impl Into<PathBuf>) -> Self {
        Self {
            device: device.into(),
            baud_rate: Self::DEFAULT_BAUD_RATE,
            poll_interval_ms: Self::DEFAULT_POLL_INTERVAL_MS,
            read_timeout_ms: Self::DEFAULT_READ_TIMEOUT_MS,
            reset_on_init: true,
        }
    }

    /// Sets the line speed.
    #[must_use]
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Sets the delay between input polls.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Replaces the device path, keeping the other settings.
    #[must_use]
    pub fn with_device(mut self, device: impl Into<PathBuf>) -> Self {
        self.device = device.into();
        self
    }

    /// Sets the longest wait for one line.
    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Chooses whether every relay is switched off when the card is attached.
    #[must_use]
    pub fn with_reset_on_init(mut self, reset: bool) -> Self {
        self.reset_on_init = reset;
        self
    }

    /// Returns the device path.
    #[must_use]
    pub fn device(&self) -> &Path {
        &self.device
    }

    /// Returns the line speed.
    #[must_use]
    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    /// Returns the delay between input polls.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Returns the longest wait for one line.
    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Returns whether relays are reset when the card is attached.
    #[must_use]
    pub fn reset_on_init(&self) -> bool {
        self.reset_on_init
    }
}

/// Opens the configured port with UDIN line settings.
///
/// The port read timeout is the poll interval, so each read waits at most
/// one poll step. Pending input is discarded.
///
/// # Errors
///
/// Returns `ProtocolError::Serial` if the port cannot be opened or flushed.
#[cfg(feature = "serial")]
pub fn open_port(
    config: &SerialConfig,
) -> Result<Box<dyn SerialLine>, crate::error::ProtocolError> {
    use serialport::{ClearBuffer, DataBits, FlowControl, Parity, StopBits};

    let path = config.device().to_string_lossy();
    let port = serialport::new(path.as_ref(), config.baud_rate())
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .timeout(config.poll_interval())
        .open()?;
    port.clear(ClearBuffer::Input)?;

    tracing::debug!(device = %path, baud = config.baud_rate(), "Opened serial port");
    Ok(Box::new(port))
}
