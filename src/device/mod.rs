// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Relay card abstraction.
//!
//! This module provides one trait, [`RelayDevice`], implemented by every
//! backend so the filesystem adapter does not care how a card is reached.
//!
//! # Backend Differences
//!
//! ## SNMP Cards
//!
//! SNMP cards keep no local state. Every read is a network query and the
//! channel count comes from configuration.
//!
//! ```no_run
//! use relayfs::device::{RelayDevice, SnmpRelayDevice};
//! use relayfs::protocol::snmp::SnmpConfig;
//! use relayfs::types::ChannelIndex;
//!
//! # fn example() -> relayfs::Result<()> {
//! let device = SnmpRelayDevice::new(SnmpConfig::new("192.168.1.100", "private"));
//! device.attach()?;
//!
//! let state = device.read(ChannelIndex::new(0)?)?;
//! println!("relay 1 is {state}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Serial Cards
//!
//! Serial cards are identified on attach and their relay states cached.
//! Every switch is verified against the card; a disagreement takes every
//! channel offline until the card is attached again.
//!
//! ```no_run
//! use relayfs::device::{RelayDevice, SerialRelayDevice};
//! use relayfs::protocol::serial::SerialConfig;
//! use relayfs::types::{ChannelIndex, RelayState};
//!
//! # fn example() -> relayfs::Result<()> {
//! let device = SerialRelayDevice::new(SerialConfig::new("/dev/ttyUSB0"));
//! device.attach()?;
//!
//! let outcome = device.switch(ChannelIndex::new(2)?, RelayState::On);
//! println!("{outcome:?}");
//! # Ok(())
//! # }
//! ```

mod serial;
mod snmp;

pub use serial::{SerialOpener, SerialRelayDevice};
pub use snmp::SnmpRelayDevice;

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::types::{ChannelIndex, RelayState};

/// Result of a switch request.
///
/// Switches are fire-and-forget at the filesystem boundary; this value is
/// what the caller gets to log or inspect.
#[derive(Debug)]
pub enum SwitchOutcome {
    /// The device was told to switch.
    Switched,
    /// The relay was already in the requested state; nothing was sent.
    Unchanged,
    /// The device did not accept the command.
    Failed(Error),
    /// The device disagreed with the cached state afterwards. Every channel
    /// is now hidden.
    Inconsistent(Vec<ChannelIndex>),
    /// The channel is not currently exposed.
    Unavailable,
}

impl SwitchOutcome {
    /// Returns `true` if the relay is known to be in the requested state.
    #[must_use]
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Switched | Self::Unchanged)
    }
}

/// A relay card reachable through one backend.
///
/// Implementations serialise all device traffic internally, so a single
/// instance may be shared between filesystem worker threads.
pub trait RelayDevice: Send + Sync {
    /// Returns a short human-readable description for logs.
    fn describe(&self) -> String;

    /// Opens the connection and discovers the channels.
    ///
    /// # Errors
    ///
    /// Returns an error if the device cannot be reached or identified. The
    /// device then exposes no channels.
    fn attach(&self) -> Result<()>;

    /// Closes the connection. No channels are exposed afterwards.
    fn detach(&self);

    /// Returns the number of currently exposed channels.
    fn channel_count(&self) -> u8;

    /// Returns when the channel last changed state, if it is exposed.
    fn last_changed(&self, index: ChannelIndex) -> Option<DateTime<Utc>>;

    /// Returns the state of one channel.
    ///
    /// # Errors
    ///
    /// Returns `Error::ChannelUnavailable` if the channel is not exposed, or a
    /// transport error if the device could not be queried.
    fn read(&self, index: ChannelIndex) -> Result<RelayState>;

    /// Requests a relay state change.
    fn switch(&self, index: ChannelIndex, state: RelayState) -> SwitchOutcome;
}

impl<D: RelayDevice + ?Sized> RelayDevice for Box<D> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn attach(&self) -> Result<()> {
        (**self).attach()
    }

    fn detach(&self) {
        (**self).detach();
    }

    fn channel_count(&self) -> u8 {
        (**self).channel_count()
    }

    fn last_changed(&self, index: ChannelIndex) -> Option<DateTime<Utc>> {
        (**self).last_changed(index)
    }

    fn read(&self, index: ChannelIndex) -> Result<RelayState> {
        (**self).read(index)
    }

    fn switch(&self, index: ChannelIndex, state: RelayState) -> SwitchOutcome {
        (**self).switch(index, state)
    }
}
