// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Relay registry tracking.

use chrono::{DateTime, Utc};

use crate::types::{ChannelIndex, RelayState};

/// Last known state of one relay channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Channel {
    index: ChannelIndex,
    state: RelayState,
    last_changed: DateTime<Utc>,
}

impl Channel {
    /// Creates a channel record.
    #[must_use]
    pub fn new(index: ChannelIndex, state: RelayState, last_changed: DateTime<Utc>) -> Self {
        Self {
            index,
            state,
            last_changed,
        }
    }

    /// Returns the channel index.
    #[must_use]
    pub fn index(&self) -> ChannelIndex {
        self.index
    }

    /// Returns the cached relay state.
    #[must_use]
    pub fn state(&self) -> RelayState {
        self.state
    }

    /// Returns when the state last changed.
    #[must_use]
    pub fn last_changed(&self) -> DateTime<Utc> {
        self.last_changed
    }
}

/// Lifecycle of the registry.
///
/// Channels are only exposed while `Operational`. A failed consistency check
/// moves the registry to `Degraded`, and only [`RelayRegistry::populate`]
/// (called when the filesystem is initialised again) leaves that state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RegistryState {
    /// No device attached.
    #[default]
    Offline,
    /// Channels are known and trusted.
    Operational,
    /// The device disagreed with the cache; nothing is exposed.
    Degraded {
        /// Channels whose reported state differed from the cache.
        mismatched: Vec<ChannelIndex>,
        /// When the inconsistency was detected.
        since: DateTime<Utc>,
    },
}

/// In-memory table of the relays on one card.
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use relayfs::state::RelayRegistry;
/// use relayfs::types::{ChannelIndex, RelayState};
///
/// let mut registry = RelayRegistry::new();
/// assert_eq!(registry.channel_count(), 0);
///
/// // Seed 8 channels from an aggregate bitmask, channel 1 on.
/// registry.populate(8, 0b0000_0001, Utc::now());
/// let first = ChannelIndex::new(0).unwrap();
/// assert_eq!(registry.state(first), Some(RelayState::On));
///
/// // The device agrees with the cache.
/// assert!(registry.verify(0b0000_0001, Utc::now()).is_ok());
///
/// // The device disagrees: everything disappears.
/// assert!(registry.verify(0b0000_0011, Utc::now()).is_err());
/// assert_eq!(registry.channel_count(), 0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct RelayRegistry {
    status: RegistryState,
    channels: Vec<Channel>,
}

impl RelayRegistry {
    /// Creates an empty, offline registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds `count` channels from an aggregate state bitmask.
    ///
    /// Bit *i* of `mask` is the state of channel *i*. Every channel gets
    /// `now` as its last-changed time. The registry becomes operational.
    pub fn populate(&mut self, count: u8, mask: u32, now: DateTime<Utc>) {
        self.channels = ChannelIndex::range(count)
            .map(|index| Channel::new(index, bit_state(mask, index), now))
            .collect();
        self.status = RegistryState::Operational;
    }

    /// Forgets every channel and goes offline.
    pub fn clear(&mut self) {
        self.channels.clear();
        self.status = RegistryState::Offline;
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub fn status(&self) -> &RegistryState {
        &self.status
    }

    /// Returns `true` if channels are exposed.
    #[must_use]
    pub fn is_operational(&self) -> bool {
        matches!(self.status, RegistryState::Operational)
    }

    /// Returns the number of exposed channels.
    ///
    /// Zero unless the registry is operational.
    #[must_use]
    pub fn channel_count(&self) -> u8 {
        if self.is_operational() {
            u8::try_from(self.channels.len()).unwrap_or(u8::MAX)
        } else {
            0
        }
    }

    /// Returns the record for an exposed channel.
    #[must_use]
    pub fn channel(&self, index: ChannelIndex) -> Option<&Channel> {
        if self.is_operational() {
            self.channels.get(index.as_usize())
        } else {
            None
        }
    }

    /// Returns the cached state of an exposed channel.
    #[must_use]
    pub fn state(&self, index: ChannelIndex) -> Option<RelayState> {
        self.channel(index).map(Channel::state)
    }

    /// Records a new state for a channel.
    ///
    /// Returns `true` if the cached state changed, in which case the
    /// last-changed time is set to `now`. Unknown channels are ignored.
    pub fn record(&mut self, index: ChannelIndex, state: RelayState, now: DateTime<Utc>) -> bool {
        if !self.is_operational() {
            return false;
        }
        match self.channels.get_mut(index.as_usize()) {
            Some(channel) if channel.state != state => {
                channel.state = state;
                channel.last_changed = now;
                true
            }
            _ => false,
        }
    }

    /// Returns the cache as an aggregate bitmask.
    #[must_use]
    pub fn mask(&self) -> u32 {
        self.channels
            .iter()
            .filter(|c| c.state.is_on())
            .fold(0, |mask, c| mask | (1 << c.index.value()))
    }

    /// Compares the cache against the state reported by the device.
    ///
    /// # Errors
    ///
    /// Returns the mismatching channels if any bit disagrees; the registry is
    /// then degraded.
    pub fn verify(&mut self, mask: u32, now: DateTime<Utc>) -> Result<(), Vec<ChannelIndex>> {
        let mismatched: Vec<ChannelIndex> = self
            .channels
            .iter()
            .filter(|c| bit_state(mask, c.index) != c.state)
            .map(Channel::index)
            .collect();

        if mismatched.is_empty() {
            Ok(())
        } else {
            self.degrade(mismatched.clone(), now);
            Err(mismatched)
        }
    }

    /// Marks the whole relay set as untrustworthy.
    pub fn degrade(&mut self, mismatched: Vec<ChannelIndex>, now: DateTime<Utc>) {
        self.status = RegistryState::Degraded {
            mismatched,
            since: now,
        };
    }
}

fn bit_state(mask: u32, index: ChannelIndex) -> RelayState {
    RelayState::from(mask & (1 << index.value()) != 0)
}
