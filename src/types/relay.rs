// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Relay-related types.
//!
//! This module provides the on/off state of a relay and the index used to
//! address one channel of a multi-relay card.

use std::fmt;
use std::str::FromStr;

use crate::error::ValueError;

/// Represents the state of a relay.
///
/// # Examples
///
/// ```
/// use relayfs::types::RelayState;
///
/// assert_eq!(RelayState::On.as_byte(), b'1');
/// assert_eq!(RelayState::from_byte(b'1'), RelayState::On);
/// // Anything other than '1' switches the relay off.
/// assert_eq!(RelayState::from_byte(b'x'), RelayState::Off);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub enum RelayState {
    /// Relay is open.
    #[default]
    Off,
    /// Relay is closed.
    On,
}

impl RelayState {
    /// Returns the lowercase name of the state.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::On => "on",
        }
    }

    /// Returns the numeric value written to the device.
    #[must_use]
    pub const fn as_num(&self) -> u8 {
        match self {
            Self::Off => 0,
            Self::On => 1,
        }
    }

    /// Returns the file content byte for this state.
    #[must_use]
    pub const fn as_byte(&self) -> u8 {
        match self {
            Self::Off => b'0',
            Self::On => b'1',
        }
    }

    /// Decodes the first byte written to a channel file.
    ///
    /// Only `'1'` means on.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Self {
        if byte == b'1' { Self::On } else { Self::Off }
    }

    /// Decodes an integer reported by a device: zero is off, anything else on.
    #[must_use]
    pub const fn from_num(value: i64) -> Self {
        if value == 0 { Self::Off } else { Self::On }
    }

    /// Returns `true` if the relay is on.
    #[must_use]
    pub const fn is_on(&self) -> bool {
        matches!(self, Self::On)
    }
}

impl fmt::Display for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RelayState {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "off" | "0" | "false" => Ok(Self::Off),
            "on" | "1" | "true" => Ok(Self::On),
            _ => Err(ValueError::InvalidRelayState(s.to_string())),
        }
    }
}

impl From<bool> for RelayState {
    fn from(value: bool) -> Self {
        if value { Self::On } else { Self::Off }
    }
}

/// Zero-based index of a relay channel.
///
/// Users see channels numbered from 1; the device protocols and the registry
/// work with the zero-based index. The largest card supported has 16 relays.
///
/// # Examples
///
/// ```
/// use relayfs::types::ChannelIndex;
///
/// let idx = ChannelIndex::new(2).unwrap();
/// assert_eq!(idx.value(), 2);
/// assert_eq!(idx.number(), 3);
/// assert_eq!(ChannelIndex::from_number(3).unwrap(), idx);
///
/// assert!(ChannelIndex::new(16).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ChannelIndex(u8);

impl ChannelIndex {
    /// Number of channels addressable by any backend.
    pub const LIMIT: u8 = 16;

    /// Creates a new channel index.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::OutOfRange` if `index` is not below [`Self::LIMIT`].
    pub fn new(index: u8) -> Result<Self, ValueError> {
        if index >= Self::LIMIT {
            return Err(ValueError::OutOfRange {
                min: 0,
                max: u16::from(Self::LIMIT - 1),
                actual: u16::from(index),
            });
        }
        Ok(Self(index))
    }

    /// Creates an index from the 1-based channel number.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::OutOfRange` if `number` is 0 or above [`Self::LIMIT`].
    pub fn from_number(number: u8) -> Result<Self, ValueError> {
        if number == 0 || number > Self::LIMIT {
            return Err(ValueError::OutOfRange {
                min: 1,
                max: u16::from(Self::LIMIT),
                actual: u16::from(number),
            });
        }
        Ok(Self(number - 1))
    }

    /// Returns the zero-based index.
    #[must_use]
    pub const fn value(&self) -> u8 {
        self.0
    }

    /// Returns the 1-based channel number.
    #[must_use]
    pub const fn number(&self) -> u8 {
        self.0 + 1
    }

    /// Returns the index as `usize` for table lookups.
    #[must_use]
    pub const fn as_usize(&self) -> usize {
        self.0 as usize
    }

    /// Iterates over the first `count` channels.
    pub fn range(count: u8) -> impl Iterator<Item = Self> {
        (0..count.min(Self::LIMIT)).map(Self)
    }
}

impl fmt::Display for ChannelIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_state_bytes() {
        assert_eq!(RelayState::Off.as_byte(), b'0');
        assert_eq!(RelayState::On.as_byte(), b'1');
        assert_eq!(RelayState::from_byte(b'1'), RelayState::On);
        assert_eq!(RelayState::from_byte(b'0'), RelayState::Off);
        assert_eq!(RelayState::from_byte(b'\n'), RelayState::Off);
        assert_eq!(RelayState::from_byte(b'2'), RelayState::Off);
    }

    #[test]
    fn relay_state_from_num() {
        assert_eq!(RelayState::from_num(0), RelayState::Off);
        assert_eq!(RelayState::from_num(1), RelayState::On);
        assert_eq!(RelayState::from_num(-7), RelayState::On);
    }

    #[test]
    fn relay_state_from_str() {
        assert_eq!("ON".parse::<RelayState>().unwrap(), RelayState::On);
        assert_eq!("off".parse::<RelayState>().unwrap(), RelayState::Off);
        assert_eq!("1".parse::<RelayState>().unwrap(), RelayState::On);
        assert_eq!("false".parse::<RelayState>().unwrap(), RelayState::Off);
        assert!(matches!(
            "toggle".parse::<RelayState>(),
            Err(ValueError::InvalidRelayState(_))
        ));
    }

    #[test]
    fn relay_state_from_bool() {
        assert_eq!(RelayState::from(true), RelayState::On);
        assert_eq!(RelayState::from(false), RelayState::Off);
    }

    #[test]
    fn channel_index_bounds() {
        for i in 0..16 {
            assert_eq!(ChannelIndex::new(i).unwrap().value(), i);
        }
        assert!(ChannelIndex::new(16).is_err());
        assert!(ChannelIndex::from_number(0).is_err());
        assert!(ChannelIndex::from_number(17).is_err());
        assert_eq!(ChannelIndex::from_number(16).unwrap().value(), 15);
    }

    #[test]
    fn channel_index_range_is_capped() {
        assert_eq!(ChannelIndex::range(4).count(), 4);
        assert_eq!(ChannelIndex::range(0).count(), 0);
        assert_eq!(ChannelIndex::range(200).count(), 16);
    }

    #[test]
    fn channel_index_display_is_one_based() {
        assert_eq!(ChannelIndex::new(0).unwrap().to_string(), "1");
    }
}
