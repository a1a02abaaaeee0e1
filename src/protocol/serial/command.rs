// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! UDIN command set.

use std::fmt;

use crate::types::{ChannelIndex, RelayState};

/// Command understood by a UDIN relay card.
///
/// # Examples
///
/// ```
/// use relayfs::protocol::serial::SerialCommand;
/// use relayfs::types::{ChannelIndex, RelayState};
///
/// let cmd = SerialCommand::Switch {
///     index: ChannelIndex::new(2).unwrap(),
///     state: RelayState::On,
/// };
/// assert_eq!(cmd.token(), "n3");
/// assert!(!cmd.expects_response());
///
/// assert_eq!(SerialCommand::QueryState.token(), "s0");
/// assert!(SerialCommand::QueryState.expects_response());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialCommand {
    /// `?` - report the model string.
    Identify,
    /// `s0` - report all relay states as a decimal bitmask.
    QueryState,
    /// `r0` - switch every relay off.
    ResetAll,
    /// `nX`/`fX` - switch relay X on or off.
    Switch {
        /// Relay to switch.
        index: ChannelIndex,
        /// Requested state.
        state: RelayState,
    },
}

impl SerialCommand {
    /// Returns the ASCII token sent to the device, without terminator.
    #[must_use]
    pub fn token(&self) -> String {
        match self {
            Self::Identify => "?".to_string(),
            Self::QueryState => "s0".to_string(),
            Self::ResetAll => "r0".to_string(),
            Self::Switch { index, state } => {
                let verb = match state {
                    RelayState::On => 'n',
                    RelayState::Off => 'f',
                };
                format!("{verb}{}", index.number())
            }
        }
    }

    /// Returns `true` if the device sends a response line after the echo.
    #[must_use]
    pub const fn expects_response(&self) -> bool {
        matches!(self, Self::Identify | Self::QueryState)
    }
}

impl fmt::Display for SerialCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token())
    }
}
