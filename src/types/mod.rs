// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Value types for relay control.
//!
//! # Types
//!
//! - [`RelayState`] - On/Off state of one relay
//! - [`ChannelIndex`] - Zero-based relay index (0-15)

mod relay;

pub use relay::{ChannelIndex, RelayState};
