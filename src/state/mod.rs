// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Relay state management types.
//!
//! The [`RelayRegistry`] holds the last known state of every channel on a
//! card together with a lifecycle ([`RegistryState`]) that decides whether
//! the channels are exposed at all.

mod registry;

pub use registry::{Channel, RegistryState, RelayRegistry};
