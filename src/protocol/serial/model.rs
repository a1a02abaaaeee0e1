// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Known UDIN models.

/// A relay card model recognised from its identification string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceModel {
    /// The exact reply to the `?` command.
    pub id: &'static str,
    /// Number of relays on the card.
    pub relays: u8,
}

/// Largest relay count of any supported serial card.
pub const MAX_RELAYS: u8 = 8;

/// Every supported model.
pub const KNOWN_MODELS: &[DeviceModel] = &[DeviceModel {
    id: "UDIN-8R 8 x Relay V1.0",
    relays: 8,
}];

/// Looks up a model by its identification string.
///
/// # Examples
///
/// ```
/// use relayfs::protocol::serial::lookup_model;
///
/// assert_eq!(lookup_model("UDIN-8R 8 x Relay V1.0").map(|m| m.relays), Some(8));
/// assert!(lookup_model("UDIN-4R").is_none());
/// ```
#[must_use]
pub fn lookup_model(id: &str) -> Option<&'static DeviceModel> {
    KNOWN_MODELS.iter().find(|model| model.id == id)
}
