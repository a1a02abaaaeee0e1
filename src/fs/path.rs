// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Translation between filesystem paths and relay channels.
//!
//! The mounted directory is flat: `/` plus one file per relay named `r1`,
//! `r2`, ... Numbers are 1-based decimal without leading zeros.

use crate::types::ChannelIndex;

/// Leading character of every channel file name.
pub const CHANNEL_TAG: char = 'r';

/// What a path refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathTarget {
    /// The mount root.
    Root,
    /// A channel file.
    Channel(ChannelIndex),
}

/// Resolves a path against the current channel count.
///
/// Returns `None` for anything that is neither the root nor a channel
/// numbered `1..=channel_count`.
///
/// # Examples
///
/// ```
/// use relayfs::fs::path::{resolve, PathTarget};
///
/// assert_eq!(resolve("/", 8), Some(PathTarget::Root));
/// assert!(matches!(resolve("/r8", 8), Some(PathTarget::Channel(i)) if i.value() == 7));
/// assert_eq!(resolve("/r9", 8), None);
/// assert_eq!(resolve("/r01", 8), None);
/// assert_eq!(resolve("/r1x", 8), None);
/// ```
#[must_use]
pub fn resolve(path: &str, channel_count: u8) -> Option<PathTarget> {
    if path == "/" {
        return Some(PathTarget::Root);
    }
    path.strip_prefix('/')
        .and_then(|name| channel_from_name(name, channel_count))
        .map(PathTarget::Channel)
}

/// Resolves a path that must name a channel.
#[must_use]
pub fn channel_from_path(path: &str, channel_count: u8) -> Option<ChannelIndex> {
    match resolve(path, channel_count) {
        Some(PathTarget::Channel(index)) => Some(index),
        _ => None,
    }
}

/// Parses a bare file name (no leading slash) into a channel index.
#[must_use]
pub fn channel_from_name(name: &str, channel_count: u8) -> Option<ChannelIndex> {
    let digits = name.strip_prefix(CHANNEL_TAG)?;
    if digits.is_empty() || digits.starts_with('0') || !digits.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }
    let number: u8 = digits.parse().ok()?;
    if number > channel_count {
        return None;
    }
    ChannelIndex::from_number(number).ok()
}

/// Returns the file name of a channel.
#[must_use]
pub fn file_name(index: ChannelIndex) -> String {
    format!("{CHANNEL_TAG}{}", index.number())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(path: &str, count: u8) -> Option<u8> {
        channel_from_path(path, count).map(|i| i.value())
    }

    #[test]
    fn root_is_distinguished() {
        assert_eq!(resolve("/", 0), Some(PathTarget::Root));
        assert_eq!(resolve("/", 16), Some(PathTarget::Root));
        assert_eq!(channel("/", 16), None);
    }

    #[test]
    fn valid_channels_map_to_zero_based_index() {
        for n in 1..=8u8 {
            assert_eq!(channel(&format!("/r{n}"), 8), Some(n - 1));
        }
    }

    #[test]
    fn boundaries() {
        assert_eq!(channel("/r1", 4), Some(0));
        assert_eq!(channel("/r4", 4), Some(3));
        assert_eq!(channel("/r5", 4), None);
        assert_eq!(channel("/r0", 4), None);
    }

    #[test]
    fn multi_digit_channels_reachable() {
        assert_eq!(channel("/r10", 16), Some(9));
        assert_eq!(channel("/r16", 16), Some(15));
        assert_eq!(channel("/r17", 16), None);
        assert_eq!(channel("/r10", 9), None);
    }

    #[test]
    fn rejects_malformed_names() {
        assert_eq!(channel("/r", 8), None);
        assert_eq!(channel("/r1x", 8), None);
        assert_eq!(channel("/r1 ", 8), None);
        assert_eq!(channel("/r01", 8), None);
        assert_eq!(channel("/r+1", 8), None);
        assert_eq!(channel("/r-1", 8), None);
        assert_eq!(channel("/R1", 8), None);
        assert_eq!(channel("/x1", 8), None);
        assert_eq!(channel("r1", 8), None);
        assert_eq!(channel("/r1/", 8), None);
        assert_eq!(channel("/dir/r1", 8), None);
        assert_eq!(channel("/r999", 16), None);
        assert_eq!(channel("", 8), None);
    }

    #[test]
    fn no_channels_when_count_is_zero() {
        assert_eq!(channel("/r1", 0), None);
    }

    #[test]
    fn file_name_round_trips() {
        for index in ChannelIndex::range(16) {
            let name = file_name(index);
            assert_eq!(channel_from_name(&name, 16), Some(index));
        }
        assert_eq!(file_name(ChannelIndex::new(0).unwrap()), "r1");
    }
}
