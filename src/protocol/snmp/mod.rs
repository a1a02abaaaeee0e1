// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! SNMP transport for network relay cards.
//!
//! The card publishes one read-write INTEGER object per relay under the
//! Denkovi enterprise subtree. Relays are grouped by eight:
//!
//! ```text
//! .1.3.6.1.4.1.19865.1.2.<index / 8 + 1>.<index % 8 + 1>.0
//! ```

mod ber;
mod session;

pub use ber::{tag, Message, Oid, Pdu, PduKind, Value, VarBind, VERSION_1};
pub use session::SnmpSession;

use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ProtocolError;
use crate::types::ChannelIndex;

/// Enterprise prefix of the relay objects.
const RELAY_OID_PREFIX: [u32; 9] = [1, 3, 6, 1, 4, 1, 19865, 1, 2];

/// Returns the object identifier of a relay.
///
/// # Examples
///
/// ```
/// use relayfs::protocol::snmp::relay_oid;
/// use relayfs::types::ChannelIndex;
///
/// let oid = relay_oid(ChannelIndex::new(9).unwrap());
/// assert_eq!(oid.to_string(), ".1.3.6.1.4.1.19865.1.2.2.2.0");
/// ```
#[must_use]
pub fn relay_oid(index: ChannelIndex) -> Oid {
    let i = u32::from(index.value());
    let mut arcs = RELAY_OID_PREFIX.to_vec();
    arcs.extend([i / 8 + 1, i % 8 + 1, 0]);
    // The prefix starts with 1.3, which is always a valid OID head.
    Oid::from_arcs(&arcs).unwrap_or_else(|_| unreachable!("relay OID prefix is valid"))
}

/// Configuration for an SNMP relay card.
///
/// # Examples
///
/// ```
/// use relayfs::protocol::snmp::SnmpConfig;
/// use std::time::Duration;
///
/// let config = SnmpConfig::new("192.168.1.100", "private")
///     .with_relays(4)
///     .with_timeout(Duration::from_millis(500))
///     .with_retries(2);
///
/// assert_eq!(config.relays(), 4);
///
/// // Relay counts are capped at the size of the largest card.
/// assert_eq!(SnmpConfig::new("host", "c").with_relays(40).relays(), 16);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SnmpConfig {
    peer: String,
    community: String,
    #[serde(default = "default_relays")]
    relays: u8,
    #[serde(default = "default_timeout_ms")]
    timeout_ms: u64,
    #[serde(default = "default_retries")]
    retries: u32,
}

fn default_relays() -> u8 {
    SnmpConfig::MAX_RELAYS
}

fn default_timeout_ms() -> u64 {
    SnmpConfig::DEFAULT_TIMEOUT_MS
}

fn default_retries() -> u32 {
    SnmpConfig::DEFAULT_RETRIES
}

impl SnmpConfig {
    /// Largest supported relay card.
    pub const MAX_RELAYS: u8 = 16;
    /// Default SNMP agent port.
    pub const DEFAULT_PORT: u16 = 161;
    /// Default per-attempt timeout in milliseconds.
    pub const DEFAULT_TIMEOUT_MS: u64 = 1000;
    /// Default number of retransmissions.
    pub const DEFAULT_RETRIES: u32 = 5;

    /// Creates a configuration for the agent at `peer` (`host` or `host:port`).
    #[must_use]
    pub fn new(peer: impl Into<String>, community: impl Into<String>) -> Self {
        Self {
            peer: peer.into(),
            community: community.into(),
            relays: Self::MAX_RELAYS,
            timeout_ms: Self::DEFAULT_TIMEOUT_MS,
            retries: Self::DEFAULT_RETRIES,
        }
    }

    /// Sets the number of relays, capped at [`Self::MAX_RELAYS`].
    #[must_use]
    pub fn with_relays(mut self, relays: u8) -> Self {
        self.relays = relays.min(Self::MAX_RELAYS);
        self
    }

    /// Sets the per-attempt timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the number of retransmissions after the first attempt.
    #[must_use]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Returns the peer address as configured.
    #[must_use]
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Returns the community string.
    #[must_use]
    pub fn community(&self) -> &str {
        &self.community
    }

    /// Returns the relay count, capped at [`Self::MAX_RELAYS`].
    #[must_use]
    pub fn relays(&self) -> u8 {
        self.relays.min(Self::MAX_RELAYS)
    }

    /// Returns the per-attempt timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Returns the number of retransmissions.
    #[must_use]
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Resolves the peer, defaulting to port 161.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::InvalidAddress` if the peer does not resolve.
    pub fn peer_addr(&self) -> Result<SocketAddr, ProtocolError> {
        let resolved = match self.peer.to_socket_addrs() {
            Ok(mut addrs) => addrs.next(),
            Err(_) => (self.peer.as_str(), Self::DEFAULT_PORT)
                .to_socket_addrs()
                .ok()
                .and_then(|mut addrs| addrs.next()),
        };
        resolved.ok_or_else(|| ProtocolError::InvalidAddress(self.peer.clone()))
    }
}
