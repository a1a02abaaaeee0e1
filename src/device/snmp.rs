// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! SNMP relay card.

use std::sync::atomic::{AtomicU8, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::device::{RelayDevice, SwitchOutcome};
use crate::error::{Error, Result};
use crate::protocol::snmp::{relay_oid, Oid, SnmpConfig, SnmpSession};
use crate::types::{ChannelIndex, RelayState};

/// Relay card reached over SNMPv1.
///
/// The relay states are not cached: each read queries the agent, and the
/// last-changed time of a channel is always the current time.
#[derive(Debug)]
pub struct SnmpRelayDevice {
    config: SnmpConfig,
    oids: Vec<Oid>,
    session: Mutex<Option<SnmpSession>>,
    // Kept outside the lock so listings never wait behind a slow query.
    count: AtomicU8,
}

impl SnmpRelayDevice {
    /// Creates a detached device with its object identifiers precomputed.
    #[must_use]
    pub fn new(config: SnmpConfig) -> Self {
        let oids = ChannelIndex::range(config.relays()).map(relay_oid).collect();
        Self {
            config,
            oids,
            session: Mutex::new(None),
            count: AtomicU8::new(0),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &SnmpConfig {
        &self.config
    }

    /// Returns the object identifier of an exposed channel.
    fn oid(&self, index: ChannelIndex) -> Result<&Oid> {
        if index.value() >= self.channel_count() {
            return Err(Error::ChannelUnavailable(index.number()));
        }
        self.oids
            .get(index.as_usize())
            .ok_or(Error::ChannelUnavailable(index.number()))
    }

    fn with_session<T>(
        &self,
        index: ChannelIndex,
        f: impl FnOnce(&mut SnmpSession, &Oid) -> Result<T>,
    ) -> Result<T> {
        let oid = self.oid(index)?;
        let mut guard = self.session.lock();
        let session = guard
            .as_mut()
            .ok_or(Error::ChannelUnavailable(index.number()))?;
        f(session, oid)
    }
}

impl RelayDevice for SnmpRelayDevice {
    fn describe(&self) -> String {
        format!("snmp://{}", self.config.peer())
    }

    fn attach(&self) -> Result<()> {
        let session = SnmpSession::open(&self.config)?;
        let peer = session.peer();
        *self.session.lock() = Some(session);

        let count = u8::try_from(self.oids.len()).unwrap_or(u8::MAX);
        self.count.store(count, Ordering::Release);
        tracing::info!(peer = %peer, relays = count, "SNMP relay card attached");
        Ok(())
    }

    fn detach(&self) {
        self.count.store(0, Ordering::Release);
        if self.session.lock().take().is_some() {
            tracing::info!(peer = %self.config.peer(), "SNMP relay card detached");
        }
    }

    fn channel_count(&self) -> u8 {
        self.count.load(Ordering::Acquire)
    }

    fn last_changed(&self, index: ChannelIndex) -> Option<DateTime<Utc>> {
        (index.value() < self.channel_count()).then(Utc::now)
    }

    fn read(&self, index: ChannelIndex) -> Result<RelayState> {
        let value = self.with_session(index, |session, oid| session.get(oid))?;
        let state = RelayState::from_num(value);
        tracing::debug!(channel = %index, state = %state, "Read relay");
        Ok(state)
    }

    fn switch(&self, index: ChannelIndex, state: RelayState) -> SwitchOutcome {
        let result = self.with_session(index, |session, oid| {
            session.set(oid, i64::from(state.as_num()))
        });

        match result {
            Ok(()) => {
                tracing::debug!(channel = %index, state = %state, "Switched relay");
                SwitchOutcome::Switched
            }
            Err(Error::ChannelUnavailable(_)) => SwitchOutcome::Unavailable,
            Err(e) => {
                tracing::warn!(channel = %index, state = %state, error = %e, "Relay switch failed");
                SwitchOutcome::Failed(e)
            }
        }
    }
}
