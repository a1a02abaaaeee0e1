// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! UDIN serial relay card.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::device::{RelayDevice, SwitchOutcome};
use crate::error::{DeviceError, Error, Result};
use crate::protocol::serial::{
    lookup_model, DeviceModel, SerialCommand, SerialConfig, SerialLine, SerialLink, MAX_RELAYS,
};
use crate::state::{RegistryState, RelayRegistry};
use crate::types::{ChannelIndex, RelayState};

/// Opens the byte stream to a card.
pub type SerialOpener = Box<dyn Fn(&SerialConfig) -> Result<Box<dyn SerialLine>> + Send + Sync>;

struct SerialInner {
    link: Option<SerialLink>,
    model: Option<&'static DeviceModel>,
    registry: RelayRegistry,
}

/// Relay card reached over a serial port.
///
/// The link and the relay registry share one lock, so a switch and its
/// verification query are never interleaved with another caller.
pub struct SerialRelayDevice {
    config: SerialConfig,
    opener: SerialOpener,
    inner: Mutex<SerialInner>,
}

impl std::fmt::Debug for SerialRelayDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialRelayDevice")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SerialRelayDevice {
    /// Creates a detached device that opens the configured serial port.
    #[cfg(feature = "serial")]
    #[must_use]
    pub fn new(config: SerialConfig) -> Self {
        Self::with_opener(config, |config| {
            crate::protocol::serial::open_port(config).map_err(Error::from)
        })
    }

    /// Creates a detached device that obtains its line from `opener`.
    ///
    /// The opener runs on every attach.
    #[must_use]
    pub fn with_opener<F>(config: SerialConfig, opener: F) -> Self
    where
        F: Fn(&SerialConfig) -> Result<Box<dyn SerialLine>> + Send + Sync + 'static,
    {
        Self {
            config,
            opener: Box::new(opener),
            inner: Mutex::new(SerialInner {
                link: None,
                model: None,
                registry: RelayRegistry::new(),
            }),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &SerialConfig {
        &self.config
    }

    /// Returns the identified model, if attached.
    #[must_use]
    pub fn model(&self) -> Option<&'static DeviceModel> {
        self.inner.lock().model
    }

    /// Returns the registry lifecycle state.
    #[must_use]
    pub fn status(&self) -> RegistryState {
        self.inner.lock().registry.status().clone()
    }

    fn identify(&self, link: &mut SerialLink) -> Result<(&'static DeviceModel, u32)> {
        let id = link.send(&SerialCommand::Identify)?.unwrap_or_default();
        let model = lookup_model(&id).ok_or(DeviceError::UnknownModel(id))?;
        tracing::debug!(model = model.id, relays = model.relays, "Identified relay card");

        if self.config.reset_on_init() {
            if let Err(e) = link.send(&SerialCommand::ResetAll) {
                tracing::warn!(error = %e, "Failed to reset relays");
            }
        }

        let mask = link.query_state()?;
        Ok((model, mask))
    }
}

impl RelayDevice for SerialRelayDevice {
    fn describe(&self) -> String {
        format!("serial://{}", self.config.device().display())
    }

    fn attach(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.link = None;
        inner.model = None;
        inner.registry.clear();

        let line = (self.opener)(&self.config)?;
        let mut link = SerialLink::new(line, &self.config);

        // On failure the link is dropped here, which closes the port.
        let (model, mask) = self.identify(&mut link)?;

        let relays = model.relays.min(MAX_RELAYS);
        inner.registry.populate(relays, mask, Utc::now());
        inner.link = Some(link);
        inner.model = Some(model);

        tracing::info!(
            device = %self.config.device().display(),
            model = model.id,
            relays,
            state = mask,
            "Serial relay card attached"
        );
        Ok(())
    }

    fn detach(&self) {
        let mut inner = self.inner.lock();
        inner.registry.clear();
        inner.model = None;
        if inner.link.take().is_some() {
            tracing::info!(device = %self.config.device().display(), "Serial relay card detached");
        }
    }

    fn channel_count(&self) -> u8 {
        self.inner.lock().registry.channel_count()
    }

    fn last_changed(&self, index: ChannelIndex) -> Option<DateTime<Utc>> {
        self.inner
            .lock()
            .registry
            .channel(index)
            .map(|channel| channel.last_changed())
    }

    fn read(&self, index: ChannelIndex) -> Result<RelayState> {
        self.inner
            .lock()
            .registry
            .state(index)
            .ok_or(Error::ChannelUnavailable(index.number()))
    }

    fn switch(&self, index: ChannelIndex, state: RelayState) -> SwitchOutcome {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        match inner.registry.state(index) {
            None => return SwitchOutcome::Unavailable,
            Some(current) if current == state => {
                tracing::trace!(channel = %index, state = %state, "Relay already in requested state");
                return SwitchOutcome::Unchanged;
            }
            Some(_) => {}
        }

        let Some(link) = inner.link.as_mut() else {
            return SwitchOutcome::Unavailable;
        };

        // The card may have switched even if the echo was lost.
        let sent = link.send(&SerialCommand::Switch { index, state });
        let now = Utc::now();
        match &sent {
            Ok(_) => {
                inner.registry.record(index, state, now);
            }
            Err(e) => {
                tracing::warn!(channel = %index, state = %state, error = %e, "Relay switch not acknowledged");
            }
        }

        match link.query_state() {
            Ok(mask) => match inner.registry.verify(mask, now) {
                Ok(()) => match sent {
                    Ok(_) => {
                        tracing::debug!(channel = %index, state = %state, "Switched relay");
                        SwitchOutcome::Switched
                    }
                    Err(e) => SwitchOutcome::Failed(e),
                },
                Err(mismatched) => {
                    let channels: Vec<u8> = mismatched.iter().map(ChannelIndex::number).collect();
                    tracing::error!(
                        channel = %index,
                        reported = mask,
                        mismatched = ?channels,
                        "Relay card disagrees with cached state, hiding all channels"
                    );
                    SwitchOutcome::Inconsistent(mismatched)
                }
            },
            Err(e) => {
                tracing::error!(
                    channel = %index,
                    error = %e,
                    "Could not verify relay state, hiding all channels"
                );
                inner.registry.degrade(Vec::new(), now);
                SwitchOutcome::Inconsistent(Vec::new())
            }
        }
    }
}
