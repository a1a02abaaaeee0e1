// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Path-based filesystem adapter.
//!
//! [`RelayFs`] exposes one [`RelayDevice`] as a flat directory of one-byte
//! files. Each entry point takes a path, resolves it with [`path`], and
//! only then talks to the device. Errors are reduced to [`FsError`].
//!
//! # Examples
//!
//! ```no_run
//! use relayfs::device::SnmpRelayDevice;
//! use relayfs::fs::RelayFs;
//! use relayfs::protocol::snmp::SnmpConfig;
//!
//! let fs = RelayFs::new(SnmpRelayDevice::new(
//!     SnmpConfig::new("192.168.1.100", "private").with_relays(4),
//! ));
//! fs.init();
//!
//! for entry in fs.readdir("/").unwrap() {
//!     println!("{}", entry.name);
//! }
//!
//! fs.write("/r2", b"1", 0).unwrap();
//! assert_eq!(fs.read("/r2", 1, 0).unwrap(), b"1");
//! ```

#[cfg(feature = "fuse")]
pub mod fuse;
pub mod path;

use std::time::SystemTime;

use chrono::{DateTime, Utc};

use crate::device::{RelayDevice, SwitchOutcome};
use crate::error::FsError;
use crate::types::{ChannelIndex, RelayState};

use path::PathTarget;

/// Permission bits of the mount root.
pub const ROOT_PERM: u16 = 0o775;
/// Permission bits of a channel file.
pub const CHANNEL_PERM: u16 = 0o664;

/// Type of a filesystem entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// The mount root.
    Directory,
    /// A channel file.
    RegularFile,
}

/// Attributes reported for an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileAttr {
    /// Entry type.
    pub kind: FileKind,
    /// Permission bits.
    pub perm: u16,
    /// Link count.
    pub nlink: u32,
    /// Size in bytes.
    pub size: u64,
    /// Owner.
    pub uid: u32,
    /// Group.
    pub gid: u32,
    /// Status change time.
    pub ctime: SystemTime,
    /// Modification time.
    pub mtime: SystemTime,
}

/// One directory listing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Entry name.
    pub name: String,
    /// What the entry refers to. `.` and `..` both refer to the root.
    pub target: PathTarget,
}

impl DirEntry {
    /// Returns the entry type.
    #[must_use]
    pub fn kind(&self) -> FileKind {
        match self.target {
            PathTarget::Root => FileKind::Directory,
            PathTarget::Channel(_) => FileKind::RegularFile,
        }
    }
}

/// Filesystem view of one relay card.
#[derive(Debug)]
pub struct RelayFs<D> {
    device: D,
    started: DateTime<Utc>,
    uid: u32,
    gid: u32,
}

impl<D: RelayDevice> RelayFs<D> {
    /// Wraps a detached device. Files are owned by the current process.
    #[must_use]
    pub fn new(device: D) -> Self {
        Self {
            device,
            started: Utc::now(),
            uid: rustix::process::getuid().as_raw(),
            gid: rustix::process::getgid().as_raw(),
        }
    }

    /// Returns the underlying device.
    #[must_use]
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Attaches the device.
    ///
    /// Failure is logged and leaves the directory empty; the mount itself
    /// still succeeds.
    pub fn init(&self) {
        match self.device.attach() {
            Ok(()) => tracing::info!(
                device = %self.device.describe(),
                channels = self.device.channel_count(),
                "Relay filesystem ready"
            ),
            Err(e) => tracing::warn!(
                device = %self.device.describe(),
                error = %e,
                "Relay device unavailable, exposing no channels"
            ),
        }
    }

    /// Detaches the device.
    pub fn destroy(&self) {
        self.device.detach();
    }

    /// Resolves a path against the current channel set.
    ///
    /// # Errors
    ///
    /// Returns `FsError::NotFound` if the path names nothing.
    pub fn resolve(&self, path: &str) -> Result<PathTarget, FsError> {
        path::resolve(path, self.device.channel_count()).ok_or(FsError::NotFound)
    }

    fn channel(&self, path: &str) -> Result<ChannelIndex, FsError> {
        match self.resolve(path)? {
            PathTarget::Channel(index) => Ok(index),
            PathTarget::Root => Err(FsError::NotFound),
        }
    }

    /// Lists the root directory.
    ///
    /// # Errors
    ///
    /// Returns `FsError::NotFound` for any path other than `/`.
    pub fn readdir(&self, path: &str) -> Result<Vec<DirEntry>, FsError> {
        if path != "/" {
            return Err(FsError::NotFound);
        }

        let mut entries = vec![
            DirEntry {
                name: ".".to_string(),
                target: PathTarget::Root,
            },
            DirEntry {
                name: "..".to_string(),
                target: PathTarget::Root,
            },
        ];
        entries.extend(
            ChannelIndex::range(self.device.channel_count()).map(|index| DirEntry {
                name: path::file_name(index),
                target: PathTarget::Channel(index),
            }),
        );
        Ok(entries)
    }

    /// Returns the attributes of the root or a channel file.
    ///
    /// # Errors
    ///
    /// Returns `FsError::NotFound` if the path names nothing.
    pub fn getattr(&self, path: &str) -> Result<FileAttr, FsError> {
        let target = self.resolve(path)?;
        self.attr(target)
    }

    /// Returns the attributes of an already resolved target.
    ///
    /// # Errors
    ///
    /// Returns `FsError::NotFound` if a channel disappeared since it was
    /// resolved.
    pub fn attr(&self, target: PathTarget) -> Result<FileAttr, FsError> {
        let started = SystemTime::from(self.started);
        match target {
            PathTarget::Root => Ok(FileAttr {
                kind: FileKind::Directory,
                perm: ROOT_PERM,
                nlink: 2,
                size: 0,
                uid: self.uid,
                gid: self.gid,
                ctime: started,
                mtime: started,
            }),
            PathTarget::Channel(index) => {
                let changed = self.device.last_changed(index).ok_or(FsError::NotFound)?;
                Ok(FileAttr {
                    kind: FileKind::RegularFile,
                    perm: CHANNEL_PERM,
                    nlink: 1,
                    size: 1,
                    uid: self.uid,
                    gid: self.gid,
                    ctime: started,
                    mtime: SystemTime::from(changed),
                })
            }
        }
    }

    /// Checks that a channel file can be opened.
    ///
    /// # Errors
    ///
    /// Returns `FsError::NotFound` unless the path names a channel.
    pub fn open(&self, path: &str) -> Result<(), FsError> {
        self.channel(path).map(|_| ())
    }

    /// Reads a channel file.
    ///
    /// A zero-sized read or any read at a non-zero offset returns nothing
    /// without touching the device.
    ///
    /// # Errors
    ///
    /// Returns `FsError::NotFound` for an unknown path and `FsError::Io` if
    /// the device could not be queried.
    pub fn read(&self, path: &str, size: usize, offset: u64) -> Result<Vec<u8>, FsError> {
        let index = self.channel(path)?;
        if size == 0 || offset != 0 {
            return Ok(Vec::new());
        }

        match self.device.read(index) {
            Ok(state) => Ok(vec![state.as_byte()]),
            Err(e) => {
                tracing::warn!(channel = %index, error = %e, "Relay read failed");
                Err(FsError::from(e))
            }
        }
    }

    /// Writes a channel file.
    ///
    /// The first byte selects the state: `'1'` is on, anything else off.
    /// The whole buffer is reported as written even if the device rejected
    /// the switch.
    ///
    /// # Errors
    ///
    /// Returns `FsError::NotFound` for an unknown path.
    pub fn write(&self, path: &str, data: &[u8], offset: u64) -> Result<usize, FsError> {
        let index = self.channel(path)?;
        let Some(&first) = data.first() else {
            return Ok(0);
        };
        if offset != 0 {
            return Ok(0);
        }

        self.switch_channel(index, RelayState::from_byte(first));
        Ok(data.len())
    }

    /// Switches one channel and returns what happened.
    pub fn switch_channel(&self, index: ChannelIndex, state: RelayState) -> SwitchOutcome {
        let outcome = self.device.switch(index, state);
        tracing::debug!(channel = %index, state = %state, outcome = ?outcome, "Write handled");
        outcome
    }

    /// Accepts and ignores a mode change.
    ///
    /// # Errors
    ///
    /// Never fails.
    pub fn chmod(&self, _path: &str, _mode: u32) -> Result<(), FsError> {
        Ok(())
    }

    /// Accepts and ignores an ownership change.
    ///
    /// # Errors
    ///
    /// Never fails.
    pub fn chown(&self, _path: &str, _uid: Option<u32>, _gid: Option<u32>) -> Result<(), FsError> {
        Ok(())
    }

    /// Accepts and ignores a timestamp change.
    ///
    /// # Errors
    ///
    /// Never fails.
    pub fn utimens(
        &self,
        _path: &str,
        _atime: Option<SystemTime>,
        _mtime: Option<SystemTime>,
    ) -> Result<(), FsError> {
        Ok(())
    }

    /// Accepts and ignores a truncation.
    ///
    /// # Errors
    ///
    /// Never fails.
    pub fn truncate(&self, _path: &str, _size: u64) -> Result<(), FsError> {
        Ok(())
    }
}
