// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Kernel FUSE binding.
//!
//! The kernel addresses entries by inode. The directory is flat, so inodes
//! are fixed: 1 is the root and channel index *i* is inode *i + 2*.

use std::ffi::OsStr;
use std::path::Path;
use std::time::{Duration, SystemTime};

pub use fuser::MountOption;

use fuser::{
    FileType, Filesystem, KernelConfig, ReplyAttr, ReplyData, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyOpen, ReplyWrite, Request, TimeOrNow, FUSE_ROOT_ID,
};

use crate::device::RelayDevice;
use crate::error::FsError;
use crate::fs::path::{self, PathTarget};
use crate::fs::{FileAttr, FileKind, RelayFs};
use crate::types::ChannelIndex;

/// How long the kernel may cache entries and attributes.
const TTL: Duration = Duration::from_secs(1);

/// Inode of the first channel.
const FIRST_CHANNEL_INO: u64 = FUSE_ROOT_ID + 1;

/// Returns the inode of a target.
#[must_use]
pub fn inode(target: PathTarget) -> u64 {
    match target {
        PathTarget::Root => FUSE_ROOT_ID,
        PathTarget::Channel(index) => FIRST_CHANNEL_INO + u64::from(index.value()),
    }
}

/// Returns the target of an inode, without checking the channel count.
#[must_use]
pub fn target(ino: u64) -> Option<PathTarget> {
    if ino == FUSE_ROOT_ID {
        return Some(PathTarget::Root);
    }
    let index = ino.checked_sub(FIRST_CHANNEL_INO)?;
    let index = u8::try_from(index).ok()?;
    ChannelIndex::new(index).ok().map(PathTarget::Channel)
}

fn path_of(target: PathTarget) -> String {
    match target {
        PathTarget::Root => "/".to_string(),
        PathTarget::Channel(index) => format!("/{}", path::file_name(index)),
    }
}

fn path_of_inode(ino: u64) -> Result<String, FsError> {
    target(ino).map(path_of).ok_or(FsError::NotFound)
}

fn file_type(kind: FileKind) -> FileType {
    match kind {
        FileKind::Directory => FileType::Directory,
        FileKind::RegularFile => FileType::RegularFile,
    }
}

fn to_fuse_attr(ino: u64, attr: &FileAttr) -> fuser::FileAttr {
    fuser::FileAttr {
        ino,
        size: attr.size,
        blocks: attr.size.div_ceil(512),
        atime: attr.mtime,
        mtime: attr.mtime,
        ctime: attr.ctime,
        crtime: attr.ctime,
        kind: file_type(attr.kind),
        perm: attr.perm,
        nlink: attr.nlink,
        uid: attr.uid,
        gid: attr.gid,
        rdev: 0,
        blksize: 512,
        flags: 0,
    }
}

fn to_system_time(time: Option<TimeOrNow>) -> Option<SystemTime> {
    time.map(|t| match t {
        TimeOrNow::SpecificTime(t) => t,
        TimeOrNow::Now => SystemTime::now(),
    })
}

/// Adapts a [`RelayFs`] to the `fuser` inode protocol.
#[derive(Debug)]
pub struct FuseAdapter<D> {
    fs: RelayFs<D>,
}

impl<D: RelayDevice> FuseAdapter<D> {
    /// Wraps a path-based filesystem.
    #[must_use]
    pub fn new(fs: RelayFs<D>) -> Self {
        Self { fs }
    }

    /// Returns the wrapped filesystem.
    #[must_use]
    pub fn inner(&self) -> &RelayFs<D> {
        &self.fs
    }

    fn attr(&self, ino: u64) -> Result<fuser::FileAttr, FsError> {
        let attr = self.fs.getattr(&path_of_inode(ino)?)?;
        Ok(to_fuse_attr(ino, &attr))
    }
}

impl<D: RelayDevice> Filesystem for FuseAdapter<D> {
    fn init(
        &mut self,
        _req: &Request<'_>,
        _config: &mut KernelConfig,
    ) -> Result<(), libc::c_int> {
        self.fs.init();
        Ok(())
    }

    fn destroy(&mut self) {
        self.fs.destroy();
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        if parent != FUSE_ROOT_ID {
            reply.error(libc::ENOENT);
            return;
        }
        let Some(name) = name.to_str() else {
            reply.error(libc::ENOENT);
            return;
        };

        let path = format!("/{name}");
        let result = self.fs.resolve(&path).and_then(|target| {
            let attr = self.fs.attr(target)?;
            Ok(to_fuse_attr(inode(target), &attr))
        });
        match result {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        match self.attr(ino) {
            Ok(attr) => reply.attr(&TTL, &attr),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let result = path_of_inode(ino).and_then(|path| {
            if let Some(mode) = mode {
                self.fs.chmod(&path, mode)?;
            }
            if uid.is_some() || gid.is_some() {
                self.fs.chown(&path, uid, gid)?;
            }
            if let Some(size) = size {
                self.fs.truncate(&path, size)?;
            }
            if atime.is_some() || mtime.is_some() {
                self.fs
                    .utimens(&path, to_system_time(atime), to_system_time(mtime))?;
            }
            self.attr(ino)
        });
        match result {
            Ok(attr) => reply.attr(&TTL, &attr),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let entries = match path_of_inode(ino).and_then(|path| self.fs.readdir(&path)) {
            Ok(entries) => entries,
            Err(e) => {
                reply.error(e.errno());
                return;
            }
        };

        let skip = usize::try_from(offset).unwrap_or(0);
        for (i, entry) in entries.iter().enumerate().skip(skip) {
            let next = i64::try_from(i + 1).unwrap_or(i64::MAX);
            if reply.add(inode(entry.target), next, file_type(entry.kind()), &entry.name) {
                break;
            }
        }
        reply.ok();
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        match path_of_inode(ino).and_then(|path| self.fs.open(&path)) {
            Ok(()) => reply.opened(0, 0),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let Ok(offset) = u64::try_from(offset) else {
            reply.error(libc::EINVAL);
            return;
        };
        let size = usize::try_from(size).unwrap_or(usize::MAX);
        match path_of_inode(ino).and_then(|path| self.fs.read(&path, size, offset)) {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let Ok(offset) = u64::try_from(offset) else {
            reply.error(libc::EINVAL);
            return;
        };
        match path_of_inode(ino).and_then(|path| self.fs.write(&path, data, offset)) {
            Ok(written) => reply.written(u32::try_from(written).unwrap_or(u32::MAX)),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn flush(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _lock_owner: u64,
        reply: ReplyEmpty,
    ) {
        reply.ok();
    }
}

/// Builds mount options from command-line style settings.
///
/// Common option names map onto their `fuser` variants; anything else is
/// passed through unchanged.
#[must_use]
pub fn mount_options(allow_other: bool, extra: &[String]) -> Vec<MountOption> {
    let mut options = vec![
        MountOption::FSName("relayfs".to_string()),
        MountOption::DefaultPermissions,
    ];
    if allow_other {
        options.push(MountOption::AllowOther);
    }
    options.extend(
        extra
            .iter()
            .flat_map(|opt| opt.split(','))
            .filter(|opt| !opt.is_empty())
            .map(|opt| match opt {
                "ro" => MountOption::RO,
                "rw" => MountOption::RW,
                "allow_other" => MountOption::AllowOther,
                "allow_root" => MountOption::AllowRoot,
                "auto_unmount" => MountOption::AutoUnmount,
                "default_permissions" => MountOption::DefaultPermissions,
                other => MountOption::CUSTOM(other.to_string()),
            }),
    );
    options
}

/// Mounts the filesystem and serves requests until it is unmounted.
///
/// # Errors
///
/// Returns an error if the mount fails.
pub fn mount<D: RelayDevice + 'static>(
    fs: RelayFs<D>,
    mountpoint: &Path,
    options: &[MountOption],
) -> std::io::Result<()> {
    tracing::info!(
        mountpoint = %mountpoint.display(),
        device = %fs.device().describe(),
        "Mounting relay filesystem"
    );
    fuser::mount2(FuseAdapter::new(fs), mountpoint, options)
}
