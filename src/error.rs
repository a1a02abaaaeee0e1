// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for relayfs.
//!
//! Internally every failure is described by [`Error`] and its sub-enums.
//! At the filesystem boundary all of them collapse into the two codes a
//! caller can observe, see [`FsError`].

use thiserror::Error;

/// The main error type for this library.
#[derive(Debug, Error)]
pub enum Error {
    /// Error occurred during value validation.
    #[error("value error: {0}")]
    Value(#[from] ValueError),

    /// Error occurred while talking to the device.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Error occurred while decoding a device response.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Error occurred during device setup.
    #[error("device error: {0}")]
    Device(#[from] DeviceError),

    /// The channel is not currently exposed (no device, or degraded).
    #[error("channel {0} is not available")]
    ChannelUnavailable(u8),
}

/// Errors related to value validation and constraints.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueError {
    /// A numeric value is outside the allowed range.
    #[error("value {actual} is out of range [{min}, {max}]")]
    OutOfRange {
        /// Minimum allowed value.
        min: u16,
        /// Maximum allowed value.
        max: u16,
        /// The actual value that was provided.
        actual: u16,
    },

    /// An invalid relay state string was provided.
    #[error("invalid relay state: {0}")]
    InvalidRelayState(String),
}

/// Errors related to transport communication (SNMP/serial).
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Underlying I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Opening the serial port failed.
    #[cfg(feature = "serial")]
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// The device did not answer within the wait budget.
    #[error("request timed out after {0} ms")]
    Timeout(u64),

    /// Invalid peer address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// The device echoed something other than the command that was sent.
    #[error("command echo mismatch: sent {sent:?}, got {received:?}")]
    EchoMismatch {
        /// The command that was written.
        sent: String,
        /// The line the device sent back.
        received: String,
    },

    /// The SNMP agent answered with a non-zero error-status.
    #[error("agent reported error status {status} at index {index}")]
    AgentError {
        /// SNMP error-status value.
        status: i64,
        /// SNMP error-index value.
        index: i64,
    },

    /// No connection is open.
    #[error("device is not connected")]
    NotConnected,
}

/// Errors related to decoding device responses.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The input ended before a complete element was read.
    #[error("truncated input while reading {0}")]
    Truncated(&'static str),

    /// A tag other than the expected one was found.
    #[error("unexpected tag 0x{found:02x} while reading {context} (expected 0x{expected:02x})")]
    UnexpectedTag {
        /// What was being decoded.
        context: &'static str,
        /// The expected tag byte.
        expected: u8,
        /// The tag byte actually found.
        found: u8,
    },

    /// A length field could not be decoded.
    #[error("invalid length encoding")]
    InvalidLength,

    /// An integer does not fit the target type.
    #[error("integer overflow while reading {0}")]
    IntegerOverflow(&'static str),

    /// Unexpected response format.
    #[error("unexpected response format: {0}")]
    UnexpectedFormat(String),

    /// A line from the device is not valid text.
    #[error("line is not valid ASCII: {0:?}")]
    InvalidLine(Vec<u8>),
}

/// Errors related to device setup.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The identification string does not match a known model.
    #[error("unrecognized device: {0:?}")]
    UnknownModel(String),

    /// Device configuration is invalid.
    #[error("invalid device configuration: {0}")]
    InvalidConfiguration(String),
}

/// Error codes visible at the filesystem boundary.
///
/// Path failures and unavailable channels are [`FsError::NotFound`]; failed
/// device queries are [`FsError::Io`]. Failed writes never surface here.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FsError {
    /// The path does not name the root or a currently known channel.
    #[error("no such file or directory")]
    NotFound,

    /// The device could not be queried.
    #[error("input/output error")]
    Io,
}

impl FsError {
    /// Returns the errno value for this error.
    #[must_use]
    pub const fn errno(self) -> i32 {
        match self {
            Self::NotFound => libc::ENOENT,
            Self::Io => libc::EIO,
        }
    }
}

impl From<&Error> for FsError {
    fn from(err: &Error) -> Self {
        match err {
            Error::ChannelUnavailable(_) => Self::NotFound,
            _ => Self::Io,
        }
    }
}

impl From<Error> for FsError {
    fn from(err: Error) -> Self {
        Self::from(&err)
    }
}

/// A specialized Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;
