// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! relayfs - relay cards as a virtual filesystem.
//!
//! Every relay of a card appears as a one-byte file in a single directory.
//! Reading a file returns `0` or `1`; writing `1` switches the relay on and
//! anything else switches it off.
//!
//! ```text
//! $ ls /mnt/relays
//! r1  r2  r3  r4
//! $ echo 1 > /mnt/relays/r3
//! $ cat /mnt/relays/r3
//! 1
//! ```
//!
//! # Supported Cards
//!
//! - **SNMP**: Denkovi DAEnetIP2 family, up to 16 relays, SNMPv1
//! - **Serial**: UDIN USB cards (`UDIN-8R`), 8 relays, 9600 baud ASCII
//!
//! # Quick Start
//!
//! ## SNMP Card
//!
//! ```no_run
//! use relayfs::device::SnmpRelayDevice;
//! use relayfs::fs::RelayFs;
//! use relayfs::protocol::snmp::SnmpConfig;
//!
//! let config = SnmpConfig::new("192.168.1.100", "private").with_relays(8);
//! let fs = RelayFs::new(SnmpRelayDevice::new(config));
//! fs.init();
//!
//! let state = fs.read("/r1", 1, 0).unwrap();
//! println!("relay 1: {}", state[0] as char);
//! ```
//!
//! ## Serial Card
//!
//! ```no_run
//! use relayfs::device::SerialRelayDevice;
//! use relayfs::fs::RelayFs;
//! use relayfs::protocol::serial::SerialConfig;
//!
//! let fs = RelayFs::new(SerialRelayDevice::new(SerialConfig::new("/dev/ttyUSB0")));
//! fs.init();
//! fs.write("/r3", b"1", 0).unwrap();
//! ```
//!
//! # Features
//!
//! - `serial` (default): open serial ports through `serialport`
//! - `fuse`: mount through the kernel with `fuser`, see [`fs::fuse`]
//!
//! # Error Handling
//!
//! Library operations return [`Result`] with the detailed [`Error`] type.
//! The filesystem adapter reduces these to [`FsError`], which only knows
//! "not found" and "I/O error".

pub mod device;
pub mod error;
pub mod fs;
pub mod protocol;
pub mod state;
pub mod types;

pub use device::{RelayDevice, SerialRelayDevice, SnmpRelayDevice, SwitchOutcome};
pub use error::{DeviceError, Error, FsError, ParseError, ProtocolError, Result, ValueError};
pub use fs::RelayFs;
pub use protocol::serial::SerialConfig;
pub use protocol::snmp::SnmpConfig;
pub use state::{Channel, RegistryState, RelayRegistry};
pub use types::{ChannelIndex, RelayState};
