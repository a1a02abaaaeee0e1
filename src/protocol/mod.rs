// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device transports.
//!
//! Each transport owns one connection and performs a single exchange per
//! call, blocking the caller until the device answers or the transport's
//! own wait budget runs out.
//!
//! - [`snmp`]: SNMPv1 over UDP for network relay cards
//! - [`serial`]: line-oriented ASCII for UDIN USB relay cards

pub mod serial;
pub mod snmp;
