// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Blocking SNMPv1 session over UDP.

use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use crate::error::{ParseError, ProtocolError, Result};
use crate::protocol::snmp::ber::{Message, Oid, Pdu, PduKind};
use crate::protocol::snmp::SnmpConfig;

const MAX_DATAGRAM: usize = 65_507;

/// An open SNMP session with one agent.
///
/// Every call sends one request and waits for the matching response,
/// retransmitting on timeout. The session is not shareable; callers
/// serialise access to it.
#[derive(Debug)]
pub struct SnmpSession {
    socket: UdpSocket,
    peer: SocketAddr,
    community: String,
    timeout: Duration,
    retries: u32,
    next_request_id: i32,
}

impl SnmpSession {
    /// Opens a session to the configured agent.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` if the peer cannot be resolved or the local
    /// socket cannot be created.
    pub fn open(config: &SnmpConfig) -> std::result::Result<Self, ProtocolError> {
        let peer = config.peer_addr()?;
        let local: SocketAddr = if peer.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = UdpSocket::bind(local)?;
        socket.connect(peer)?;

        tracing::debug!(peer = %peer, "Opened SNMP session");

        Ok(Self {
            socket,
            peer,
            community: config.community().to_string(),
            timeout: config.timeout(),
            retries: config.retries(),
            next_request_id: 1,
        })
    }

    /// Returns the agent address.
    #[must_use]
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Reads an integer object.
    ///
    /// # Errors
    ///
    /// Returns an error on timeout, socket failure, a non-zero error-status
    /// or a response without an integer value.
    pub fn get(&mut self, oid: &Oid) -> Result<i64> {
        let request_id = self.take_request_id();
        let pdu = self.exchange(&Message::get(&self.community, request_id, oid.clone()))?;
        pdu.varbinds
            .first()
            .and_then(|vb| vb.value.as_integer())
            .ok_or_else(|| {
                ParseError::UnexpectedFormat(format!("no integer value for {oid}")).into()
            })
    }

    /// Writes an integer object.
    ///
    /// # Errors
    ///
    /// Returns an error on timeout, socket failure or a non-zero error-status.
    pub fn set(&mut self, oid: &Oid, value: i64) -> Result<()> {
        let request_id = self.take_request_id();
        self.exchange(&Message::set(
            &self.community,
            request_id,
            oid.clone(),
            value,
        ))?;
        Ok(())
    }

    fn take_request_id(&mut self) -> i32 {
        let id = self.next_request_id;
        self.next_request_id = if id == i32::MAX { 1 } else { id + 1 };
        id
    }

    fn exchange(&mut self, request: &Message) -> Result<Pdu> {
        let bytes = request.encode();
        let request_id = request.pdu.request_id;
        let mut buf = vec![0u8; MAX_DATAGRAM];

        for attempt in 0..=self.retries {
            if attempt > 0 {
                tracing::debug!(request_id, attempt, "Retransmitting SNMP request");
            }
            self.socket.send(&bytes).map_err(ProtocolError::from)?;

            let deadline = Instant::now() + self.timeout;
            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }
                self.socket
                    .set_read_timeout(Some(remaining))
                    .map_err(ProtocolError::from)?;

                let len = match self.socket.recv(&mut buf) {
                    Ok(len) => len,
                    Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                        break;
                    }
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => return Err(ProtocolError::from(e).into()),
                };

                match Message::decode(&buf[..len]) {
                    Ok(response) if answers(request, &response) => {
                        return check_status(response.pdu);
                    }
                    Ok(other) => {
                        tracing::trace!(
                            request_id = other.pdu.request_id,
                            expected = request_id,
                            "Discarding unrelated SNMP datagram"
                        );
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "Discarding malformed SNMP datagram");
                    }
                }
            }
        }

        let total = self.timeout * (self.retries + 1);
        Err(ProtocolError::Timeout(u64::try_from(total.as_millis()).unwrap_or(u64::MAX)).into())
    }
}

/// Whether `response` belongs to `request`: same request id and community,
/// and, unless it reports an error, the same first object.
fn answers(request: &Message, response: &Message) -> bool {
    let oid = |message: &Message| message.pdu.varbinds.first().map(|vb| vb.oid.clone());
    response.pdu.kind == PduKind::GetResponse
        && response.pdu.request_id == request.pdu.request_id
        && response.community == request.community
        && (response.pdu.error_status != 0 || oid(response) == oid(request))
}

fn check_status(pdu: Pdu) -> Result<Pdu> {
    if pdu.error_status != 0 {
        return Err(ProtocolError::AgentError {
            status: pdu.error_status,
            index: pdu.error_index,
        }
        .into());
    }
    Ok(pdu)
}
