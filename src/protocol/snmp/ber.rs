// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! BER encoding of SNMPv1 messages.
//!
//! Only the subset needed to get and set integer objects is implemented:
//! definite lengths, INTEGER, OCTET STRING, NULL, OBJECT IDENTIFIER,
//! SEQUENCE and the GetRequest/GetResponse/SetRequest PDUs. Application
//! integer types (Counter32, Gauge32, `TimeTicks`) decode as integers.

use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;

/// BER tag bytes.
pub mod tag {
    /// Universal INTEGER.
    pub const INTEGER: u8 = 0x02;
    /// Universal OCTET STRING.
    pub const OCTET_STRING: u8 = 0x04;
    /// Universal NULL.
    pub const NULL: u8 = 0x05;
    /// Universal OBJECT IDENTIFIER.
    pub const OBJECT_IDENTIFIER: u8 = 0x06;
    /// Constructed SEQUENCE.
    pub const SEQUENCE: u8 = 0x30;
    /// Application Counter32.
    pub const COUNTER32: u8 = 0x41;
    /// Application Gauge32.
    pub const GAUGE32: u8 = 0x42;
    /// Application `TimeTicks`.
    pub const TIMETICKS: u8 = 0x43;
    /// Context GetRequest-PDU.
    pub const GET_REQUEST: u8 = 0xA0;
    /// Context GetResponse-PDU.
    pub const GET_RESPONSE: u8 = 0xA2;
    /// Context SetRequest-PDU.
    pub const SET_REQUEST: u8 = 0xA3;
}

/// SNMP protocol version field for SNMPv1.
pub const VERSION_1: i64 = 0;

// ============================================================================
// Oid
// ============================================================================

/// An SNMP object identifier.
///
/// # Examples
///
/// ```
/// use relayfs::protocol::snmp::Oid;
///
/// let oid: Oid = ".1.3.6.1.4.1.19865.1.2.1.1.0".parse().unwrap();
/// assert_eq!(oid.arcs()[6], 19865);
/// assert_eq!(oid.to_string(), ".1.3.6.1.4.1.19865.1.2.1.1.0");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Oid(Vec<u32>);

impl Oid {
    /// Creates an OID from its arcs.
    ///
    /// # Errors
    ///
    /// Returns `ParseError::UnexpectedFormat` unless there are at least two
    /// arcs, the first is 0-2 and the second is below 40 when the first is
    /// 0 or 1.
    pub fn from_arcs(arcs: &[u32]) -> Result<Self, ParseError> {
        match arcs {
            [first, second, ..]
                if (*first < 2 && *second < 40) || (*first == 2 && *second <= u32::MAX - 80) =>
            {
                Ok(Self(arcs.to_vec()))
            }
            _ => Err(ParseError::UnexpectedFormat(format!(
                "invalid object identifier {arcs:?}"
            ))),
        }
    }

    /// Returns the arcs.
    #[must_use]
    pub fn arcs(&self) -> &[u32] {
        &self.0
    }

    fn encode_content(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.0.len() + 4);
        // from_arcs guarantees two leading arcs
        push_base128(&mut out, self.0[0] * 40 + self.0[1]);
        for arc in &self.0[2..] {
            push_base128(&mut out, *arc);
        }
        out
    }

    fn decode_content(content: &[u8]) -> Result<Self, ParseError> {
        let mut arcs = Vec::with_capacity(content.len() + 1);
        let mut value: u32 = 0;
        let mut in_progress = false;
        for &byte in content {
            value = value
                .checked_mul(128)
                .ok_or(ParseError::IntegerOverflow("object identifier"))?
                | u32::from(byte & 0x7f);
            in_progress = byte & 0x80 != 0;
            if !in_progress {
                if arcs.is_empty() {
                    let first = (value / 40).min(2);
                    arcs.push(first);
                    arcs.push(value - first * 40);
                } else {
                    arcs.push(value);
                }
                value = 0;
            }
        }
        if in_progress || arcs.is_empty() {
            return Err(ParseError::Truncated("object identifier"));
        }
        Ok(Self(arcs))
    }
}

impl FromStr for Oid {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let arcs = s
            .strip_prefix('.')
            .unwrap_or(s)
            .split('.')
            .map(str::parse)
            .collect::<Result<Vec<u32>, _>>()
            .map_err(|_| ParseError::UnexpectedFormat(format!("invalid object identifier {s:?}")))?;
        Self::from_arcs(&arcs)
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for arc in &self.0 {
            write!(f, ".{arc}")?;
        }
        Ok(())
    }
}

// ============================================================================
// Message
// ============================================================================

/// Value carried by a variable binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Placeholder used in get requests.
    Null,
    /// Any integer-typed value.
    Integer(i64),
    /// Any other type, kept undecoded.
    Other {
        /// The BER tag.
        tag: u8,
        /// The raw content bytes.
        content: Vec<u8>,
    },
}

impl Value {
    /// Returns the value as an integer if it has an integer type.
    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }
}

/// One `name = value` pair of a PDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarBind {
    /// The object name.
    pub oid: Oid,
    /// The object value.
    pub value: Value,
}

/// PDU types used by relayfs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PduKind {
    /// Read request.
    GetRequest,
    /// Agent response to any request.
    GetResponse,
    /// Write request.
    SetRequest,
}

impl PduKind {
    /// Returns the context tag of this PDU.
    #[must_use]
    pub const fn tag(self) -> u8 {
        match self {
            Self::GetRequest => tag::GET_REQUEST,
            Self::GetResponse => tag::GET_RESPONSE,
            Self::SetRequest => tag::SET_REQUEST,
        }
    }

    fn from_tag(found: u8) -> Result<Self, ParseError> {
        match found {
            tag::GET_REQUEST => Ok(Self::GetRequest),
            tag::GET_RESPONSE => Ok(Self::GetResponse),
            tag::SET_REQUEST => Ok(Self::SetRequest),
            _ => Err(ParseError::UnexpectedTag {
                context: "pdu",
                expected: tag::GET_RESPONSE,
                found,
            }),
        }
    }
}

/// A request or response PDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pdu {
    /// PDU type.
    pub kind: PduKind,
    /// Identifier pairing requests with responses.
    pub request_id: i32,
    /// Zero on success.
    pub error_status: i64,
    /// Index of the failing binding when `error_status` is non-zero.
    pub error_index: i64,
    /// The variable bindings.
    pub varbinds: Vec<VarBind>,
}

/// An SNMPv1 message.
///
/// # Examples
///
/// ```
/// use relayfs::protocol::snmp::{Message, Oid, PduKind};
///
/// let oid: Oid = "1.3.6.1.4.1.19865.1.2.1.1.0".parse().unwrap();
/// let request = Message::get("private", 7, oid);
/// let decoded = Message::decode(&request.encode()).unwrap();
/// assert_eq!(decoded.pdu.kind, PduKind::GetRequest);
/// assert_eq!(decoded.pdu.request_id, 7);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Protocol version, [`VERSION_1`] for everything relayfs sends.
    pub version: i64,
    /// The community string.
    pub community: Vec<u8>,
    /// The PDU.
    pub pdu: Pdu,
}

impl Message {
    /// Builds a GetRequest for one object.
    #[must_use]
    pub fn get(community: &str, request_id: i32, oid: Oid) -> Self {
        Self::request(PduKind::GetRequest, community, request_id, oid, Value::Null)
    }

    /// Builds a SetRequest writing an integer to one object.
    #[must_use]
    pub fn set(community: &str, request_id: i32, oid: Oid, value: i64) -> Self {
        Self::request(
            PduKind::SetRequest,
            community,
            request_id,
            oid,
            Value::Integer(value),
        )
    }

    /// Builds a response to `request` carrying the given bindings.
    #[must_use]
    pub fn response_to(request: &Self, error_status: i64, varbinds: Vec<VarBind>) -> Self {
        Self {
            version: request.version,
            community: request.community.clone(),
            pdu: Pdu {
                kind: PduKind::GetResponse,
                request_id: request.pdu.request_id,
                error_status,
                error_index: if error_status == 0 { 0 } else { 1 },
                varbinds,
            },
        }
    }

    fn request(kind: PduKind, community: &str, request_id: i32, oid: Oid, value: Value) -> Self {
        Self {
            version: VERSION_1,
            community: community.as_bytes().to_vec(),
            pdu: Pdu {
                kind,
                request_id,
                error_status: 0,
                error_index: 0,
                varbinds: vec![VarBind { oid, value }],
            },
        }
    }

    /// Encodes the message.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut bindings = Vec::new();
        for varbind in &self.pdu.varbinds {
            let mut binding = Vec::new();
            push_tlv(&mut binding, tag::OBJECT_IDENTIFIER, &varbind.oid.encode_content());
            match &varbind.value {
                Value::Null => push_tlv(&mut binding, tag::NULL, &[]),
                Value::Integer(v) => push_tlv(&mut binding, tag::INTEGER, &encode_integer(*v)),
                Value::Other { tag, content } => push_tlv(&mut binding, *tag, content),
            }
            push_tlv(&mut bindings, tag::SEQUENCE, &binding);
        }

        let mut pdu = Vec::new();
        push_tlv(
            &mut pdu,
            tag::INTEGER,
            &encode_integer(i64::from(self.pdu.request_id)),
        );
        push_tlv(&mut pdu, tag::INTEGER, &encode_integer(self.pdu.error_status));
        push_tlv(&mut pdu, tag::INTEGER, &encode_integer(self.pdu.error_index));
        push_tlv(&mut pdu, tag::SEQUENCE, &bindings);

        let mut body = Vec::new();
        push_tlv(&mut body, tag::INTEGER, &encode_integer(self.version));
        push_tlv(&mut body, tag::OCTET_STRING, &self.community);
        push_tlv(&mut body, self.pdu.kind.tag(), &pdu);

        let mut out = Vec::with_capacity(body.len() + 4);
        push_tlv(&mut out, tag::SEQUENCE, &body);
        out
    }

    /// Decodes a message.
    ///
    /// # Errors
    ///
    /// Returns `ParseError` if the datagram is not a well-formed SNMP message
    /// with one of the supported PDU types.
    pub fn decode(buf: &[u8]) -> Result<Self, ParseError> {
        let mut outer = Reader::new(buf);
        let mut body = Reader::new(outer.expect(tag::SEQUENCE, "message")?);

        let version = decode_integer(body.expect(tag::INTEGER, "version")?, "version")?;
        let community = body.expect(tag::OCTET_STRING, "community")?.to_vec();

        let (pdu_tag, pdu_content) = body.next_tlv("pdu")?;
        let kind = PduKind::from_tag(pdu_tag)?;
        let mut pdu = Reader::new(pdu_content);

        let request_id = decode_integer(pdu.expect(tag::INTEGER, "request-id")?, "request-id")?;
        let request_id =
            i32::try_from(request_id).map_err(|_| ParseError::IntegerOverflow("request-id"))?;
        let error_status =
            decode_integer(pdu.expect(tag::INTEGER, "error-status")?, "error-status")?;
        let error_index = decode_integer(pdu.expect(tag::INTEGER, "error-index")?, "error-index")?;

        let mut list = Reader::new(pdu.expect(tag::SEQUENCE, "varbind list")?);
        let mut varbinds = Vec::new();
        while !list.is_empty() {
            let mut binding = Reader::new(list.expect(tag::SEQUENCE, "varbind")?);
            let oid = Oid::decode_content(binding.expect(tag::OBJECT_IDENTIFIER, "varbind name")?)?;
            let (value_tag, content) = binding.next_tlv("varbind value")?;
            let value = match value_tag {
                tag::NULL => Value::Null,
                tag::INTEGER | tag::COUNTER32 | tag::GAUGE32 | tag::TIMETICKS => {
                    Value::Integer(decode_integer(content, "varbind value")?)
                }
                other => Value::Other {
                    tag: other,
                    content: content.to_vec(),
                },
            };
            varbinds.push(VarBind { oid, value });
        }

        Ok(Self {
            version,
            community,
            pdu: Pdu {
                kind,
                request_id,
                error_status,
                error_index,
                varbinds,
            },
        })
    }
}

// ============================================================================
// Primitive encoding
// ============================================================================

fn push_tlv(out: &mut Vec<u8>, tag: u8, content: &[u8]) {
    out.push(tag);
    push_length(out, content.len());
    out.extend_from_slice(content);
}

fn push_length(out: &mut Vec<u8>, len: usize) {
    if len < 0x80 {
        // fits the short form
        #[allow(clippy::cast_possible_truncation)]
        out.push(len as u8);
        return;
    }
    let bytes = len.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    let significant = &bytes[skip..];
    #[allow(clippy::cast_possible_truncation)]
    out.push(0x80 | significant.len() as u8);
    out.extend_from_slice(significant);
}

fn push_base128(out: &mut Vec<u8>, mut value: u32) {
    let mut groups = [0u8; 5];
    let mut n = 0;
    loop {
        #[allow(clippy::cast_possible_truncation)]
        let group = (value & 0x7f) as u8;
        groups[n] = group;
        n += 1;
        value >>= 7;
        if value == 0 {
            break;
        }
    }
    for i in (0..n).rev() {
        let continuation = if i == 0 { 0 } else { 0x80 };
        out.push(groups[i] | continuation);
    }
}

/// Minimal two's-complement big-endian encoding.
fn encode_integer(value: i64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let mut start = 0;
    while start < bytes.len() - 1 {
        let redundant = (bytes[start] == 0x00 && bytes[start + 1] & 0x80 == 0)
            || (bytes[start] == 0xff && bytes[start + 1] & 0x80 != 0);
        if !redundant {
            break;
        }
        start += 1;
    }
    bytes[start..].to_vec()
}

fn decode_integer(content: &[u8], context: &'static str) -> Result<i64, ParseError> {
    let (first, _) = content.split_first().ok_or(ParseError::Truncated(context))?;
    if content.len() > 8 {
        return Err(ParseError::IntegerOverflow(context));
    }
    let mut value: i64 = if first & 0x80 != 0 { -1 } else { 0 };
    for &byte in content {
        value = (value << 8) | i64::from(byte);
    }
    Ok(value)
}

// ============================================================================
// Reader
// ============================================================================

struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn next_tlv(&mut self, context: &'static str) -> Result<(u8, &'a [u8]), ParseError> {
        let (&found, rest) = self.buf.split_first().ok_or(ParseError::Truncated(context))?;
        let (len, rest) = read_length(rest, context)?;
        if rest.len() < len {
            return Err(ParseError::Truncated(context));
        }
        let (content, remaining) = rest.split_at(len);
        self.buf = remaining;
        Ok((found, content))
    }

    fn expect(&mut self, expected: u8, context: &'static str) -> Result<&'a [u8], ParseError> {
        let (found, content) = self.next_tlv(context)?;
        if found != expected {
            return Err(ParseError::UnexpectedTag {
                context,
                expected,
                found,
            });
        }
        Ok(content)
    }
}

fn read_length<'a>(buf: &'a [u8], context: &'static str) -> Result<(usize, &'a [u8]), ParseError> {
    let (&first, rest) = buf.split_first().ok_or(ParseError::Truncated(context))?;
    if first < 0x80 {
        return Ok((usize::from(first), rest));
    }
    let count = usize::from(first & 0x7f);
    // 0x80 is the indefinite form, which SNMP forbids
    if count == 0 || count > 4 {
        return Err(ParseError::InvalidLength);
    }
    if rest.len() < count {
        return Err(ParseError::Truncated(context));
    }
    let (bytes, rest) = rest.split_at(count);
    let len = bytes
        .iter()
        .fold(0usize, |len, b| (len << 8) | usize::from(*b));
    Ok((len, rest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_encoding_is_minimal() {
        assert_eq!(encode_integer(0), vec![0x00]);
        assert_eq!(encode_integer(1), vec![0x01]);
        assert_eq!(encode_integer(127), vec![0x7f]);
        assert_eq!(encode_integer(128), vec![0x00, 0x80]);
        assert_eq!(encode_integer(256), vec![0x01, 0x00]);
        assert_eq!(encode_integer(-1), vec![0xff]);
        assert_eq!(encode_integer(-128), vec![0x80]);
        assert_eq!(encode_integer(-129), vec![0xff, 0x7f]);
    }

    #[test]
    fn integer_decoding_sign_extends() {
        assert_eq!(decode_integer(&[0x80], "t").unwrap(), -128);
        assert_eq!(decode_integer(&[0x00, 0x80], "t").unwrap(), 128);
        assert_eq!(decode_integer(&[0xff, 0x7f], "t").unwrap(), -129);
        assert_eq!(
            decode_integer(&[0x00, 0xff, 0xff, 0xff, 0xff], "t").unwrap(),
            0xffff_ffff
        );
        assert!(decode_integer(&[], "t").is_err());
        assert!(decode_integer(&[1; 9], "t").is_err());
    }

    #[test]
    fn long_form_lengths() {
        let mut out = Vec::new();
        push_length(&mut out, 0x7f);
        assert_eq!(out, vec![0x7f]);

        out.clear();
        push_length(&mut out, 0x80);
        assert_eq!(out, vec![0x81, 0x80]);

        out.clear();
        push_length(&mut out, 0x1234);
        assert_eq!(out, vec![0x82, 0x12, 0x34]);

        assert_eq!(read_length(&[0x82, 0x12, 0x34], "t").unwrap().0, 0x1234);
        assert_eq!(read_length(&[0x80], "t"), Err(ParseError::InvalidLength));
        assert_eq!(read_length(&[0x82, 0x01], "t"), Err(ParseError::Truncated("t")));
    }

    #[test]
    fn oid_encoding_matches_known_bytes() {
        let oid: Oid = ".1.3.6.1.4.1.19865.1.2.1.4.0".parse().unwrap();
        assert_eq!(
            oid.encode_content(),
            vec![0x2b, 0x06, 0x01, 0x04, 0x01, 0x81, 0x9b, 0x19, 0x01, 0x02, 0x01, 0x04, 0x00]
        );
        assert_eq!(Oid::decode_content(&oid.encode_content()).unwrap(), oid);
    }

    #[test]
    fn oid_parsing_rejects_garbage() {
        assert!("".parse::<Oid>().is_err());
        assert!("1".parse::<Oid>().is_err());
        assert!("1.3.x".parse::<Oid>().is_err());
        assert!("3.1".parse::<Oid>().is_err());
        assert!("1.40".parse::<Oid>().is_err());
        assert!("2.100.3".parse::<Oid>().is_ok());
    }

    #[test]
    fn truncated_oid_is_rejected() {
        assert_eq!(
            Oid::decode_content(&[0x2b, 0x81]),
            Err(ParseError::Truncated("object identifier"))
        );
    }

    #[test]
    fn get_request_wire_format() {
        let oid: Oid = "1.3.6.1.4.1.19865.1.2.1.1.0".parse().unwrap();
        let bytes = Message::get("public", 1, oid).encode();
        let expected: Vec<u8> = [
            &[0x30, 0x2b][..],
            &[0x02, 0x01, 0x00],
            &[0x04, 0x06],
            b"public",
            &[0xa0, 0x1e],
            &[0x02, 0x01, 0x01],
            &[0x02, 0x01, 0x00],
            &[0x02, 0x01, 0x00],
            &[0x30, 0x13, 0x30, 0x11, 0x06, 0x0d],
            &[0x2b, 0x06, 0x01, 0x04, 0x01, 0x81, 0x9b, 0x19, 0x01, 0x02, 0x01, 0x01, 0x00],
            &[0x05, 0x00],
        ]
        .concat();
        assert_eq!(bytes, expected);
    }

    #[test]
    fn set_request_decodes_back() {
        let oid: Oid = "1.3.6.1.4.1.19865.1.2.2.3.0".parse().unwrap();
        let msg = Message::set("private", 4242, oid.clone(), 1);
        let decoded = Message::decode(&msg.encode()).unwrap();
        assert_eq!(decoded, msg);
        assert_eq!(decoded.pdu.varbinds[0].value.as_integer(), Some(1));
    }

    #[test]
    fn response_with_gauge_value() {
        let oid: Oid = "1.3.6.1.4.1.19865.1.2.1.1.0".parse().unwrap();
        let request = Message::get("public", 9, oid.clone());
        let mut response = Message::response_to(&request, 0, vec![]);
        response.pdu.varbinds.push(VarBind {
            oid,
            value: Value::Other {
                tag: tag::GAUGE32,
                content: vec![0x01],
            },
        });
        let decoded = Message::decode(&response.encode()).unwrap();
        assert_eq!(decoded.pdu.kind, PduKind::GetResponse);
        assert_eq!(decoded.pdu.varbinds[0].value, Value::Integer(1));
    }

    #[test]
    fn unknown_pdu_is_rejected() {
        let oid: Oid = "1.3.6.1".parse().unwrap();
        let mut bytes = Message::get("public", 1, oid).encode();
        // community is 6 bytes; PDU tag follows at offset 2 + 3 + 8
        bytes[13] = 0xa4;
        assert!(matches!(
            Message::decode(&bytes),
            Err(ParseError::UnexpectedTag { context: "pdu", found: 0xa4, .. })
        ));
    }

    #[test]
    fn truncated_message_is_rejected() {
        let oid: Oid = "1.3.6.1".parse().unwrap();
        let bytes = Message::get("public", 1, oid).encode();
        assert!(Message::decode(&bytes[..bytes.len() - 1]).is_err());
        assert!(Message::decode(&[]).is_err());
    }
}
