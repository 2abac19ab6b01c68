//! STUN binding responder
//!
//! Answers binding requests on a UDP socket with the address and port the
//! request arrived from (XOR-MAPPED-ADDRESS). Holds no state and shares
//! nothing with the room registry.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::error::DecodeError;

pub const MAGIC_COOKIE: u32 = 0x2112_A442;
pub const BINDING_REQUEST: u16 = 0x0001;
pub const BINDING_SUCCESS: u16 = 0x0101;
pub const ATTR_XOR_MAPPED_ADDRESS: u16 = 0x0020;

const HEADER_LEN: usize = 20;
const FAMILY_IPV4: u8 = 0x01;
const FAMILY_IPV6: u8 = 0x02;

/// Largest datagram read
const MAX_DATAGRAM: usize = 1500;

/// STUN message class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Class {
    Request,
    Indication,
    SuccessResponse,
    ErrorResponse,
}

/// One type-length-value attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub kind: u16,
    pub value: Vec<u8>,
}

/// Decoded STUN message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StunMessage {
    pub message_type: u16,
    pub transaction_id: [u8; 12],
    pub attributes: Vec<Attribute>,
}

impl StunMessage {
    /// Decode a datagram; bytes past the declared length are ignored
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.len() < HEADER_LEN {
            return Err(DecodeError::TooShort(buf.len()));
        }
        if buf[0] & 0xC0 != 0 {
            return Err(DecodeError::NotStun);
        }
        let cookie = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        if cookie != MAGIC_COOKIE {
            return Err(DecodeError::BadCookie(cookie));
        }
        let declared = usize::from(u16::from_be_bytes([buf[2], buf[3]]));
        if buf.len() < HEADER_LEN + declared {
            return Err(DecodeError::LengthMismatch {
                declared,
                actual: buf.len() - HEADER_LEN,
            });
        }

        let message_type = u16::from_be_bytes([buf[0], buf[1]]);
        let mut transaction_id = [0u8; 12];
        transaction_id.copy_from_slice(&buf[8..HEADER_LEN]);

        let end = HEADER_LEN + declared;
        let mut attributes = Vec::new();
        let mut offset = HEADER_LEN;
        while offset < end {
            if offset + 4 > end {
                return Err(DecodeError::TruncatedAttribute(offset));
            }
            let kind = u16::from_be_bytes([buf[offset], buf[offset + 1]]);
            let len = usize::from(u16::from_be_bytes([buf[offset + 2], buf[offset + 3]]));
            let start = offset + 4;
            if start + len > end {
                return Err(DecodeError::TruncatedAttribute(offset));
            }
            attributes.push(Attribute {
                kind,
                value: buf[start..start + len].to_vec(),
            });
            // Values are padded to a 4-byte boundary
            offset = start + len.next_multiple_of(4);
        }

        Ok(Self {
            message_type,
            transaction_id,
            attributes,
        })
    }

    /// Method number, with the class bits removed
    pub fn method(&self) -> u16 {
        let t = self.message_type;
        (t & 0x000F) | ((t & 0x00E0) >> 1) | ((t & 0x3E00) >> 2)
    }

    pub fn class(&self) -> Class {
        match ((self.message_type >> 7) & 0x2) | ((self.message_type >> 4) & 0x1) {
            0 => Class::Request,
            1 => Class::Indication,
            2 => Class::SuccessResponse,
            _ => Class::ErrorResponse,
        }
    }

    pub fn is_binding_request(&self) -> bool {
        self.method() == BINDING_REQUEST && self.class() == Class::Request
    }

    /// Reflected address carried by a binding response
    pub fn xor_mapped_address(&self) -> Option<SocketAddr> {
        self.attributes
            .iter()
            .find(|a| a.kind == ATTR_XOR_MAPPED_ADDRESS)
            .and_then(|a| decode_xor_address(&a.value, &self.transaction_id))
    }
}

/// Encode a binding success response reporting `addr`
pub fn encode_binding_success(transaction_id: &[u8; 12], addr: SocketAddr) -> Vec<u8> {
    let value = encode_xor_address(addr, transaction_id);
    let body_len = 4 + value.len();

    let mut out = Vec::with_capacity(HEADER_LEN + body_len);
    out.extend_from_slice(&BINDING_SUCCESS.to_be_bytes());
    out.extend_from_slice(&(body_len as u16).to_be_bytes());
    out.extend_from_slice(&MAGIC_COOKIE.to_be_bytes());
    out.extend_from_slice(transaction_id);
    out.extend_from_slice(&ATTR_XOR_MAPPED_ADDRESS.to_be_bytes());
    out.extend_from_slice(&(value.len() as u16).to_be_bytes());
    out.extend_from_slice(&value);
    out
}

/// IPv4 peers seen through a dual-stack socket are reported as IPv4
fn unmap(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map_or(IpAddr::V6(v6), IpAddr::V4),
        v4 => v4,
    }
}

fn xor_key(transaction_id: &[u8; 12]) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..4].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
    key[4..].copy_from_slice(transaction_id);
    key
}

fn encode_xor_address(addr: SocketAddr, transaction_id: &[u8; 12]) -> Vec<u8> {
    let key = xor_key(transaction_id);
    let port = addr.port() ^ (MAGIC_COOKIE >> 16) as u16;

    let (family, octets): (u8, Vec<u8>) = match unmap(addr.ip()) {
        IpAddr::V4(v4) => (FAMILY_IPV4, v4.octets().to_vec()),
        IpAddr::V6(v6) => (FAMILY_IPV6, v6.octets().to_vec()),
    };

    let mut value = vec![0, family];
    value.extend_from_slice(&port.to_be_bytes());
    value.extend(octets.iter().zip(key.iter()).map(|(b, k)| b ^ k));
    value
}

fn decode_xor_address(value: &[u8], transaction_id: &[u8; 12]) -> Option<SocketAddr> {
    if value.len() < 8 {
        return None;
    }
    let key = xor_key(transaction_id);
    let port = u16::from_be_bytes([value[2], value[3]]) ^ (MAGIC_COOKIE >> 16) as u16;

    let ip = match value[1] {
        FAMILY_IPV4 => {
            let mut octets = [0u8; 4];
            for (i, o) in octets.iter_mut().enumerate() {
                *o = value[4 + i] ^ key[i];
            }
            IpAddr::V4(Ipv4Addr::from(octets))
        }
        FAMILY_IPV6 if value.len() >= 20 => {
            let mut octets = [0u8; 16];
            for (i, o) in octets.iter_mut().enumerate() {
                *o = value[4 + i] ^ key[i];
            }
            IpAddr::V6(Ipv6Addr::from(octets))
        }
        _ => return None,
    };
    Some(SocketAddr::new(ip, port))
}

/// Reply for one datagram, if it deserves one
pub fn respond(datagram: &[u8], from: SocketAddr) -> Option<Vec<u8>> {
    let msg = match StunMessage::decode(datagram) {
        Ok(msg) => msg,
        Err(e) => {
            warn!("[stun] not a STUN packet from {}: {}", from, e);
            return None;
        }
    };

    if msg.is_binding_request() {
        Some(encode_binding_success(&msg.transaction_id, from))
    } else {
        info!(
            "[stun] ignored message from {}: method={:#05x} class={:?}",
            from,
            msg.method(),
            msg.class()
        );
        None
    }
}

/// Serve binding requests on `socket` forever
pub async fn run(socket: UdpSocket) {
    let mut buf = [0u8; MAX_DATAGRAM];
    loop {
        let (n, from) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                warn!("[stun] read error: {}", e);
                continue;
            }
        };

        let Some(reply) = respond(&buf[..n], from) else {
            continue;
        };
        match socket.send_to(&reply, from).await {
            Ok(_) => debug!("[stun] replied to {}", from),
            Err(e) => warn!("[stun] response write to {} failed: {}", from, e),
        }
    }
}
