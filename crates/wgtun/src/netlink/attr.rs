//! Netlink attribute (rtattr) parsing.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use winnow::binary::le_u16;
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::token::take;

/// Result type for winnow parsers.
pub type PResult<T> = core::result::Result<T, ErrMode<ContextError>>;

/// Netlink attribute alignment.
pub const NLA_ALIGNTO: usize = 4;

/// Size of the attribute header.
pub const NLA_HDRLEN: usize = 4;

/// Attribute type flags live in the top two bits.
pub const NLA_TYPE_MASK: u16 = 0x3FFF;

#[inline]
pub const fn nla_align(len: usize) -> usize {
    (len + NLA_ALIGNTO - 1) & !(NLA_ALIGNTO - 1)
}

/// Parse one attribute, returning its type (flags masked off) and payload.
///
/// Consumes the trailing alignment padding when present.
pub fn parse_attr<'a>(input: &mut &'a [u8]) -> PResult<(u16, &'a [u8])> {
    let len = le_u16.parse_next(input)? as usize;
    let attr_type = le_u16.parse_next(input)?;

    if len < NLA_HDRLEN {
        return Err(ErrMode::Cut(ContextError::new()));
    }

    let payload: &[u8] = take(len - NLA_HDRLEN).parse_next(input)?;

    let padding = nla_align(len) - len;
    if input.len() >= padding {
        let _: &[u8] = take(padding).parse_next(input)?;
    }

    Ok((attr_type & NLA_TYPE_MASK, payload))
}

/// Parse all attributes until the input is exhausted.
///
/// A truncated trailing attribute ends the list rather than failing it.
pub fn parse_attrs<'a>(input: &mut &'a [u8]) -> PResult<Vec<(u16, &'a [u8])>> {
    let mut attrs = Vec::new();
    while input.len() >= NLA_HDRLEN {
        match parse_attr(input) {
            Ok(attr) => attrs.push(attr),
            Err(_) => break,
        }
    }
    Ok(attrs)
}

/// Read an address attribute for the given kernel address family.
pub fn ip_addr(data: &[u8], family: u8) -> Option<IpAddr> {
    match (family as i32, data.len()) {
        (libc::AF_INET, 4..) => {
            let octets: [u8; 4] = data[..4].try_into().ok()?;
            Some(IpAddr::V4(Ipv4Addr::from(octets)))
        }
        (libc::AF_INET6, 16..) => {
            let octets: [u8; 16] = data[..16].try_into().ok()?;
            Some(IpAddr::V6(Ipv6Addr::from(octets)))
        }
        _ => None,
    }
}

/// Raw bytes of an address for use as an attribute payload.
pub fn ip_bytes(addr: &IpAddr) -> Vec<u8> {
    match addr {
        IpAddr::V4(v4) => v4.octets().to_vec(),
        IpAddr::V6(v6) => v6.octets().to_vec(),
    }
}

/// Kernel address family of an address.
pub fn family_of(addr: &IpAddr) -> u8 {
    match addr {
        IpAddr::V4(_) => libc::AF_INET as u8,
        IpAddr::V6(_) => libc::AF_INET6 as u8,
    }
}

pub fn u32_ne(data: &[u8]) -> Option<u32> {
    Some(u32::from_ne_bytes(data.get(..4)?.try_into().ok()?))
}
