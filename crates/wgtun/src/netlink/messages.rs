//! Route-family message headers and the parsed messages built from them.

use std::net::IpAddr;

use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::token::take;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::attr::{PResult, ip_addr, parse_attrs, u32_ne};
use crate::error::{Error, Result};

/// Interface address message (struct ifaddrmsg).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct IfAddrMsg {
    pub ifa_family: u8,
    pub ifa_prefixlen: u8,
    pub ifa_flags: u8,
    pub ifa_scope: u8,
    pub ifa_index: u32,
}

/// Route message (struct rtmsg).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct RtMsg {
    pub rtm_family: u8,
    pub rtm_dst_len: u8,
    pub rtm_src_len: u8,
    pub rtm_tos: u8,
    pub rtm_table: u8,
    pub rtm_protocol: u8,
    pub rtm_scope: u8,
    pub rtm_type: u8,
    pub rtm_flags: u32,
}

/// Interface info message (struct ifinfomsg).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct IfInfoMsg {
    pub ifi_family: u8,
    pub __ifi_pad: u8,
    pub ifi_type: u16,
    pub ifi_index: i32,
    pub ifi_flags: u32,
    pub ifi_change: u32,
}

/// Address attributes (IFA_*).
pub mod ifa {
    pub const ADDRESS: u16 = 1;
    pub const LOCAL: u16 = 2;
    pub const FLAGS: u16 = 8;
}

/// Route attributes (RTA_*).
pub mod rta {
    pub const DST: u16 = 1;
    pub const OIF: u16 = 4;
    pub const GATEWAY: u16 = 5;
    pub const PRIORITY: u16 = 6;
    pub const TABLE: u16 = 15;
}

/// Link attributes (IFLA_*).
pub mod ifla {
    pub const IFNAME: u16 = 3;
    pub const OPERSTATE: u16 = 16;
}

/// Routing tables.
pub const RT_TABLE_MAIN: u8 = 254;
/// Route protocol for administratively added routes.
pub const RTPROT_STATIC: u8 = 4;
pub const RT_SCOPE_UNIVERSE: u8 = 0;
pub const RT_SCOPE_LINK: u8 = 253;
pub const RTN_UNICAST: u8 = 1;
/// Address flag for addresses with infinite lifetime.
pub const IFA_F_PERMANENT: u8 = 0x80;

/// Parse the fixed header of type `T` off the front of `input`.
fn header<T: FromBytes>(input: &mut &[u8]) -> PResult<T> {
    let bytes: &[u8] = take(std::mem::size_of::<T>()).parse_next(input)?;
    T::read_from_bytes(bytes).map_err(|_| ErrMode::Cut(ContextError::new()))
}

/// Run a winnow parser over a whole message payload.
pub fn parse_payload<T>(payload: &[u8], parser: fn(&mut &[u8]) -> PResult<T>) -> Result<T> {
    let mut input = payload;
    parser(&mut input).map_err(|e| Error::InvalidMessage(format!("{:?}", e)))
}

/// A parsed RTM_NEWADDR.
#[derive(Debug, Clone)]
pub struct AddressMessage {
    pub header: IfAddrMsg,
    /// IFA_LOCAL when present, else IFA_ADDRESS.
    pub address: Option<IpAddr>,
}

impl AddressMessage {
    pub fn parse(input: &mut &[u8]) -> PResult<Self> {
        let header: IfAddrMsg = header(input)?;
        let mut local = None;
        let mut address = None;

        for (ty, data) in parse_attrs(input)? {
            match ty {
                ifa::LOCAL => local = ip_addr(data, header.ifa_family),
                ifa::ADDRESS => address = ip_addr(data, header.ifa_family),
                _ => {}
            }
        }

        Ok(Self {
            header,
            address: local.or(address),
        })
    }
}

/// A parsed RTM_NEWROUTE.
#[derive(Debug, Clone)]
pub struct RouteMessage {
    pub header: RtMsg,
    pub destination: Option<IpAddr>,
    pub oif: Option<u32>,
    pub gateway: Option<IpAddr>,
    pub priority: Option<u32>,
    pub table: u32,
}

impl RouteMessage {
    pub fn parse(input: &mut &[u8]) -> PResult<Self> {
        let header: RtMsg = header(input)?;
        let mut msg = Self {
            header,
            destination: None,
            oif: None,
            gateway: None,
            priority: None,
            table: header.rtm_table as u32,
        };

        for (ty, data) in parse_attrs(input)? {
            match ty {
                rta::DST => msg.destination = ip_addr(data, header.rtm_family),
                rta::OIF => msg.oif = u32_ne(data),
                rta::GATEWAY => msg.gateway = ip_addr(data, header.rtm_family),
                rta::PRIORITY => msg.priority = u32_ne(data),
                rta::TABLE => {
                    if let Some(table) = u32_ne(data) {
                        msg.table = table;
                    }
                }
                _ => {}
            }
        }

        Ok(msg)
    }
}

/// A parsed RTM_NEWLINK / RTM_DELLINK.
#[derive(Debug, Clone)]
pub struct LinkMessage {
    pub header: IfInfoMsg,
    pub name: Option<String>,
    /// Raw IF_OPER_* value.
    pub operstate: Option<u8>,
}

impl LinkMessage {
    pub fn parse(input: &mut &[u8]) -> PResult<Self> {
        let header: IfInfoMsg = header(input)?;
        let mut msg = Self {
            header,
            name: None,
            operstate: None,
        };

        for (ty, data) in parse_attrs(input)? {
            match ty {
                ifla::IFNAME => {
                    let end = data.iter().position(|b| *b == 0).unwrap_or(data.len());
                    msg.name = Some(String::from_utf8_lossy(&data[..end]).into_owned());
                }
                ifla::OPERSTATE => msg.operstate = data.first().copied(),
                _ => {}
            }
        }

        Ok(msg)
    }

    pub fn index(&self) -> u32 {
        self.header.ifi_index as u32
    }
}
