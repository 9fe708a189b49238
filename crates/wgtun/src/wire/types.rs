//! Driver ABI records.
//!
//! All multi-byte fields are little-endian except the socket address port,
//! which is in network order. Fields are byte arrays or `zerocopy::byteorder`
//! wrappers, so every struct has alignment 1 and its padding is spelled out.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

use zerocopy::byteorder::{BigEndian, LittleEndian, U16, U32, U64};
use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::error::{Error, Result};
use crate::key::KEY_LEN;

/// IPv4 address family in the driver ABI.
pub const AF_INET: u16 = 2;
/// IPv6 address family in the driver ABI.
pub const AF_INET6: u16 = 23;

/// Interface record flags.
pub mod interface_flags {
    pub const HAS_PUBLIC_KEY: u32 = 1 << 0;
    pub const HAS_PRIVATE_KEY: u32 = 1 << 1;
    pub const HAS_LISTEN_PORT: u32 = 1 << 2;
    pub const REPLACE_PEERS: u32 = 1 << 3;
}

/// Peer record flags.
pub mod peer_flags {
    pub const HAS_PUBLIC_KEY: u32 = 1 << 0;
    pub const HAS_PRESHARED_KEY: u32 = 1 << 1;
    pub const HAS_PERSISTENT_KEEPALIVE: u32 = 1 << 2;
    pub const HAS_ENDPOINT: u32 = 1 << 3;
    pub const REPLACE_ALLOWED_IPS: u32 = 1 << 5;
    pub const REMOVE: u32 = 1 << 6;
    pub const UPDATE: u32 = 1 << 7;
}

/// Interface header (80 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct WgInterface {
    pub flags: U32<LittleEndian>,
    pub listen_port: U16<LittleEndian>,
    pub private_key: [u8; KEY_LEN],
    pub public_key: [u8; KEY_LEN],
    _pad0: [u8; 2],
    pub peers_count: U32<LittleEndian>,
    _pad1: [u8; 4],
}

impl WgInterface {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn has(&self, flag: u32) -> bool {
        self.flags.get() & flag != 0
    }
}

/// `SOCKADDR_INET` (28 bytes).
///
/// IPv4: address at body[0..4]. IPv6: flowinfo at body[0..4], address at
/// body[4..20], scope id at body[20..24].
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct SockAddrInet {
    pub family: U16<LittleEndian>,
    pub port: U16<BigEndian>,
    pub body: [u8; 24],
}

impl SockAddrInet {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn from_socket_addr(addr: &SocketAddr) -> Self {
        let mut out = Self::new_zeroed();
        out.port = U16::new(addr.port());
        match addr {
            SocketAddr::V4(v4) => {
                out.family = U16::new(AF_INET);
                out.body[..4].copy_from_slice(&v4.ip().octets());
            }
            SocketAddr::V6(v6) => {
                out.family = U16::new(AF_INET6);
                out.body[0..4].copy_from_slice(&v6.flowinfo().to_be_bytes());
                out.body[4..20].copy_from_slice(&v6.ip().octets());
                out.body[20..24].copy_from_slice(&v6.scope_id().to_le_bytes());
            }
        }
        out
    }

    pub fn to_socket_addr(&self) -> Result<SocketAddr> {
        let port = self.port.get();
        match self.family.get() {
            AF_INET => {
                let mut octets = [0u8; 4];
                octets.copy_from_slice(&self.body[..4]);
                Ok(SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::from(octets), port)))
            }
            AF_INET6 => {
                let mut flow = [0u8; 4];
                flow.copy_from_slice(&self.body[0..4]);
                let mut octets = [0u8; 16];
                octets.copy_from_slice(&self.body[4..20]);
                let mut scope = [0u8; 4];
                scope.copy_from_slice(&self.body[20..24]);
                Ok(SocketAddr::V6(SocketAddrV6::new(
                    Ipv6Addr::from(octets),
                    port,
                    u32::from_be_bytes(flow),
                    u32::from_le_bytes(scope),
                )))
            }
            other => Err(Error::InvalidMessage(format!(
                "unknown endpoint address family {}",
                other
            ))),
        }
    }
}

/// Peer record (136 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct WgPeer {
    pub flags: U32<LittleEndian>,
    pub reserved: U32<LittleEndian>,
    pub public_key: [u8; KEY_LEN],
    pub preshared_key: [u8; KEY_LEN],
    pub persistent_keepalive: U16<LittleEndian>,
    _pad0: [u8; 2],
    pub endpoint: SockAddrInet,
    pub tx_bytes: U64<LittleEndian>,
    pub rx_bytes: U64<LittleEndian>,
    /// 100ns intervals since 1601-01-01, 0 if never.
    pub last_handshake: U64<LittleEndian>,
    pub allowed_ips_count: U32<LittleEndian>,
    _pad1: [u8; 4],
}

impl WgPeer {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn has(&self, flag: u32) -> bool {
        self.flags.get() & flag != 0
    }
}

/// Allowed IP record (24 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct WgAllowedIp {
    /// IPv4 uses the first 4 bytes.
    pub address: [u8; 16],
    pub family: U16<LittleEndian>,
    pub cidr: u8,
    _pad: [u8; 5],
}

impl WgAllowedIp {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn new(addr: IpAddr, cidr: u8) -> Self {
        let mut out = Self::new_zeroed();
        match addr {
            IpAddr::V4(v4) => {
                out.family = U16::new(AF_INET);
                out.address[..4].copy_from_slice(&v4.octets());
            }
            IpAddr::V6(v6) => {
                out.family = U16::new(AF_INET6);
                out.address.copy_from_slice(&v6.octets());
            }
        }
        out.cidr = cidr;
        out
    }

    pub fn addr(&self) -> Result<IpAddr> {
        match self.family.get() {
            AF_INET => {
                let mut octets = [0u8; 4];
                octets.copy_from_slice(&self.address[..4]);
                Ok(IpAddr::V4(Ipv4Addr::from(octets)))
            }
            AF_INET6 => Ok(IpAddr::V6(Ipv6Addr::from(self.address))),
            other => Err(Error::InvalidMessage(format!(
                "unknown allowed IP address family {}",
                other
            ))),
        }
    }
}
