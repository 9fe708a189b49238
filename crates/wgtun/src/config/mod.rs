//! In-memory tunnel configuration model.
//!
//! A [`Config`] is one [`Interface`] plus an ordered list of [`Peer`]s. It is
//! produced by [`Config::parse`] from the INI-style text format, or built
//! directly:
//!
//! ```
//! use wgtun::config::{Config, Interface, Peer};
//! use wgtun::key::Key;
//!
//! let peer_key = Key::from_bytes([1u8; 32]);
//! let config = Config::new(
//!     Interface::new()
//!         .private_key(Key::generate_private())
//!         .listen_port(51820)
//!         .address("10.0.0.2/32".parse().unwrap()),
//! )
//! .peer(
//!     Peer::new(peer_key)
//!         .endpoint("192.0.2.1:51820".parse().unwrap())
//!         .allowed_ip("0.0.0.0/0".parse().unwrap())
//!         .persistent_keepalive(25),
//! );
//! assert_eq!(config.peers.len(), 1);
//! ```
//!
//! Presence of every optional field is explicit: an absent `ListenPort` is
//! `None`, which is different from `Some(0)`.

mod parse;

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::key::Key;

/// An address with prefix length, e.g. `10.0.0.0/8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Prefix {
    addr: IpAddr,
    cidr: u8,
}

impl Prefix {
    /// Create a prefix, rejecting lengths beyond the family's width.
    pub fn new(addr: IpAddr, cidr: u8) -> Result<Self> {
        let max = match addr {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        if cidr > max {
            return Err(Error::InvalidPrefix(format!(
                "prefix length {} exceeds {} for {}",
                cidr, max, addr
            )));
        }
        Ok(Self { addr, cidr })
    }

    /// Host prefix (/32 or /128) for a single address.
    pub fn host(addr: IpAddr) -> Self {
        let cidr = if addr.is_ipv4() { 32 } else { 128 };
        Self { addr, cidr }
    }

    /// The address part.
    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    /// The prefix length.
    pub fn cidr(&self) -> u8 {
        self.cidr
    }

    /// Whether this is an IPv4 prefix.
    pub fn is_ipv4(&self) -> bool {
        self.addr.is_ipv4()
    }
}

impl FromStr for Prefix {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (addr, len) = s
            .split_once('/')
            .ok_or_else(|| Error::InvalidPrefix(format!("missing prefix length in '{}'", s)))?;

        let addr: IpAddr = addr
            .parse()
            .map_err(|_| Error::InvalidPrefix(format!("invalid address '{}'", addr)))?;
        let cidr: u8 = len
            .parse()
            .map_err(|_| Error::InvalidPrefix(format!("invalid prefix length '{}'", len)))?;

        Self::new(addr, cidr)
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.cidr)
    }
}

/// The `[Interface]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Interface {
    /// Local private key.
    pub private_key: Option<Key>,
    /// Local public key.
    pub public_key: Option<Key>,
    /// UDP listen port.
    pub listen_port: Option<u16>,
    /// Addresses to assign to the adapter, in document order.
    pub addresses: Vec<Prefix>,
}

impl Interface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn private_key(mut self, key: Key) -> Self {
        self.private_key = Some(key);
        self
    }

    pub fn public_key(mut self, key: Key) -> Self {
        self.public_key = Some(key);
        self
    }

    pub fn listen_port(mut self, port: u16) -> Self {
        self.listen_port = Some(port);
        self
    }

    pub fn address(mut self, prefix: Prefix) -> Self {
        self.addresses.push(prefix);
        self
    }
}

/// One `[Peer]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Peer {
    /// Peer's public key.
    pub public_key: Option<Key>,
    /// Optional preshared key.
    pub preshared_key: Option<Key>,
    /// Keepalive interval in seconds.
    pub persistent_keepalive: Option<u16>,
    /// Remote endpoint.
    pub endpoint: Option<SocketAddr>,
    /// Networks routed to this peer, in document order.
    pub allowed_ips: Vec<Prefix>,
}

impl Peer {
    /// Create a peer identified by its public key.
    pub fn new(public_key: Key) -> Self {
        Self {
            public_key: Some(public_key),
            ..Default::default()
        }
    }

    pub fn preshared_key(mut self, key: Key) -> Self {
        self.preshared_key = Some(key);
        self
    }

    pub fn persistent_keepalive(mut self, secs: u16) -> Self {
        self.persistent_keepalive = Some(secs);
        self
    }

    pub fn endpoint(mut self, endpoint: SocketAddr) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    pub fn allowed_ip(mut self, prefix: Prefix) -> Self {
        self.allowed_ips.push(prefix);
        self
    }
}

/// A complete tunnel configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub interface: Interface,
    /// Peers in document order. Duplicates are kept.
    pub peers: Vec<Peer>,
}

impl Config {
    pub fn new(interface: Interface) -> Self {
        Self {
            interface,
            peers: Vec::new(),
        }
    }

    pub fn peer(mut self, peer: Peer) -> Self {
        self.peers.push(peer);
        self
    }

    /// Parse the INI-style tunnel document.
    ///
    /// Any malformed value fails the whole parse; no partial model is returned.
    pub fn parse(text: &str) -> Result<Self> {
        parse::parse(text)
    }

    /// All peers' allowed prefixes, in order.
    pub fn routes(&self) -> impl Iterator<Item = &Prefix> {
        self.peers.iter().flat_map(|p| p.allowed_ips.iter())
    }
}

impl FromStr for Config {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, key: &str, prefixes: &[Prefix]) -> fmt::Result {
    if prefixes.is_empty() {
        return Ok(());
    }
    let joined: Vec<String> = prefixes.iter().map(|p| p.to_string()).collect();
    writeln!(f, "{} = {}", key, joined.join(", "))
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let iface = &self.interface;
        writeln!(f, "[Interface]")?;
        if let Some(key) = &iface.private_key {
            writeln!(f, "PrivateKey = {}", key)?;
        }
        if let Some(key) = &iface.public_key {
            writeln!(f, "PublicKey = {}", key)?;
        }
        if let Some(port) = iface.listen_port {
            writeln!(f, "ListenPort = {}", port)?;
        }
        write_list(f, "Address", &iface.addresses)?;

        for peer in &self.peers {
            writeln!(f)?;
            writeln!(f, "[Peer]")?;
            if let Some(key) = &peer.public_key {
                writeln!(f, "PublicKey = {}", key)?;
            }
            if let Some(key) = &peer.preshared_key {
                writeln!(f, "PresharedKey = {}", key)?;
            }
            if let Some(endpoint) = &peer.endpoint {
                writeln!(f, "Endpoint = {}", endpoint)?;
            }
            write_list(f, "AllowedIPs", &peer.allowed_ips)?;
            if let Some(secs) = peer.persistent_keepalive {
                writeln!(f, "PersistentKeepalive = {}", secs)?;
            }
        }
        Ok(())
    }
}
