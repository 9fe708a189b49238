//! Compiles a [`Config`] into the driver's binary configuration layout, and
//! decodes such a buffer back.
//!
//! The buffer is an interface header followed by `peers_count` peer records,
//! each immediately followed by its `allowed_ips_count` allowed-IP records.
//! The interface header always carries `REPLACE_PEERS` and every peer record
//! carries `REPLACE_ALLOWED_IPS`, so applying a buffer replaces whatever the
//! driver held before.

pub mod types;

use zerocopy::byteorder::{U16, U32};
use zerocopy::{FromBytes, FromZeros, IntoBytes};

use crate::config::{Config, Interface, Peer, Prefix};
use crate::error::{Error, Result};
use crate::key::Key;

pub use types::{
    AF_INET, AF_INET6, SockAddrInet, WgAllowedIp, WgInterface, WgPeer, interface_flags,
    peer_flags,
};

/// Exact number of bytes [`compile`] writes for `config`.
pub fn required_size(config: &Config) -> usize {
    WgInterface::SIZE
        + config
            .peers
            .iter()
            .map(|p| WgPeer::SIZE + p.allowed_ips.len() * WgAllowedIp::SIZE)
            .sum::<usize>()
}

/// Write the binary configuration into `buf`.
///
/// Returns the number of bytes written, which always equals
/// [`required_size`]. Fails without touching `buf` when it is too small.
pub fn compile(config: &Config, buf: &mut [u8]) -> Result<usize> {
    let required = required_size(config);
    if buf.len() < required {
        return Err(Error::BufferTooSmall {
            required,
            capacity: buf.len(),
        });
    }

    let peers_count = count(config.peers.len(), "peers")?;
    for peer in &config.peers {
        count(peer.allowed_ips.len(), "allowed IPs")?;
    }

    let mut writer = Writer { buf, pos: 0 };
    writer.put(&interface_record(&config.interface, peers_count))?;

    for peer in &config.peers {
        writer.put(&peer_record(peer)?)?;
        for prefix in &peer.allowed_ips {
            writer.put(&WgAllowedIp::new(prefix.addr(), prefix.cidr()))?;
        }
    }

    if writer.pos != required {
        return Err(Error::SizeMismatch {
            expected: required,
            written: writer.pos,
        });
    }

    tracing::trace!(bytes = required, peers = config.peers.len(), "compiled configuration");
    Ok(required)
}

/// Compile into a freshly allocated buffer of exactly the required size.
pub fn compile_to_vec(config: &Config) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; required_size(config)];
    let written = compile(config, &mut buf)?;
    buf.truncate(written);
    Ok(buf)
}

fn count(len: usize, what: &'static str) -> Result<u32> {
    u32::try_from(len).map_err(|_| Error::TooMany { what, count: len })
}

struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl Writer<'_> {
    fn put<T: IntoBytes + zerocopy::Immutable>(&mut self, record: &T) -> Result<()> {
        let bytes = record.as_bytes();
        let end = self.pos + bytes.len();
        let capacity = self.buf.len();
        let dst = self.buf.get_mut(self.pos..end).ok_or(Error::SizeMismatch {
            expected: capacity,
            written: end,
        })?;
        dst.copy_from_slice(bytes);
        self.pos = end;
        Ok(())
    }
}

fn interface_record(iface: &Interface, peers_count: u32) -> WgInterface {
    let mut rec = WgInterface::new_zeroed();
    let mut flags = interface_flags::REPLACE_PEERS;

    if let Some(key) = &iface.private_key {
        flags |= interface_flags::HAS_PRIVATE_KEY;
        rec.private_key = *key.as_bytes();
    }
    if let Some(key) = &iface.public_key {
        flags |= interface_flags::HAS_PUBLIC_KEY;
        rec.public_key = *key.as_bytes();
    }
    if let Some(port) = iface.listen_port {
        flags |= interface_flags::HAS_LISTEN_PORT;
        rec.listen_port = U16::new(port);
    }

    rec.flags = U32::new(flags);
    rec.peers_count = U32::new(peers_count);
    rec
}

fn peer_record(peer: &Peer) -> Result<WgPeer> {
    let mut rec = WgPeer::new_zeroed();
    let mut flags = peer_flags::REPLACE_ALLOWED_IPS;

    if let Some(key) = &peer.public_key {
        flags |= peer_flags::HAS_PUBLIC_KEY;
        rec.public_key = *key.as_bytes();
    }
    if let Some(key) = &peer.preshared_key {
        flags |= peer_flags::HAS_PRESHARED_KEY;
        rec.preshared_key = *key.as_bytes();
    }
    if let Some(secs) = peer.persistent_keepalive {
        flags |= peer_flags::HAS_PERSISTENT_KEEPALIVE;
        rec.persistent_keepalive = U16::new(secs);
    }
    if let Some(endpoint) = &peer.endpoint {
        flags |= peer_flags::HAS_ENDPOINT;
        rec.endpoint = SockAddrInet::from_socket_addr(endpoint);
    }

    rec.flags = U32::new(flags);
    rec.allowed_ips_count = U32::new(count(peer.allowed_ips.len(), "allowed IPs")?);
    Ok(rec)
}

/// Traffic counters the driver reports per peer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeerStats {
    pub tx_bytes: u64,
    pub rx_bytes: u64,
    /// 100ns intervals since 1601-01-01, 0 if no handshake yet.
    pub last_handshake: u64,
}

/// A decoded driver configuration.
#[derive(Debug, Clone, Default)]
pub struct Decoded {
    pub config: Config,
    /// One entry per peer, same order as `config.peers`.
    pub stats: Vec<PeerStats>,
}

/// Decode a buffer in the driver layout.
///
/// Presence of optional fields follows the record flags; fields without their
/// flag are reported as absent even if the bytes are non-zero.
pub fn decode(buf: &[u8]) -> Result<Decoded> {
    let mut rest = buf;
    let iface: WgInterface = read(&mut rest)?;

    let mut decoded = Decoded::default();
    let interface = &mut decoded.config.interface;
    if iface.has(interface_flags::HAS_PRIVATE_KEY) {
        interface.private_key = Some(Key::from_bytes(iface.private_key));
    }
    if iface.has(interface_flags::HAS_PUBLIC_KEY) {
        interface.public_key = Some(Key::from_bytes(iface.public_key));
    }
    if iface.has(interface_flags::HAS_LISTEN_PORT) {
        interface.listen_port = Some(iface.listen_port.get());
    }

    for _ in 0..iface.peers_count.get() {
        let rec: WgPeer = read(&mut rest)?;
        let mut peer = Peer::default();

        if rec.has(peer_flags::HAS_PUBLIC_KEY) {
            peer.public_key = Some(Key::from_bytes(rec.public_key));
        }
        if rec.has(peer_flags::HAS_PRESHARED_KEY) {
            peer.preshared_key = Some(Key::from_bytes(rec.preshared_key));
        }
        if rec.has(peer_flags::HAS_PERSISTENT_KEEPALIVE) {
            peer.persistent_keepalive = Some(rec.persistent_keepalive.get());
        }
        if rec.has(peer_flags::HAS_ENDPOINT) {
            peer.endpoint = Some(rec.endpoint.to_socket_addr()?);
        }

        for _ in 0..rec.allowed_ips_count.get() {
            let ip: WgAllowedIp = read(&mut rest)?;
            peer.allowed_ips.push(Prefix::new(ip.addr()?, ip.cidr)?);
        }

        decoded.stats.push(PeerStats {
            tx_bytes: rec.tx_bytes.get(),
            rx_bytes: rec.rx_bytes.get(),
            last_handshake: rec.last_handshake.get(),
        });
        decoded.config.peers.push(peer);
    }

    Ok(decoded)
}

fn read<T: FromBytes>(rest: &mut &[u8]) -> Result<T> {
    let (value, tail) = T::read_from_prefix(*rest).map_err(|_| Error::Truncated {
        expected: std::mem::size_of::<T>(),
        actual: rest.len(),
    })?;
    *rest = tail;
    Ok(value)
}
