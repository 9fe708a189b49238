//! Line-oriented parser for the INI-style tunnel document.

use std::net::{IpAddr, SocketAddr};

use super::{Config, Interface, Peer, Prefix};
use crate::error::{Error, Result};
use crate::key::Key;

/// Section currently being consumed.
enum Section {
    /// Before the first header.
    None,
    Interface,
    Peer(Peer),
    /// Unrecognized section name; its lines are skipped.
    Other,
}

pub(super) fn parse(text: &str) -> Result<Config> {
    let mut config = Config::default();
    let mut section = Section::None;

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();

        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if line.len() >= 2 && line.starts_with('[') && line.ends_with(']') {
            finish(&mut config, std::mem::replace(&mut section, Section::None));
            section = match &line[1..line.len() - 1] {
                "Interface" => Section::Interface,
                "Peer" => Section::Peer(Peer::default()),
                other => {
                    tracing::debug!(section = other, line = line_no, "skipping unknown section");
                    Section::Other
                }
            };
            continue;
        }

        let (key, value) = match line.split_once('=') {
            Some((k, v)) => (k.trim(), v.trim()),
            None => {
                tracing::debug!(line = line_no, "skipping line without '='");
                continue;
            }
        };

        match &mut section {
            Section::Interface => interface_key(&mut config.interface, key, value, line_no)?,
            Section::Peer(peer) => peer_key(peer, key, value, line_no)?,
            Section::None | Section::Other => {}
        }
    }

    finish(&mut config, section);
    Ok(config)
}

fn finish(config: &mut Config, section: Section) {
    if let Section::Peer(peer) = section {
        config.peers.push(peer);
    }
}

fn interface_key(iface: &mut Interface, key: &str, value: &str, line: usize) -> Result<()> {
    match key {
        "PrivateKey" => iface.private_key = Some(parse_key(value, line)?),
        "PublicKey" => iface.public_key = Some(parse_key(value, line)?),
        "ListenPort" => iface.listen_port = Some(parse_u16(key, value, line)?),
        "Address" => iface.addresses.extend(parse_prefix_list(value, line)?),
        _ => tracing::trace!(key, line, "ignoring unknown interface key"),
    }
    Ok(())
}

fn peer_key(peer: &mut Peer, key: &str, value: &str, line: usize) -> Result<()> {
    match key {
        "PublicKey" => peer.public_key = Some(parse_key(value, line)?),
        "PresharedKey" => peer.preshared_key = Some(parse_key(value, line)?),
        "PersistentKeepalive" => peer.persistent_keepalive = Some(parse_u16(key, value, line)?),
        "Endpoint" => peer.endpoint = Some(parse_endpoint(value, line)?),
        "AllowedIPs" => peer.allowed_ips.extend(parse_prefix_list(value, line)?),
        _ => tracing::trace!(key, line, "ignoring unknown peer key"),
    }
    Ok(())
}

fn parse_key(value: &str, line: usize) -> Result<Key> {
    if value.is_empty() {
        return Err(Error::parse(line, "empty key"));
    }
    Key::from_base64(value).map_err(|e| Error::parse(line, e.to_string()))
}

fn parse_u16(key: &str, value: &str, line: usize) -> Result<u16> {
    value
        .parse()
        .map_err(|_| Error::parse(line, format!("invalid {} '{}'", key, value)))
}

fn parse_prefix_list(value: &str, line: usize) -> Result<Vec<Prefix>> {
    if value.is_empty() {
        return Ok(Vec::new());
    }
    let mut items: Vec<&str> = value.split(',').collect();
    // A single trailing separator ends the list.
    if items.len() > 1 && items.last() == Some(&"") {
        items.pop();
    }

    items
        .into_iter()
        .map(|item| {
            item.parse::<Prefix>().map_err(|e| match e {
                Error::InvalidPrefix(msg) => Error::parse(line, msg),
                other => Error::parse(line, other.to_string()),
            })
        })
        .collect()
}

/// `ip:port` or `[ipv6]:port`.
fn parse_endpoint(value: &str, line: usize) -> Result<SocketAddr> {
    let bad = || Error::parse(line, format!("invalid endpoint '{}'", value));

    let (host, port) = if let Some(rest) = value.strip_prefix('[') {
        let (host, rest) = rest.split_once(']').ok_or_else(bad)?;
        let port = rest.strip_prefix(':').ok_or_else(bad)?;
        (host, port)
    } else {
        value.rsplit_once(':').ok_or_else(bad)?
    };

    let addr: IpAddr = host.parse().map_err(|_| bad())?;
    let port: u16 = port.parse().map_err(|_| bad())?;
    Ok(SocketAddr::new(addr, port))
}
