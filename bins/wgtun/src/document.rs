//! Offline commands on tunnel documents and compiled buffers.

use std::fmt::Write as _;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use wgtun::{Config, Result, wire};

fn load(path: &Path) -> Result<Config> {
    let text = fs::read_to_string(path)?;
    Config::parse(&text)
}

pub fn check(path: &Path) -> Result<()> {
    let config = load(path)?;
    let allowed: usize = config.peers.iter().map(|p| p.allowed_ips.len()).sum();

    println!(
        "{}: {} address(es), {} peer(s), {} allowed prefix(es), {} bytes compiled",
        path.display(),
        config.interface.addresses.len(),
        config.peers.len(),
        allowed,
        wire::required_size(&config),
    );
    Ok(())
}

pub fn compile(path: &Path, output: Option<&Path>, hex: bool) -> Result<()> {
    let config = load(path)?;
    let buf = wire::compile_to_vec(&config)?;

    let bytes = if hex {
        let mut text = String::with_capacity(buf.len() * 2 + 1);
        for b in &buf {
            let _ = write!(text, "{:02x}", b);
        }
        text.push('\n');
        text.into_bytes()
    } else {
        buf
    };

    match output {
        Some(out) => fs::write(out, &bytes)?,
        None => io::stdout().write_all(&bytes)?,
    }
    Ok(())
}

pub fn decode(path: &Path) -> Result<()> {
    let buf = fs::read(path)?;
    let decoded = wire::decode(&buf)?;

    print!("{}", decoded.config);
    for (i, stats) in decoded.stats.iter().enumerate() {
        if stats.tx_bytes > 0 || stats.rx_bytes > 0 || stats.last_handshake > 0 {
            println!(
                "# peer {}: rx {} B, tx {} B, last handshake {}",
                i, stats.rx_bytes, stats.tx_bytes, stats.last_handshake
            );
        }
    }
    Ok(())
}

pub fn show(path: &Path) -> Result<()> {
    let config = load(path)?;
    print!("{}", config);
    Ok(())
}
