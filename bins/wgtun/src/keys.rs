//! Key generation commands.

use std::io::{self, Read};

use wgtun::{Key, Result};

/// Generate a new private key.
pub fn genkey() -> Result<()> {
    println!("{}", Key::generate_private());
    Ok(())
}

/// Derive public key from private key read from stdin.
pub fn pubkey() -> Result<()> {
    let mut input = String::new();
    io::stdin().read_to_string(&mut input)?;

    let private: Key = input.trim().parse()?;
    println!("{}", private.public_key());
    Ok(())
}

/// Generate a preshared key.
pub fn genpsk() -> Result<()> {
    println!("{}", Key::generate_preshared());
    Ok(())
}
