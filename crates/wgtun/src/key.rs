//! Curve25519 key material.

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use rand::RngCore;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::error::{Error, Result};

/// Size of a WireGuard key in bytes.
pub const KEY_LEN: usize = 32;

/// A 32-byte key (private, public or preshared).
///
/// Parsed from and displayed as standard base64.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Key([u8; KEY_LEN]);

impl Key {
    /// Wrap raw key bytes.
    pub const fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Generate a new private key, clamped for Curve25519.
    pub fn generate_private() -> Self {
        let mut key = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut key);

        key[0] &= 248;
        key[31] &= 127;
        key[31] |= 64;

        Self(key)
    }

    /// Generate a random preshared key.
    pub fn generate_preshared() -> Self {
        let mut key = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut key);
        Self(key)
    }

    /// Derive the public key, treating `self` as a private key.
    pub fn public_key(&self) -> Self {
        let secret = StaticSecret::from(self.0);
        Self(*PublicKey::from(&secret).as_bytes())
    }

    /// Decode a base64 key, requiring exactly [`KEY_LEN`] bytes.
    pub fn from_base64(s: &str) -> Result<Self> {
        let bytes = BASE64_STANDARD
            .decode(s.trim())
            .map_err(|e| Error::Key(format!("invalid base64: {}", e)))?;

        let key: [u8; KEY_LEN] = bytes.as_slice().try_into().map_err(|_| {
            Error::Key(format!(
                "expected {} bytes, got {}",
                KEY_LEN,
                bytes.len()
            ))
        })?;

        Ok(Self(key))
    }

    /// Encode as standard base64.
    pub fn to_base64(&self) -> String {
        BASE64_STANDARD.encode(self.0)
    }
}

impl FromStr for Key {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_base64(s)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

// Keys never show up in debug output.
impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Key(..)")
    }
}

/// A generated private/public key pair.
#[derive(Debug, Clone, Copy)]
pub struct KeyPair {
    pub private: Key,
    pub public: Key,
}

impl KeyPair {
    /// Generate a fresh key pair.
    pub fn generate() -> Self {
        let private = Key::generate_private();
        Self {
            public: private.public_key(),
            private,
        }
    }
}
