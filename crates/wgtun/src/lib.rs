//! WireGuard tunnel configuration and network state management.
//!
//! This crate turns the INI-style tunnel document into the binary layout the
//! tunnel driver consumes, applies it to an adapter, installs the addresses
//! and routes it implies, and reports adapter status changes.
//!
//! - [`config`] - document model and parser
//! - [`wire`] - driver buffer layout, compiler and decoder
//! - [`adapter`] / [`driver`] - adapter ownership over a pluggable driver
//! - [`net`] - address and route synchronization
//! - [`observer`] - adapter status observation
//! - [`netlink`] - Linux rtnetlink backend for `net` and `observer`
//! - [`service`] - named-method dispatcher for a host application
//!
//! # Example
//!
//! ```ignore
//! use wgtun::netlink::NetlinkTable;
//! use wgtun::net::NetworkConfigurator;
//! use wgtun::{Config, InterfaceId};
//!
//! #[tokio::main]
//! async fn main() -> wgtun::Result<()> {
//!     let config: Config = std::fs::read_to_string("wg0.conf")?.parse()?;
//!     let table = NetlinkTable::new()?;
//!     let network = NetworkConfigurator::new(&table, InterfaceId::from_index(5));
//!
//!     network.add_addresses(&config.interface.addresses).await?;
//!     network.add_routes(config.routes()).await?;
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod config;
pub mod driver;
pub mod error;
pub mod interface_id;
pub mod key;
pub mod net;
pub mod netlink;
pub mod observer;
pub mod service;
pub mod status;
pub mod wire;

pub use adapter::Adapter;
pub use config::{Config, Interface, Peer, Prefix};
pub use error::{Error, Result};
pub use interface_id::InterfaceId;
pub use key::{Key, KeyPair};
pub use status::{ConnectionStatus, OperStatus};
