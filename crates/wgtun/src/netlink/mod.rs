//! Linux rtnetlink backend.
//!
//! [`NetlinkTable`] implements [`RouteTable`](crate::net::RouteTable) and
//! [`NetlinkMonitor`] implements
//! [`InterfaceMonitor`](crate::observer::InterfaceMonitor). An
//! [`InterfaceId`] is treated as a kernel interface index.

pub mod attr;
pub mod builder;
pub mod connection;
pub mod message;
pub mod messages;
mod monitor;
pub mod socket;
mod table;

pub use connection::Connection;
pub use monitor::NetlinkMonitor;
pub use socket::NetlinkSocket;
pub use table::NetlinkTable;

use crate::error::{Error, Result};
use crate::interface_id::InterfaceId;

fn kernel_index(interface: InterfaceId) -> Result<u32> {
    interface
        .index()
        .ok_or_else(|| Error::InterfaceNotFound(interface.to_string()))
}
