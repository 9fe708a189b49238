//! Address and route synchronization for an adapter's interface.
//!
//! [`NetworkConfigurator`] adds the addresses and routes a [`Config`] implies
//! and removes everything owned by an interface on teardown. The OS tables are
//! reached through the [`RouteTable`] trait; [`crate::netlink::NetlinkTable`]
//! is the Linux implementation.
//!
//! Adds are idempotent (an existing entry counts as added) and stop at the
//! first real failure. Removes enumerate the table, delete every entry owned
//! by the interface, treat "not found" as success and keep going after
//! individual failures, collecting them in an [`ApplyResult`].
//!
//! [`Config`]: crate::config::Config

use std::fmt;
use std::future::Future;

use crate::config::Prefix;
use crate::error::{Error, Result};
use crate::interface_id::InterfaceId;

/// An address assigned to an interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddressEntry {
    pub interface: InterfaceId,
    pub prefix: Prefix,
}

/// A forwarding table entry through an interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RouteEntry {
    pub interface: InterfaceId,
    pub destination: Prefix,
    pub metric: u32,
}

/// OS unicast address and forwarding tables.
pub trait RouteTable: Send + Sync {
    /// Assign an address with an on-link prefix and infinite lifetime.
    fn add_address(
        &self,
        interface: InterfaceId,
        prefix: Prefix,
    ) -> impl Future<Output = Result<()>> + Send;

    /// All unicast addresses on all interfaces.
    fn addresses(&self) -> impl Future<Output = Result<Vec<AddressEntry>>> + Send;

    fn delete_address(&self, entry: &AddressEntry) -> impl Future<Output = Result<()>> + Send;

    /// Add an on-link route (no gateway, metric 0) through `interface`.
    fn add_route(
        &self,
        interface: InterfaceId,
        destination: Prefix,
    ) -> impl Future<Output = Result<()>> + Send;

    /// All forwarding entries on all interfaces.
    fn routes(&self) -> impl Future<Output = Result<Vec<RouteEntry>>> + Send;

    fn delete_route(&self, entry: &RouteEntry) -> impl Future<Output = Result<()>> + Send;
}

/// Outcome of an add or remove pass.
#[derive(Debug, Default)]
pub struct ApplyResult {
    /// Entries actually added or deleted.
    pub changes_made: usize,
    /// Entries that failed (remove passes only).
    pub errors: Vec<ApplyError>,
    /// Summary of what was done.
    pub summary: Vec<String>,
}

impl ApplyResult {
    /// True when every entry succeeded or needed no change.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    /// Get a human-readable summary.
    pub fn summary_text(&self) -> String {
        if self.summary.is_empty() {
            "No changes made".to_string()
        } else {
            self.summary.join("\n")
        }
    }
}

/// A single failed entry.
#[derive(Debug)]
pub struct ApplyError {
    /// What operation was being performed.
    pub operation: String,
    /// The underlying error.
    pub error: Error,
}

impl fmt::Display for ApplyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.operation, self.error)
    }
}

/// Applies address and route state for one interface.
pub struct NetworkConfigurator<'a, T: RouteTable> {
    table: &'a T,
    interface: InterfaceId,
}

impl<'a, T: RouteTable> NetworkConfigurator<'a, T> {
    pub fn new(table: &'a T, interface: InterfaceId) -> Self {
        Self { table, interface }
    }

    pub fn interface(&self) -> InterfaceId {
        self.interface
    }

    /// Assign `prefixes` to the interface.
    ///
    /// Already-present addresses count as success; any other failure aborts
    /// the remaining adds.
    pub async fn add_addresses(&self, prefixes: &[Prefix]) -> Result<ApplyResult> {
        let mut result = ApplyResult::default();

        for prefix in prefixes {
            match self.table.add_address(self.interface, *prefix).await {
                Ok(()) => {
                    result.changes_made += 1;
                    result.summary.push(format!("added address {}", prefix));
                }
                Err(e) if e.is_already_exists() => {
                    result.summary.push(format!("address {} already present", prefix));
                }
                Err(e) => {
                    tracing::error!(interface = %self.interface, %prefix, error = %e, "failed to add address");
                    return Err(e.with_context(format!("adding address {}", prefix)));
                }
            }
        }

        tracing::info!(interface = %self.interface, added = result.changes_made, "addresses configured");
        Ok(result)
    }

    /// Route each of `prefixes` through the interface.
    ///
    /// Same semantics as [`add_addresses`](Self::add_addresses).
    pub async fn add_routes<'p>(
        &self,
        prefixes: impl IntoIterator<Item = &'p Prefix>,
    ) -> Result<ApplyResult> {
        let mut result = ApplyResult::default();

        for prefix in prefixes {
            match self.table.add_route(self.interface, *prefix).await {
                Ok(()) => {
                    result.changes_made += 1;
                    result.summary.push(format!("added route {}", prefix));
                }
                Err(e) if e.is_already_exists() => {
                    result.summary.push(format!("route {} already present", prefix));
                }
                Err(e) => {
                    tracing::error!(interface = %self.interface, %prefix, error = %e, "failed to add route");
                    return Err(e.with_context(format!("adding route {}", prefix)));
                }
            }
        }

        tracing::info!(interface = %self.interface, added = result.changes_made, "routes configured");
        Ok(result)
    }

    /// Delete every address owned by the interface.
    ///
    /// Fails only if the table cannot be enumerated. Per-entry failures are
    /// collected in the result and do not stop the pass.
    pub async fn remove_all_addresses(&self) -> Result<ApplyResult> {
        let entries = self
            .table
            .addresses()
            .await
            .map_err(|e| e.with_context("listing addresses"))?;

        let mut result = ApplyResult::default();
        for entry in entries.iter().filter(|e| e.interface == self.interface) {
            match self.table.delete_address(entry).await {
                Ok(()) => {
                    result.changes_made += 1;
                    result.summary.push(format!("removed address {}", entry.prefix));
                }
                Err(e) if e.is_not_found() => {
                    result.summary.push(format!("address {} already gone", entry.prefix));
                }
                Err(e) => {
                    tracing::warn!(interface = %self.interface, prefix = %entry.prefix, error = %e, "failed to remove address");
                    result.errors.push(ApplyError {
                        operation: format!("removing address {}", entry.prefix),
                        error: e,
                    });
                }
            }
        }

        tracing::info!(
            interface = %self.interface,
            removed = result.changes_made,
            failed = result.errors.len(),
            "addresses removed"
        );
        Ok(result)
    }

    /// Delete every route through the interface.
    ///
    /// Same semantics as [`remove_all_addresses`](Self::remove_all_addresses).
    pub async fn remove_all_routes(&self) -> Result<ApplyResult> {
        let entries = self
            .table
            .routes()
            .await
            .map_err(|e| e.with_context("listing routes"))?;

        let mut result = ApplyResult::default();
        for entry in entries.iter().filter(|e| e.interface == self.interface) {
            match self.table.delete_route(entry).await {
                Ok(()) => {
                    result.changes_made += 1;
                    result.summary.push(format!("removed route {}", entry.destination));
                }
                Err(e) if e.is_not_found() => {
                    result.summary.push(format!("route {} already gone", entry.destination));
                }
                Err(e) => {
                    tracing::warn!(interface = %self.interface, destination = %entry.destination, error = %e, "failed to remove route");
                    result.errors.push(ApplyError {
                        operation: format!("removing route {}", entry.destination),
                        error: e,
                    });
                }
            }
        }

        tracing::info!(
            interface = %self.interface,
            removed = result.changes_made,
            failed = result.errors.len(),
            "routes removed"
        );
        Ok(result)
    }
}
