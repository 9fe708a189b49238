//! Common test utilities for integration tests.
//!
//! In-memory fakes for the driver, the OS route tables and the interface
//! monitor, plus helper macros for tests that need a real kernel.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::process::Command;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use wgtun::driver::{AdapterState, Driver, LogState};
use wgtun::net::{AddressEntry, RouteEntry, RouteTable};
use wgtun::observer::{InterfaceChange, InterfaceMonitor, Subscription};
use wgtun::{Error, InterfaceId, Key, OperStatus, Prefix, Result};

/// Base of the identifiers [`FakeDriver`] reports for its adapters.
pub const LUID_BASE: u64 = 100;

#[derive(Default)]
struct DriverState {
    existing: HashSet<String>,
    fail_create: bool,
    fail_set_state: bool,
    fail_configure: bool,
    next_handle: u32,
    names: HashMap<u32, String>,
    created: Vec<String>,
    closed: Vec<u32>,
    states: HashMap<u32, AdapterState>,
    configs: HashMap<u32, Vec<u8>>,
}

/// Driver keeping adapters in memory. Clones share state.
#[derive(Clone, Default)]
pub struct FakeDriver {
    state: Arc<Mutex<DriverState>>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `open(name)` succeed.
    pub fn with_existing(self, name: &str) -> Self {
        self.state.lock().unwrap().existing.insert(name.to_string());
        self
    }

    pub fn fail_create(&self, fail: bool) {
        self.state.lock().unwrap().fail_create = fail;
    }

    pub fn fail_set_state(&self, fail: bool) {
        self.state.lock().unwrap().fail_set_state = fail;
    }

    pub fn fail_configure(&self, fail: bool) {
        self.state.lock().unwrap().fail_configure = fail;
    }

    /// Names passed to `create`.
    pub fn created(&self) -> Vec<String> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn close_count(&self) -> usize {
        self.state.lock().unwrap().closed.len()
    }

    pub fn state_of(&self, name: &str) -> Option<AdapterState> {
        let state = self.state.lock().unwrap();
        let handle = state.names.iter().find(|(_, n)| *n == name).map(|(h, _)| *h)?;
        state.states.get(&handle).copied()
    }

    /// Last buffer handed to `set_configuration` for `name`.
    pub fn configuration_of(&self, name: &str) -> Option<Vec<u8>> {
        let state = self.state.lock().unwrap();
        let handle = state.names.iter().find(|(_, n)| *n == name).map(|(h, _)| *h)?;
        state.configs.get(&handle).cloned()
    }

    fn register(&self, name: &str) -> u32 {
        let mut state = self.state.lock().unwrap();
        state.next_handle += 1;
        let handle = state.next_handle;
        state.names.insert(handle, name.to_string());
        state.states.insert(handle, AdapterState::Down);
        handle
    }
}

impl Driver for FakeDriver {
    type Handle = u32;

    fn create(&self, name: &str, _tunnel_type: &str) -> Result<u32> {
        {
            let mut state = self.state.lock().unwrap();
            if state.fail_create {
                return Err(Error::from_errno(libc::EPERM));
            }
            state.created.push(name.to_string());
            state.existing.insert(name.to_string());
        }
        Ok(self.register(name))
    }

    fn open(&self, name: &str) -> Result<u32> {
        if !self.state.lock().unwrap().existing.contains(name) {
            return Err(Error::from_errno(libc::ENOENT));
        }
        Ok(self.register(name))
    }

    fn close(&self, handle: u32) {
        self.state.lock().unwrap().closed.push(handle);
    }

    fn set_state(&self, handle: &u32, adapter_state: AdapterState) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_set_state {
            return Err(Error::from_errno(libc::EIO));
        }
        state.states.insert(*handle, adapter_state);
        Ok(())
    }

    fn get_state(&self, handle: &u32) -> Result<AdapterState> {
        let state = self.state.lock().unwrap();
        state
            .states
            .get(handle)
            .copied()
            .ok_or(Error::InvalidHandle)
    }

    fn set_configuration(&self, handle: &u32, config: &[u8]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_configure {
            return Err(Error::from_errno(libc::EINVAL));
        }
        state.configs.insert(*handle, config.to_vec());
        Ok(())
    }

    fn get_configuration(&self, handle: &u32, buf: &mut [u8]) -> Result<usize> {
        let state = self.state.lock().unwrap();
        let config = state
            .configs
            .get(handle)
            .ok_or(Error::from_errno(libc::ENOENT))?;
        if buf.len() < config.len() {
            return Err(Error::BufferTooSmall {
                required: config.len(),
                capacity: buf.len(),
            });
        }
        buf[..config.len()].copy_from_slice(config);
        Ok(config.len())
    }

    fn luid(&self, handle: &u32) -> Result<InterfaceId> {
        Ok(InterfaceId::new(LUID_BASE + *handle as u64))
    }

    fn set_logging(&self, _handle: &u32, _state: LogState) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
struct TableState {
    addresses: Vec<AddressEntry>,
    routes: Vec<RouteEntry>,
    list_calls: usize,
    add_calls: usize,
    delete_calls: usize,
    fail_listing: bool,
    fail_add_route: Option<Prefix>,
    fail_delete: HashSet<Prefix>,
    vanish_on_delete: HashSet<Prefix>,
}

/// Address and route tables kept in memory. Clones share state.
#[derive(Clone, Default)]
pub struct FakeRouteTable {
    state: Arc<Mutex<TableState>>,
}

impl FakeRouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_address(&self, interface: InterfaceId, prefix: &str) {
        self.state.lock().unwrap().addresses.push(AddressEntry {
            interface,
            prefix: prefix.parse().unwrap(),
        });
    }

    pub fn seed_route(&self, interface: InterfaceId, destination: &str) {
        self.state.lock().unwrap().routes.push(RouteEntry {
            interface,
            destination: destination.parse().unwrap(),
            metric: 0,
        });
    }

    pub fn fail_listing(&self, fail: bool) {
        self.state.lock().unwrap().fail_listing = fail;
    }

    pub fn fail_add_route(&self, destination: &str) {
        self.state.lock().unwrap().fail_add_route = Some(destination.parse().unwrap());
    }

    /// Deleting `prefix` fails with EPERM.
    pub fn fail_delete(&self, prefix: &str) {
        self.state.lock().unwrap().fail_delete.insert(prefix.parse().unwrap());
    }

    /// `prefix` is listed but already gone when deleted.
    pub fn vanish_on_delete(&self, prefix: &str) {
        self.state
            .lock()
            .unwrap()
            .vanish_on_delete
            .insert(prefix.parse().unwrap());
    }

    pub fn addresses_of(&self, interface: InterfaceId) -> Vec<Prefix> {
        let state = self.state.lock().unwrap();
        state
            .addresses
            .iter()
            .filter(|e| e.interface == interface)
            .map(|e| e.prefix)
            .collect()
    }

    pub fn routes_of(&self, interface: InterfaceId) -> Vec<Prefix> {
        let state = self.state.lock().unwrap();
        state
            .routes
            .iter()
            .filter(|e| e.interface == interface)
            .map(|e| e.destination)
            .collect()
    }

    pub fn list_calls(&self) -> usize {
        self.state.lock().unwrap().list_calls
    }

    pub fn add_calls(&self) -> usize {
        self.state.lock().unwrap().add_calls
    }

    pub fn delete_calls(&self) -> usize {
        self.state.lock().unwrap().delete_calls
    }
}

impl RouteTable for FakeRouteTable {
    async fn add_address(&self, interface: InterfaceId, prefix: Prefix) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.add_calls += 1;
        let entry = AddressEntry { interface, prefix };
        if state.addresses.contains(&entry) {
            return Err(Error::from_errno(libc::EEXIST));
        }
        state.addresses.push(entry);
        Ok(())
    }

    async fn addresses(&self) -> Result<Vec<AddressEntry>> {
        let mut state = self.state.lock().unwrap();
        state.list_calls += 1;
        if state.fail_listing {
            return Err(Error::from_errno(libc::EACCES));
        }
        Ok(state.addresses.clone())
    }

    async fn delete_address(&self, entry: &AddressEntry) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.delete_calls += 1;
        if state.fail_delete.contains(&entry.prefix) {
            return Err(Error::from_errno(libc::EPERM));
        }
        state.addresses.retain(|e| e != entry);
        if state.vanish_on_delete.contains(&entry.prefix) {
            return Err(Error::from_errno(libc::EADDRNOTAVAIL));
        }
        Ok(())
    }

    async fn add_route(&self, interface: InterfaceId, destination: Prefix) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.add_calls += 1;
        if state.fail_add_route == Some(destination) {
            return Err(Error::from_errno(libc::ENETUNREACH));
        }
        let entry = RouteEntry {
            interface,
            destination,
            metric: 0,
        };
        if state.routes.contains(&entry) {
            return Err(Error::from_errno(libc::EEXIST));
        }
        state.routes.push(entry);
        Ok(())
    }

    async fn routes(&self) -> Result<Vec<RouteEntry>> {
        let mut state = self.state.lock().unwrap();
        state.list_calls += 1;
        if state.fail_listing {
            return Err(Error::from_errno(libc::EACCES));
        }
        Ok(state.routes.clone())
    }

    async fn delete_route(&self, entry: &RouteEntry) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.delete_calls += 1;
        if state.fail_delete.contains(&entry.destination) {
            return Err(Error::from_errno(libc::EPERM));
        }
        state.routes.retain(|e| e != entry);
        if state.vanish_on_delete.contains(&entry.destination) {
            return Err(Error::from_errno(libc::ESRCH));
        }
        Ok(())
    }
}

#[derive(Default)]
struct MonitorState {
    subscribes: AtomicUsize,
    fail_subscribe: AtomicBool,
    senders: Mutex<Vec<mpsc::UnboundedSender<InterfaceChange>>>,
    statuses: Mutex<HashMap<InterfaceId, OperStatus>>,
    read_delay: Mutex<Option<Duration>>,
}

/// Interface monitor driven by the test. Clones share state.
#[derive(Clone, Default)]
pub struct FakeMonitor {
    state: Arc<MonitorState>,
}

impl FakeMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_status(&self, interface: InterfaceId, status: OperStatus) {
        self.state.statuses.lock().unwrap().insert(interface, status);
    }

    pub fn fail_subscribe(&self, fail: bool) {
        self.state.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    /// Make every status read sleep first.
    pub fn set_read_delay(&self, delay: Duration) {
        *self.state.read_delay.lock().unwrap() = Some(delay);
    }

    /// Total `subscribe` calls.
    pub fn subscribe_count(&self) -> usize {
        self.state.subscribes.load(Ordering::SeqCst)
    }

    /// Subscriptions whose receiving side is still alive.
    pub fn active_subscriptions(&self) -> usize {
        self.state
            .senders
            .lock()
            .unwrap()
            .iter()
            .filter(|tx| !tx.is_closed())
            .count()
    }

    /// Close every subscription from the source side.
    pub fn end_subscriptions(&self) {
        self.state.senders.lock().unwrap().clear();
    }

    /// Deliver a change notification to every live subscription.
    pub fn notify(&self, interface: InterfaceId, status: Option<OperStatus>) {
        let change = InterfaceChange { interface, status };
        for tx in self.state.senders.lock().unwrap().iter() {
            let _ = tx.send(change);
        }
    }
}

impl InterfaceMonitor for FakeMonitor {
    fn subscribe(&self) -> Result<Subscription> {
        self.state.subscribes.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_subscribe.load(Ordering::SeqCst) {
            return Err(Error::from_errno(libc::EPERM));
        }
        let (tx, subscription) = Subscription::channel();
        self.state.senders.lock().unwrap().push(tx);
        Ok(subscription)
    }

    async fn oper_status(&self, interface: InterfaceId) -> Result<OperStatus> {
        let delay = *self.state.read_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.state
            .statuses
            .lock()
            .unwrap()
            .get(&interface)
            .copied()
            .ok_or(Error::from_errno(libc::ENODEV))
    }
}

/// A two-peer document with fixed keys.
pub fn sample_config() -> String {
    format!(
        "[Interface]\n\
         PrivateKey = {}\n\
         ListenPort = 51820\n\
         Address = 10.8.0.2/24, fd00::2/64\n\
         \n\
         [Peer]\n\
         PublicKey = {}\n\
         Endpoint = 192.0.2.1:51820\n\
         AllowedIPs = 10.8.0.0/24, 192.168.10.0/24\n\
         \n\
         [Peer]\n\
         PublicKey = {}\n\
         AllowedIPs = fd00::/64\n",
        Key::from_bytes([1; 32]),
        Key::from_bytes([2; 32]),
        Key::from_bytes([3; 32]),
    )
}

/// A dummy kernel interface deleted on drop.
pub struct TestLink {
    name: String,
    index: u32,
}

impl TestLink {
    pub fn new(prefix: &str) -> Result<Self> {
        let name = format!("{}{}", prefix, std::process::id() % 10000);
        ip(&["link", "add", &name, "type", "dummy"])?;
        ip(&["link", "set", &name, "up"])?;

        let index = std::fs::read_to_string(format!("/sys/class/net/{}/ifindex", name))?
            .trim()
            .parse()
            .map_err(|_| Error::InterfaceNotFound(name.clone()))?;

        Ok(Self { name, index })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> InterfaceId {
        InterfaceId::from_index(self.index)
    }
}

impl Drop for TestLink {
    fn drop(&mut self) {
        let _ = Command::new("ip").args(["link", "del", &self.name]).status();
    }
}

/// Run an `ip` command, failing on a non-zero exit.
pub fn ip(args: &[&str]) -> Result<String> {
    let output = Command::new("ip").args(args).output()?;
    if !output.status.success() {
        return Err(Error::InvalidMessage(format!(
            "ip {:?}: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Check if running as root.
pub fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

/// Skip the test if not running as root.
#[macro_export]
macro_rules! require_root {
    () => {
        if !crate::common::is_root() {
            eprintln!("Skipping test: requires root");
            return Ok(());
        }
    };
}
