//! Tunnel driver capability set.
//!
//! The driver is consumed through the [`Driver`] trait only; how it is loaded
//! is up to the implementor. A driver that could not be loaded is represented
//! by its absence (see [`crate::service::Service::native_init`]).

use crate::error::Result;
use crate::interface_id::InterfaceId;

/// Tunnel type passed to [`Driver::create`] by default.
pub const DEFAULT_TUNNEL_TYPE: &str = "WireGuard";

/// Administrative adapter state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdapterState {
    #[default]
    Down,
    Up,
}

/// Driver log forwarding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogState {
    #[default]
    Off,
    On,
    /// Forward logs prefixed with the adapter name.
    OnWithPrefix,
}

/// Operations the native tunnel driver provides.
///
/// `Handle` is the driver's adapter resource. [`Driver::close`] consumes it,
/// so a handle is released at most once.
pub trait Driver: Send + Sync + 'static {
    type Handle: Send + Sync;

    /// Create a new adapter.
    fn create(&self, name: &str, tunnel_type: &str) -> Result<Self::Handle>;

    /// Open an existing adapter by name.
    fn open(&self, name: &str) -> Result<Self::Handle>;

    /// Release the adapter.
    fn close(&self, handle: Self::Handle);

    fn set_state(&self, handle: &Self::Handle, state: AdapterState) -> Result<()>;

    fn get_state(&self, handle: &Self::Handle) -> Result<AdapterState>;

    /// Apply a compiled configuration buffer.
    fn set_configuration(&self, handle: &Self::Handle, config: &[u8]) -> Result<()>;

    /// Read the current configuration into `buf`, returning the bytes used.
    ///
    /// Fails with [`Error::BufferTooSmall`](crate::Error::BufferTooSmall)
    /// carrying the needed size when `buf` is too short.
    fn get_configuration(&self, handle: &Self::Handle, buf: &mut [u8]) -> Result<usize>;

    /// OS interface identifier of the adapter.
    fn luid(&self, handle: &Self::Handle) -> Result<InterfaceId>;

    fn set_logging(&self, handle: &Self::Handle, state: LogState) -> Result<()>;
}
