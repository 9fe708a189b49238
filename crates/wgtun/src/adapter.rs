//! Owned tunnel adapter.

use std::sync::Arc;

use crate::config::Config;
use crate::driver::{AdapterState, Driver, LogState};
use crate::error::{Error, Result};
use crate::interface_id::InterfaceId;
use crate::wire::{self, Decoded};

/// Initial buffer size for reading the driver configuration back.
const READ_BUFFER_SIZE: usize = 4096;

/// A tunnel adapter owning one driver handle.
///
/// The handle is released exactly once: by [`Adapter::close`] or on drop,
/// whichever comes first. Every operation on a closed adapter fails with
/// [`Error::InvalidHandle`].
pub struct Adapter<D: Driver> {
    driver: Arc<D>,
    name: String,
    handle: Option<D::Handle>,
    applied: Option<Config>,
}

impl<D: Driver> Adapter<D> {
    /// Create a new adapter.
    pub fn create(driver: Arc<D>, name: &str, tunnel_type: &str) -> Result<Self> {
        let handle = driver
            .create(name, tunnel_type)
            .map_err(|e| e.with_context(format!("creating adapter {}", name)))?;
        tracing::info!(adapter = name, tunnel_type, "created adapter");
        Ok(Self::from_handle(driver, name, handle))
    }

    /// Open an existing adapter.
    pub fn open(driver: Arc<D>, name: &str) -> Result<Self> {
        let handle = driver
            .open(name)
            .map_err(|e| e.with_context(format!("opening adapter {}", name)))?;
        tracing::info!(adapter = name, "opened adapter");
        Ok(Self::from_handle(driver, name, handle))
    }

    fn from_handle(driver: Arc<D>, name: &str, handle: D::Handle) -> Self {
        Self {
            driver,
            name: name.to_string(),
            handle: Some(handle),
            applied: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_valid(&self) -> bool {
        self.handle.is_some()
    }

    /// The configuration most recently applied successfully.
    pub fn applied(&self) -> Option<&Config> {
        self.applied.as_ref()
    }

    fn handle(&self) -> Result<&D::Handle> {
        self.handle.as_ref().ok_or(Error::InvalidHandle)
    }

    pub fn set_state(&self, state: AdapterState) -> Result<()> {
        self.driver.set_state(self.handle()?, state)?;
        tracing::debug!(adapter = %self.name, ?state, "set adapter state");
        Ok(())
    }

    pub fn state(&self) -> Result<AdapterState> {
        self.driver.get_state(self.handle()?)
    }

    /// Hand a compiled buffer to the driver.
    pub fn set_configuration(&self, compiled: &[u8]) -> Result<()> {
        self.driver.set_configuration(self.handle()?, compiled)
    }

    /// Read the driver's current configuration and decode it.
    pub fn configuration(&self) -> Result<Decoded> {
        let handle = self.handle()?;
        let mut buf = vec![0u8; READ_BUFFER_SIZE];

        // The configuration may grow between calls; retry a few times.
        for _ in 0..4 {
            match self.driver.get_configuration(handle, &mut buf) {
                Ok(n) => return wire::decode(&buf[..n.min(buf.len())]),
                Err(Error::BufferTooSmall { required, .. }) if required > buf.len() => {
                    buf.resize(required, 0);
                }
                Err(e) => return Err(e),
            }
        }

        Err(Error::BufferTooSmall {
            required: buf.len() + 1,
            capacity: buf.len(),
        })
    }

    pub fn luid(&self) -> Result<InterfaceId> {
        self.driver.luid(self.handle()?)
    }

    pub fn set_logging(&self, state: LogState) -> Result<()> {
        self.driver.set_logging(self.handle()?, state)
    }

    /// Parse, compile and apply `text`, then bring the adapter up.
    ///
    /// Parse or compile failures never reach the driver. If the driver accepts
    /// the configuration but the adapter cannot be brought up, the result is
    /// [`Error::NotBroughtUp`] and the configuration stays recorded as applied.
    /// Any other failure clears the recorded configuration.
    pub fn apply_configuration(&mut self, text: &str) -> Result<&Config> {
        self.handle()?;

        let parsed = Config::parse(text).and_then(|config| {
            let compiled = wire::compile_to_vec(&config)?;
            Ok((config, compiled))
        });
        let (config, compiled) = match parsed {
            Ok(parsed) => parsed,
            Err(e) => {
                self.applied = None;
                return Err(e);
            }
        };

        if let Err(e) = self.set_configuration(&compiled) {
            self.applied = None;
            return Err(e.with_context(format!("configuring adapter {}", self.name)));
        }

        tracing::info!(
            adapter = %self.name,
            peers = config.peers.len(),
            bytes = compiled.len(),
            "configuration applied"
        );
        let applied = self.applied.insert(config);

        let handle = self.handle.as_ref().ok_or(Error::InvalidHandle)?;
        if let Err(e) = self.driver.set_state(handle, AdapterState::Up) {
            tracing::warn!(adapter = %self.name, error = %e, "adapter not brought up");
            return Err(Error::NotBroughtUp(Box::new(e)));
        }

        Ok(applied)
    }

    /// Release the driver handle. Later calls are no-ops.
    pub fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.driver.close(handle);
            self.applied = None;
            tracing::debug!(adapter = %self.name, "closed adapter");
        }
    }
}

impl<D: Driver> Drop for Adapter<D> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<D: Driver> std::fmt::Debug for Adapter<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Adapter")
            .field("name", &self.name)
            .field("valid", &self.is_valid())
            .finish()
    }
}
