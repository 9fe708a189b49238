//! Request dispatcher for the host application.
//!
//! The host calls named methods with a small argument map and receives either
//! a JSON value or a [`ServiceError`] carrying a stable error code. Status
//! changes of observed adapters are delivered separately through
//! [`Service::listen`].
//!
//! ```ignore
//! let mut service = Service::new(load_driver, NetlinkTable::new()?, NetlinkMonitor::new()?);
//! service.dispatch("nativeInit", &Args::new()).await?;
//!
//! let mut args = Args::new();
//! args.insert("win32ServiceName".into(), "wg0".into());
//! service.dispatch("setupTunnel", &args).await?;
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde_json::{Map, Value, json};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::adapter::Adapter;
use crate::config::Config;
use crate::driver::{AdapterState, DEFAULT_TUNNEL_TYPE, Driver};
use crate::error::{Error, Result};
use crate::interface_id::InterfaceId;
use crate::key::KeyPair;
use crate::net::{NetworkConfigurator, RouteTable};
use crate::observer::{AdapterStatusObserver, InterfaceMonitor, StatusEvent};
use crate::status::ConnectionStatus;

/// Method arguments.
pub type Args = Map<String, Value>;

/// Argument naming the adapter.
pub const ARG_ADAPTER_NAME: &str = "win32ServiceName";
/// Argument carrying the configuration text.
pub const ARG_CONFIG: &str = "cfg";

/// Methods the host can call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    GenerateKeyPair,
    CheckTunnelConfiguration,
    NativeInit,
    SetupTunnel,
    Connect,
    Disconnect,
    Status,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GenerateKeyPair => "generateKeyPair",
            Self::CheckTunnelConfiguration => "checkTunnelConfiguration",
            Self::NativeInit => "nativeInit",
            Self::SetupTunnel => "setupTunnel",
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::Status => "status",
        }
    }
}

impl FromStr for Method {
    type Err = ServiceError;

    fn from_str(s: &str) -> std::result::Result<Self, ServiceError> {
        Ok(match s {
            "generateKeyPair" => Self::GenerateKeyPair,
            "checkTunnelConfiguration" => Self::CheckTunnelConfiguration,
            "nativeInit" => Self::NativeInit,
            "setupTunnel" => Self::SetupTunnel,
            "connect" => Self::Connect,
            "disconnect" => Self::Disconnect,
            "status" => Self::Status,
            other => {
                return Err(ServiceError::new(
                    ErrorCode::NotImplemented,
                    format!("method '{}' is not implemented", other),
                ));
            }
        })
    }
}

/// Stable error codes reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    LibraryNotAvailable,
    AdapterCreationFailed,
    AdapterNotFound,
    AdapterInvalid,
    ConfigurationFailed,
    ConfigurationParseFailed,
    IpConfigurationFailed,
    AdapterStateFailed,
    InvalidArgument,
    NotImplemented,
    UnknownError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LibraryNotAvailable => "WIREGUARD_LIBRARY_NOT_AVAILABLE",
            Self::AdapterCreationFailed => "ADAPTER_CREATION_FAILED",
            Self::AdapterNotFound => "ADAPTER_NOT_FOUND",
            Self::AdapterInvalid => "ADAPTER_INVALID",
            Self::ConfigurationFailed => "CONFIGURATION_FAILED",
            Self::ConfigurationParseFailed => "CONFIGURATION_PARSE_FAILED",
            Self::IpConfigurationFailed => "IP_CONFIGURATION_FAILED",
            Self::AdapterStateFailed => "ADAPTER_STATE_FAILED",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::NotImplemented => "NOT_IMPLEMENTED",
            Self::UnknownError => "UNKNOWN_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed method call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ServiceError {
    pub code: ErrorCode,
    pub message: String,
}

impl ServiceError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// `what` followed by the underlying error, which carries the OS code
    /// and description when there is one.
    fn caused_by(code: ErrorCode, what: impl fmt::Display, err: &Error) -> Self {
        Self::new(code, format!("{}: {}", what, err))
    }
}

pub type ServiceResult = std::result::Result<Value, ServiceError>;

fn required<'a>(args: &'a Args, name: &str) -> std::result::Result<&'a str, ServiceError> {
    args.get(name).and_then(Value::as_str).ok_or_else(|| {
        tracing::error!(argument = name, "missing argument");
        ServiceError::new(
            ErrorCode::InvalidArgument,
            format!("Argument '{}' is required", name),
        )
    })
}

type Loader<D> = Box<dyn Fn() -> Result<D> + Send + Sync>;

/// Tunnel service state: the driver, known adapters, and the status observer.
pub struct Service<D: Driver, R: RouteTable, M: InterfaceMonitor> {
    loader: Loader<D>,
    driver: Option<Arc<D>>,
    adapters: Vec<Adapter<D>>,
    table: R,
    observer: AdapterStatusObserver<M>,
}

impl<D: Driver, R: RouteTable, M: InterfaceMonitor> Service<D, R, M> {
    /// `loader` is called by `nativeInit` to obtain the driver.
    pub fn new(loader: impl Fn() -> Result<D> + Send + Sync + 'static, table: R, monitor: M) -> Self {
        Self {
            loader: Box::new(loader),
            driver: None,
            adapters: Vec::new(),
            table,
            observer: AdapterStatusObserver::new(monitor),
        }
    }

    pub fn observer(&self) -> &AdapterStatusObserver<M> {
        &self.observer
    }

    /// Known adapter by name.
    pub fn adapter(&self, name: &str) -> Option<&Adapter<D>> {
        self.adapters.iter().find(|a| a.name() == name)
    }

    /// Attach the status event sink.
    pub fn listen(&self) -> UnboundedReceiverStream<StatusEvent> {
        self.observer.listen()
    }

    pub fn cancel_listen(&self) {
        self.observer.cancel_listen();
    }

    /// Route a call by method name.
    pub async fn dispatch(&mut self, method: &str, args: &Args) -> ServiceResult {
        let method: Method = method.parse().inspect_err(|_| {
            tracing::warn!(method, "unknown method");
        })?;
        tracing::info!(method = method.as_str(), "handling call");

        match method {
            Method::GenerateKeyPair => Ok(self.generate_key_pair()),
            Method::CheckTunnelConfiguration => Ok(self.check_tunnel_configuration()),
            Method::NativeInit => self.native_init(),
            Method::SetupTunnel => self.setup_tunnel(required(args, ARG_ADAPTER_NAME)?).await,
            Method::Connect => {
                let name = required(args, ARG_ADAPTER_NAME)?;
                let cfg = required(args, ARG_CONFIG)?;
                self.connect(name, cfg).await
            }
            Method::Disconnect => self.disconnect(required(args, ARG_ADAPTER_NAME)?).await,
            Method::Status => self.status(required(args, ARG_ADAPTER_NAME)?),
        }
    }

    /// `{publicKey, privateKey}`, both base64.
    pub fn generate_key_pair(&self) -> Value {
        let pair = KeyPair::generate();
        json!({
            "publicKey": pair.public.to_base64(),
            "privateKey": pair.private.to_base64(),
        })
    }

    /// Whether the most recently set up adapter is usable.
    pub fn check_tunnel_configuration(&self) -> Value {
        Value::Bool(self.adapters.last().is_some_and(Adapter::is_valid))
    }

    /// Load the driver.
    pub fn native_init(&mut self) -> ServiceResult {
        match (self.loader)() {
            Ok(driver) => {
                self.driver = Some(Arc::new(driver));
                tracing::info!("tunnel driver loaded");
                Ok(Value::Null)
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to load tunnel driver");
                Err(ServiceError::caused_by(
                    ErrorCode::LibraryNotAvailable,
                    "Failed to load tunnel driver",
                    &e,
                ))
            }
        }
    }

    /// Get an adapter for `name` (known, opened, or created) and observe it.
    pub async fn setup_tunnel(&mut self, name: &str) -> ServiceResult {
        let Some(driver) = self.driver.clone() else {
            tracing::error!(adapter = name, "tunnel driver not loaded");
            return Err(ServiceError::new(
                ErrorCode::LibraryNotAvailable,
                "Tunnel driver is not loaded",
            ));
        };

        if let Some(existing) = self.adapter(name) {
            tracing::info!(adapter = name, "adapter already set up");
            if existing.is_valid() {
                if let Ok(luid) = existing.luid() {
                    self.observe(luid).await;
                }
            }
            return Ok(Value::Null);
        }

        let adapter = match Adapter::open(Arc::clone(&driver), name) {
            Ok(adapter) => adapter,
            Err(e) => {
                tracing::debug!(adapter = name, error = %e, "no existing adapter, creating");
                Adapter::create(driver, name, DEFAULT_TUNNEL_TYPE).map_err(|e| {
                    tracing::error!(adapter = name, error = %e, "adapter creation failed");
                    ServiceError::caused_by(
                        ErrorCode::AdapterCreationFailed,
                        format!("Failed to create adapter {}", name),
                        &e,
                    )
                })?
            }
        };

        if let Ok(luid) = adapter.luid() {
            self.observe(luid).await;
        }
        self.adapters.push(adapter);

        Ok(Value::Null)
    }

    /// Apply `cfg` to the adapter and install its addresses and routes.
    pub async fn connect(&mut self, name: &str, cfg: &str) -> ServiceResult {
        let adapter = self
            .adapters
            .iter_mut()
            .find(|a| a.name() == name)
            .ok_or_else(|| {
                tracing::error!(adapter = name, "connect on unknown adapter");
                ServiceError::new(
                    ErrorCode::AdapterNotFound,
                    "Adapter not found. Call 'setupTunnel' first.",
                )
            })?;
        if !adapter.is_valid() {
            return Err(ServiceError::new(ErrorCode::AdapterInvalid, "Adapter is not valid"));
        }

        let config: Config = match adapter.apply_configuration(cfg) {
            Ok(config) => config.clone(),
            Err(e) => {
                tracing::error!(adapter = name, error = %e, "connect failed");
                let code = match &e {
                    Error::Parse { .. } | Error::Key(_) => ErrorCode::ConfigurationParseFailed,
                    Error::NotBroughtUp(_) => ErrorCode::AdapterStateFailed,
                    _ => ErrorCode::ConfigurationFailed,
                };
                return Err(ServiceError::caused_by(
                    code,
                    "Failed to apply configuration to adapter",
                    &e,
                ));
            }
        };

        let luid = match adapter.luid() {
            Ok(luid) => luid,
            Err(e) => {
                tracing::warn!(adapter = name, error = %e, "no interface identifier, skipping network setup");
                return Ok(Value::Null);
            }
        };

        let network = NetworkConfigurator::new(&self.table, luid);
        if !config.interface.addresses.is_empty() {
            network
                .add_addresses(&config.interface.addresses)
                .await
                .map_err(|e| {
                    ServiceError::caused_by(
                        ErrorCode::IpConfigurationFailed,
                        "Failed to configure IP addresses on adapter",
                        &e,
                    )
                })?;
        }
        network.add_routes(config.routes()).await.map_err(|e| {
            ServiceError::caused_by(
                ErrorCode::IpConfigurationFailed,
                "Failed to configure routes for peer allowed IPs",
                &e,
            )
        })?;

        if !self.observer.is_monitoring(luid) {
            self.observe(luid).await;
        }

        tracing::info!(adapter = name, "connected");
        Ok(Value::Null)
    }

    /// Bring the adapter down, clean up its network state and stop observing it.
    pub async fn disconnect(&mut self, name: &str) -> ServiceResult {
        let adapter = self.adapter(name).ok_or_else(|| {
            tracing::error!(adapter = name, "disconnect on unknown adapter");
            ServiceError::new(ErrorCode::AdapterNotFound, "Adapter not found")
        })?;
        if !adapter.is_valid() {
            return Err(ServiceError::new(ErrorCode::AdapterInvalid, "Adapter is not valid"));
        }

        adapter.set_state(AdapterState::Down).map_err(|e| {
            tracing::error!(adapter = name, error = %e, "failed to bring adapter down");
            ServiceError::caused_by(
                ErrorCode::AdapterStateFailed,
                "Failed to set adapter state to down",
                &e,
            )
        })?;

        if let Ok(luid) = adapter.luid() {
            let network = NetworkConfigurator::new(&self.table, luid);

            match network.remove_all_addresses().await {
                Ok(result) if result.is_success() => {}
                Ok(result) => {
                    for failure in &result.errors {
                        tracing::warn!(adapter = name, "{}", failure);
                    }
                }
                Err(e) => tracing::warn!(adapter = name, error = %e, "failed to remove addresses"),
            }

            match network.remove_all_routes().await {
                Ok(result) if result.is_success() => {}
                Ok(result) => {
                    for failure in &result.errors {
                        tracing::warn!(adapter = name, "{}", failure);
                    }
                }
                Err(e) => tracing::warn!(adapter = name, error = %e, "failed to remove routes"),
            }

            self.observer.stop_observing(luid).await;
        }

        tracing::info!(adapter = name, "disconnected");
        Ok(Value::Null)
    }

    /// `connected` when the adapter is up, `disconnected` otherwise.
    pub fn status(&self, name: &str) -> ServiceResult {
        let Some(adapter) = self.adapter(name).filter(|a| a.is_valid()) else {
            return Ok(Value::from(ConnectionStatus::Disconnected.as_str()));
        };

        let status = match adapter.state() {
            Ok(AdapterState::Up) => ConnectionStatus::Connected,
            Ok(AdapterState::Down) => ConnectionStatus::Disconnected,
            Err(e) => {
                tracing::error!(adapter = name, error = %e, "status check failed");
                return Err(ServiceError::caused_by(
                    ErrorCode::UnknownError,
                    "Failed to read adapter state",
                    &e,
                ));
            }
        };

        Ok(Value::from(status.as_str()))
    }

    /// Stop observing everything and release every adapter.
    pub async fn shutdown(&mut self) {
        self.observer.stop_all_observing().await;
        for adapter in &mut self.adapters {
            adapter.close();
        }
        self.adapters.clear();
    }

    async fn observe(&self, luid: InterfaceId) {
        if let Err(e) = self.observer.start_observing(luid).await {
            tracing::warn!(interface = %luid, error = %e, "cannot observe adapter");
        }
    }
}
