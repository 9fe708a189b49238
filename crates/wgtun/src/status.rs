//! Interface operational status and the coarse connection status derived from it.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::Error;

/// RFC 2863 operational status of an interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperStatus {
    Unknown,
    NotPresent,
    Down,
    LowerLayerDown,
    Testing,
    Dormant,
    Up,
}

impl OperStatus {
    /// Map a kernel `IF_OPER_*` value.
    pub fn from_kernel(value: u8) -> Self {
        match value {
            1 => Self::NotPresent,
            2 => Self::Down,
            3 => Self::LowerLayerDown,
            4 => Self::Testing,
            5 => Self::Dormant,
            6 => Self::Up,
            _ => Self::Unknown,
        }
    }
}

/// Tunnel status reported to the host application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    Connecting,
    Disconnecting,
    Unknown,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Disconnecting => "disconnecting",
            Self::Unknown => "unknown",
        }
    }
}

impl From<OperStatus> for ConnectionStatus {
    fn from(status: OperStatus) -> Self {
        match status {
            OperStatus::Up => Self::Connected,
            OperStatus::Down
            | OperStatus::Dormant
            | OperStatus::NotPresent
            | OperStatus::LowerLayerDown => Self::Disconnected,
            OperStatus::Unknown | OperStatus::Testing => Self::Unknown,
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "connected" => Ok(Self::Connected),
            "disconnected" => Ok(Self::Disconnected),
            "connecting" => Ok(Self::Connecting),
            "disconnecting" => Ok(Self::Disconnecting),
            "unknown" => Ok(Self::Unknown),
            other => Err(Error::InvalidMessage(format!(
                "unknown connection status '{}'",
                other
            ))),
        }
    }
}
