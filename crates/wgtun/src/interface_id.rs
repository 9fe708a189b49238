//! OS-level interface identifier.

use std::fmt;

/// Identifies an adapter to the OS network stack.
///
/// This is the locally unique identifier the driver reports for an adapter.
/// The netlink backend treats it as a kernel interface index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InterfaceId(u64);

impl InterfaceId {
    #[inline]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Identifier for a kernel interface index.
    #[inline]
    pub const fn from_index(index: u32) -> Self {
        Self(index as u64)
    }

    #[inline]
    pub const fn raw(&self) -> u64 {
        self.0
    }

    /// The kernel interface index, if the identifier fits in one.
    pub fn index(&self) -> Option<u32> {
        u32::try_from(self.0).ok().filter(|i| *i != 0)
    }
}

impl From<u32> for InterfaceId {
    fn from(index: u32) -> Self {
        Self::from_index(index)
    }
}

impl fmt::Display for InterfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl serde::Serialize for InterfaceId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.0)
    }
}
