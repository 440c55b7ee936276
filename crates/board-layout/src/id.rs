//! Stable node identifiers and their allocator.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::LayoutModelError;

/// Stable identifier for layout nodes.
///
/// `0` is reserved for the root sentinel so IDs are always non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u64);

impl NodeId {
    /// Lowest valid node ID.
    pub const MIN: Self = Self(1);

    /// Create a new node ID, rejecting 0.
    pub fn new(raw: u64) -> Result<Self, LayoutModelError> {
        if raw == 0 {
            return Err(LayoutModelError::ZeroNodeId);
        }
        Ok(Self(raw))
    }

    /// Get the raw numeric value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Return the next ID, or an error on overflow.
    pub fn checked_next(self) -> Result<Self, LayoutModelError> {
        let Some(next) = self.0.checked_add(1) else {
            return Err(LayoutModelError::NodeIdOverflow { current: self });
        };
        Self::new(next)
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::MIN
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Deterministic allocator for node IDs.
///
/// Replaying the same operation stream from the same baseline always hands
/// out the same IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeIdAllocator {
    next: NodeId,
}

impl NodeIdAllocator {
    /// Start allocating from a known ID.
    #[must_use]
    pub const fn with_next(next: NodeId) -> Self {
        Self { next }
    }

    /// Peek at the next ID without consuming.
    #[must_use]
    pub const fn peek(&self) -> NodeId {
        self.next
    }

    /// Allocate the next ID and advance.
    pub fn allocate(&mut self) -> Result<NodeId, LayoutModelError> {
        let current = self.next;
        self.next = self.next.checked_next()?;
        Ok(current)
    }
}

impl Default for NodeIdAllocator {
    fn default() -> Self {
        Self { next: NodeId::MIN }
    }
}

pub(crate) mod parent_sentinel {
    //! `Option<NodeId>` persisted with `0` standing for "no parent".

    use serde::{Deserialize, Deserializer, Serializer};

    use super::NodeId;

    pub(crate) fn serialize<S>(parent: &Option<NodeId>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(parent.map_or(0, NodeId::get))
    }

    pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<Option<NodeId>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<u64>::deserialize(deserializer)?.unwrap_or(0);
        Ok(if raw == 0 { None } else { Some(NodeId(raw)) })
    }
}
