//! Tagged entity lock keys.

use std::fmt;

use enrollhub_core::types::{ConsumerId, ResourceId};

/// Key of an exclusive entity lock.
///
/// Consumer and resource keys share one keyspace. The derived ordering is
/// the global acquisition order: every consumer key sorts before every
/// resource key, then by identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LockKey {
    /// Serializes ledger updates for one consumer.
    Consumer(ConsumerId),
    /// Serializes capacity updates for one resource.
    Resource(ResourceId),
}

impl LockKey {
    /// Lock key for a consumer.
    pub fn consumer(id: &ConsumerId) -> Self {
        Self::Consumer(id.clone())
    }

    /// Lock key for a resource.
    pub fn resource(id: ResourceId) -> Self {
        Self::Resource(id)
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockKey::Consumer(id) => write!(f, "consumer:{id}"),
            LockKey::Resource(id) => write!(f, "resource:{id}"),
        }
    }
}
