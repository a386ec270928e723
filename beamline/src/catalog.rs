//! Connection catalog: named connection descriptors.
//!
//! The catalog is pure metadata. It is populated once by
//! [`IoManager::configure`](crate::IoManager::configure), read-only
//! afterwards, and holds no runtime state.

use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock};

use beamline_core::{QueueConfig, TransportAddress};
use serde::{Deserialize, Serialize};

use crate::error::{EndpointError, IoResult};

/// Transport realization of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionKind {
    /// Bounded in-process queue.
    Queue,
    /// Network point-to-point, sending side.
    NetSender,
    /// Network point-to-point, consuming side.
    NetReceiver,
    /// Network pub/sub, publishing side.
    NetPublisher,
    /// Network pub/sub, subscribing side.
    NetSubscriber,
}

impl ConnectionKind {
    /// Whether this kind is realized by a network transport.
    pub fn is_network(&self) -> bool {
        !matches!(self, ConnectionKind::Queue)
    }

    /// Whether this kind carries pub/sub topic semantics.
    pub fn is_pubsub(&self) -> bool {
        matches!(self, ConnectionKind::NetPublisher | ConnectionKind::NetSubscriber)
    }
}

/// One named connection.
///
/// Descriptors are deployment configuration; they serialize so connection
/// maps can be loaded from JSON. Immutable once registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionDescriptor {
    /// Connection name, unique within a catalog.
    pub name: String,
    /// Transport realization.
    pub kind: ConnectionKind,
    /// Payload label matched against the caller's type. Empty matches any
    /// payload type.
    pub type_tag: String,
    /// Locator: `queue://<backend>:<capacity>` for queues,
    /// `inproc://<label>` for network kinds.
    pub address: String,
}

impl ConnectionDescriptor {
    /// Create a descriptor.
    pub fn new(
        name: impl Into<String>,
        kind: ConnectionKind,
        type_tag: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            type_tag: type_tag.into(),
            address: address.into(),
        }
    }

    fn validate(&self) -> IoResult<()> {
        let invalid = || EndpointError::InvalidAddress {
            name: self.name.clone(),
            kind: self.kind,
            address: self.address.clone(),
        };

        match self.kind {
            ConnectionKind::Queue => {
                QueueConfig::from_address(&self.address).map_err(|_| invalid())?;
            }
            _ => {
                TransportAddress::parse(&self.address).map_err(|_| invalid())?;
            }
        }
        Ok(())
    }
}

/// The set of configured connections.
///
/// Read-mostly: `configure` replaces the whole map, `lookup` takes a read
/// lock only.
pub(crate) struct ConnectionCatalog {
    entries: RwLock<Option<HashMap<String, ConnectionDescriptor>>>,
}

impl ConnectionCatalog {
    pub(crate) fn new() -> Self {
        Self {
            entries: RwLock::new(None),
        }
    }

    /// Replace the catalog contents after validating names and addresses.
    pub(crate) fn configure(&self, descriptors: &[ConnectionDescriptor]) -> IoResult<()> {
        let mut seen = HashSet::with_capacity(descriptors.len());
        for descriptor in descriptors {
            if !seen.insert(descriptor.name.as_str()) {
                return Err(EndpointError::DuplicateName {
                    name: descriptor.name.clone(),
                });
            }
            descriptor.validate()?;
        }

        let map = descriptors
            .iter()
            .map(|d| (d.name.clone(), d.clone()))
            .collect();
        *self.write() = Some(map);
        Ok(())
    }

    pub(crate) fn lookup(&self, name: &str) -> IoResult<ConnectionDescriptor> {
        self.read()
            .as_ref()
            .and_then(|entries| entries.get(name))
            .cloned()
            .ok_or_else(|| EndpointError::UnknownConnection {
                name: name.to_string(),
            })
    }

    pub(crate) fn is_configured(&self) -> bool {
        self.read().is_some()
    }

    /// Whether `descriptors` describes exactly the configured set.
    pub(crate) fn matches(&self, descriptors: &[ConnectionDescriptor]) -> bool {
        match self.read().as_ref() {
            None => false,
            Some(entries) => {
                entries.len() == descriptors.len()
                    && descriptors
                        .iter()
                        .all(|d| entries.get(&d.name).is_some_and(|e| e == d))
            }
        }
    }

    pub(crate) fn reset(&self) {
        *self.write() = None;
    }

    fn read(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, Option<HashMap<String, ConnectionDescriptor>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, Option<HashMap<String, ConnectionDescriptor>>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}
