//! Endpoint registry: one live endpoint per `(connection name, payload type)`.
//!
//! The registry caches endpoints so every caller asking for the same
//! connection and payload type converges on the same queue or transport
//! binding, and so at most one delivery loop can exist per endpoint.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use beamline_core::{Message, NetworkManager, QueueRegistry};

use crate::catalog::{ConnectionCatalog, ConnectionKind};
use crate::endpoint::Endpoint;
use crate::error::{EndpointError, IoResult};

/// Cache key: endpoint identity is the connection name plus the compile-time
/// payload type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct EndpointKey {
    name: String,
    payload: TypeId,
}

/// Type-erased cache entry.
trait RegistryEntry: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn connection_name(&self) -> &str;
    /// Whether the endpoint is externally referenced or has a live delivery
    /// thread.
    fn in_use(&self) -> bool;
    /// Tear down the delivery loop (forced-reset path).
    fn teardown(&self);
}

struct TypedEntry<T: Message>(Arc<Endpoint<T>>);

impl<T: Message> RegistryEntry for TypedEntry<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn connection_name(&self) -> &str {
        self.0.name()
    }

    fn in_use(&self) -> bool {
        Arc::strong_count(&self.0) > 1 || self.0.has_callback()
    }

    fn teardown(&self) {
        self.0.remove_callback();
    }
}

/// Cache of live endpoints.
pub(crate) struct EndpointRegistry {
    entries: Mutex<HashMap<EndpointKey, Box<dyn RegistryEntry>>>,
}

impl EndpointRegistry {
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve `(name, T)` to its shared endpoint, constructing the right
    /// variant on first request.
    pub(crate) fn resolve<T: Message>(
        &self,
        catalog: &ConnectionCatalog,
        queues: &QueueRegistry,
        network: &NetworkManager,
        name: &str,
    ) -> IoResult<Arc<Endpoint<T>>> {
        let descriptor = catalog.lookup(name)?;

        // An empty tag is a wildcard matching any payload type.
        if !descriptor.type_tag.is_empty() && descriptor.type_tag != T::type_label() {
            return Err(EndpointError::TypeMismatch {
                name: name.to_string(),
                expected: descriptor.type_tag.clone(),
                requested: T::type_label(),
            });
        }

        let key = EndpointKey {
            name: name.to_string(),
            payload: TypeId::of::<T>(),
        };

        let mut entries = self.lock_entries();
        if let Some(entry) = entries.get(&key) {
            // The key carries T's TypeId, so the entry is always TypedEntry<T>.
            let typed = entry
                .as_any()
                .downcast_ref::<TypedEntry<T>>()
                .ok_or_else(|| EndpointError::TypeMismatch {
                    name: name.to_string(),
                    expected: descriptor.type_tag.clone(),
                    requested: T::type_label(),
                })?;
            return Ok(Arc::clone(&typed.0));
        }

        let endpoint = Arc::new(match descriptor.kind {
            ConnectionKind::Queue => Endpoint::queue(name, queues),
            _ => Endpoint::network(&descriptor, network),
        });

        entries.insert(key, Box::new(TypedEntry(Arc::clone(&endpoint))));
        tracing::debug!(
            connection = name,
            payload = T::type_label(),
            kind = ?descriptor.kind,
            "created endpoint"
        );
        Ok(endpoint)
    }

    /// Drop every cached endpoint.
    ///
    /// # Errors
    ///
    /// [`EndpointError::InUse`] while any endpoint is externally referenced
    /// or has a live delivery thread; nothing is dropped in that case.
    pub(crate) fn reset(&self) -> IoResult<()> {
        let mut entries = self.lock_entries();

        let mut held: Vec<&str> = entries
            .values()
            .filter(|entry| entry.in_use())
            .map(|entry| entry.connection_name())
            .collect();
        if !held.is_empty() {
            held.sort_unstable();
            held.dedup();
            return Err(EndpointError::InUse {
                names: held.join(", "),
            });
        }

        entries.clear();
        Ok(())
    }

    /// Tear down every delivery loop and drop the cache unconditionally.
    /// Outstanding handles keep working but are no longer shared.
    pub(crate) fn force_reset(&self) {
        let mut entries = self.lock_entries();
        for entry in entries.values() {
            entry.teardown();
        }
        entries.clear();
    }

    /// Number of cached endpoints.
    pub(crate) fn len(&self) -> usize {
        self.lock_entries().len()
    }

    fn lock_entries(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<EndpointKey, Box<dyn RegistryEntry>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
