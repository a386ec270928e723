//! The messaging facade.
//!
//! [`IoManager`] is the single entry point application components use to
//! exchange messages: it owns the connection catalog, the endpoint registry,
//! and the queue/network providers, and routes every operation to the right
//! typed endpoint.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use beamline_core::{
    BindingMode, Message, NetworkBinding, NetworkManager, QueueConfig, QueueRegistry,
    TransportAddress,
};

use crate::catalog::{ConnectionCatalog, ConnectionDescriptor, ConnectionKind};
use crate::endpoint::{Endpoint, ReceiverHandle, SenderHandle};
use crate::error::{EndpointError, IoResult};
use crate::registry::EndpointRegistry;

/// Unified messaging facade.
///
/// Components ask the manager for typed sender/receiver handles by
/// connection name; whether a connection is realized by an in-process queue
/// or a network transport is decided by its descriptor, not by the caller.
///
/// `IoManager` is not `Clone`. Deployments that want process-wide state use
/// [`IoManager::global`], which hands out one `&'static` instance so every
/// handle flows through the same catalog and registry; tests and embedded
/// uses construct owned instances instead.
///
/// ```compile_fail
/// use beamline::IoManager;
///
/// fn assert_clone<T: Clone>(_: T) {}
/// assert_clone(IoManager::new()); // IoManager is not Clone
/// ```
pub struct IoManager {
    catalog: ConnectionCatalog,
    registry: EndpointRegistry,
    queues: QueueRegistry,
    network: NetworkManager,
}

impl IoManager {
    /// Create an unconfigured manager.
    pub fn new() -> Self {
        Self {
            catalog: ConnectionCatalog::new(),
            registry: EndpointRegistry::new(),
            queues: QueueRegistry::new(),
            network: NetworkManager::new(),
        }
    }

    /// The process-wide manager instance.
    pub fn global() -> &'static IoManager {
        static GLOBAL: OnceLock<IoManager> = OnceLock::new();
        GLOBAL.get_or_init(IoManager::new)
    }

    /// Configure the connection set.
    ///
    /// Populates the catalog and configures the queue and network providers
    /// from the descriptors' addresses. Configuring again with an identical
    /// descriptor set is a no-op; a different set is accepted only while no
    /// endpoint handles are live, and then replaces the configuration.
    ///
    /// # Errors
    ///
    /// `DuplicateName` on repeated names, `InvalidAddress` when an address
    /// is malformed for its kind, `InUse` when reconfiguring with live
    /// handles.
    pub fn configure(&self, descriptors: &[ConnectionDescriptor]) -> IoResult<()> {
        if self.catalog.is_configured() {
            if self.catalog.matches(descriptors) {
                return Ok(());
            }
            self.registry.reset()?;
        }

        self.catalog.configure(descriptors)?;

        let mut queue_configs = HashMap::new();
        let mut bindings = Vec::new();
        for descriptor in descriptors {
            match descriptor.kind {
                ConnectionKind::Queue => {
                    let config = QueueConfig::from_address(&descriptor.address)
                        .map_err(|_| invalid_address(descriptor))?;
                    queue_configs.insert(descriptor.name.clone(), config);
                }
                kind => {
                    let address = TransportAddress::parse(&descriptor.address)
                        .map_err(|_| invalid_address(descriptor))?;
                    bindings.push(NetworkBinding {
                        name: descriptor.name.clone(),
                        address,
                        mode: if kind.is_pubsub() {
                            BindingMode::PublishSubscribe
                        } else {
                            BindingMode::PointToPoint
                        },
                    });
                }
            }
        }

        self.queues.configure(queue_configs);
        self.network.configure(bindings);
        tracing::debug!(connections = descriptors.len(), "configured");
        Ok(())
    }

    /// Tear down the registry, the providers, and the catalog.
    ///
    /// # Errors
    ///
    /// `InUse` while any endpoint handle is still held or any delivery
    /// thread is live; nothing is torn down in that case.
    pub fn reset(&self) -> IoResult<()> {
        self.registry.reset()?;
        self.queues.reset();
        self.network.reset();
        self.catalog.reset();
        Ok(())
    }

    /// Tear down unconditionally: delivery loops are stopped, all state is
    /// cleared. Outstanding handles keep working but are no longer shared
    /// with later requests.
    pub fn force_reset(&self) {
        self.registry.force_reset();
        self.queues.reset();
        self.network.reset();
        self.catalog.reset();
    }

    /// Resolve the sending view of connection `name` for payload type `T`.
    ///
    /// Repeated calls return handles to the same underlying endpoint.
    ///
    /// # Errors
    ///
    /// `UnknownConnection` for unconfigured names, `TypeMismatch` when the
    /// descriptor's payload tag disagrees with `T`.
    pub fn get_sender<T: Message>(&self, name: &str) -> IoResult<SenderHandle<T>> {
        Ok(SenderHandle::new(self.resolve::<T>(name)?))
    }

    /// Resolve the receiving view of connection `name` for payload type `T`.
    ///
    /// Repeated calls return handles to the same underlying endpoint.
    ///
    /// # Errors
    ///
    /// As [`get_sender`](Self::get_sender).
    pub fn get_receiver<T: Message>(&self, name: &str) -> IoResult<ReceiverHandle<T>> {
        Ok(ReceiverHandle::new(self.resolve::<T>(name)?))
    }

    /// Register `callback` on connection `name`, replacing any existing one,
    /// and start the endpoint's delivery thread.
    ///
    /// While registered, direct `receive` calls on the endpoint are refused.
    /// The callback must not call [`remove_callback`](Self::remove_callback)
    /// for its own endpoint; it may freely send on any connection.
    ///
    /// # Errors
    ///
    /// As [`get_sender`](Self::get_sender), plus `DeliveryThread` when the
    /// thread cannot be spawned.
    pub fn add_callback<T: Message>(
        &self,
        name: &str,
        callback: impl FnMut(T) + Send + 'static,
    ) -> IoResult<()> {
        self.resolve::<T>(name)?.add_callback(callback)
    }

    /// Stop the delivery thread of connection `name` and clear its callback
    /// slot. Idempotent: removing an absent callback is a no-op.
    ///
    /// Blocks until the delivery thread has observed the shutdown flag and
    /// exited (bounded by one delivery tick).
    ///
    /// # Errors
    ///
    /// As [`get_sender`](Self::get_sender).
    pub fn remove_callback<T: Message>(&self, name: &str) -> IoResult<()> {
        self.resolve::<T>(name)?.remove_callback();
        Ok(())
    }

    /// Number of live endpoints in the registry.
    pub fn endpoint_count(&self) -> usize {
        self.registry.len()
    }

    fn resolve<T: Message>(&self, name: &str) -> IoResult<Arc<Endpoint<T>>> {
        self.registry
            .resolve::<T>(&self.catalog, &self.queues, &self.network, name)
    }
}

impl Default for IoManager {
    fn default() -> Self {
        Self::new()
    }
}

fn invalid_address(descriptor: &ConnectionDescriptor) -> EndpointError {
    EndpointError::InvalidAddress {
        name: descriptor.name.clone(),
        kind: descriptor.kind,
        address: descriptor.address.clone(),
    }
}
