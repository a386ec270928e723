//! Transport-polymorphic typed endpoints.
//!
//! An [`Endpoint`] is the shared object behind every handle for one
//! `(connection name, payload type)` pair. It is one of two variants (queue
//! or network) plus the callback delivery machinery common to both:
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ Endpoint<T>                                  │
//! │                                              │
//! │  ┌──────────────┐   ┌─────────────────────┐  │
//! │  │ QueueEndpoint│ or│ NetworkEndpoint     │  │
//! │  └──────────────┘   └─────────────────────┘  │
//! │                                              │
//! │  ┌────────────────────────────────────────┐  │
//! │  │ DeliveryLoop                           │  │
//! │  │  with-callback flag (atomic)           │  │
//! │  │  delivery thread (join on remove)      │  │
//! │  └────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Callers hold [`SenderHandle`] / [`ReceiverHandle`] views over a shared
//! `Arc<Endpoint<T>>`; the registry holds one more reference so repeated
//! requests converge on the same endpoint.

mod network;
mod queue;

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use beamline_core::{Message, NetworkManager, QueueRegistry, Timeout};

use crate::catalog::ConnectionDescriptor;
use crate::error::{EndpointError, IoResult};

pub(crate) use network::NetworkEndpoint;
pub(crate) use queue::QueueEndpoint;

/// Callback invoked with each delivered value.
pub(crate) type DeliveryCallback<T> = Box<dyn FnMut(T) + Send + 'static>;

/// Callback lifecycle shared by both endpoint variants.
///
/// Invariant: while the with-callback flag is set, the delivery thread is
/// alive; after `remove` returns, the flag is clear and the thread has been
/// joined.
struct DeliveryLoop {
    active: Arc<AtomicBool>,
    runner: Mutex<Option<JoinHandle<()>>>,
}

impl DeliveryLoop {
    fn new() -> Self {
        Self {
            active: Arc::new(AtomicBool::new(false)),
            runner: Mutex::new(None),
        }
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Replace any existing callback, then spawn a fresh delivery thread.
    fn install(
        &self,
        name: &str,
        spawn: impl FnOnce(Arc<AtomicBool>) -> io::Result<JoinHandle<()>>,
    ) -> IoResult<()> {
        let mut runner = self.lock_runner();
        Self::stop_locked(&self.active, &mut runner, name);

        self.active.store(true, Ordering::Release);
        match spawn(Arc::clone(&self.active)) {
            Ok(handle) => {
                *runner = Some(handle);
                Ok(())
            }
            Err(source) => {
                self.active.store(false, Ordering::Release);
                Err(EndpointError::DeliveryThread {
                    name: name.to_string(),
                    source,
                })
            }
        }
    }

    /// Clear the flag and join the delivery thread. Idempotent; never fails.
    fn remove(&self, name: &str) {
        let mut runner = self.lock_runner();
        Self::stop_locked(&self.active, &mut runner, name);
    }

    fn stop_locked(
        active: &AtomicBool,
        runner: &mut Option<JoinHandle<()>>,
        name: &str,
    ) {
        active.store(false, Ordering::Release);
        if let Some(handle) = runner.take()
            && handle.join().is_err()
        {
            tracing::warn!(connection = name, "delivery thread could not be joined");
        }
    }

    fn lock_runner(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.runner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The two transport realizations behind one typed endpoint.
enum EndpointKind<T: Message> {
    Queue(QueueEndpoint<T>),
    Network(NetworkEndpoint<T>),
}

/// Shared state for one `(connection name, payload type)` pair.
pub(crate) struct Endpoint<T: Message> {
    name: String,
    kind: EndpointKind<T>,
    delivery: DeliveryLoop,
}

impl<T: Message> Endpoint<T> {
    pub(crate) fn queue(name: &str, queues: &QueueRegistry) -> Self {
        Self {
            name: name.to_string(),
            kind: EndpointKind::Queue(QueueEndpoint::new(name, queues)),
            delivery: DeliveryLoop::new(),
        }
    }

    pub(crate) fn network(descriptor: &ConnectionDescriptor, network: &NetworkManager) -> Self {
        Self {
            name: descriptor.name.clone(),
            kind: EndpointKind::Network(NetworkEndpoint::new(descriptor, network)),
            delivery: DeliveryLoop::new(),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn send(&self, value: T, timeout: Timeout, topic: &str) -> IoResult<()> {
        match &self.kind {
            EndpointKind::Queue(endpoint) => endpoint.send(value, timeout, topic),
            EndpointKind::Network(endpoint) => endpoint.send(value, timeout, topic),
        }
    }

    /// Like [`send`](Self::send): a timeout yields `false`; other failures
    /// are reported out-of-band and yield `false`.
    pub(crate) fn try_send(&self, value: T, timeout: Timeout, topic: &str) -> bool {
        match self.send(value, timeout, topic) {
            Ok(()) => true,
            Err(EndpointError::Timeout { .. }) => false,
            Err(err) => {
                tracing::error!(connection = %self.name, error = %err, "try_send failed");
                false
            }
        }
    }

    pub(crate) fn receive(&self, timeout: Timeout) -> IoResult<T> {
        if self.delivery.is_active() {
            return Err(EndpointError::CallbackConflict {
                name: self.name.clone(),
            });
        }

        match &self.kind {
            EndpointKind::Queue(endpoint) => endpoint.receive(timeout),
            EndpointKind::Network(endpoint) => endpoint.receive(timeout),
        }
    }

    /// Register `callback`, replacing any existing one, and start the
    /// delivery thread.
    pub(crate) fn add_callback(
        &self,
        callback: impl FnMut(T) + Send + 'static,
    ) -> IoResult<()> {
        let callback: DeliveryCallback<T> = Box::new(callback);
        self.delivery.install(&self.name, |active| match &self.kind {
            EndpointKind::Queue(endpoint) => endpoint.spawn_delivery(active, callback),
            EndpointKind::Network(endpoint) => endpoint.spawn_delivery(active, callback),
        })
    }

    /// Stop the delivery thread and clear the callback slot. Idempotent.
    ///
    /// Must not be called from inside the endpoint's own callback: the
    /// delivery thread would join itself.
    pub(crate) fn remove_callback(&self) {
        self.delivery.remove(&self.name);
    }

    pub(crate) fn has_callback(&self) -> bool {
        self.delivery.is_active()
    }
}

impl<T: Message> Drop for Endpoint<T> {
    fn drop(&mut self) {
        self.delivery.remove(&self.name);
    }
}

/// Sending view of a shared endpoint.
///
/// Obtained from [`IoManager::get_sender`](crate::IoManager::get_sender);
/// cloning shares the same underlying endpoint.
pub struct SenderHandle<T: Message> {
    endpoint: Arc<Endpoint<T>>,
}

impl<T: Message> SenderHandle<T> {
    pub(crate) fn new(endpoint: Arc<Endpoint<T>>) -> Self {
        Self { endpoint }
    }

    /// The connection name this handle was resolved from.
    pub fn name(&self) -> &str {
        self.endpoint.name()
    }

    /// Send a value, consuming it, waiting up to `timeout`.
    ///
    /// # Errors
    ///
    /// `Timeout` past the deadline, `InstanceNotFound` without a binding,
    /// `NotSerializable` for non-serializable payloads on network
    /// connections.
    pub fn send(&self, value: T, timeout: Timeout) -> IoResult<()> {
        self.endpoint.send(value, timeout, "")
    }

    /// Send a value under a pub/sub topic.
    ///
    /// Queue connections warn and ignore the topic.
    ///
    /// # Errors
    ///
    /// As [`send`](Self::send).
    pub fn send_with_topic(&self, value: T, timeout: Timeout, topic: &str) -> IoResult<()> {
        self.endpoint.send(value, timeout, topic)
    }

    /// Send a value, reporting failure as `false`. Timeouts are silent;
    /// other failures are logged out-of-band.
    pub fn try_send(&self, value: T, timeout: Timeout) -> bool {
        self.endpoint.try_send(value, timeout, "")
    }

    /// [`try_send`](Self::try_send) under a pub/sub topic.
    pub fn try_send_with_topic(&self, value: T, timeout: Timeout, topic: &str) -> bool {
        self.endpoint.try_send(value, timeout, topic)
    }
}

impl<T: Message> Clone for SenderHandle<T> {
    fn clone(&self) -> Self {
        Self {
            endpoint: Arc::clone(&self.endpoint),
        }
    }
}

impl<T: Message> std::fmt::Debug for SenderHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SenderHandle")
            .field("connection", &self.endpoint.name())
            .field("payload", &T::type_label())
            .finish()
    }
}

/// Receiving view of a shared endpoint.
///
/// Obtained from [`IoManager::get_receiver`](crate::IoManager::get_receiver);
/// cloning shares the same underlying endpoint.
pub struct ReceiverHandle<T: Message> {
    endpoint: Arc<Endpoint<T>>,
}

impl<T: Message> ReceiverHandle<T> {
    pub(crate) fn new(endpoint: Arc<Endpoint<T>>) -> Self {
        Self { endpoint }
    }

    /// The connection name this handle was resolved from.
    pub fn name(&self) -> &str {
        self.endpoint.name()
    }

    /// Receive one value, waiting up to `timeout`.
    ///
    /// On a network connection a non-serializable payload type yields a
    /// default-constructed value immediately (such traffic is dropped
    /// silently on receive).
    ///
    /// # Errors
    ///
    /// `CallbackConflict` while a callback is registered, `Timeout` past the
    /// deadline, `InstanceNotFound` without a binding.
    pub fn receive(&self, timeout: Timeout) -> IoResult<T> {
        self.endpoint.receive(timeout)
    }
}

impl<T: Message> Clone for ReceiverHandle<T> {
    fn clone(&self) -> Self {
        Self {
            endpoint: Arc::clone(&self.endpoint),
        }
    }
}

impl<T: Message> std::fmt::Debug for ReceiverHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceiverHandle")
            .field("connection", &self.endpoint.name())
            .field("payload", &T::type_label())
            .finish()
    }
}
