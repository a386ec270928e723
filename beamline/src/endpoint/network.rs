//! Network-backed endpoint: send/receive over a point-to-point or pub/sub
//! transport, with wire serialization.

use std::io;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use beamline_core::{
    Frame, Message, NetworkManager, Timeout, TransportError, TransportReceiver, TransportSender,
    TransportSubscriber,
};

use crate::catalog::{ConnectionDescriptor, ConnectionKind};
use crate::endpoint::DeliveryCallback;
use crate::error::{EndpointError, IoResult};

/// Delivery-loop tick. Network transports cancel finely, so the loop polls
/// much faster than the queue variant.
const NETWORK_TICK_MS: i64 = 1;

/// Receiving side of a network endpoint, shared with the delivery thread.
///
/// Holds at most one of the two binding flavors; the subscriber is preferred
/// when both are somehow present. Reads are serialized by the per-endpoint
/// receive lock.
struct ReadSide {
    name: String,
    receiver: Option<TransportReceiver>,
    subscriber: Option<TransportSubscriber>,
    lock: Mutex<()>,
}

impl ReadSide {
    fn read_frame(&self, timeout: Timeout) -> Result<Frame, TransportError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(subscriber) = &self.subscriber {
            return subscriber.receive(timeout);
        }
        if let Some(receiver) = &self.receiver {
            return receiver.receive(timeout);
        }
        Err(TransportError::UnknownBinding {
            name: self.name.clone(),
        })
    }
}

/// Endpoint over a network transport binding.
pub(crate) struct NetworkEndpoint<T: Message> {
    name: String,
    sender: Option<TransportSender>,
    send_lock: Mutex<()>,
    read: Arc<ReadSide>,
    _payload: PhantomData<fn() -> T>,
}

impl<T: Message> NetworkEndpoint<T> {
    /// Bind transport resources for `descriptor`.
    ///
    /// Topic semantics follow the descriptor kind: a `NetSubscriber`
    /// connection binds a subscriber keyed by the connection name, a
    /// `NetReceiver` binds a point-to-point receiver. Missing bindings are
    /// tolerated here and surface as `InstanceNotFound` when the endpoint
    /// is used.
    pub(crate) fn new(descriptor: &ConnectionDescriptor, network: &NetworkManager) -> Self {
        let name = descriptor.name.as_str();
        let sender = network.get_sender(name).ok();

        let (receiver, subscriber) = match descriptor.kind {
            ConnectionKind::NetReceiver => (network.get_receiver(name).ok(), None),
            ConnectionKind::NetSubscriber => (None, network.get_subscriber(name).ok()),
            _ => (None, None),
        };

        Self {
            name: name.to_string(),
            sender,
            send_lock: Mutex::new(()),
            read: Arc::new(ReadSide {
                name: name.to_string(),
                receiver,
                subscriber,
                lock: Mutex::new(()),
            }),
            _payload: PhantomData,
        }
    }

    pub(crate) fn send(&self, value: T, timeout: Timeout, topic: &str) -> IoResult<()> {
        if !T::is_serializable() {
            return Err(EndpointError::NotSerializable {
                name: self.name.clone(),
                label: T::type_label(),
            });
        }

        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| EndpointError::InstanceNotFound {
                name: self.name.clone(),
                facility: "transport",
            })?;

        let bytes = value.encode_wire().map_err(|source| EndpointError::Codec {
            name: self.name.clone(),
            source,
        })?;

        let _guard = self.send_lock.lock().unwrap_or_else(PoisonError::into_inner);
        sender
            .send(&bytes, timeout, topic)
            .map_err(|e| EndpointError::from_transport(&self.name, "send", e))
    }

    pub(crate) fn receive(&self, timeout: Timeout) -> IoResult<T> {
        // Non-serializable traffic is dropped silently on receive: the
        // caller gets a default-constructed value, never an error.
        if !T::is_serializable() {
            return Ok(T::default());
        }

        let frame = self
            .read
            .read_frame(timeout)
            .map_err(|e| EndpointError::from_transport(&self.name, "receive", e))?;

        if frame.payload.is_empty() {
            return Err(EndpointError::Timeout {
                name: self.name.clone(),
                operation: "receive",
                millis: timeout.as_millis(),
            });
        }

        T::decode_wire(&frame.payload).map_err(|source| EndpointError::Codec {
            name: self.name.clone(),
            source,
        })
    }

    /// Start the delivery thread. Transport errors other than a timed-out
    /// tick are survivable: the loop logs and continues until `active`
    /// clears. For non-serializable payloads the callback never fires.
    pub(crate) fn spawn_delivery(
        &self,
        active: Arc<AtomicBool>,
        mut callback: DeliveryCallback<T>,
    ) -> io::Result<JoinHandle<()>> {
        let read = Arc::clone(&self.read);
        let serializable = T::is_serializable();
        let tick = Duration::from_millis(NETWORK_TICK_MS as u64);

        std::thread::Builder::new()
            .name(format!("beamline-cb-{}", self.name))
            .spawn(move || {
                while active.load(Ordering::Acquire) {
                    if !serializable {
                        std::thread::sleep(tick);
                        continue;
                    }

                    match read.read_frame(Timeout::from_millis(NETWORK_TICK_MS)) {
                        Ok(frame) if frame.payload.is_empty() => {}
                        Ok(frame) => match T::decode_wire(&frame.payload) {
                            Ok(value) => callback(value),
                            Err(err) => {
                                tracing::warn!(
                                    connection = %read.name,
                                    error = %err,
                                    "dropping undecodable frame"
                                );
                            }
                        },
                        // An empty tick is normal.
                        Err(TransportError::ReceiveTimeout { .. }) => {}
                        Err(err) => {
                            tracing::debug!(
                                connection = %read.name,
                                error = %err,
                                "transport error in delivery loop"
                            );
                            std::thread::sleep(tick);
                        }
                    }
                }
            })
    }
}
