//! Network manager and in-process transport.
//!
//! The network manager maps connection names to transport bindings and hands
//! out sender, receiver, and subscriber primitives:
//!
//! - **Point-to-point** routes buffer frames in a bounded channel keyed by
//!   address. Senders can push before any receiver exists; one consumer
//!   drains the route.
//! - **Publish/subscribe** routes fan each frame out to every subscriber
//!   whose topic filter prefix-matches the frame's topic (an empty filter
//!   matches everything). Each matching subscriber must accept its copy
//!   within the send timeout; frames published with no matching subscriber
//!   are dropped.
//!
//! Only `inproc://` addresses are realized in-tree; this module is the seam
//! where an external transport would bind.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::timeout::Timeout;

/// Frames buffered per point-to-point route or per subscriber.
const ROUTE_DEPTH: usize = 1024;

/// Transport error types.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// No frame arrived within the deadline.
    #[error("transport receive timed out after {millis} ms")]
    ReceiveTimeout {
        /// The deadline that elapsed, in milliseconds.
        millis: i64,
    },

    /// The route could not accept the frame within the deadline.
    #[error("transport send timed out after {millis} ms")]
    SendTimeout {
        /// The deadline that elapsed, in milliseconds.
        millis: i64,
    },

    /// No binding is configured under the requested name.
    #[error("no network binding named {name:?}")]
    UnknownBinding {
        /// The requested binding name.
        name: String,
    },
}

/// Malformed transport address.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid transport address {address:?}: expected inproc://<label>")]
pub struct TransportAddressError {
    /// The address that failed to parse.
    pub address: String,
}

/// Validated transport locator.
///
/// Currently only in-process routes (`inproc://<label>`) are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TransportAddress(String);

impl TransportAddress {
    /// Parse and validate an address string.
    ///
    /// # Errors
    ///
    /// Returns [`TransportAddressError`] unless the address is
    /// `inproc://<label>` with a non-empty label.
    pub fn parse(address: &str) -> Result<Self, TransportAddressError> {
        match address.strip_prefix("inproc://") {
            Some(label) if !label.is_empty() => Ok(Self(address.to_string())),
            _ => Err(TransportAddressError {
                address: address.to_string(),
            }),
        }
    }

    /// The address as originally written.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TransportAddress {
    type Error = TransportAddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TransportAddress> for String {
    fn from(value: TransportAddress) -> Self {
        value.0
    }
}

impl std::fmt::Display for TransportAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Delivery discipline of one binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BindingMode {
    /// One buffered route, one consumer.
    PointToPoint,
    /// Fan-out to topic-filtered subscribers, each bounded by the send
    /// timeout; no buffering without subscribers.
    PublishSubscribe,
}

/// One named transport binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkBinding {
    /// Binding name; for pub/sub bindings this doubles as the topic key
    /// subscribers resolve.
    pub name: String,
    /// Route address. Bindings sharing an address share a route.
    pub address: TransportAddress,
    /// Delivery discipline.
    pub mode: BindingMode,
}

/// One message crossing a route: an opaque topic header plus payload bytes.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Opaque routing string; empty outside pub/sub traffic.
    pub topic: String,
    /// Payload bytes.
    pub payload: Vec<u8>,
}

struct SubscriberEntry {
    filter: String,
    tx: crossbeam_channel::Sender<Frame>,
}

/// Shared per-address route state.
struct Route {
    address: TransportAddress,
    p2p_tx: crossbeam_channel::Sender<Frame>,
    p2p_rx: crossbeam_channel::Receiver<Frame>,
    subscribers: Mutex<Vec<SubscriberEntry>>,
}

impl Route {
    fn new(address: TransportAddress) -> Self {
        let (p2p_tx, p2p_rx) = crossbeam_channel::bounded(ROUTE_DEPTH);
        Self {
            address,
            p2p_tx,
            p2p_rx,
            subscribers: Mutex::new(Vec::new()),
        }
    }

    fn lock_subscribers(&self) -> std::sync::MutexGuard<'_, Vec<SubscriberEntry>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Fan a frame out to every subscriber whose filter matches.
    ///
    /// Every matching subscriber must accept the frame within `timeout`;
    /// delivery proceeds to the remaining subscribers even after one stays
    /// full, and the send then fails with `SendTimeout`. Dropped subscribers
    /// are unregistered. Publishing with no matching subscriber delivers
    /// nowhere and succeeds.
    fn fan_out(&self, frame: &Frame, timeout: Timeout) -> Result<(), TransportError> {
        let mut timed_out = false;

        let mut subscribers = self.lock_subscribers();
        subscribers.retain(|entry| {
            if !frame.topic.starts_with(&entry.filter) {
                return true;
            }
            match deliver(&entry.tx, frame.clone(), timeout) {
                Delivery::Accepted => true,
                Delivery::Full => {
                    tracing::warn!(
                        address = %self.address,
                        topic = %frame.topic,
                        "subscriber buffer still full past the send deadline"
                    );
                    timed_out = true;
                    true
                }
                // Subscriber handle dropped; unregister it.
                Delivery::Disconnected => false,
            }
        });
        drop(subscribers);

        if timed_out {
            return Err(TransportError::SendTimeout {
                millis: timeout.as_millis(),
            });
        }
        Ok(())
    }

    fn has_subscribers(&self) -> bool {
        !self.lock_subscribers().is_empty()
    }
}

enum Delivery {
    Accepted,
    Full,
    Disconnected,
}

fn deliver(tx: &crossbeam_channel::Sender<Frame>, frame: Frame, timeout: Timeout) -> Delivery {
    use crossbeam_channel::{SendTimeoutError, TrySendError};

    if timeout.is_no_block() {
        match tx.try_send(frame) {
            Ok(()) => Delivery::Accepted,
            Err(TrySendError::Full(_)) => Delivery::Full,
            Err(TrySendError::Disconnected(_)) => Delivery::Disconnected,
        }
    } else if timeout.is_block() {
        match tx.send(frame) {
            Ok(()) => Delivery::Accepted,
            Err(_) => Delivery::Disconnected,
        }
    } else {
        match tx.send_timeout(frame, timeout.as_duration()) {
            Ok(()) => Delivery::Accepted,
            Err(SendTimeoutError::Timeout(_)) => Delivery::Full,
            Err(SendTimeoutError::Disconnected(_)) => Delivery::Disconnected,
        }
    }
}

/// Sending side of one binding.
#[derive(Clone)]
pub struct TransportSender {
    name: String,
    mode: BindingMode,
    route: Arc<Route>,
}

impl TransportSender {
    /// Hand a payload to the route with the supplied topic.
    ///
    /// Point-to-point sends wait up to `timeout` for buffer space. Pub/sub
    /// sends wait up to `timeout` for every matching subscriber to accept
    /// its copy; with no matching subscriber the frame is dropped and the
    /// send succeeds.
    ///
    /// # Errors
    ///
    /// [`TransportError::SendTimeout`] when the route (or any matching
    /// subscriber buffer) stays full past the deadline.
    pub fn send(&self, payload: &[u8], timeout: Timeout, topic: &str) -> Result<(), TransportError> {
        let frame = Frame {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        };

        match self.mode {
            BindingMode::PublishSubscribe => self.route.fan_out(&frame, timeout),
            BindingMode::PointToPoint => {
                // Topic semantics requested on a point-to-point route: the
                // subscribers see the frame instead of the buffered queue.
                if self.route.has_subscribers() {
                    return self.route.fan_out(&frame, timeout);
                }

                match deliver(&self.route.p2p_tx, frame, timeout) {
                    Delivery::Accepted => Ok(()),
                    Delivery::Full | Delivery::Disconnected => {
                        Err(TransportError::SendTimeout {
                            millis: timeout.as_millis(),
                        })
                    }
                }
            }
        }
    }

    /// Like [`send`](Self::send), reporting failure as `false`.
    pub fn try_send(&self, payload: &[u8], timeout: Timeout, topic: &str) -> bool {
        self.send(payload, timeout, topic).is_ok()
    }

    /// The binding name this sender was resolved from.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Consuming side of a point-to-point binding.
#[derive(Clone)]
pub struct TransportReceiver {
    name: String,
    route: Arc<Route>,
}

impl TransportReceiver {
    /// Take one frame from the route, waiting up to `timeout`.
    ///
    /// # Errors
    ///
    /// [`TransportError::ReceiveTimeout`] when no frame arrives in time.
    pub fn receive(&self, timeout: Timeout) -> Result<Frame, TransportError> {
        let timed_out = || TransportError::ReceiveTimeout {
            millis: timeout.as_millis(),
        };

        if timeout.is_no_block() {
            self.route.p2p_rx.try_recv().map_err(|_| timed_out())
        } else if timeout.is_block() {
            self.route.p2p_rx.recv().map_err(|_| timed_out())
        } else {
            self.route
                .p2p_rx
                .recv_timeout(timeout.as_duration())
                .map_err(|_| timed_out())
        }
    }

    /// The binding name this receiver was resolved from.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Topic-filtered consumer registered on a route.
pub struct TransportSubscriber {
    topic: String,
    rx: crossbeam_channel::Receiver<Frame>,
}

impl TransportSubscriber {
    /// Take one matching frame, waiting up to `timeout`.
    ///
    /// # Errors
    ///
    /// [`TransportError::ReceiveTimeout`] when no frame arrives in time.
    pub fn receive(&self, timeout: Timeout) -> Result<Frame, TransportError> {
        let timed_out = || TransportError::ReceiveTimeout {
            millis: timeout.as_millis(),
        };

        if timeout.is_no_block() {
            self.rx.try_recv().map_err(|_| timed_out())
        } else if timeout.is_block() {
            self.rx.recv().map_err(|_| timed_out())
        } else {
            self.rx
                .recv_timeout(timeout.as_duration())
                .map_err(|_| timed_out())
        }
    }

    /// The topic key this subscriber was resolved from.
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

/// Network manager: maps binding names to routes and hands out transport
/// primitives.
pub struct NetworkManager {
    bindings: Mutex<HashMap<String, NetworkBinding>>,
    routes: Mutex<HashMap<TransportAddress, Arc<Route>>>,
}

impl NetworkManager {
    /// Create an unconfigured manager.
    pub fn new() -> Self {
        Self {
            bindings: Mutex::new(HashMap::new()),
            routes: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the set of bindings. Existing routes are dropped; outstanding
    /// transport handles keep their route alive but it is no longer shared
    /// with later requests.
    pub fn configure(&self, bindings: Vec<NetworkBinding>) {
        let mut map = HashMap::with_capacity(bindings.len());
        for binding in bindings {
            map.insert(binding.name.clone(), binding);
        }
        *self.lock_bindings() = map;
        self.lock_routes().clear();
    }

    /// Resolve the sending side of the named binding.
    ///
    /// # Errors
    ///
    /// [`TransportError::UnknownBinding`] when the name is not configured.
    pub fn get_sender(&self, name: &str) -> Result<TransportSender, TransportError> {
        let binding = self.binding(name)?;
        Ok(TransportSender {
            name: name.to_string(),
            mode: binding.mode,
            route: self.route(&binding.address),
        })
    }

    /// Resolve the point-to-point consuming side of the named binding.
    ///
    /// # Errors
    ///
    /// [`TransportError::UnknownBinding`] when the name is not configured.
    pub fn get_receiver(&self, name: &str) -> Result<TransportReceiver, TransportError> {
        let binding = self.binding(name)?;
        Ok(TransportReceiver {
            name: name.to_string(),
            route: self.route(&binding.address),
        })
    }

    /// Register a subscriber on the binding named by `topic`.
    ///
    /// The subscriber receives every frame published on the binding's route
    /// (its filter is empty); frame-level topics remain visible to the
    /// consumer.
    ///
    /// # Errors
    ///
    /// [`TransportError::UnknownBinding`] when no binding carries the topic.
    pub fn get_subscriber(&self, topic: &str) -> Result<TransportSubscriber, TransportError> {
        self.get_subscriber_filtered(topic, "")
    }

    /// Register a subscriber on the binding named by `topic`, delivering only
    /// frames whose topic starts with `filter` (ZeroMQ-style prefix match).
    ///
    /// # Errors
    ///
    /// [`TransportError::UnknownBinding`] when no binding carries the topic.
    pub fn get_subscriber_filtered(
        &self,
        topic: &str,
        filter: &str,
    ) -> Result<TransportSubscriber, TransportError> {
        let binding = self.binding(topic)?;
        let route = self.route(&binding.address);

        let (tx, rx) = crossbeam_channel::bounded(ROUTE_DEPTH);
        route.lock_subscribers().push(SubscriberEntry {
            filter: filter.to_string(),
            tx,
        });
        tracing::debug!(topic, filter, address = %binding.address, "registered subscriber");

        Ok(TransportSubscriber {
            topic: topic.to_string(),
            rx,
        })
    }

    /// Drop all bindings and routes.
    pub fn reset(&self) {
        self.lock_bindings().clear();
        self.lock_routes().clear();
    }

    fn binding(&self, name: &str) -> Result<NetworkBinding, TransportError> {
        self.lock_bindings()
            .get(name)
            .cloned()
            .ok_or_else(|| TransportError::UnknownBinding {
                name: name.to_string(),
            })
    }

    fn route(&self, address: &TransportAddress) -> Arc<Route> {
        let mut routes = self.lock_routes();
        Arc::clone(
            routes
                .entry(address.clone())
                .or_insert_with(|| Arc::new(Route::new(address.clone()))),
        )
    }

    fn lock_bindings(&self) -> std::sync::MutexGuard<'_, HashMap<String, NetworkBinding>> {
        self.bindings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_routes(&self) -> std::sync::MutexGuard<'_, HashMap<TransportAddress, Arc<Route>>> {
        self.routes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for NetworkManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p2p_binding(name: &str, address: &str) -> NetworkBinding {
        NetworkBinding {
            name: name.to_string(),
            address: TransportAddress::parse(address).expect("address"),
            mode: BindingMode::PointToPoint,
        }
    }

    fn pubsub_binding(name: &str, address: &str) -> NetworkBinding {
        NetworkBinding {
            name: name.to_string(),
            address: TransportAddress::parse(address).expect("address"),
            mode: BindingMode::PublishSubscribe,
        }
    }

    #[test]
    fn test_address_parsing() {
        assert!(TransportAddress::parse("inproc://foo").is_ok());
        assert!(TransportAddress::parse("inproc://").is_err());
        assert!(TransportAddress::parse("tcp://127.0.0.1:4000").is_err());
        assert!(TransportAddress::parse("foo").is_err());
    }

    #[test]
    fn test_p2p_roundtrip() {
        let manager = NetworkManager::new();
        manager.configure(vec![p2p_binding("conn", "inproc://foo")]);

        let sender = manager.get_sender("conn").expect("sender");
        let receiver = manager.get_receiver("conn").expect("receiver");

        sender
            .send(b"payload", Timeout::NO_BLOCK, "")
            .expect("send");
        let frame = receiver.receive(Timeout::from_millis(10)).expect("receive");
        assert_eq!(frame.payload, b"payload");
        assert_eq!(frame.topic, "");
    }

    #[test]
    fn test_p2p_buffers_before_receiver_exists() {
        let manager = NetworkManager::new();
        manager.configure(vec![p2p_binding("conn", "inproc://foo")]);

        let sender = manager.get_sender("conn").expect("sender");
        sender.send(b"early", Timeout::NO_BLOCK, "").expect("send");

        let receiver = manager.get_receiver("conn").expect("receiver");
        let frame = receiver.receive(Timeout::NO_BLOCK).expect("receive");
        assert_eq!(frame.payload, b"early");
    }

    #[test]
    fn test_p2p_shared_route_across_names() {
        // Distinct sender/receiver bindings on one address share the route.
        let manager = NetworkManager::new();
        manager.configure(vec![
            p2p_binding("conn_s", "inproc://foo"),
            p2p_binding("conn_r", "inproc://foo"),
        ]);

        let sender = manager.get_sender("conn_s").expect("sender");
        let receiver = manager.get_receiver("conn_r").expect("receiver");

        sender.send(b"cross", Timeout::NO_BLOCK, "").expect("send");
        let frame = receiver.receive(Timeout::from_millis(10)).expect("receive");
        assert_eq!(frame.payload, b"cross");
    }

    #[test]
    fn test_receive_timeout() {
        let manager = NetworkManager::new();
        manager.configure(vec![p2p_binding("conn", "inproc://foo")]);

        let receiver = manager.get_receiver("conn").expect("receiver");
        let result = receiver.receive(Timeout::NO_BLOCK);
        assert!(matches!(
            result,
            Err(TransportError::ReceiveTimeout { millis: 0 })
        ));
    }

    #[test]
    fn test_unknown_binding() {
        let manager = NetworkManager::new();
        manager.configure(vec![p2p_binding("conn", "inproc://foo")]);

        assert!(matches!(
            manager.get_sender("nope"),
            Err(TransportError::UnknownBinding { .. })
        ));
        assert!(matches!(
            manager.get_receiver("nope"),
            Err(TransportError::UnknownBinding { .. })
        ));
        assert!(matches!(
            manager.get_subscriber("nope"),
            Err(TransportError::UnknownBinding { .. })
        ));
    }

    #[test]
    fn test_pubsub_fan_out() {
        let manager = NetworkManager::new();
        manager.configure(vec![pubsub_binding("events", "inproc://bus")]);

        let first = manager.get_subscriber("events").expect("subscriber");
        let second = manager.get_subscriber("events").expect("subscriber");
        let publisher = manager.get_sender("events").expect("sender");

        publisher
            .send(b"tick", Timeout::NO_BLOCK, "status")
            .expect("send");

        for subscriber in [&first, &second] {
            let frame = subscriber
                .receive(Timeout::from_millis(10))
                .expect("receive");
            assert_eq!(frame.payload, b"tick");
            assert_eq!(frame.topic, "status");
        }
    }

    #[test]
    fn test_pubsub_full_subscriber_times_out() {
        let manager = NetworkManager::new();
        manager.configure(vec![pubsub_binding("events", "inproc://bus")]);

        let full = manager.get_subscriber("events").expect("subscriber");
        let publisher = manager.get_sender("events").expect("sender");

        for _ in 0..ROUTE_DEPTH {
            publisher.send(b"fill", Timeout::NO_BLOCK, "").expect("send");
        }

        let result = publisher.send(b"overflow", Timeout::NO_BLOCK, "");
        assert!(matches!(
            result,
            Err(TransportError::SendTimeout { millis: 0 })
        ));
        let result = publisher.send(b"overflow", Timeout::from_millis(5), "");
        assert!(matches!(
            result,
            Err(TransportError::SendTimeout { millis: 5 })
        ));
        assert!(!publisher.try_send(b"overflow", Timeout::NO_BLOCK, ""));

        // A subscriber with room still receives its copy; only the full one
        // fails the send.
        let healthy = manager.get_subscriber("events").expect("subscriber");
        let result = publisher.send(b"partial", Timeout::NO_BLOCK, "");
        assert!(matches!(result, Err(TransportError::SendTimeout { .. })));
        assert_eq!(
            healthy.receive(Timeout::NO_BLOCK).expect("receive").payload,
            b"partial"
        );

        // Draining makes room again.
        let _ = full.receive(Timeout::NO_BLOCK).expect("receive");
        publisher.send(b"fits", Timeout::NO_BLOCK, "").expect("send");
    }

    #[test]
    fn test_pubsub_without_subscribers_drops() {
        let manager = NetworkManager::new();
        manager.configure(vec![pubsub_binding("events", "inproc://bus")]);

        let publisher = manager.get_sender("events").expect("sender");
        publisher
            .send(b"lost", Timeout::NO_BLOCK, "")
            .expect("send");

        // A subscriber registered afterwards sees nothing.
        let late = manager.get_subscriber("events").expect("subscriber");
        assert!(late.receive(Timeout::NO_BLOCK).is_err());
    }

    #[test]
    fn test_dropped_subscriber_unregisters() {
        let manager = NetworkManager::new();
        manager.configure(vec![pubsub_binding("events", "inproc://bus")]);

        let subscriber = manager.get_subscriber("events").expect("subscriber");
        drop(subscriber);

        let publisher = manager.get_sender("events").expect("sender");
        publisher
            .send(b"tick", Timeout::NO_BLOCK, "")
            .expect("send");

        let survivor = manager.get_subscriber("events").expect("subscriber");
        assert!(survivor.receive(Timeout::NO_BLOCK).is_err());
    }

    #[test]
    fn test_subscriber_prefix_filter() {
        let manager = NetworkManager::new();
        manager.configure(vec![pubsub_binding("events", "inproc://bus")]);

        let status_only = manager
            .get_subscriber_filtered("events", "status")
            .expect("subscriber");
        let everything = manager.get_subscriber("events").expect("subscriber");
        let publisher = manager.get_sender("events").expect("sender");

        publisher
            .send(b"a", Timeout::NO_BLOCK, "status/cpu")
            .expect("send");
        publisher
            .send(b"b", Timeout::NO_BLOCK, "alarm/smoke")
            .expect("send");

        let frame = status_only
            .receive(Timeout::from_millis(10))
            .expect("receive");
        assert_eq!(frame.topic, "status/cpu");
        assert!(status_only.receive(Timeout::NO_BLOCK).is_err());

        assert_eq!(
            everything
                .receive(Timeout::from_millis(10))
                .expect("receive")
                .topic,
            "status/cpu"
        );
        assert_eq!(
            everything
                .receive(Timeout::from_millis(10))
                .expect("receive")
                .topic,
            "alarm/smoke"
        );
    }

    #[test]
    fn test_subscriber_on_p2p_route_takes_over() {
        let manager = NetworkManager::new();
        manager.configure(vec![p2p_binding("conn", "inproc://foo")]);

        let subscriber = manager.get_subscriber("conn").expect("subscriber");
        let sender = manager.get_sender("conn").expect("sender");

        sender
            .send(b"topical", Timeout::NO_BLOCK, "t")
            .expect("send");

        let frame = subscriber
            .receive(Timeout::from_millis(10))
            .expect("receive");
        assert_eq!(frame.payload, b"topical");

        // Nothing was buffered on the point-to-point side.
        let receiver = manager.get_receiver("conn").expect("receiver");
        assert!(receiver.receive(Timeout::NO_BLOCK).is_err());
    }

    #[test]
    fn test_reset_clears_bindings() {
        let manager = NetworkManager::new();
        manager.configure(vec![p2p_binding("conn", "inproc://foo")]);
        manager.reset();
        assert!(manager.get_sender("conn").is_err());
    }
}
