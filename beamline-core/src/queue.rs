//! Bounded in-process queue provider.
//!
//! The queue provider hands out shared, bounded FIFOs keyed by connection
//! name. A queue is created lazily on first request and shared by every
//! later request for the same name; the payload type is fixed by that first
//! request.
//!
//! Queue capacities come from `queue://<backend>:<capacity>` addresses. The
//! backend label selects nothing today (one channel-backed implementation
//! serves all queues) but is validated and kept so configurations stay
//! portable.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::timeout::Timeout;

/// Queue provider error types.
#[derive(Debug, Clone, thiserror::Error)]
pub enum QueueError {
    /// The deadline elapsed before the queue had space (push) or a message
    /// (pop).
    #[error("queue operation timed out after {millis} ms")]
    Timeout {
        /// The deadline that elapsed, in milliseconds.
        millis: i64,
    },

    /// No queue is configured under the requested name.
    #[error("no queue configured under {name:?}")]
    NotConfigured {
        /// The requested queue name.
        name: String,
    },

    /// The queue exists but was created for a different payload type.
    #[error("queue {name:?} is bound to a different payload type")]
    WrongPayloadType {
        /// The requested queue name.
        name: String,
    },
}

/// Malformed queue address.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid queue address {address:?}: expected queue://<backend>:<capacity>")]
pub struct QueueAddressError {
    /// The address that failed to parse.
    pub address: String,
}

/// Capacity and backend selector for one named queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Backend label from the address. Informational; all backends are
    /// realized by the same bounded channel.
    pub backend: String,
    /// Maximum number of buffered messages.
    pub capacity: usize,
}

impl QueueConfig {
    /// Parse a `queue://<backend>:<capacity>` address.
    ///
    /// # Errors
    ///
    /// Returns [`QueueAddressError`] when the scheme, backend, or capacity
    /// is missing or malformed, or the capacity is zero.
    pub fn from_address(address: &str) -> Result<Self, QueueAddressError> {
        let invalid = || QueueAddressError {
            address: address.to_string(),
        };

        let rest = address.strip_prefix("queue://").ok_or_else(invalid)?;
        let (backend, capacity) = rest.rsplit_once(':').ok_or_else(invalid)?;
        if backend.is_empty() {
            return Err(invalid());
        }
        let capacity: usize = capacity.parse().map_err(|_| invalid())?;
        if capacity == 0 {
            return Err(invalid());
        }

        Ok(Self {
            backend: backend.to_string(),
            capacity,
        })
    }
}

/// A shared, bounded FIFO for one connection name.
///
/// Handles are shared through `Arc`; every endpoint on the same connection
/// converges on the same queue. All operations take a [`Timeout`] with the
/// usual sentinels: [`Timeout::NO_BLOCK`] polls, [`Timeout::BLOCK`] waits
/// indefinitely.
pub struct QueueHandle<T> {
    name: String,
    capacity: usize,
    tx: crossbeam_channel::Sender<T>,
    rx: crossbeam_channel::Receiver<T>,
    pushed: AtomicU64,
    popped: AtomicU64,
}

impl<T: Send + 'static> QueueHandle<T> {
    fn new(name: &str, capacity: usize) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        Self {
            name: name.to_string(),
            capacity,
            tx,
            rx,
            pushed: AtomicU64::new(0),
            popped: AtomicU64::new(0),
        }
    }

    /// The connection name this queue is bound to.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Maximum number of buffered messages.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of messages currently buffered.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Whether the queue is currently empty.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Total messages pushed over the queue's lifetime.
    pub fn pushed(&self) -> u64 {
        self.pushed.load(Ordering::Relaxed)
    }

    /// Total messages popped over the queue's lifetime.
    pub fn popped(&self) -> u64 {
        self.popped.load(Ordering::Relaxed)
    }

    /// Push a value, waiting up to `timeout` for space.
    ///
    /// # Errors
    ///
    /// [`QueueError::Timeout`] when the queue stays full past the deadline.
    pub fn push(&self, value: T, timeout: Timeout) -> Result<(), QueueError> {
        let timed_out = || QueueError::Timeout {
            millis: timeout.as_millis(),
        };

        let result = if timeout.is_no_block() {
            self.tx.try_send(value).map_err(|_| timed_out())
        } else if timeout.is_block() {
            self.tx.send(value).map_err(|_| timed_out())
        } else {
            self.tx
                .send_timeout(value, timeout.as_duration())
                .map_err(|_| timed_out())
        };

        if result.is_ok() {
            self.pushed.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    /// Push a value, reporting failure as `false` instead of an error.
    ///
    /// The value is dropped when the queue stays full past the deadline.
    pub fn try_push(&self, value: T, timeout: Timeout) -> bool {
        self.push(value, timeout).is_ok()
    }

    /// Pop the oldest value, waiting up to `timeout` for one to arrive.
    ///
    /// # Errors
    ///
    /// [`QueueError::Timeout`] when the queue stays empty past the deadline.
    pub fn pop(&self, timeout: Timeout) -> Result<T, QueueError> {
        let timed_out = || QueueError::Timeout {
            millis: timeout.as_millis(),
        };

        let result = if timeout.is_no_block() {
            self.rx.try_recv().map_err(|_| timed_out())
        } else if timeout.is_block() {
            self.rx.recv().map_err(|_| timed_out())
        } else {
            self.rx
                .recv_timeout(timeout.as_duration())
                .map_err(|_| timed_out())
        };

        if result.is_ok() {
            self.popped.fetch_add(1, Ordering::Relaxed);
        }
        result
    }
}

/// Queue provider: maps connection names to shared bounded queues.
///
/// `configure` records capacities; queues themselves are created lazily on
/// the first `get_queue` for a name and cached for every later request. The
/// first request fixes the payload type.
pub struct QueueRegistry {
    configs: Mutex<HashMap<String, QueueConfig>>,
    queues: Mutex<HashMap<String, Box<dyn Any + Send + Sync>>>,
}

impl QueueRegistry {
    /// Create an unconfigured registry.
    pub fn new() -> Self {
        Self {
            configs: Mutex::new(HashMap::new()),
            queues: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the set of configured queues. Existing queue instances are
    /// dropped; outstanding handles keep their queue alive but it is no
    /// longer shared with later requests.
    pub fn configure(&self, configs: HashMap<String, QueueConfig>) {
        *self.lock_configs() = configs;
        self.lock_queues().clear();
    }

    /// Get (or lazily create) the shared queue for `name`.
    ///
    /// # Errors
    ///
    /// [`QueueError::NotConfigured`] when the name has no configuration,
    /// [`QueueError::WrongPayloadType`] when the queue was created for a
    /// different payload type.
    pub fn get_queue<T: Send + 'static>(&self, name: &str) -> Result<Arc<QueueHandle<T>>, QueueError> {
        let capacity = {
            let configs = self.lock_configs();
            configs
                .get(name)
                .ok_or_else(|| QueueError::NotConfigured {
                    name: name.to_string(),
                })?
                .capacity
        };

        let mut queues = self.lock_queues();
        if let Some(entry) = queues.get(name) {
            return entry
                .downcast_ref::<Arc<QueueHandle<T>>>()
                .cloned()
                .ok_or_else(|| QueueError::WrongPayloadType {
                    name: name.to_string(),
                });
        }

        let queue = Arc::new(QueueHandle::<T>::new(name, capacity));
        queues.insert(name.to_string(), Box::new(Arc::clone(&queue)));
        tracing::debug!(queue = name, capacity, "created bounded queue");
        Ok(queue)
    }

    /// Number of queue instances created so far.
    pub fn instance_count(&self) -> usize {
        self.lock_queues().len()
    }

    /// Drop all configuration and queue instances.
    pub fn reset(&self) {
        self.lock_configs().clear();
        self.lock_queues().clear();
    }

    fn lock_configs(&self) -> std::sync::MutexGuard<'_, HashMap<String, QueueConfig>> {
        self.configs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_queues(&self) -> std::sync::MutexGuard<'_, HashMap<String, Box<dyn Any + Send + Sync>>> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for QueueRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(name: &str, capacity: usize) -> QueueRegistry {
        let registry = QueueRegistry::new();
        registry.configure(HashMap::from([(
            name.to_string(),
            QueueConfig {
                backend: "StdDeQueue".to_string(),
                capacity,
            },
        )]));
        registry
    }

    #[test]
    fn test_address_parsing() {
        let config = QueueConfig::from_address("queue://FollySPSC:50").expect("parse");
        assert_eq!(config.backend, "FollySPSC");
        assert_eq!(config.capacity, 50);
    }

    #[test]
    fn test_address_parsing_rejects_malformed() {
        for address in [
            "inproc://foo",
            "queue://",
            "queue://NoCapacity",
            "queue://:10",
            "queue://Std:zero",
            "queue://Std:0",
        ] {
            assert!(
                QueueConfig::from_address(address).is_err(),
                "{address} should not parse"
            );
        }
    }

    #[test]
    fn test_push_pop_fifo() {
        let registry = registry_with("q", 10);
        let queue = registry.get_queue::<i32>("q").expect("get_queue");

        for i in 0..5 {
            queue.push(i, Timeout::NO_BLOCK).expect("push");
        }
        for i in 0..5 {
            assert_eq!(queue.pop(Timeout::NO_BLOCK).expect("pop"), i);
        }
    }

    #[test]
    fn test_full_queue_times_out() {
        let registry = registry_with("q", 2);
        let queue = registry.get_queue::<i32>("q").expect("get_queue");

        queue.push(1, Timeout::NO_BLOCK).expect("push");
        queue.push(2, Timeout::NO_BLOCK).expect("push");

        let result = queue.push(3, Timeout::NO_BLOCK);
        assert!(matches!(result, Err(QueueError::Timeout { millis: 0 })));

        let result = queue.push(3, Timeout::from_millis(5));
        assert!(matches!(result, Err(QueueError::Timeout { millis: 5 })));

        assert!(!queue.try_push(3, Timeout::NO_BLOCK));
    }

    #[test]
    fn test_empty_queue_times_out() {
        let registry = registry_with("q", 2);
        let queue = registry.get_queue::<i32>("q").expect("get_queue");

        assert!(matches!(
            queue.pop(Timeout::NO_BLOCK),
            Err(QueueError::Timeout { millis: 0 })
        ));
        assert!(matches!(
            queue.pop(Timeout::from_millis(5)),
            Err(QueueError::Timeout { millis: 5 })
        ));
    }

    #[test]
    fn test_shared_instance() {
        let registry = registry_with("q", 4);
        let a = registry.get_queue::<String>("q").expect("get_queue");
        let b = registry.get_queue::<String>("q").expect("get_queue");
        assert!(Arc::ptr_eq(&a, &b));

        a.push("via a".to_string(), Timeout::NO_BLOCK).expect("push");
        assert_eq!(b.pop(Timeout::NO_BLOCK).expect("pop"), "via a");
    }

    #[test]
    fn test_unconfigured_name() {
        let registry = registry_with("q", 4);
        let result = registry.get_queue::<i32>("other");
        assert!(matches!(result, Err(QueueError::NotConfigured { .. })));
    }

    #[test]
    fn test_payload_type_fixed_by_first_request() {
        let registry = registry_with("q", 4);
        let _first = registry.get_queue::<i32>("q").expect("get_queue");

        let second = registry.get_queue::<String>("q");
        assert!(matches!(second, Err(QueueError::WrongPayloadType { .. })));
    }

    #[test]
    fn test_reset_clears_instances() {
        let registry = registry_with("q", 4);
        let _queue = registry.get_queue::<i32>("q").expect("get_queue");
        assert_eq!(registry.instance_count(), 1);

        registry.reset();
        assert_eq!(registry.instance_count(), 0);
        assert!(registry.get_queue::<i32>("q").is_err());
    }

    #[test]
    fn test_stats() {
        let registry = registry_with("q", 4);
        let queue = registry.get_queue::<i32>("q").expect("get_queue");

        queue.push(1, Timeout::NO_BLOCK).expect("push");
        queue.push(2, Timeout::NO_BLOCK).expect("push");
        let _ = queue.pop(Timeout::NO_BLOCK).expect("pop");

        assert_eq!(queue.pushed(), 2);
        assert_eq!(queue.popped(), 1);
        assert_eq!(queue.len(), 1);
    }
}
