//! Queue-backed endpoint: send/receive over a bounded in-process queue.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use beamline_core::{Message, QueueHandle, QueueRegistry, Timeout};

use crate::error::{EndpointError, IoResult};
use crate::endpoint::DeliveryCallback;

/// Delivery-loop tick: a timed-out pop re-checks the shutdown flag, bounding
/// `remove_callback` latency without busy waiting.
const QUEUE_TICK_MS: i64 = 500;

/// Endpoint over one bounded in-process queue.
pub(crate) struct QueueEndpoint<T: Message> {
    name: String,
    queue: Option<Arc<QueueHandle<T>>>,
}

impl<T: Message> QueueEndpoint<T> {
    pub(crate) fn new(name: &str, queues: &QueueRegistry) -> Self {
        let queue = match queues.get_queue::<T>(name) {
            Ok(queue) => Some(queue),
            Err(err) => {
                tracing::warn!(connection = name, error = %err, "no queue bound");
                None
            }
        };
        Self {
            name: name.to_string(),
            queue,
        }
    }

    fn queue(&self) -> IoResult<&Arc<QueueHandle<T>>> {
        self.queue.as_ref().ok_or_else(|| EndpointError::InstanceNotFound {
            name: self.name.clone(),
            facility: "queue",
        })
    }

    pub(crate) fn send(&self, value: T, timeout: Timeout, topic: &str) -> IoResult<()> {
        if !topic.is_empty() {
            tracing::warn!(
                connection = %self.name,
                topic,
                "topics are meaningless for queue connections, check the configuration"
            );
        }

        self.queue()?
            .push(value, timeout)
            .map_err(|e| EndpointError::from_queue(&self.name, "push", e))
    }

    pub(crate) fn receive(&self, timeout: Timeout) -> IoResult<T> {
        self.queue()?
            .pop(timeout)
            .map_err(|e| EndpointError::from_queue(&self.name, "pop", e))
    }

    /// Start the delivery thread: pop with a bounded tick, hand each value to
    /// the callback, exit once `active` clears.
    pub(crate) fn spawn_delivery(
        &self,
        active: Arc<AtomicBool>,
        mut callback: DeliveryCallback<T>,
    ) -> io::Result<JoinHandle<()>> {
        let builder = std::thread::Builder::new().name(format!("beamline-cb-{}", self.name));

        let Some(queue) = self.queue.clone() else {
            // Nothing to drain; the thread only waits for shutdown so the
            // callback lifecycle stays uniform.
            return builder.spawn(move || {
                while active.load(Ordering::Acquire) {
                    std::thread::sleep(Duration::from_millis(QUEUE_TICK_MS as u64));
                }
            });
        };

        builder.spawn(move || {
            while active.load(Ordering::Acquire) {
                match queue.pop(Timeout::from_millis(QUEUE_TICK_MS)) {
                    Ok(value) => callback(value),
                    // A timed-out pop is a normal tick.
                    Err(_) => {}
                }
            }
        })
    }
}
