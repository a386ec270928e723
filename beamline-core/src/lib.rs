//! # beamline-core
//!
//! Collaborator contracts for the beamline messaging facade.
//!
//! The endpoint layer in the `beamline` crate stays transport-agnostic by
//! depending on the primitives defined here rather than on concrete I/O:
//!
//! | Component | Purpose |
//! |-----------|---------|
//! | [`Timeout`] | Millisecond deadlines with non-blocking / indefinite sentinels |
//! | [`Message`] | Payload contract: type label + wire serializability |
//! | [`wire`] | Length-prefixed MessagePack framing |
//! | [`QueueRegistry`] | Bounded in-process queues keyed by connection name |
//! | [`NetworkManager`] | Point-to-point and pub/sub transport bindings |
//!
//! ## Quick start
//!
//! ```
//! use beamline_core::{serializable_message, Message, QueueConfig, QueueRegistry, Timeout};
//! use serde::{Serialize, Deserialize};
//! use std::collections::HashMap;
//!
//! #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
//! struct Reading { channel: u32, value: f64 }
//! serializable_message!(Reading);
//!
//! let queues = QueueRegistry::new();
//! queues.configure(HashMap::from([(
//!     "readings".to_string(),
//!     QueueConfig::from_address("queue://StdDeQueue:10").unwrap(),
//! )]));
//!
//! let queue = queues.get_queue::<Reading>("readings").unwrap();
//! queue.push(Reading { channel: 1, value: 0.5 }, Timeout::NO_BLOCK).unwrap();
//! let back = queue.pop(Timeout::from_millis(10)).unwrap();
//! assert_eq!(back.channel, 1);
//! ```

#![deny(missing_docs)]

// =============================================================================
// Modules
// =============================================================================

/// Payload contract and MessagePack codec support.
pub mod message;

/// Bounded in-process queue provider.
pub mod queue;

/// Timeout values for blocking operations.
pub mod timeout;

/// Network manager and in-process transport.
pub mod transport;

/// Length-prefixed wire framing.
pub mod wire;

// =============================================================================
// Public API re-exports
// =============================================================================

pub use message::{CodecError, Message};
pub use queue::{QueueAddressError, QueueConfig, QueueError, QueueHandle, QueueRegistry};
pub use timeout::Timeout;
pub use transport::{
    BindingMode, Frame, NetworkBinding, NetworkManager, TransportAddress, TransportAddressError,
    TransportError, TransportReceiver, TransportSender, TransportSubscriber,
};
pub use wire::{FRAME_HEADER_SIZE, MAX_FRAME_BODY, WireError, decode_frame, encode_frame};
