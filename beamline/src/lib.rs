//! # beamline
//!
//! Unified messaging facade for data-acquisition applications.
//!
//! Application components exchange typed messages through named
//! *connections*. Whether a connection is realized by a bounded in-process
//! queue or by a network transport (point-to-point or pub/sub) is decided by
//! its descriptor, not by the caller: the facade resolves a connection name
//! plus a compile-time payload type to the right endpoint and hands back a
//! typed sender or receiver handle.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │              Application Code                    │
//! │     Uses IoManager + typed handles              │
//! ├─────────────────────────────────────────────────┤
//! │     IoManager (facade)                          │
//! │     • configure / reset lifecycle               │
//! │     • get_sender / get_receiver / callbacks     │
//! ├─────────────────────────────────────────────────┤
//! │     EndpointRegistry                            │
//! │     • one endpoint per (name, payload type)     │
//! ├─────────────────────────────────────────────────┤
//! │     Endpoints (queue- or network-backed)        │
//! │     • blocking send/receive with timeouts       │
//! │     • per-endpoint callback delivery thread     │
//! ├─────────────────────────────────────────────────┤
//! │     beamline-core                               │
//! │     • bounded queues, transport routes, codec   │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! ## Components
//!
//! | Component | Purpose |
//! |-----------|---------|
//! | [`IoManager`] | Facade: lifecycle, handle resolution, callbacks |
//! | [`ConnectionDescriptor`] | Named connection: kind, payload tag, address |
//! | [`SenderHandle`] / [`ReceiverHandle`] | Typed views of a shared endpoint |
//! | [`EndpointError`] | Failure taxonomy of the endpoint layer |
//!
//! ## Quick start
//!
//! ```
//! use beamline::{
//!     serializable_message, ConnectionDescriptor, ConnectionKind, IoManager, Timeout,
//! };
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
//! struct Reading { channel: u32, value: f64 }
//! serializable_message!(Reading);
//!
//! let manager = IoManager::new();
//! manager.configure(&[ConnectionDescriptor::new(
//!     "readings",
//!     ConnectionKind::Queue,
//!     "Reading",
//!     "queue://StdDeQueue:16",
//! )]).unwrap();
//!
//! let sender = manager.get_sender::<Reading>("readings").unwrap();
//! let receiver = manager.get_receiver::<Reading>("readings").unwrap();
//!
//! sender.send(Reading { channel: 3, value: 0.25 }, Timeout::NO_BLOCK).unwrap();
//! let reading = receiver.receive(Timeout::from_millis(10)).unwrap();
//! assert_eq!(reading.channel, 3);
//! ```
//!
//! ## Delivery callbacks
//!
//! Instead of polling `receive`, a component can register a callback that is
//! invoked for every arriving message on a dedicated per-endpoint delivery
//! thread:
//!
//! ```ignore
//! manager.add_callback::<Reading>("readings", |reading| process(reading))?;
//! // ... later: joins the delivery thread before returning.
//! manager.remove_callback::<Reading>("readings")?;
//! ```

#![deny(missing_docs)]

// =============================================================================
// Modules
// =============================================================================

/// Connection descriptors and the catalog.
pub mod catalog;

/// Typed endpoints and handle views.
pub mod endpoint;

/// Error types for the endpoint layer.
pub mod error;

mod manager;
mod registry;

// =============================================================================
// Public API re-exports
// =============================================================================

pub use catalog::{ConnectionDescriptor, ConnectionKind};
pub use endpoint::{ReceiverHandle, SenderHandle};
pub use error::{EndpointError, IoResult};
pub use manager::IoManager;

// Collaborator contracts callers need alongside the facade.
pub use beamline_core::{CodecError, Message, Timeout};
pub use beamline_core::{opaque_message, serializable_message};
