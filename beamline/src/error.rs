//! Error types for the endpoint layer.

use beamline_core::{CodecError, QueueError, TransportError};

use crate::catalog::ConnectionKind;

/// Errors raised by the facade and its endpoints.
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    /// The connection name is absent from the catalog.
    #[error("unknown connection {name:?}")]
    UnknownConnection {
        /// The requested connection name.
        name: String,
    },

    /// The caller's payload type disagrees with the descriptor's tag.
    #[error("connection {name:?} carries {expected:?} payloads, not {requested}")]
    TypeMismatch {
        /// The connection name.
        name: String,
        /// Payload tag declared by the descriptor.
        expected: String,
        /// Type label the caller requested.
        requested: &'static str,
    },

    /// A collaborator returned no binding for the connection.
    #[error("no {facility} instance bound for connection {name:?}")]
    InstanceNotFound {
        /// The connection name.
        name: String,
        /// Which collaborator had no binding ("queue" or "transport").
        facility: &'static str,
    },

    /// The deadline elapsed on a send or receive.
    #[error("{operation} on {name:?} timed out after {millis} ms")]
    Timeout {
        /// The connection name.
        name: String,
        /// The operation that timed out ("push", "pop", "send", "receive").
        operation: &'static str,
        /// The deadline that elapsed, in milliseconds.
        millis: i64,
    },

    /// Direct `receive` on an endpoint with an active callback.
    #[error("receive on {name:?} refused: a delivery callback is registered")]
    CallbackConflict {
        /// The connection name.
        name: String,
    },

    /// Send of a non-serializable payload over a network connection.
    #[error("{label} is not serializable and cannot cross network connection {name:?}")]
    NotSerializable {
        /// The connection name.
        name: String,
        /// Type label of the refused payload.
        label: &'static str,
    },

    /// A connection name repeats within one configuration.
    #[error("duplicate connection name {name:?}")]
    DuplicateName {
        /// The repeated name.
        name: String,
    },

    /// A descriptor's address is malformed for its kind.
    #[error("invalid address {address:?} for {kind:?} connection {name:?}")]
    InvalidAddress {
        /// The connection name.
        name: String,
        /// The descriptor's kind.
        kind: ConnectionKind,
        /// The rejected address.
        address: String,
    },

    /// Reset attempted while endpoint handles are still live.
    #[error("reset refused, connections still in use: {names}")]
    InUse {
        /// Comma-separated names of the connections still held.
        names: String,
    },

    /// Payload encode or decode failed on a network connection.
    #[error("codec failure on connection {name:?}")]
    Codec {
        /// The connection name.
        name: String,
        /// The underlying codec error.
        #[source]
        source: CodecError,
    },

    /// The delivery thread could not be started.
    #[error("failed to start delivery thread for {name:?}")]
    DeliveryThread {
        /// The connection name.
        name: String,
        /// The spawn failure.
        #[source]
        source: std::io::Error,
    },
}

impl EndpointError {
    /// Map a queue provider error onto the endpoint taxonomy.
    pub(crate) fn from_queue(name: &str, operation: &'static str, err: QueueError) -> Self {
        match err {
            QueueError::Timeout { millis } => EndpointError::Timeout {
                name: name.to_string(),
                operation,
                millis,
            },
            QueueError::NotConfigured { .. } | QueueError::WrongPayloadType { .. } => {
                EndpointError::InstanceNotFound {
                    name: name.to_string(),
                    facility: "queue",
                }
            }
        }
    }

    /// Map a transport error onto the endpoint taxonomy.
    pub(crate) fn from_transport(name: &str, operation: &'static str, err: TransportError) -> Self {
        match err {
            TransportError::SendTimeout { millis } | TransportError::ReceiveTimeout { millis } => {
                EndpointError::Timeout {
                    name: name.to_string(),
                    operation,
                    millis,
                }
            }
            TransportError::UnknownBinding { .. } => EndpointError::InstanceNotFound {
                name: name.to_string(),
                facility: "transport",
            },
        }
    }
}

/// Result alias for facade operations.
pub type IoResult<T> = Result<T, EndpointError>;
