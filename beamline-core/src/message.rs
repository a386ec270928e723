//! Message payload contract.
//!
//! Every payload type crossing the facade implements [`Message`]. The trait
//! fixes two compile-time properties the endpoint layer dispatches on:
//!
//! - the **type label**, matched against the payload tag a connection
//!   descriptor declares;
//! - **serializability**: whether values can cross a network transport.
//!
//! Serializable types encode to length-prefixed MessagePack; the
//! [`serializable_message!`](crate::serializable_message) macro implements
//! the trait from a serde-deriving struct. Types that cannot (or must not)
//! cross the wire use [`opaque_message!`](crate::opaque_message); they still
//! flow freely through in-process queue connections.
//!
//! ```
//! use beamline_core::{serializable_message, Message};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
//! struct Reading {
//!     channel: u32,
//!     value: f64,
//! }
//! serializable_message!(Reading);
//!
//! let reading = Reading { channel: 7, value: 1.25 };
//! let bytes = reading.encode_wire().unwrap();
//! let back = Reading::decode_wire(&bytes).unwrap();
//! assert_eq!(back, reading);
//! ```

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::wire::{self, WireError};

/// Codec error types.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Failed to encode a payload to bytes.
    #[error("encode failed for {label}: {source}")]
    Encode {
        /// Type label of the payload.
        label: &'static str,
        /// Underlying serializer error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Failed to decode bytes to a payload.
    #[error("decode failed for {label}: {source}")]
    Decode {
        /// Type label of the payload.
        label: &'static str,
        /// Underlying deserializer error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The payload type does not support wire serialization.
    #[error("{label} does not support wire serialization")]
    Unsupported {
        /// Type label of the payload.
        label: &'static str,
    },

    /// Frame-level validation failed.
    #[error(transparent)]
    Framing(#[from] WireError),
}

/// A payload type that can flow through the messaging facade.
///
/// `Default` is required because a network receive of a non-serializable
/// payload yields a default-constructed value (that asymmetry is part of the
/// endpoint contract, not of this trait). `Send + 'static` because values
/// are handed to delivery threads by move.
///
/// Implement through [`serializable_message!`](crate::serializable_message)
/// or [`opaque_message!`](crate::opaque_message) rather than by hand.
pub trait Message: Default + Send + 'static {
    /// Canonical label matched against a descriptor's payload tag.
    fn type_label() -> &'static str;

    /// Whether values of this type can cross a network transport.
    fn is_serializable() -> bool {
        false
    }

    /// Encode the value into a length-prefixed MessagePack frame.
    ///
    /// # Errors
    ///
    /// `Unsupported` for non-serializable types; `Encode`/`Framing` when the
    /// serializer or framing rejects the value.
    fn encode_wire(&self) -> Result<Vec<u8>, CodecError> {
        Err(CodecError::Unsupported {
            label: Self::type_label(),
        })
    }

    /// Decode a value from a length-prefixed MessagePack frame.
    ///
    /// # Errors
    ///
    /// `Unsupported` for non-serializable types; `Decode`/`Framing` when the
    /// frame or body is malformed.
    fn decode_wire(_bytes: &[u8]) -> Result<Self, CodecError> {
        Err(CodecError::Unsupported {
            label: Self::type_label(),
        })
    }
}

/// Encode a serde value into a length-prefixed MessagePack frame.
///
/// Support routine for [`serializable_message!`](crate::serializable_message);
/// prefer [`Message::encode_wire`] in application code.
///
/// # Errors
///
/// `Encode` when MessagePack serialization fails, `Framing` when the encoded
/// body exceeds the frame limit.
pub fn to_wire<T: Serialize>(label: &'static str, value: &T) -> Result<Vec<u8>, CodecError> {
    let body = rmp_serde::to_vec(value).map_err(|e| CodecError::Encode {
        label,
        source: Box::new(e),
    })?;
    Ok(wire::encode_frame(&body)?)
}

/// Decode a serde value from a length-prefixed MessagePack frame.
///
/// Support routine for [`serializable_message!`](crate::serializable_message);
/// prefer [`Message::decode_wire`] in application code.
///
/// # Errors
///
/// `Framing` when the frame is malformed, `Decode` when the body does not
/// deserialize as `T`.
pub fn from_wire<T: DeserializeOwned>(label: &'static str, bytes: &[u8]) -> Result<T, CodecError> {
    let body = wire::decode_frame(bytes)?;
    rmp_serde::from_slice(body).map_err(|e| CodecError::Decode {
        label,
        source: Box::new(e),
    })
}

/// Implement [`Message`] for a serde-deriving payload type.
///
/// The type must derive (or implement) `serde::Serialize`,
/// `serde::Deserialize`, and `Default`. Its label is the type name as
/// written.
///
/// ```
/// use beamline_core::serializable_message;
/// use serde::{Serialize, Deserialize};
///
/// #[derive(Debug, Default, Serialize, Deserialize)]
/// pub struct Fragment {
///     pub sequence: u64,
///     pub payload: Vec<u8>,
/// }
/// serializable_message!(Fragment);
/// ```
#[macro_export]
macro_rules! serializable_message {
    ($ty:ty) => {
        impl $crate::Message for $ty {
            fn type_label() -> &'static str {
                stringify!($ty)
            }

            fn is_serializable() -> bool {
                true
            }

            fn encode_wire(&self) -> ::std::result::Result<::std::vec::Vec<u8>, $crate::CodecError> {
                $crate::message::to_wire(Self::type_label(), self)
            }

            fn decode_wire(
                bytes: &[u8],
            ) -> ::std::result::Result<Self, $crate::CodecError> {
                $crate::message::from_wire(Self::type_label(), bytes)
            }
        }
    };
}

/// Implement [`Message`] for a payload type that never crosses the wire.
///
/// Opaque payloads move through in-process queue connections only; a network
/// send refuses them and a network receive yields the default value.
///
/// ```
/// use beamline_core::{opaque_message, Message};
///
/// #[derive(Debug, Default)]
/// pub struct LocalHistogram {
///     pub counts: Vec<u64>,
/// }
/// opaque_message!(LocalHistogram);
///
/// assert!(!LocalHistogram::is_serializable());
/// ```
#[macro_export]
macro_rules! opaque_message {
    ($ty:ty) => {
        impl $crate::Message for $ty {
            fn type_label() -> &'static str {
                stringify!($ty)
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    struct Sample {
        id: u32,
        scale: f64,
        note: String,
    }
    serializable_message!(Sample);

    #[derive(Debug, Default, PartialEq)]
    struct Opaque {
        id: u32,
    }
    opaque_message!(Opaque);

    #[test]
    fn test_labels() {
        assert_eq!(Sample::type_label(), "Sample");
        assert_eq!(Opaque::type_label(), "Opaque");
    }

    #[test]
    fn test_serializable_partition() {
        assert!(Sample::is_serializable());
        assert!(!Opaque::is_serializable());
    }

    #[test]
    fn test_wire_roundtrip() {
        let value = Sample {
            id: 56,
            scale: 26.5,
            note: "test1".to_string(),
        };

        let bytes = value.encode_wire().expect("encode");
        let back = Sample::decode_wire(&bytes).expect("decode");
        assert_eq!(back, value);
    }

    #[test]
    fn test_opaque_refuses_wire() {
        let value = Opaque { id: 1 };
        assert!(matches!(
            value.encode_wire(),
            Err(CodecError::Unsupported { label: "Opaque" })
        ));
        assert!(matches!(
            Opaque::decode_wire(&[]),
            Err(CodecError::Unsupported { label: "Opaque" })
        ));
    }

    #[test]
    fn test_decode_rejects_bad_frame() {
        let result = Sample::decode_wire(&[1, 2]);
        assert!(matches!(result, Err(CodecError::Framing(_))));
    }

    #[test]
    fn test_decode_rejects_wrong_body() {
        let bytes = to_wire("String", &"just a string").expect("encode");
        let result = Sample::decode_wire(&bytes);
        assert!(matches!(result, Err(CodecError::Decode { .. })));
    }
}
