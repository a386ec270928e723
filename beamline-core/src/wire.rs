//! Wire framing for network payloads.
//!
//! Frame format: `[length:4][body:N]`
//!
//! - **length**: Total frame size including the header (little-endian u32)
//! - **body**: MessagePack-encoded payload bytes
//!
//! The topic is not part of the frame; transports carry it as a separate
//! header alongside the bytes.

/// Header size: 4 bytes of little-endian length.
pub const FRAME_HEADER_SIZE: usize = 4;

/// Maximum body size (16 MB).
///
/// Frames larger than this are rejected to bound peer memory use.
pub const MAX_FRAME_BODY: usize = 16 * 1024 * 1024;

/// Framing error types.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WireError {
    /// Not enough data to parse the frame.
    #[error("insufficient data: need {needed} bytes, have {have}")]
    InsufficientData {
        /// Minimum bytes required to parse.
        needed: usize,
        /// Actual bytes available.
        have: usize,
    },

    /// Length field has an invalid value.
    #[error("invalid frame length: {length}")]
    InvalidLength {
        /// The invalid length value from the header.
        length: u32,
    },

    /// Body exceeds the maximum allowed size.
    #[error("frame too large: {size} bytes (max {MAX_FRAME_BODY})")]
    FrameTooLarge {
        /// Actual body size in bytes.
        size: usize,
    },

    /// Data extends past the length declared in the header.
    #[error("trailing bytes after frame: expected {expected} bytes, have {have}")]
    TrailingBytes {
        /// Frame size declared by the header.
        expected: usize,
        /// Actual bytes available.
        have: usize,
    },
}

/// Wrap an encoded body in a length-prefixed frame.
///
/// # Errors
///
/// Returns `FrameTooLarge` if the body exceeds [`MAX_FRAME_BODY`].
pub fn encode_frame(body: &[u8]) -> Result<Vec<u8>, WireError> {
    if body.len() > MAX_FRAME_BODY {
        return Err(WireError::FrameTooLarge { size: body.len() });
    }

    let total = FRAME_HEADER_SIZE + body.len();
    let mut data = Vec::with_capacity(total);
    data.extend_from_slice(&(total as u32).to_le_bytes());
    data.extend_from_slice(body);
    Ok(data)
}

/// Unwrap a length-prefixed frame, returning the body slice.
///
/// The input must contain exactly one frame; extra bytes are an error.
///
/// # Errors
///
/// - `InsufficientData`: not enough bytes for the header or declared length
/// - `InvalidLength`: length field smaller than the header
/// - `TrailingBytes`: data extends past the declared length
pub fn decode_frame(data: &[u8]) -> Result<&[u8], WireError> {
    if data.len() < FRAME_HEADER_SIZE {
        return Err(WireError::InsufficientData {
            needed: FRAME_HEADER_SIZE,
            have: data.len(),
        });
    }

    let length = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
    if (length as usize) < FRAME_HEADER_SIZE {
        return Err(WireError::InvalidLength { length });
    }

    let expected = length as usize;
    if data.len() < expected {
        return Err(WireError::InsufficientData {
            needed: expected,
            have: data.len(),
        });
    }
    if data.len() > expected {
        return Err(WireError::TrailingBytes {
            expected,
            have: data.len(),
        });
    }

    Ok(&data[FRAME_HEADER_SIZE..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_roundtrip() {
        let body = b"hello world";
        let frame = encode_frame(body).expect("encode");
        assert_eq!(frame.len(), FRAME_HEADER_SIZE + body.len());

        let decoded = decode_frame(&frame).expect("decode");
        assert_eq!(decoded, body.as_slice());
    }

    #[test]
    fn test_empty_body() {
        let frame = encode_frame(&[]).expect("encode");
        assert_eq!(frame.len(), FRAME_HEADER_SIZE);

        let decoded = decode_frame(&frame).expect("decode");
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_insufficient_data_header() {
        let result = decode_frame(&[0u8; 2]);
        assert!(matches!(
            result,
            Err(WireError::InsufficientData {
                needed: FRAME_HEADER_SIZE,
                have: 2
            })
        ));
    }

    #[test]
    fn test_insufficient_data_body() {
        let frame = encode_frame(b"some longer body").expect("encode");
        let result = decode_frame(&frame[..frame.len() - 3]);
        assert!(matches!(result, Err(WireError::InsufficientData { .. })));
    }

    #[test]
    fn test_invalid_length_too_small() {
        let mut bad = vec![0u8; FRAME_HEADER_SIZE];
        bad[0..4].copy_from_slice(&2u32.to_le_bytes());

        let result = decode_frame(&bad);
        assert!(matches!(result, Err(WireError::InvalidLength { length: 2 })));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut frame = encode_frame(b"body").expect("encode");
        frame.extend_from_slice(b"garbage");

        let result = decode_frame(&frame);
        assert!(matches!(result, Err(WireError::TrailingBytes { .. })));
    }

    #[test]
    fn test_frame_too_large() {
        let body = vec![0u8; MAX_FRAME_BODY + 1];
        let result = encode_frame(&body);
        assert!(matches!(result, Err(WireError::FrameTooLarge { .. })));
    }
}
