//! Inbound frame decoding and encoding
//!
//! chatrelay frame format (client to server only):
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │ Bytes 0-4:  Payload length, ASCII decimal, whitespace padded    │
//! │             ("00005", "5    " and "  5  " are all valid)        │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ Payload (1..=65536 raw bytes)                                   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Server to client traffic is not framed: each broadcast is written as
//! the raw payload in its own transport message.

use crate::{Error, FrameError, Result, LENGTH_PREFIX_SIZE, MAX_PAYLOAD_SIZE};
use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Parse a length prefix.
///
/// Surrounding whitespace is ignored. Anything that is not an unsigned
/// decimal number yields 0, which [`check_length`] then rejects.
pub fn parse_length(prefix: &[u8]) -> usize {
    std::str::from_utf8(prefix)
        .ok()
        .and_then(|s| s.trim().parse::<usize>().ok())
        .unwrap_or(0)
}

/// Validate a parsed length against `1..=max_payload`
pub fn check_length(
    prefix: &[u8],
    length: usize,
    max_payload: usize,
) -> std::result::Result<usize, FrameError> {
    if length == 0 {
        return Err(FrameError::InvalidLength {
            prefix: String::from_utf8_lossy(prefix).into_owned(),
        });
    }
    if length > max_payload {
        return Err(FrameError::PayloadTooLarge {
            length,
            max: max_payload,
        });
    }
    Ok(length)
}

/// Read one frame from a byte stream and return its payload.
///
/// Reads exactly [`LENGTH_PREFIX_SIZE`] bytes, validates the declared
/// length, then reads exactly that many payload bytes. EOF at any point is
/// reported as [`FrameError::Io`].
pub async fn read_frame<R>(
    reader: &mut R,
    max_payload: usize,
) -> std::result::Result<Bytes, FrameError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    reader.read_exact(&mut prefix).await?;

    let length = check_length(&prefix, parse_length(&prefix), max_payload)?;

    let mut payload = BytesMut::zeroed(length);
    reader.read_exact(&mut payload).await?;
    Ok(payload.freeze())
}

/// Decode one frame from the front of a buffer.
///
/// Returns `Ok(None)` if the buffer does not yet hold a complete frame,
/// otherwise the payload and the number of bytes consumed.
pub fn decode(
    buf: &[u8],
    max_payload: usize,
) -> std::result::Result<Option<(Bytes, usize)>, FrameError> {
    if buf.len() < LENGTH_PREFIX_SIZE {
        return Ok(None);
    }

    let prefix = &buf[..LENGTH_PREFIX_SIZE];
    let length = check_length(prefix, parse_length(prefix), max_payload)?;

    let total = LENGTH_PREFIX_SIZE + length;
    if buf.len() < total {
        return Ok(None);
    }

    Ok(Some((
        Bytes::copy_from_slice(&buf[LENGTH_PREFIX_SIZE..total]),
        total,
    )))
}

/// Encode a payload the way the browser client does: the decimal length
/// left aligned and padded with spaces to five bytes, then the payload.
pub fn encode_frame(payload: &[u8]) -> Result<Bytes> {
    if payload.is_empty() {
        return Err(Error::EmptyPayload);
    }
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(Error::PayloadTooLarge(payload.len()));
    }

    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    buf.put_slice(format!("{:<width$}", payload.len(), width = LENGTH_PREFIX_SIZE).as_bytes());
    buf.put_slice(payload);
    Ok(buf.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_length_padding() {
        assert_eq!(parse_length(b"00005"), 5);
        assert_eq!(parse_length(b"5    "), 5);
        assert_eq!(parse_length(b"  42 "), 42);
        assert_eq!(parse_length(b"\t7\n  "), 7);
    }

    #[test]
    fn test_parse_length_garbage_is_zero() {
        assert_eq!(parse_length(b"hello"), 0);
        assert_eq!(parse_length(b"-0005"), 0);
        assert_eq!(parse_length(b"1 2 3"), 0);
        assert_eq!(parse_length(&[0xff, 0xfe, b'1', b'2', b'3']), 0);
    }

    #[test]
    fn test_check_length_bounds() {
        assert!(check_length(b"65536", 65536, MAX_PAYLOAD_SIZE).is_ok());
        assert!(matches!(
            check_length(b"65537", 65537, MAX_PAYLOAD_SIZE),
            Err(FrameError::PayloadTooLarge { length: 65537, .. })
        ));
        assert!(matches!(
            check_length(b"00000", 0, MAX_PAYLOAD_SIZE),
            Err(FrameError::InvalidLength { .. })
        ));
    }

    #[test]
    fn test_encode_matches_browser_format() {
        let frame = encode_frame(b"hello").unwrap();
        assert_eq!(&frame[..], b"5    hello");
    }

    #[test]
    fn test_encode_rejects_empty() {
        assert!(matches!(encode_frame(b""), Err(Error::EmptyPayload)));
    }

    #[test]
    fn test_decode_partial() {
        assert!(decode(b"000", MAX_PAYLOAD_SIZE).unwrap().is_none());
        assert!(decode(b"00005hel", MAX_PAYLOAD_SIZE).unwrap().is_none());
    }

    #[test]
    fn test_decode_complete() {
        let (payload, used) = decode(b"00002hiextra", MAX_PAYLOAD_SIZE).unwrap().unwrap();
        assert_eq!(&payload[..], b"hi");
        assert_eq!(used, 7);
    }
}
