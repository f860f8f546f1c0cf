//! `raw_bytes_t` message body.
//!
//! ```text
//! ┌──────────────────┬──────────────┬──────────────┬──────────────────┐
//! │ Fingerprint (8B) │ utime (8B BE)│ length (4B BE)│ data (length B) │
//! └──────────────────┴──────────────┴──────────────┴──────────────────┘
//! ```
//!
//! Type definition:
//!
//! ```text
//! struct raw_bytes_t {
//!     int64_t utime;
//!     int32_t length;
//!     byte    data[length];
//! }
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serbus_frame::Frame;

use crate::error::{BusError, Result};

/// Size of the fixed part of the body (fingerprint + utime + length).
pub const RAW_BYTES_HEADER_SIZE: usize = 8 + 8 + 4;

/// Type fingerprint of `raw_bytes_t`, as generated for LCM bindings.
pub const RAW_BYTES_FINGERPRINT: u64 = rotate_hash(struct_hash());

// Dimension modes in the type hash.
const DIM_VAR: i64 = 1;

const fn hash_update(v: i64, c: i64) -> i64 {
    ((v << 8) ^ (v >> 55)).wrapping_add(c)
}

const fn hash_string_update(mut v: i64, s: &[u8]) -> i64 {
    v = hash_update(v, s.len() as i64);
    let mut i = 0;
    while i < s.len() {
        v = hash_update(v, s[i] as i8 as i64);
        i += 1;
    }
    v
}

const fn struct_hash() -> i64 {
    let mut v: i64 = 0x1234_5678;

    v = hash_string_update(v, b"utime");
    v = hash_string_update(v, b"int64_t");
    v = hash_update(v, 0);

    v = hash_string_update(v, b"length");
    v = hash_string_update(v, b"int32_t");
    v = hash_update(v, 0);

    v = hash_string_update(v, b"data");
    v = hash_string_update(v, b"byte");
    v = hash_update(v, 1);
    v = hash_update(v, DIM_VAR);
    v = hash_string_update(v, b"length");

    v
}

const fn rotate_hash(hash: i64) -> u64 {
    (hash as u64).rotate_left(1)
}

/// Encode a frame as a `raw_bytes_t` body.
pub fn encode(frame: &Frame) -> Result<Bytes> {
    let length = i32::try_from(frame.payload.len()).map_err(|_| BusError::MessageTooLarge {
        size: frame.payload.len(),
        max: i32::MAX as usize,
    })?;

    let mut buf = BytesMut::with_capacity(RAW_BYTES_HEADER_SIZE + frame.payload.len());
    buf.put_u64(RAW_BYTES_FINGERPRINT);
    buf.put_i64(frame.utime);
    buf.put_i32(length);
    buf.put_slice(&frame.payload);
    Ok(buf.freeze())
}

/// Decode a `raw_bytes_t` body into a frame.
pub fn decode(mut body: Bytes) -> Result<Frame> {
    if body.len() < RAW_BYTES_HEADER_SIZE {
        return Err(BusError::Decode(format!(
            "raw_bytes_t body truncated ({} bytes)",
            body.len()
        )));
    }

    let fingerprint = body.get_u64();
    if fingerprint != RAW_BYTES_FINGERPRINT {
        return Err(BusError::Decode(format!(
            "fingerprint mismatch (got {fingerprint:#018x}, expected {RAW_BYTES_FINGERPRINT:#018x})"
        )));
    }

    let utime = body.get_i64();
    let length = body.get_i32();
    let length = usize::try_from(length)
        .map_err(|_| BusError::Decode(format!("negative length {length}")))?;
    if body.len() < length {
        return Err(BusError::Decode(format!(
            "raw_bytes_t data truncated ({} of {length} bytes)",
            body.len()
        )));
    }

    Ok(Frame::new(utime, body.split_to(length)))
}
