//! Primitive wire types: big-endian integers, the fixed 64-byte string and
//! the ×32 fixed-point coordinate encoding.

use crate::error::ProtocolResult;
use crate::STRING_LENGTH;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Converts a world coordinate to its fixed-point wire value (1/32 block).
pub fn to_fixed(value: f32) -> i16 {
    // `as` saturates at the i16 range on overflow
    (value * 32.0).round() as i16
}

/// Converts a fixed-point wire value back to a world coordinate.
pub fn from_fixed(value: i16) -> f32 {
    value as f32 / 32.0
}

/// Encodes `value` as exactly 64 bytes, right-padded with ASCII spaces.
///
/// Characters outside ASCII have no single-byte representation on the wire
/// and are replaced by `?`, so one character always maps to one byte.
pub fn pad_string(value: &str) -> [u8; STRING_LENGTH] {
    let mut raw = [b' '; STRING_LENGTH];
    for (slot, ch) in raw.iter_mut().zip(value.chars()) {
        *slot = if ch.is_ascii() { ch as u8 } else { b'?' };
    }
    raw
}

/// Decodes a 64-byte wire string. With `trim` set, only trailing whitespace
/// is removed; interior and leading spaces are preserved.
pub fn unpad_string(raw: &[u8; STRING_LENGTH], trim: bool) -> String {
    let text: String = raw
        .iter()
        .map(|&b| if b.is_ascii() { b as char } else { '?' })
        .collect();

    if trim {
        text.trim_end().to_string()
    } else {
        text
    }
}

/// Cuts `value` down to at most `limit` wire bytes.
pub fn truncate_wire(value: &str, limit: usize) -> String {
    value.chars().take(limit).collect()
}

/// Extension methods for writing wire primitives into an outgoing buffer.
pub trait WireWrite {
    fn put_u8(&mut self, value: u8);
    fn put_i8(&mut self, value: i8);
    fn put_i16(&mut self, value: i16);
    fn put_i32(&mut self, value: i32);
    fn put_string(&mut self, value: &str);
}

impl WireWrite for Vec<u8> {
    fn put_u8(&mut self, value: u8) {
        self.push(value);
    }

    fn put_i8(&mut self, value: i8) {
        self.push(value as u8);
    }

    fn put_i16(&mut self, value: i16) {
        self.extend_from_slice(&value.to_be_bytes());
    }

    fn put_i32(&mut self, value: i32) {
        self.extend_from_slice(&value.to_be_bytes());
    }

    fn put_string(&mut self, value: &str) {
        self.extend_from_slice(&pad_string(value));
    }
}

/// Reads wire primitives from an async byte stream.
///
/// Every read is exact: a stream that ends early yields an
/// `UnexpectedEof` I/O error, which callers treat as fatal to the session.
pub struct PacketReader<R> {
    inner: R,
}

impl<R: AsyncRead + Unpin> PacketReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    pub async fn read_u8(&mut self) -> ProtocolResult<u8> {
        Ok(self.inner.read_u8().await?)
    }

    pub async fn read_i8(&mut self) -> ProtocolResult<i8> {
        Ok(self.inner.read_i8().await?)
    }

    pub async fn read_i16(&mut self) -> ProtocolResult<i16> {
        Ok(self.inner.read_i16().await?)
    }

    pub async fn read_i32(&mut self) -> ProtocolResult<i32> {
        Ok(self.inner.read_i32().await?)
    }

    pub async fn read_string(&mut self, trim: bool) -> ProtocolResult<String> {
        let mut raw = [0u8; STRING_LENGTH];
        self.inner.read_exact(&mut raw).await?;
        Ok(unpad_string(&raw, trim))
    }

    pub async fn read_fixed(&mut self) -> ProtocolResult<f32> {
        Ok(from_fixed(self.read_i16().await?))
    }

    pub async fn read_exact(&mut self, buf: &mut [u8]) -> ProtocolResult<()> {
        self.inner.read_exact(buf).await?;
        Ok(())
    }
}
