//! Small DER helpers shared by the protocol codecs.

use crate::infra::error::{CaError, CaResult};
use der::{Decode, ErrorKind};

/// DER definite length octets.
#[must_use]
pub fn encode_len(len: usize) -> Vec<u8> {
    if len < 0x80 {
        return vec![len as u8];
    }
    let bytes = len.to_be_bytes();
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len() - 1);
    let significant = &bytes[start..];
    let mut out = Vec::with_capacity(significant.len() + 1);
    out.push(0x80 | significant.len() as u8);
    out.extend_from_slice(significant);
    out
}

/// Tag, length and content.
#[must_use]
pub fn der_tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    out.extend_from_slice(&encode_len(content.len()));
    out.extend_from_slice(content);
    out
}

/// Concatenate already encoded elements under one tag.
#[must_use]
pub fn der_constructed(tag: u8, parts: &[&[u8]]) -> Vec<u8> {
    der_tlv(tag, &parts.concat())
}

/// Decode a complete DER message, mapping failures onto the protocol error
/// kinds: `EmptyRequest`, `TrailingData` and `MalformedRequest`.
pub fn decode_strict<'a, T: Decode<'a>>(bytes: &'a [u8], what: &str) -> CaResult<T> {
    if bytes.is_empty() {
        return Err(CaError::EmptyRequest(what.to_string()));
    }
    T::from_der(bytes).map_err(|e| match e.kind() {
        ErrorKind::TrailingData { .. } => CaError::TrailingData(what.to_string()),
        _ => CaError::MalformedRequest(format!("Failed to decode {what}: {e}")),
    })
}
