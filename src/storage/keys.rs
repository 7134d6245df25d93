//! Key namespacing for chunked objects.
//!
//! These helpers define the persisted layout and must stay bit-exact:
//! `{key}_chunks` holds the decimal chunk count, `{key}_{i}` holds chunk `i`.

use std::ops::Range;

use crate::utils::limits::CHUNK_SIZE;

const MANIFEST_SUFFIX: &str = "_chunks";

pub fn manifest_key(key: &str) -> String {
    format!("{}{}", key, MANIFEST_SUFFIX)
}

pub fn chunk_key(key: &str, index: usize) -> String {
    format!("{}_{}", key, index)
}

pub fn encode_manifest(count: usize) -> Vec<u8> {
    count.to_string().into_bytes()
}

/// Parse a stored chunk count. Only ASCII digits are accepted.
pub fn parse_manifest(raw: &[u8]) -> Option<usize> {
    let text = std::str::from_utf8(raw).ok()?.trim();
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

pub fn chunk_count(len: usize) -> usize {
    len.div_ceil(CHUNK_SIZE)
}

/// Byte ranges of every chunk of a `len`-byte object, in index order
pub fn chunk_ranges(len: usize) -> impl Iterator<Item = Range<usize>> {
    (0..chunk_count(len)).map(move |i| {
        let start = i * CHUNK_SIZE;
        start..(start + CHUNK_SIZE).min(len)
    })
}
