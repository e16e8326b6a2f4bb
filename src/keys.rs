//! Length-prefixed key encoding for grant identity and LMDB storage.
//!
//! All keys are encoded as: [len1][bytes1][len2][bytes2]...
//! - Lengths are 2-byte big-endian, so no delimiters and no escaping
//! - Any string content is allowed, two different part lists never encode equal
//! - Works for any number of parts

use crate::model::{Subject, item_id_value};

/// Longest part a key can hold
pub const MAX_PART_LEN: usize = u16::MAX as usize;

/// Build a length-prefixed key from parts.
///
/// Every part must fit in [`MAX_PART_LEN`]; names are bounded far below that by
/// [`crate::catalog::validate_name`] before they reach a key.
#[inline]
pub fn build_key(parts: &[&str]) -> Vec<u8> {
    let total_len: usize = parts.iter().map(|p| 2 + p.len()).sum();
    let mut key = Vec::with_capacity(total_len);
    for part in parts {
        debug_assert!(part.len() <= MAX_PART_LEN, "key part of {} bytes", part.len());
        key.extend_from_slice(&(part.len() as u16).to_be_bytes());
        key.extend_from_slice(part.as_bytes());
    }
    key
}

/// Build a prefix for scanning (same as build_key, just clearer intent)
#[inline]
pub fn build_prefix(parts: &[&str]) -> Vec<u8> {
    build_key(parts)
}

/// Parse a length-prefixed key into parts. Stops at the first malformed part.
pub fn parse_key(bytes: &[u8]) -> Vec<&str> {
    let mut parts = Vec::with_capacity(5);
    let mut i = 0;
    while i + 2 <= bytes.len() {
        let len = u16::from_be_bytes([bytes[i], bytes[i + 1]]) as usize;
        let start = i + 2;
        if start + len > bytes.len() {
            break;
        }
        match std::str::from_utf8(&bytes[start..start + len]) {
            Ok(part) => parts.push(part),
            Err(_) => break,
        }
        i = start + len;
    }
    parts
}

/// Composite identity of a grant without its subject.
///
/// Two grants share a key iff section, item, action and item id are all equal
/// (with an unset item id equal to zero). Dedup, template diffing and
/// reconciliation all compare through this type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GrantKey(Vec<u8>);

impl GrantKey {
    pub fn new(section: &str, item: &str, action: &str, item_id: i32) -> Self {
        GrantKey(build_key(&[section, item, action, &item_id.to_string()]))
    }
}

impl std::fmt::Display for GrantKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&parse_key(&self.0).join("|"))
    }
}

/// Storage uniqueness key: subject tag followed by the grant key parts.
pub fn subject_grant_key(subject: &Subject, section: &str, item: &str, action: &str, item_id: Option<i32>) -> Vec<u8> {
    build_key(&[&subject.tag(), section, item, action, &item_id_value(item_id).to_string()])
}

/// Prefix covering every grant index entry for one subject
pub fn subject_prefix(subject: &Subject) -> Vec<u8> {
    build_prefix(&[&subject.tag()])
}

/// Key for a resource record: [kind][id]
pub fn resource_key(kind: &str, id: i32) -> Vec<u8> {
    build_key(&[kind, &id.to_string()])
}

/// Key for a numeric row id, ordered by id
#[inline]
pub fn id_key(id: i32) -> [u8; 8] {
    (id as i64 as u64).to_be_bytes()
}
