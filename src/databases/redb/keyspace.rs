//! Layout of the single flat key-space shared by every bucket.
//!
//! ```text
//! bucket entry    : [len(name) as u16 BE] [name bytes] [encoded key]
//! sequence record : [0xFF 0xFF] [name bytes]
//! ```
//!
//! Two different bucket names never produce overlapping ranges: either their
//! lengths differ, which the first two bytes capture, or they have the same
//! length and differ within the name bytes. No legal name is 0xFFFF bytes long,
//! so the sequence range cannot overlap a bucket either.

use std::ops::Bound;

use crate::errors::{DbError, DbResult};

pub(crate) const SEQUENCE_TAG: [u8; 2] = [0xFF, 0xFF];

pub(crate) const MAX_NAME_LEN: usize = 0xFFFE;

pub fn bucket_prefix(name: &str) -> DbResult<Vec<u8>> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(DbError::InvalidName(name.to_string()));
    }
    let mut prefix = Vec::with_capacity(2 + name.len());
    prefix.extend_from_slice(&(name.len() as u16).to_be_bytes());
    prefix.extend_from_slice(name.as_bytes());
    Ok(prefix)
}

pub(crate) fn sequence_key(name: &str) -> Vec<u8> {
    let mut key = SEQUENCE_TAG.to_vec();
    key.extend_from_slice(name.as_bytes());
    key
}

/// Smallest byte string greater than every key starting with `prefix`.
///
/// `None` means no such string exists (the prefix is empty or all `0xFF`), so
/// the range is unbounded above.
pub fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < 0xFF {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}

/// A contiguous slice of the key-space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ScanRange {
    pub lower: Bound<Vec<u8>>,
    pub upper: Bound<Vec<u8>>,
}

impl ScanRange {
    /// Every key that starts with `prefix`.
    pub fn with_prefix(prefix: &[u8]) -> Self {
        Self {
            lower: Bound::Included(prefix.to_vec()),
            upper: prefix_successor(prefix).map_or(Bound::Unbounded, Bound::Excluded),
        }
    }

    /// True when no key can satisfy both bounds.
    pub fn is_empty(&self) -> bool {
        match (&self.lower, &self.upper) {
            (Bound::Included(lo), Bound::Included(hi)) => lo > hi,
            (Bound::Included(lo), Bound::Excluded(hi))
            | (Bound::Excluded(lo), Bound::Included(hi))
            | (Bound::Excluded(lo), Bound::Excluded(hi)) => lo >= hi,
            _ => false,
        }
    }

    pub fn as_ref_bounds(&self) -> (Bound<&[u8]>, Bound<&[u8]>) {
        (as_ref_bound(&self.lower), as_ref_bound(&self.upper))
    }
}

fn as_ref_bound(bound: &Bound<Vec<u8>>) -> Bound<&[u8]> {
    match bound {
        Bound::Included(k) => Bound::Included(k.as_slice()),
        Bound::Excluded(k) => Bound::Excluded(k.as_slice()),
        Bound::Unbounded => Bound::Unbounded,
    }
}
