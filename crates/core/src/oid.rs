//! Content-addressed object identifiers.
//!
//! A file's OID is the hex SHA-1 of its bytes. A collection's OID is the hex
//! SHA-1 over the concatenation of its members' OIDs in sorted order.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

/// Hex SHA-1 identifier of a file, collection, or map/reduce job.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Oid(String);

impl Oid {
    /// OID of a raw byte sequence.
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(data);
        Self(format!("{:x}", hasher.finalize()))
    }

    /// OID of a collection: members are sorted and de-duplicated before hashing,
    /// so member order never changes the identifier.
    pub fn for_collection<'a>(members: impl IntoIterator<Item = &'a Oid>) -> Self {
        let mut sorted: Vec<&Oid> = members.into_iter().collect();
        sorted.sort();
        sorted.dedup();
        let mut hasher = Sha1::new();
        for member in sorted {
            hasher.update(member.0.as_bytes());
        }
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Parse a 40-character hex string. Uppercase input is normalised.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.len() == 40 && raw.bytes().all(|b| b.is_ascii_hexdigit()) {
            Some(Self(raw.to_ascii_lowercase()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Stable bucket for hash partitioning across `buckets` workers.
    pub fn bucket(&self, buckets: usize) -> usize {
        if buckets == 0 {
            return 0;
        }
        let prefix = self.0.get(..16).unwrap_or(&self.0);
        let value = u64::from_str_radix(prefix, 16).unwrap_or(0);
        (value % buckets as u64) as usize
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_oid_is_sha1_hex() {
        assert_eq!(Oid::from_bytes(b"abc").as_str(), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[test]
    fn parse_accepts_only_forty_hex_digits() {
        assert!(Oid::parse("A9993E364706816ABA3E25717850C26C9CD0D89D").is_some());
        assert!(Oid::parse("a9993e").is_none());
        assert!(Oid::parse("g9993e364706816aba3e25717850c26c9cd0d89d").is_none());
    }

    #[test]
    fn bucket_is_within_range() {
        let oid = Oid::from_bytes(b"bucket");
        for n in 1..8 {
            assert!(oid.bucket(n) < n);
        }
        assert_eq!(oid.bucket(0), 0);
    }
}
