//! Canonical binary encoding for artifacts, tags, and RPC payloads.
//!
//! `bincode` in serde mode with fixed-width little-endian integers: sequences
//! and strings carry a u64 length prefix and `f64` is written as its IEEE-754
//! bits. Artifacts only use ordered containers, so equal values always encode
//! to identical bytes.

use bincode::config::{Configuration, Fixint, LittleEndian, NoLimit};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{EngineError, EngineResult};

/// Version of the artifact/RPC schema. Peers with a different version are rejected.
pub const CODEC_SCHEMA_VERSION: u32 = 1;

fn config() -> Configuration<LittleEndian, Fixint, NoLimit> {
    bincode::config::standard().with_little_endian().with_fixed_int_encoding()
}

/// Encode a value into its canonical byte form.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> EngineResult<Vec<u8>> {
    bincode::serde::encode_to_vec(value, config()).map_err(|e| EngineError::Codec(e.to_string()))
}

/// Decode a value, rejecting trailing bytes.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> EngineResult<T> {
    let (value, read): (T, usize) = bincode::serde::decode_from_slice(bytes, config())
        .map_err(|e| EngineError::Codec(e.to_string()))?;
    if read != bytes.len() {
        return Err(EngineError::Codec(format!(
            "{} trailing bytes after canonical value",
            bytes.len() - read
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn empty_list_is_a_zero_length_prefix() {
        let bytes = encode(&Vec::<String>::new()).unwrap();
        assert_eq!(bytes, vec![0u8; 8]);
    }

    #[test]
    fn maps_encode_in_key_order() {
        let mut a = BTreeMap::new();
        a.insert("b".to_string(), 2u32);
        a.insert("a".to_string(), 1u32);
        let mut b = BTreeMap::new();
        b.insert("a".to_string(), 1u32);
        b.insert("b".to_string(), 2u32);
        assert_eq!(encode(&a).unwrap(), encode(&b).unwrap());
    }

    #[test]
    fn decode_rejects_trailing_bytes() {
        let mut bytes = encode(&7u32).unwrap();
        bytes.push(0);
        assert!(matches!(decode::<u32>(&bytes), Err(EngineError::Codec(_))));
    }
}
