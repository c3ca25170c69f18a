//! Partition key hashing.
//!
//! The hash maps a document's partition key value onto the `u64` key space
//! that [`HashRange`](super::HashRange)s partition. The policy here is
//! illustrative, not a production algorithm: the only properties the
//! pagination engine relies on are determinism and a stable value for a
//! given key across the lifetime of a store.

use serde_json::Value;

/// Deterministic 64-bit hash of a partition key value.
///
/// 64-bit FNV-1a over the canonical JSON encoding of the key. FNV keeps
/// the hash stable across toolchains without extra dependencies.
pub fn hash_partition_key(key: &Value) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;

    // Canonical text form so `1` and `1.0`-style representation differences
    // inside serde_json do not produce distinct hashes for the same key.
    let encoded = key.to_string();
    encoded.as_bytes().iter().fold(OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(PRIME)
    })
}
