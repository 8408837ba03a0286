//! Core domain types used by the trust chain.
//!
//! This module defines strongly-typed hashes, agent identities, signature
//! wrappers and the constants that anchor a chain (genesis sequence number,
//! genesis hash sentinel, the "unknown" link sequence number of a proposal
//! half-block). The goal is to avoid "naked" byte buffers in public APIs
//! and instead use domain-specific newtypes.

use serde::{Deserialize, Serialize};

/// Block record and transaction payload types.
pub mod block;
/// Block index set algebra.
pub mod index;

pub use block::{Block, BlockHash, ExchangeSummary, Transaction};
pub use index::BlockIndex;

/// Length in bytes of all 256-bit hash types used in this module.
pub const HASH_LEN: usize = 32;

/// Length in bytes of an Ed25519 public key.
pub const PUBLIC_KEY_LEN: usize = 32;

/// Length in bytes of an Ed25519 detached signature.
pub const SIGNATURE_LEN: usize = 64;

/// Sequence number of the first block in every chain.
pub const GENESIS_SEQ: u32 = 1;

/// Link sequence number carried by a proposal half-block before the
/// agreement half fills it in.
pub const UNKNOWN_SEQ: u32 = 0;

/// Strongly-typed 256-bit hash wrapper (BLAKE3-256).
///
/// This type is used as the backing representation for all fixed-size
/// hashes in the chain. It is always exactly [`HASH_LEN`] bytes long.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Hash256(pub [u8; HASH_LEN]);

impl Hash256 {
    /// Computes a new [`Hash256`] as the BLAKE3-256 hash of `data`.
    ///
    /// The result is deterministic for a given byte slice and is suitable
    /// for use as an identifier or content hash, but it is **not** a
    /// password hash or KDF.
    pub fn compute(data: &[u8]) -> Self {
        let h = blake3::hash(data);
        Hash256(*h.as_bytes())
    }

    /// Returns the underlying 32-byte hash as a borrowed array.
    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }
}

/// Agent identity: an Ed25519 public key.
///
/// Identity equality is byte equality of the 32-byte key. The ordering
/// derive makes the key usable as a `BTreeMap` key, which keeps every
/// index structure canonically sorted by identity.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct PublicKey(pub [u8; PUBLIC_KEY_LEN]);

impl PublicKey {
    /// Returns the raw public key bytes.
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.0
    }

    /// Human-readable form of the identity, used in log output and file
    /// names. Protocol equality never goes through this form.
    pub fn as_readable(&self) -> String {
        hex::encode(self.0)
    }
}

/// Ed25519 detached signature bytes over a canonical block encoding.
///
/// The wrapper is intentionally opaque: it does not interpret the
/// signature material, it only carries it through the API in a
/// structured way. An empty signature is the placeholder state of a
/// block that has not been signed yet.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Signature(pub Vec<u8>);

impl Signature {
    /// Returns the raw signature bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Placeholder signature used while a block is under construction.
    pub fn empty() -> Self {
        Signature(Vec::new())
    }
}

/// Contact information about an agent as published to the directory.
///
/// `address` is the transport-level reply address of the agent and is the
/// key under which in-flight exchange state is tracked; `agent_type` is a
/// free-form behavior label (e.g. `"protect"`).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub public_key: PublicKey,
    pub address: String,
    pub agent_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash256_is_deterministic() {
        let a = Hash256::compute(b"trust-chain");
        let b = Hash256::compute(b"trust-chain");
        assert_eq!(a, b);
        assert_ne!(a, Hash256::compute(b"trust-chain2"));
    }

    #[test]
    fn public_key_readable_roundtrips_through_hex() {
        let pk = PublicKey([7u8; PUBLIC_KEY_LEN]);
        let readable = pk.as_readable();
        assert_eq!(readable.len(), PUBLIC_KEY_LEN * 2);
        assert_eq!(hex::decode(&readable).unwrap(), pk.as_bytes());
    }

    #[test]
    fn public_key_orders_by_bytes() {
        let low = PublicKey([1u8; PUBLIC_KEY_LEN]);
        let high = PublicKey([2u8; PUBLIC_KEY_LEN]);
        assert!(low < high);
    }
}
