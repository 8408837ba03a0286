// chain/src/types/block.rs

//! Block record and transaction payload.
//!
//! A block is the immutable unit of a trust chain: it names its creator,
//! its position in the creator's chain, the counterparty of the recorded
//! interaction, the hash of the creator's previous block, and an opaque
//! transaction payload.
//!
//! Serialization is done with **bincode 2** using the `serde` integration
//! (`bincode::serde::encode_to_vec`) and an explicit `standard()` config.
//! The same canonical encoding is used everywhere we need block bytes:
//! hashing, signing, wire frames, and the shutdown dump.

use serde::{Deserialize, Serialize};

use super::{BlockIndex, GENESIS_SEQ, HASH_LEN, Hash256, PublicKey, Signature, UNKNOWN_SEQ};

/// Strongly-typed block hash.
///
/// This is the content hash of a [`Block`], computed as a BLAKE3-256
/// digest over the canonical bincode-2 serialization of the block.
/// Wrapping the underlying [`Hash256`] avoids passing raw byte arrays
/// around in public APIs.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct BlockHash(pub Hash256);

/// Hash sentinel carried in `previous_hash` by every genesis block.
pub const GENESIS_HASH: BlockHash = BlockHash(Hash256([0u8; HASH_LEN]));

/// Summary of the two block sets that flowed during one exchange session.
///
/// Both halves of an exchange block pair carry the same summary, written
/// from the initiator's point of view: `transfer_up` is what the
/// initiator sent, `transfer_down` is what the initiator received.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ExchangeSummary {
    pub transfer_up: BlockIndex,
    pub transfer_down: BlockIndex,
}

/// Transaction payload of a block.
///
/// Plain interactions and genesis blocks carry [`Transaction::Empty`];
/// exchange blocks carry the session's [`ExchangeSummary`]. The payload
/// travels as opaque bytes inside the block (see [`Transaction::to_bytes`])
/// so that the block layout stays independent of the payload vocabulary.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Transaction {
    /// No structured content; records the bare fact of an interaction.
    Empty,
    /// Attests the block sets exchanged during an audit session.
    Exchange(ExchangeSummary),
}

impl Transaction {
    /// Encodes the transaction into its canonical byte form.
    ///
    /// # Panics
    ///
    /// Panics if encoding fails. This is considered a programming error,
    /// because all payload fields are required to be serializable.
    pub fn to_bytes(&self) -> Vec<u8> {
        let cfg = bincode::config::standard();
        bincode::serde::encode_to_vec(self, cfg)
            .expect("Transaction should always be serializable with bincode 2 + serde")
    }

    /// Decodes a transaction from canonical bytes, `None` on malformed
    /// input.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let cfg = bincode::config::standard();
        let (tx, _): (Transaction, usize) = bincode::serde::decode_from_slice(bytes, cfg).ok()?;
        Some(tx)
    }
}

/// A signed, hash-linked record of one half of a pairwise interaction.
///
/// Invariants maintained by the factory and checked by validation:
///
/// - sequence numbers per creator form the contiguous range `1..=N`,
/// - every non-genesis block's `previous_hash` is the hash of the
///   creator's previous block,
/// - proposal and agreement halves of one interaction carry identical
///   payload bytes and crossed `link_*` fields.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Identity of the block's creator.
    pub public_key: PublicKey,
    /// Position of this block in the creator's chain, starting at 1.
    pub sequence_number: u32,
    /// Identity of the interaction counterparty.
    pub link_public_key: PublicKey,
    /// Counterparty's sequence number for the paired half-block.
    ///
    /// [`UNKNOWN_SEQ`] on a proposal half; filled in on the agreement
    /// half with the proposal's sequence number.
    pub link_sequence_number: u32,
    /// Hash of the creator's previous block; [`GENESIS_HASH`] at genesis.
    pub previous_hash: BlockHash,
    /// Ed25519 signature over [`Block::signing_bytes`].
    pub signature: Signature,
    /// Opaque serialized [`Transaction`].
    pub payload: Vec<u8>,
}

impl Block {
    /// Returns the canonical byte representation of this block.
    ///
    /// All hashing and network encoding that depend on a "canonical"
    /// form go through this method to avoid format drift.
    ///
    /// # Panics
    ///
    /// Panics if encoding fails; all fields are plain serializable data.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        // Explicit config to avoid relying on any implicit defaults.
        let cfg = bincode::config::standard();
        bincode::serde::encode_to_vec(self, cfg)
            .expect("Block should always be serializable with bincode 2 + serde")
    }

    /// Returns the bytes covered by the block signature: the canonical
    /// encoding of every field except the signature itself.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let cfg = bincode::config::standard();
        let view = (
            &self.public_key,
            self.sequence_number,
            &self.link_public_key,
            self.link_sequence_number,
            &self.previous_hash,
            &self.payload,
        );
        bincode::serde::encode_to_vec(view, cfg)
            .expect("Block signing view should always be serializable")
    }

    /// Computes the canonical BLAKE3-256 hash of this block.
    ///
    /// The hash covers the full block including the signature, so two
    /// blocks with the same content but different signers never collide.
    /// This must remain stable across agents for the audit to work.
    pub fn compute_hash(&self) -> BlockHash {
        let bytes = self.canonical_bytes();
        BlockHash(Hash256::compute(&bytes))
    }

    /// Decodes the transaction payload, `None` on malformed bytes.
    pub fn transaction(&self) -> Option<Transaction> {
        Transaction::from_bytes(&self.payload)
    }

    /// Returns the exchange summary if this block's payload carries one.
    pub fn exchange_summary(&self) -> Option<ExchangeSummary> {
        match self.transaction() {
            Some(Transaction::Exchange(summary)) => Some(summary),
            _ => None,
        }
    }

    /// True for the proposal half of an interaction (link sequence
    /// number not yet known).
    pub fn is_proposal(&self) -> bool {
        self.link_sequence_number == UNKNOWN_SEQ
    }

    /// True for the first block of a chain.
    pub fn is_genesis(&self) -> bool {
        self.sequence_number == GENESIS_SEQ
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PUBLIC_KEY_LEN;

    fn dummy_key(byte: u8) -> PublicKey {
        PublicKey([byte; PUBLIC_KEY_LEN])
    }

    fn dummy_block(seq: u32, payload: Vec<u8>) -> Block {
        Block {
            public_key: dummy_key(1),
            sequence_number: seq,
            link_public_key: dummy_key(2),
            link_sequence_number: UNKNOWN_SEQ,
            previous_hash: GENESIS_HASH,
            signature: Signature::empty(),
            payload,
        }
    }

    #[test]
    fn block_hash_is_deterministic() {
        let block = dummy_block(1, Transaction::Empty.to_bytes());
        let h1 = block.compute_hash();
        let h2 = block.compute_hash();
        assert_eq!(h1, h2);
    }

    #[test]
    fn block_hash_covers_signature() {
        let unsigned = dummy_block(1, Transaction::Empty.to_bytes());
        let mut signed = unsigned.clone();
        signed.signature = Signature(vec![9u8; 64]);
        assert_ne!(unsigned.compute_hash(), signed.compute_hash());
    }

    #[test]
    fn signing_bytes_exclude_signature() {
        let unsigned = dummy_block(1, Transaction::Empty.to_bytes());
        let mut signed = unsigned.clone();
        signed.signature = Signature(vec![9u8; 64]);
        assert_eq!(unsigned.signing_bytes(), signed.signing_bytes());
    }

    #[test]
    fn transaction_roundtrips_through_payload_bytes() {
        let mut up = BlockIndex::new();
        up.insert(dummy_key(3), 4);
        let summary = ExchangeSummary {
            transfer_up: up.clone(),
            transfer_down: BlockIndex::new(),
        };
        let tx = Transaction::Exchange(summary.clone());

        let block = dummy_block(2, tx.to_bytes());
        assert_eq!(block.transaction(), Some(tx));
        assert_eq!(block.exchange_summary(), Some(summary));
    }

    #[test]
    fn empty_transaction_has_no_exchange_summary() {
        let block = dummy_block(1, Transaction::Empty.to_bytes());
        assert_eq!(block.exchange_summary(), None);
    }

    #[test]
    fn malformed_payload_decodes_to_none() {
        let block = dummy_block(1, vec![0xff, 0xff, 0xff, 0xff]);
        assert_eq!(block.transaction(), None);
    }

    #[test]
    fn proposal_and_genesis_flags() {
        let block = dummy_block(GENESIS_SEQ, Transaction::Empty.to_bytes());
        assert!(block.is_genesis());
        assert!(block.is_proposal());

        let mut agreement = dummy_block(2, Transaction::Empty.to_bytes());
        agreement.link_sequence_number = 5;
        assert!(!agreement.is_proposal());
        assert!(!agreement.is_genesis());
    }
}
