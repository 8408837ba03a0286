//! Storage of exchange attestations.
//!
//! For every exchange block an agent appends to its own chain, it records
//! which blocks it received during that session. Peers combine these
//! attestations with the chain itself to reconstruct the agent's complete
//! knowledge, which is exactly what the audit checks against.
//!
//! Entries are insert-only: written when the local half-block is created,
//! never updated, never removed.

use std::collections::HashMap;

use crate::protocol::{ExchangeIndex, ExchangeIndexEntry};
use crate::types::{Block, BlockHash, BlockIndex};

/// Map from local exchange block hash to the block index it attests.
#[derive(Debug, Default)]
pub struct ExchangeStorage {
    exchanges: HashMap<BlockHash, BlockIndex>,
}

impl ExchangeStorage {
    /// Creates an empty exchange storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the attestation for a freshly created local exchange
    /// block.
    pub fn add_exchange(&mut self, block: &Block, index: BlockIndex) {
        self.exchanges.insert(block.compute_hash(), index);
    }

    /// Returns the attested index for a block hash, if recorded.
    pub fn get(&self, hash: &BlockHash) -> Option<&BlockIndex> {
        self.exchanges.get(hash)
    }

    /// Number of recorded attestations.
    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    /// True if nothing is recorded yet.
    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    /// Union of all attested indices.
    pub fn combined_index(&self) -> BlockIndex {
        self.exchanges
            .values()
            .fold(BlockIndex::new(), |acc, index| acc.union(index))
    }

    /// Wire projection of the storage.
    pub fn as_message(&self) -> ExchangeIndex {
        let mut entries: Vec<ExchangeIndexEntry> = self
            .exchanges
            .iter()
            .map(|(hash, index)| ExchangeIndexEntry {
                block_hash: *hash,
                index: index.clone(),
            })
            .collect();
        // Canonical order on the wire.
        entries.sort_by_key(|entry| entry.block_hash);
        ExchangeIndex { entries }
    }

    /// Rebuilds a storage from its wire projection.
    pub fn from_message(message: &ExchangeIndex) -> Self {
        let exchanges = message
            .entries
            .iter()
            .map(|entry| (entry.block_hash, entry.index.clone()))
            .collect();
        Self { exchanges }
    }
}

/// Union of the indices attested in a wire-form exchange storage.
pub fn combined_wire_index(message: &ExchangeIndex) -> BlockIndex {
    message
        .entries
        .iter()
        .fold(BlockIndex::new(), |acc, entry| acc.union(&entry.index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::block::GENESIS_HASH;
    use crate::types::{PUBLIC_KEY_LEN, PublicKey, Signature, Transaction, UNKNOWN_SEQ};

    fn dummy_block(creator: u8, seq: u32) -> Block {
        Block {
            public_key: PublicKey([creator; PUBLIC_KEY_LEN]),
            sequence_number: seq,
            link_public_key: PublicKey([creator.wrapping_add(1); PUBLIC_KEY_LEN]),
            link_sequence_number: UNKNOWN_SEQ,
            previous_hash: GENESIS_HASH,
            signature: Signature::empty(),
            payload: Transaction::Empty.to_bytes(),
        }
    }

    fn index_of(creator: u8, seqs: &[u32]) -> BlockIndex {
        let mut index = BlockIndex::new();
        for seq in seqs {
            index.insert(PublicKey([creator; PUBLIC_KEY_LEN]), *seq);
        }
        index
    }

    #[test]
    fn add_and_lookup() {
        let mut storage = ExchangeStorage::new();
        let block = dummy_block(1, 2);
        storage.add_exchange(&block, index_of(9, &[1, 2]));

        assert_eq!(storage.len(), 1);
        assert_eq!(
            storage.get(&block.compute_hash()),
            Some(&index_of(9, &[1, 2]))
        );
    }

    #[test]
    fn combined_index_unions_all_attestations() {
        let mut storage = ExchangeStorage::new();
        storage.add_exchange(&dummy_block(1, 2), index_of(9, &[1]));
        storage.add_exchange(&dummy_block(1, 3), index_of(9, &[2]));

        assert_eq!(storage.combined_index(), index_of(9, &[1, 2]));
    }

    #[test]
    fn wire_projection_roundtrips() {
        let mut storage = ExchangeStorage::new();
        storage.add_exchange(&dummy_block(1, 2), index_of(9, &[1, 4]));
        storage.add_exchange(&dummy_block(1, 3), BlockIndex::new());

        let message = storage.as_message();
        let rebuilt = ExchangeStorage::from_message(&message);

        assert_eq!(rebuilt.len(), storage.len());
        assert_eq!(rebuilt.combined_index(), storage.combined_index());
        assert_eq!(combined_wire_index(&message), storage.combined_index());
    }

    #[test]
    fn wire_entries_are_sorted_by_hash() {
        let mut storage = ExchangeStorage::new();
        storage.add_exchange(&dummy_block(1, 2), BlockIndex::new());
        storage.add_exchange(&dummy_block(2, 5), BlockIndex::new());
        storage.add_exchange(&dummy_block(3, 7), BlockIndex::new());

        let message = storage.as_message();
        let hashes: Vec<_> = message.entries.iter().map(|e| e.block_hash).collect();
        let mut sorted = hashes.clone();
        sorted.sort();
        assert_eq!(hashes, sorted);
    }
}
