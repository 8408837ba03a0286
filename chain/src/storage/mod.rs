//! Storage backends for the trust chain.
//!
//! This module defines the [`BlockStore`] abstraction used by the agent,
//! plus concrete implementations:
//!
//! - an in-memory store ([`mem::InMemoryBlockStore`]) suitable for tests
//!   and simulations,
//! - a RocksDB-backed store ([`rocksdb::RocksDbBlockStore`]) for
//!   persistent agent processes.

pub mod mem;
pub mod rocksdb;

pub use mem::InMemoryBlockStore;
pub use self::rocksdb::{RocksDbBlockStore, RocksDbConfig, StorageError};

use crate::types::{Block, BlockIndex, GENESIS_SEQ, PublicKey};

/// Abstract storage interface used by the agent.
///
/// Blocks are keyed by `(creator identity, sequence number)`. The
/// interface is intentionally small: the protocol needs idempotent
/// insertion, point and chain retrieval, and index-scoped selection.
pub trait BlockStore {
    /// Inserts a block. Insertion is idempotent per key; on conflict the
    /// earlier insertion is kept.
    fn add(&mut self, block: Block);

    /// Fetches a block by creator and sequence number, if present.
    fn get(&self, public_key: &PublicKey, sequence_number: u32) -> Option<Block>;

    /// Returns every stored block, in no particular order.
    fn get_all_blocks(&self) -> Vec<Block>;

    /// Returns the creator's chain from sequence number 1 upward, in
    /// order. If the stored blocks have gaps, the longest gapless prefix
    /// is returned.
    fn get_chain(&self, public_key: &PublicKey) -> Vec<Block> {
        let mut chain = Vec::new();
        let mut seq = GENESIS_SEQ;
        while let Some(block) = self.get(public_key, seq) {
            chain.push(block);
            seq += 1;
        }
        chain
    }

    /// Returns all blocks listed in the index. Pairs the store does not
    /// hold are omitted; the caller detects the shortfall.
    fn index(&self, index: &BlockIndex) -> Vec<Block> {
        index
            .to_database_args()
            .iter()
            .filter_map(|(public_key, seq)| self.get(public_key, *seq))
            .collect()
    }

    /// True if the pair is stored.
    fn contains(&self, public_key: &PublicKey, sequence_number: u32) -> bool {
        self.get(public_key, sequence_number).is_some()
    }
}
