//! In-memory block store.
//!
//! This implementation is useful for unit tests, simulations, and small
//! experiments. It keeps all blocks in a `HashMap` keyed by
//! `(creator, sequence number)`.

use std::collections::HashMap;

use super::BlockStore;
use crate::types::{Block, PublicKey};

/// In-memory implementation of [`BlockStore`].
#[derive(Default)]
pub struct InMemoryBlockStore {
    blocks: HashMap<(PublicKey, u32), Block>,
}

impl InMemoryBlockStore {
    /// Creates a new, empty in-memory block store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of blocks currently stored.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Returns `true` if no blocks are stored.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

impl BlockStore for InMemoryBlockStore {
    fn add(&mut self, block: Block) {
        self.blocks
            .entry((block.public_key, block.sequence_number))
            .or_insert(block);
    }

    fn get(&self, public_key: &PublicKey, sequence_number: u32) -> Option<Block> {
        self.blocks.get(&(*public_key, sequence_number)).cloned()
    }

    fn get_all_blocks(&self) -> Vec<Block> {
        self.blocks.values().cloned().collect()
    }
}
