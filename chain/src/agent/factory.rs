//! Block construction.
//!
//! The factory is responsible for assembling and signing the blocks an
//! agent appends to its own chain: the genesis block, proposal halves
//! for new interactions, and agreement halves linked to a received
//! proposal.
//!
//! The factory is deliberately stateless with respect to the chain; it
//! holds only the agent's [`Identity`] and queries a [`BlockStore`]
//! provided at call time. Every block it produces is persisted into that
//! store before it is returned.

use std::fmt;

use crate::crypto::Identity;
use crate::storage::BlockStore;
use crate::types::block::GENESIS_HASH;
use crate::types::{Block, GENESIS_SEQ, PublicKey, Signature, Transaction, UNKNOWN_SEQ};

/// Errors produced during block construction.
#[derive(Debug)]
pub enum FactoryError {
    /// The local chain has no genesis block yet; the agent must create it
    /// before proposing interactions.
    MissingGenesis,
}

impl fmt::Display for FactoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FactoryError::MissingGenesis => {
                write!(f, "local chain has no genesis block")
            }
        }
    }
}

impl std::error::Error for FactoryError {}

/// Builds and signs the blocks of this agent's chain.
pub struct BlockFactory {
    identity: Identity,
}

impl BlockFactory {
    /// Creates a factory around the agent's identity.
    pub fn new(identity: Identity) -> Self {
        Self { identity }
    }

    /// The agent identity this factory signs for.
    pub fn public_key(&self) -> PublicKey {
        self.identity.public_key()
    }

    /// Creates and stores the genesis block if the chain is still empty.
    ///
    /// Idempotent: if a genesis block already exists it is returned
    /// unchanged.
    pub fn create_genesis<S: BlockStore>(&self, store: &mut S) -> Block {
        let own = self.public_key();
        if let Some(existing) = store.get(&own, GENESIS_SEQ) {
            return existing;
        }

        let block = self.build_signed(own, GENESIS_SEQ, UNKNOWN_SEQ, GENESIS_HASH, Transaction::Empty);
        store.add(block.clone());
        block
    }

    /// Builds the proposal half of a new interaction with `partner`.
    ///
    /// The block gets the next local sequence number, links to the
    /// partner with an unknown link sequence number, carries the hash of
    /// the local tip, and is stored before being returned.
    pub fn create_new<S: BlockStore>(
        &self,
        store: &mut S,
        partner: PublicKey,
        transaction: Transaction,
    ) -> Result<Block, FactoryError> {
        let (previous_hash, sequence_number) = self.tip_of(store)?;
        let block = self.build_signed(partner, sequence_number, UNKNOWN_SEQ, previous_hash, transaction);
        store.add(block.clone());
        Ok(block)
    }

    /// Builds the agreement half linked to a received proposal.
    ///
    /// The agreement copies the proposal's payload bytes, fills in the
    /// link fields from the proposal, and is stored before being
    /// returned.
    pub fn create_linked<S: BlockStore>(
        &self,
        store: &mut S,
        proposal: &Block,
    ) -> Result<Block, FactoryError> {
        let (previous_hash, sequence_number) = self.tip_of(store)?;

        let mut block = Block {
            public_key: self.public_key(),
            sequence_number,
            link_public_key: proposal.public_key,
            link_sequence_number: proposal.sequence_number,
            previous_hash,
            signature: Signature::empty(),
            payload: proposal.payload.clone(),
        };
        block.signature = self.identity.sign(&block.signing_bytes());

        store.add(block.clone());
        Ok(block)
    }

    fn tip_of<S: BlockStore>(&self, store: &S) -> Result<(crate::types::BlockHash, u32), FactoryError> {
        let chain = store.get_chain(&self.public_key());
        match chain.last() {
            Some(tip) => Ok((tip.compute_hash(), tip.sequence_number + 1)),
            None => Err(FactoryError::MissingGenesis),
        }
    }

    fn build_signed(
        &self,
        link_public_key: PublicKey,
        sequence_number: u32,
        link_sequence_number: u32,
        previous_hash: crate::types::BlockHash,
        transaction: Transaction,
    ) -> Block {
        let mut block = Block {
            public_key: self.public_key(),
            sequence_number,
            link_public_key,
            link_sequence_number,
            previous_hash,
            signature: Signature::empty(),
            payload: transaction.to_bytes(),
        };
        block.signature = self.identity.sign(&block.signing_bytes());
        block
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryBlockStore;
    use crate::validation::{verify_chain, verify_linked_pair};

    fn factory(seed: u8) -> BlockFactory {
        BlockFactory::new(Identity::from_seed([seed; 32]))
    }

    #[test]
    fn genesis_is_idempotent_and_self_linked() {
        let f = factory(1);
        let mut store = InMemoryBlockStore::new();

        let genesis = f.create_genesis(&mut store);
        assert_eq!(genesis.sequence_number, GENESIS_SEQ);
        assert_eq!(genesis.previous_hash, GENESIS_HASH);
        assert_eq!(genesis.link_public_key, f.public_key());
        assert!(genesis.verify_signature().is_ok());

        let again = f.create_genesis(&mut store);
        assert_eq!(again, genesis);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn create_new_requires_genesis() {
        let f = factory(2);
        let mut store = InMemoryBlockStore::new();
        let partner = factory(3).public_key();

        assert!(matches!(
            f.create_new(&mut store, partner, Transaction::Empty),
            Err(FactoryError::MissingGenesis)
        ));
    }

    #[test]
    fn proposals_extend_the_chain_with_valid_links() {
        let f = factory(4);
        let mut store = InMemoryBlockStore::new();
        let partner = factory(5).public_key();

        f.create_genesis(&mut store);
        let p1 = f
            .create_new(&mut store, partner, Transaction::Empty)
            .expect("proposal");
        let p2 = f
            .create_new(&mut store, partner, Transaction::Empty)
            .expect("proposal");

        assert_eq!(p1.sequence_number, 2);
        assert_eq!(p2.sequence_number, 3);
        assert!(p1.is_proposal());
        assert_eq!(p1.link_public_key, partner);

        let chain = store.get_chain(&f.public_key());
        assert_eq!(chain.len(), 3);
        assert!(verify_chain(&chain).is_ok());
    }

    #[test]
    fn linked_agreement_satisfies_the_pair_invariants() {
        let fa = factory(6);
        let fb = factory(7);
        let mut store_a = InMemoryBlockStore::new();
        let mut store_b = InMemoryBlockStore::new();

        fa.create_genesis(&mut store_a);
        fb.create_genesis(&mut store_b);

        let proposal = fa
            .create_new(&mut store_a, fb.public_key(), Transaction::Empty)
            .expect("proposal");
        let agreement = fb
            .create_linked(&mut store_b, &proposal)
            .expect("agreement");

        assert!(verify_linked_pair(&proposal, &agreement).is_ok());
        assert!(agreement.verify_signature().is_ok());
        assert_eq!(agreement.sequence_number, 2);
        assert!(store_b.contains(&fb.public_key(), 2));
    }
}
