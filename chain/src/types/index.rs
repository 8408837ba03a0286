// chain/src/types/index.rs

//! Block index set algebra.
//!
//! A [`BlockIndex`] is a compact proof-of-set: for each agent identity it
//! records which sequence numbers of that agent's chain are covered. The
//! audit protocol is built on two operations over these indices, union
//! and difference, plus two constructors: one over a bag of concrete
//! blocks, and one over a chain that also folds in the block sets its
//! exchange blocks attest.
//!
//! The representation is canonical by construction: a `BTreeMap` keyed by
//! identity with sorted, deduplicated sequence numbers per key, and no
//! empty per-key entries. The same structure is used on the wire and in
//! exchange payloads, so re-serialization is stable.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::{Block, PublicKey};

/// Set-valued map from agent identity to covered sequence numbers.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct BlockIndex {
    entries: BTreeMap<PublicKey, BTreeSet<u32>>,
}

impl BlockIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a single `(identity, sequence number)` pair.
    pub fn insert(&mut self, public_key: PublicKey, sequence_number: u32) {
        self.entries
            .entry(public_key)
            .or_default()
            .insert(sequence_number);
    }

    /// Returns the sequence numbers recorded for an identity, if any.
    pub fn get(&self, public_key: &PublicKey) -> Option<&BTreeSet<u32>> {
        self.entries.get(public_key)
    }

    /// True if the pair is recorded in this index.
    pub fn contains(&self, public_key: &PublicKey, sequence_number: u32) -> bool {
        self.entries
            .get(public_key)
            .is_some_and(|seqs| seqs.contains(&sequence_number))
    }

    /// Number of identities with at least one recorded block.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no blocks are recorded at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of `(identity, sequence number)` pairs recorded.
    pub fn block_count(&self) -> usize {
        self.entries.values().map(BTreeSet::len).sum()
    }

    /// Iterates entries in canonical (identity-sorted) order.
    pub fn entries(&self) -> impl Iterator<Item = (&PublicKey, &BTreeSet<u32>)> {
        self.entries.iter()
    }

    /// Builds the index of a bag of concrete blocks.
    pub fn from_blocks<'a, I>(blocks: I) -> Self
    where
        I: IntoIterator<Item = &'a Block>,
    {
        let mut index = Self::new();
        for block in blocks {
            index.insert(block.public_key, block.sequence_number);
        }
        index
    }

    /// Builds the full knowledge index attested by one agent's chain.
    ///
    /// Every block contributes its own `(creator, seq)` pair. Exchange
    /// blocks additionally contribute the block set their half attests:
    /// the `transfer_up` summary on a proposal half, `transfer_down` on
    /// an agreement half.
    pub fn from_chain<'a, I>(chain: I) -> Self
    where
        I: IntoIterator<Item = &'a Block>,
    {
        let mut index = Self::new();
        for block in chain {
            index.insert(block.public_key, block.sequence_number);
            if let Some(summary) = block.exchange_summary() {
                let transfer = if block.is_proposal() {
                    summary.transfer_up
                } else {
                    summary.transfer_down
                };
                index = index.union(&transfer);
            }
        }
        index
    }

    /// Returns the union of both indices.
    pub fn union(&self, other: &BlockIndex) -> BlockIndex {
        let mut entries = self.entries.clone();
        for (key, seqs) in &other.entries {
            entries.entry(*key).or_default().extend(seqs.iter().copied());
        }
        BlockIndex { entries }
    }

    /// Returns the index of pairs present in `self` but not in `other`.
    ///
    /// Keys present only in `other` are dropped; keys whose difference
    /// is empty are elided.
    pub fn difference(&self, other: &BlockIndex) -> BlockIndex {
        let mut entries = BTreeMap::new();
        for (key, seqs) in &self.entries {
            match other.entries.get(key) {
                Some(theirs) => {
                    let diff: BTreeSet<u32> = seqs.difference(theirs).copied().collect();
                    if !diff.is_empty() {
                        entries.insert(*key, diff);
                    }
                }
                None => {
                    entries.insert(*key, seqs.clone());
                }
            }
        }
        BlockIndex { entries }
    }

    /// Flattens the index into `(identity, sequence number)` pairs for
    /// block store lookups.
    pub fn to_database_args(&self) -> Vec<(PublicKey, u32)> {
        self.entries
            .iter()
            .flat_map(|(key, seqs)| seqs.iter().map(move |seq| (*key, *seq)))
            .collect()
    }
}
