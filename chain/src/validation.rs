//! Verification of received chains, block sets, and half-block pairs.
//!
//! These checks back the audit protocol's fraud decisions: a failure here
//! is a protocol violation and leads to a reject plus a permanent entry
//! on the ignore list. All checks are deterministic and side-effect free.

use std::fmt;

use crate::types::{Block, BlockIndex, GENESIS_SEQ};
use crate::types::block::GENESIS_HASH;

/// Error type returned when a chain, block set, or pair fails validation.
#[derive(Debug)]
pub enum ValidationError {
    /// Input is invalid according to a fixed structural rule.
    Invalid(&'static str),
    /// Input is invalid with a dynamic error message.
    Custom(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::Invalid(msg) => write!(f, "invalid data: {msg}"),
            ValidationError::Custom(msg) => write!(f, "invalid data: {msg}"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Verifies the correctness of a complete chain received from a peer.
///
/// Checks, in order:
///
/// - the chain is non-empty and has a single author,
/// - sequence numbers form exactly the contiguous range `1..=N`,
/// - each block links to the hash of its predecessor (the genesis block
///   carries the genesis sentinel),
/// - every block signature verifies under the author key.
pub fn verify_chain(chain: &[Block]) -> Result<(), ValidationError> {
    if chain.is_empty() {
        return Err(ValidationError::Invalid("empty chain"));
    }

    let author = chain[0].public_key;
    if chain.iter().any(|b| b.public_key != author) {
        return Err(ValidationError::Invalid("chain has more than one author"));
    }

    let mut seqs: Vec<u32> = chain.iter().map(|b| b.sequence_number).collect();
    seqs.sort_unstable();
    let expected: Vec<u32> = (GENESIS_SEQ..=chain.len() as u32).collect();
    if seqs != expected {
        return Err(ValidationError::Custom(format!(
            "sequence numbers are not the contiguous range 1..={}, got {seqs:?}",
            chain.len()
        )));
    }

    let mut ordered: Vec<&Block> = chain.iter().collect();
    ordered.sort_unstable_by_key(|b| b.sequence_number);

    for pair in ordered.windows(2) {
        let expected_hash = pair[0].compute_hash();
        if pair[1].previous_hash != expected_hash {
            return Err(ValidationError::Custom(format!(
                "block {} does not link to the hash of block {}",
                pair[1].sequence_number, pair[0].sequence_number
            )));
        }
    }
    if ordered[0].previous_hash != GENESIS_HASH {
        return Err(ValidationError::Invalid(
            "genesis block does not carry the genesis hash sentinel",
        ));
    }

    check_signatures(chain)
}

/// Verifies a transferred block set against the index the receiver asked
/// for.
///
/// Every `(identity, sequence number)` pair of `requested` must be
/// present in the delivered set, and each delivered block must carry a
/// valid signature. Delivering more than requested is not fraud; the
/// extra blocks are simply stored as well.
pub fn verify_blocks(blocks: &[Block], requested: &BlockIndex) -> Result<(), ValidationError> {
    let delivered = BlockIndex::from_blocks(blocks);
    let missing = requested.difference(&delivered);
    if !missing.is_empty() {
        return Err(ValidationError::Custom(format!(
            "peer failed to deliver {} block(s) its records attest",
            missing.block_count()
        )));
    }
    check_signatures(blocks)
}

/// Verifies a peer's closing disclosure: its full chain plus the block
/// set covering everything its records attest beyond our own store.
pub fn verify_chain_and_blocks(
    chain: &[Block],
    blocks: &[Block],
    expected: &BlockIndex,
) -> Result<(), ValidationError> {
    verify_chain(chain)?;
    verify_blocks(blocks, expected)
}

/// Verifies that a proposal and agreement form a valid half-block pair:
/// identical payload bytes and crossed link fields.
pub fn verify_linked_pair(proposal: &Block, agreement: &Block) -> Result<(), ValidationError> {
    if !proposal.is_proposal() {
        return Err(ValidationError::Invalid(
            "first half of the pair is not a proposal",
        ));
    }
    if proposal.payload != agreement.payload {
        return Err(ValidationError::Invalid(
            "pair halves carry different payload bytes",
        ));
    }
    if proposal.link_public_key != agreement.public_key
        || agreement.link_public_key != proposal.public_key
    {
        return Err(ValidationError::Invalid("pair link keys are not crossed"));
    }
    if agreement.link_sequence_number != proposal.sequence_number {
        return Err(ValidationError::Invalid(
            "agreement does not link to the proposal's sequence number",
        ));
    }
    Ok(())
}

fn check_signatures(blocks: &[Block]) -> Result<(), ValidationError> {
    for block in blocks {
        if block.verify_signature().is_err() {
            return Err(ValidationError::Custom(format!(
                "invalid signature on block ({}, {})",
                block.public_key.as_readable(),
                block.sequence_number
            )));
        }
    }
    Ok(())
}
