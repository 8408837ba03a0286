//! Wire protocol: message types, payload records, and the envelope.
//!
//! Every message on the bus is an [`Envelope`]: a message type tag, the
//! sender's reply address, and exactly one payload record. The tag/payload
//! pairing mirrors the protocol tables; handlers dispatch on the tag and
//! treat a mismatched payload as a malformed message.

pub mod codec;

pub use codec::{CodecError, MAX_FRAME_LEN, decode_envelope, encode_envelope};

use serde::{Deserialize, Serialize};

use crate::types::{AgentInfo, Block, BlockHash, BlockIndex};

/// Message type tags.
///
/// The numeric codes are part of the external protocol vocabulary and are
/// kept stable; see [`MessageType::code`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    Register = 1,
    AgentReply = 2,
    AgentRequest = 3,
    Unregister = 4,
    BlockProposal = 5,
    BlockAgreement = 6,
    ProtectChain = 7,
    ProtectBlocksRequest = 8,
    ProtectBlocksReply = 9,
    ProtectChainBlocks = 10,
    ProtectBlockProposal = 11,
    ProtectBlockAgreement = 12,
    ProtectReject = 13,
    ProtectIndexRequest = 14,
    ProtectIndexReply = 15,
}

impl MessageType {
    /// Stable numeric code of this message type.
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

/// Registration request sent to the directory.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Register {
    pub agent: AgentInfo,
}

/// Unregistration notice sent to the directory.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Unregister {
    pub agent: AgentInfo,
}

/// Directory answer: the currently registered agents.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct AgentReply {
    pub agents: Vec<AgentInfo>,
}

/// A set of blocks together with the contact info of their sender.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Database {
    pub info: AgentInfo,
    pub blocks: Vec<Block>,
}

/// One attestation of an exchange storage: the local exchange block hash
/// and the block index it attests.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ExchangeIndexEntry {
    pub block_hash: BlockHash,
    pub index: BlockIndex,
}

/// Wire projection of an agent's exchange storage.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ExchangeIndex {
    pub entries: Vec<ExchangeIndexEntry>,
}

/// The responder's closing disclosure: its full chain, the blocks the
/// initiator is missing, and its exchange storage.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ChainAndBlocks {
    pub chain: Vec<Block>,
    pub blocks: Vec<Block>,
    pub exchange: ExchangeIndex,
}

/// The single payload record carried by an envelope.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    Empty,
    Register(Register),
    Unregister(Unregister),
    AgentReply(AgentReply),
    Block(Block),
    Database(Database),
    Index(BlockIndex),
    ChainAndBlocks(ChainAndBlocks),
    ExchangeIndex(ExchangeIndex),
}

/// A tagged message on the bus.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Message type tag; decides which handler runs.
    pub kind: MessageType,
    /// Transport-level reply address of the sender.
    pub sender: String,
    /// Exactly one payload record.
    pub payload: Payload,
}

impl Envelope {
    /// Builds an envelope.
    pub fn new(kind: MessageType, sender: impl Into<String>, payload: Payload) -> Self {
        Self {
            kind,
            sender: sender.into(),
            payload,
        }
    }
}
