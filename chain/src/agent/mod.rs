//! The agent: one event-loop-owned object holding all protocol state.
//!
//! The agent owns its identity, block store, block factory, peer list,
//! request cache, exchange storage, and ignore list. All message handlers
//! are synchronous and run to completion on the owning loop; the only
//! effects that leave the agent are envelopes pushed onto the outbound
//! channel. Components hold no back-pointer to the agent; the agent owns
//! them and passes arguments explicitly.
//!
//! Base behavior (directory traffic and the two-message block
//! proposal/agreement interaction) lives here; the multi-round exchange
//! protocol lives in [`protect`].

pub mod exchange;
pub mod factory;
pub mod protect;
pub mod request_cache;

pub use exchange::ExchangeStorage;
pub use factory::{BlockFactory, FactoryError};
pub use request_cache::{RequestCache, RequestState};

use std::collections::HashSet;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use rand::seq::SliceRandom;
use tokio::sync::mpsc;

use crate::config::AgentConfig;
use crate::crypto::Identity;
use crate::metrics::MetricsRegistry;
use crate::protocol::{AgentReply, Database, Envelope, MessageType, Payload, Register, Unregister};
use crate::storage::BlockStore;
use crate::types::{AgentInfo, Block, PublicKey, Transaction};
use crate::validation::verify_linked_pair;

/// An envelope addressed to a peer, ready for the transport.
#[derive(Clone, Debug)]
pub struct OutboundMessage {
    pub to: String,
    pub envelope: Envelope,
}

/// Errors that abort a message handler.
///
/// Anything that reaches the caller here is an internal invariant
/// failure (e.g. the local chain lost its genesis block); the node
/// treats it as fatal. Peer misbehavior never surfaces as an error;
/// it is handled in-protocol with rejects and the ignore list.
#[derive(Debug)]
pub enum AgentError {
    /// Block construction failed against the local store.
    Factory(FactoryError),
}

impl From<FactoryError> for AgentError {
    fn from(e: FactoryError) -> Self {
        AgentError::Factory(e)
    }
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentError::Factory(e) => write!(f, "block construction failed: {e}"),
        }
    }
}

impl std::error::Error for AgentError {}

/// A trust-chain agent.
///
/// Generic over the storage backend so tests and simulations can run on
/// the in-memory store while nodes use RocksDB.
pub struct Agent<S: BlockStore> {
    config: AgentConfig,
    info: AgentInfo,
    factory: BlockFactory,
    store: S,
    agents: Vec<AgentInfo>,
    pub(crate) request_cache: RequestCache,
    pub(crate) exchange_storage: ExchangeStorage,
    pub(crate) ignore_list: HashSet<String>,
    outbound: mpsc::UnboundedSender<OutboundMessage>,
    metrics: Arc<MetricsRegistry>,
}

impl<S: BlockStore> Agent<S> {
    /// Creates an agent, writing the genesis block if the store does not
    /// have one yet.
    pub fn new(
        config: AgentConfig,
        identity: Identity,
        mut store: S,
        metrics: Arc<MetricsRegistry>,
        outbound: mpsc::UnboundedSender<OutboundMessage>,
    ) -> Self {
        let factory = BlockFactory::new(identity);
        factory.create_genesis(&mut store);

        let info = AgentInfo {
            public_key: factory.public_key(),
            address: config.listen_addr.to_string(),
            agent_type: config.agent_type.clone(),
        };

        Self {
            config,
            info,
            factory,
            store,
            agents: Vec::new(),
            request_cache: RequestCache::new(),
            exchange_storage: ExchangeStorage::new(),
            ignore_list: HashSet::new(),
            outbound,
            metrics,
        }
    }

    /// Contact information about this agent.
    pub fn info(&self) -> &AgentInfo {
        &self.info
    }

    /// This agent's identity.
    pub fn public_key(&self) -> PublicKey {
        self.info.public_key
    }

    /// Read access to the block store, mainly for tests and tooling.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub(crate) fn peer_by_address(&self, address: &str) -> Option<AgentInfo> {
        self.agents.iter().find(|a| a.address == address).cloned()
    }

    /// Pushes an envelope onto the outbound channel.
    pub(crate) fn send(&self, to: &str, kind: MessageType, payload: Payload) {
        let envelope = Envelope::new(kind, self.info.address.clone(), payload);
        let message = OutboundMessage {
            to: to.to_string(),
            envelope,
        };
        if self.outbound.send(message).is_err() {
            tracing::warn!("outbound channel closed, dropping message to {to}");
        }
    }

    /// Dispatches one received envelope to its handler.
    ///
    /// Unknown or malformed tag/payload combinations are logged and
    /// dropped; they are never answered.
    pub fn handle_envelope(&mut self, envelope: Envelope) -> Result<(), AgentError> {
        let sender = envelope.sender.clone();
        match (envelope.kind, envelope.payload) {
            (MessageType::AgentReply, Payload::AgentReply(reply)) => {
                self.set_agents(reply);
                Ok(())
            }
            (MessageType::BlockProposal, Payload::Block(block)) => {
                self.block_proposal(&sender, block)
            }
            (MessageType::BlockAgreement, Payload::Block(block)) => {
                self.block_confirm(&sender, block);
                Ok(())
            }
            (MessageType::ProtectChain, Payload::Database(db)) => {
                self.protect_chain(&sender, db);
                Ok(())
            }
            (MessageType::ProtectIndexRequest, Payload::Empty) => {
                self.protect_index_request(&sender);
                Ok(())
            }
            (MessageType::ProtectIndexReply, Payload::ExchangeIndex(exchange)) => {
                self.protect_index_reply(&sender, exchange);
                Ok(())
            }
            (MessageType::ProtectBlocksRequest, Payload::Index(index)) => {
                self.protect_blocks_request(&sender, index);
                Ok(())
            }
            (MessageType::ProtectBlocksReply, Payload::Database(db)) => {
                self.protect_blocks_reply(&sender, db);
                Ok(())
            }
            (MessageType::ProtectChainBlocks, Payload::ChainAndBlocks(cab)) => {
                self.protect_chain_blocks(&sender, cab)
            }
            (MessageType::ProtectBlockProposal, Payload::Block(block)) => {
                self.protect_block_proposal(&sender, block)
            }
            (MessageType::ProtectBlockAgreement, Payload::Block(block)) => {
                self.protect_block_agreement(&sender, block)
            }
            (MessageType::ProtectReject, Payload::Empty) => {
                self.protect_reject(&sender);
                Ok(())
            }
            (kind, _) => {
                tracing::warn!("dropping malformed {kind:?} message from {sender}");
                Ok(())
            }
        }
    }

    /// Announces this agent to the directory.
    pub fn register(&self) {
        let payload = Payload::Register(Register {
            agent: self.info.clone(),
        });
        self.send(&self.config.directory_addr, MessageType::Register, payload);
        tracing::info!("registered with directory {}", self.config.directory_addr);
    }

    /// Announces that this agent is leaving the network.
    pub fn unregister(&self) {
        let payload = Payload::Unregister(Unregister {
            agent: self.info.clone(),
        });
        self.send(&self.config.directory_addr, MessageType::Unregister, payload);
        tracing::info!("unregistered from directory {}", self.config.directory_addr);
    }

    /// Asks the directory for the current peer list.
    pub fn request_agents(&self) {
        self.send(
            &self.config.directory_addr,
            MessageType::AgentRequest,
            Payload::Empty,
        );
    }

    /// Handler for AGENT_REPLY: replaces the known peer list.
    fn set_agents(&mut self, reply: AgentReply) {
        self.agents = reply.agents;
        self.metrics.protocol.known_peers.set(self.agents.len() as i64);
        tracing::debug!("directory reported {} agent(s)", self.agents.len());
    }

    /// Picks a random peer that is not this agent and not ignored.
    pub(crate) fn pick_partner(&self) -> Option<AgentInfo> {
        let candidates: Vec<&AgentInfo> = self
            .agents
            .iter()
            .filter(|a| a.public_key != self.info.public_key)
            .filter(|a| !self.ignore_list.contains(&a.address))
            .collect();
        candidates.choose(&mut rand::thread_rng()).map(|a| (*a).clone())
    }

    /// Sends a block proposal to a peer, starting the two-message base
    /// interaction. A random peer is chosen when none is given.
    pub fn request_interaction(&mut self, partner: Option<&AgentInfo>) -> Result<(), AgentError> {
        let partner = match partner {
            Some(p) => p.clone(),
            None => match self.pick_partner() {
                Some(p) => p,
                None => {
                    tracing::debug!("no partner available for an interaction");
                    return Ok(());
                }
            },
        };

        let block =
            self.factory
                .create_new(&mut self.store, partner.public_key, Transaction::Empty)?;
        self.send(
            &partner.address,
            MessageType::BlockProposal,
            Payload::Block(block),
        );
        Ok(())
    }

    /// Handler for BLOCK_PROPOSAL: stores the proposal and answers with
    /// the linked agreement half.
    fn block_proposal(&mut self, sender: &str, block: Block) -> Result<(), AgentError> {
        if block.verify_signature().is_err() {
            tracing::warn!("dropping block proposal with invalid signature from {sender}");
            return Ok(());
        }

        self.store.add(block.clone());

        let agreement = self.factory.create_linked(&mut self.store, &block)?;
        self.send(
            sender,
            MessageType::BlockAgreement,
            Payload::Block(agreement),
        );
        Ok(())
    }

    /// Handler for BLOCK_AGREEMENT: checks the pair against our stored
    /// proposal and stores the agreement.
    fn block_confirm(&mut self, sender: &str, block: Block) {
        let proposal = self
            .store
            .get(&self.info.public_key, block.link_sequence_number);
        let Some(proposal) = proposal else {
            tracing::warn!("dropping agreement from {sender} for an unknown proposal");
            return;
        };

        if block.verify_signature().is_err() {
            tracing::warn!("dropping agreement with invalid signature from {sender}");
            return;
        }
        if let Err(e) = verify_linked_pair(&proposal, &block) {
            tracing::warn!("dropping mismatched agreement from {sender}: {e}");
            return;
        }

        self.store.add(block);
    }

    /// One scheduler tick: expire stale exchange slots, then try to start
    /// a new exchange with a random peer.
    ///
    /// Agents whose behavior label is not `"protect"` skip the audit and
    /// fall back to the plain two-message interaction.
    pub fn step(&mut self) -> Result<(), AgentError> {
        for address in self.request_cache.expire(self.config.request_ttl) {
            self.metrics.protocol.sessions_expired.inc();
            tracing::debug!("exchange with {address} expired");
        }

        if self.config.agent_type == "protect" {
            self.request_protect(None)
        } else {
            self.request_interaction(None)
        }
    }

    /// Serializes this agent's store for post-experiment analysis.
    ///
    /// The dump is the wire `Database` record written to
    /// `<data_dir>/<readable public key>.dat`.
    pub fn write_data(&self) -> io::Result<PathBuf> {
        std::fs::create_dir_all(&self.config.data_dir)?;

        let database = Database {
            info: self.info.clone(),
            blocks: self.store.get_all_blocks(),
        };
        let cfg = bincode::config::standard();
        let bytes = bincode::serde::encode_to_vec(&database, cfg)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;

        let path = PathBuf::from(&self.config.data_dir)
            .join(format!("{}.dat", self.info.public_key.as_readable()));
        std::fs::write(&path, bytes)?;
        Ok(path)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Shared helpers for agent tests: agents on in-memory stores wired
    //! to plain channels, plus a router that pumps messages between them
    //! until the network is quiet.

    use super::*;
    use crate::storage::InMemoryBlockStore;
    use std::collections::HashMap;
    use std::time::Duration;

    pub struct TestAgent {
        pub agent: Agent<InMemoryBlockStore>,
        pub outbound: mpsc::UnboundedReceiver<OutboundMessage>,
    }

    pub fn test_agent(seed: u8, port: u16) -> TestAgent {
        let config = AgentConfig {
            listen_addr: format!("127.0.0.1:{port}")
                .parse()
                .expect("test address should parse"),
            directory_addr: "127.0.0.1:9000".to_string(),
            request_ttl: Duration::from_secs(10),
            ..AgentConfig::default()
        };
        let (tx, rx) = mpsc::unbounded_channel();
        let metrics = Arc::new(MetricsRegistry::new().expect("metrics registry"));
        let agent = Agent::new(
            config,
            Identity::from_seed([seed; 32]),
            InMemoryBlockStore::new(),
            metrics,
            tx,
        );
        TestAgent { agent, outbound: rx }
    }

    /// Makes both agents known to each other, as if the directory had
    /// answered an AGENT_REQUEST.
    pub fn introduce(agents: &mut [&mut TestAgent]) {
        let infos: Vec<AgentInfo> = agents.iter().map(|t| t.agent.info().clone()).collect();
        for t in agents.iter_mut() {
            t.agent.set_agents(AgentReply {
                agents: infos.clone(),
            });
        }
    }

    /// Delivers queued messages between the given agents until no agent
    /// has anything left to send. Messages to unknown addresses are
    /// dropped, mimicking the lossy bus.
    pub fn pump(agents: &mut [&mut TestAgent]) {
        loop {
            let mut deliveries: Vec<(String, Envelope)> = Vec::new();
            for t in agents.iter_mut() {
                while let Ok(message) = t.outbound.try_recv() {
                    deliveries.push((message.to, message.envelope));
                }
            }
            if deliveries.is_empty() {
                return;
            }

            let mut by_address: HashMap<String, Vec<Envelope>> = HashMap::new();
            for (to, envelope) in deliveries {
                by_address.entry(to).or_default().push(envelope);
            }

            for t in agents.iter_mut() {
                let address = t.agent.info().address.clone();
                if let Some(envelopes) = by_address.remove(&address) {
                    for envelope in envelopes {
                        t.agent
                            .handle_envelope(envelope)
                            .expect("handler should not fail in tests");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{introduce, pump, test_agent};
    use super::*;
    use crate::types::GENESIS_SEQ;

    #[test]
    fn new_agent_starts_with_a_genesis_block() {
        let t = test_agent(1, 9101);
        let chain = t.agent.store().get_chain(&t.agent.public_key());
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].sequence_number, GENESIS_SEQ);
        assert!(chain[0].verify_signature().is_ok());
    }

    #[test]
    fn base_interaction_stores_the_pair_on_both_sides() {
        let mut a = test_agent(1, 9101);
        let mut b = test_agent(2, 9102);
        introduce(&mut [&mut a, &mut b]);

        let partner = b.agent.info().clone();
        a.agent
            .request_interaction(Some(&partner))
            .expect("interaction request");
        pump(&mut [&mut a, &mut b]);

        let a_pk = a.agent.public_key();
        let b_pk = b.agent.public_key();

        // A: genesis + proposal + B's agreement.
        assert!(a.agent.store().contains(&a_pk, 2));
        assert!(b.agent.store().contains(&a_pk, 2));
        // B: genesis + agreement.
        assert!(b.agent.store().contains(&b_pk, 2));
        assert!(a.agent.store().contains(&b_pk, 2));

        let proposal = a.agent.store().get(&a_pk, 2).unwrap();
        let agreement = a.agent.store().get(&b_pk, 2).unwrap();
        assert_eq!(proposal.payload, agreement.payload);
        assert_eq!(agreement.link_sequence_number, proposal.sequence_number);
    }

    #[test]
    fn agreement_for_unknown_proposal_is_dropped() {
        let mut a = test_agent(1, 9101);
        let b = test_agent(2, 9102);

        // Forge an agreement that does not match any proposal of A.
        let mut rogue = b.agent.store().get_chain(&b.agent.public_key())[0].clone();
        rogue.link_sequence_number = 7;

        let before = a.agent.store().get_all_blocks().len();
        a.agent
            .handle_envelope(Envelope::new(
                MessageType::BlockAgreement,
                b.agent.info().address.clone(),
                Payload::Block(rogue),
            ))
            .unwrap();
        assert_eq!(a.agent.store().get_all_blocks().len(), before);
    }

    #[test]
    fn register_and_request_agents_go_to_the_directory() {
        let mut t = test_agent(3, 9103);
        t.agent.register();
        t.agent.request_agents();

        let first = t.outbound.try_recv().expect("register message");
        assert_eq!(first.to, "127.0.0.1:9000");
        assert_eq!(first.envelope.kind, MessageType::Register);

        let second = t.outbound.try_recv().expect("agent request message");
        assert_eq!(second.envelope.kind, MessageType::AgentRequest);
        assert_eq!(second.envelope.sender, t.agent.info().address);
    }

    #[test]
    fn write_data_dumps_all_blocks() {
        let tmp = tempfile::TempDir::new().expect("temp dir");
        let mut t = test_agent(4, 9104);
        t.agent.config.data_dir = tmp.path().to_string_lossy().to_string();

        let path = t.agent.write_data().expect("dump");
        let bytes = std::fs::read(&path).expect("read dump");

        let cfg = bincode::config::standard();
        let (database, _): (Database, usize) =
            bincode::serde::decode_from_slice(&bytes, cfg).expect("decode dump");
        assert_eq!(database.info, *t.agent.info());
        assert_eq!(database.blocks.len(), 1);
    }
}
