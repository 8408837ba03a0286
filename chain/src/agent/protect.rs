//! The PROTECT exchange: a seven-message mutual audit between two agents.
//!
//! Before recording a new interaction, each side proves to the other that
//! it has disclosed every block its chain attests to. The initiator opens
//! with its full chain; the responder reconstructs the initiator's
//! knowledge from the chain plus its exchange attestations, requests the
//! blocks it is missing, then discloses its own chain, blocks, and
//! attestations in return. When both deltas have flowed, the initiator
//! proposes an exchange block whose payload summarizes the two block sets,
//! the responder agrees, and the pair hands off to a normal interaction.
//!
//! A disclosed chain is itself a transfer: the receiver persists it on
//! successful verification, and the transfer summaries cover only the
//! blocks that flowed beyond the two chains. Two agents that know nothing
//! of third parties therefore commit an exchange with empty summaries.
//!
//! Per peer there is at most one open session, tracked in the request
//! cache. A message for which no session is open is dropped and logged,
//! never answered. A reject at any point ends the session; whether future
//! sessions with that peer are possible is decided by the ignore list.

use crate::protocol::{ChainAndBlocks, Database, ExchangeIndex, MessageType, Payload};
use crate::storage::BlockStore;
use crate::types::{AgentInfo, Block, BlockIndex, ExchangeSummary, Transaction};
use crate::validation::{verify_blocks, verify_chain, verify_chain_and_blocks, verify_linked_pair};

use super::exchange::combined_wire_index;
use super::{Agent, AgentError};

impl<S: BlockStore> Agent<S> {
    /// Starts a PROTECT exchange with a partner, or with a random known
    /// peer when none is given.
    ///
    /// The request is skipped when a session with the partner is already
    /// open or the partner is on the ignore list.
    pub fn request_protect(&mut self, partner: Option<&AgentInfo>) -> Result<(), AgentError> {
        let partner = match partner {
            Some(p) => p.clone(),
            None => match self.pick_partner() {
                Some(p) => p,
                None => {
                    tracing::debug!("no partner available for an exchange");
                    return Ok(());
                }
            },
        };

        if self.request_cache.get(&partner.address).is_some() {
            tracing::debug!(
                "request already open, skipping exchange with {}",
                partner.address
            );
            return Ok(());
        }
        if self.ignore_list.contains(&partner.address) {
            return Ok(());
        }

        let chain = self.store.get_chain(&self.public_key());
        self.request_cache.open(&partner.address, None);
        self.send(
            &partner.address,
            MessageType::ProtectChain,
            Payload::Database(Database {
                info: self.info().clone(),
                blocks: chain,
            }),
        );
        self.metrics.protocol.sessions_initiated.inc();

        tracing::debug!("requesting exchange with {}", partner.address);
        Ok(())
    }

    /// Sends PROTECT_REJECT to a peer and drops the session slot.
    fn send_reject(&mut self, address: &str) {
        self.send(address, MessageType::ProtectReject, Payload::Empty);
        self.request_cache.remove(address);
        self.metrics.protocol.sessions_rejected.inc();
    }

    /// Marks a peer as fraudulent: reject, drop the slot, and refuse all
    /// future sessions.
    fn reject_and_ignore(&mut self, address: &str, reason: impl std::fmt::Display) {
        tracing::warn!("ignoring {address} after failed verification: {reason}");
        self.ignore_list.insert(address.to_string());
        self.send_reject(address);
    }

    /// Handler for PROTECT_CHAIN, the opening message.
    ///
    /// A second opening message while a session is already open is
    /// answered with a reject (without ignoring the peer); this also
    /// resolves the case of two agents opening towards each other at
    /// once: both reject, both slots clear, a later tick may retry.
    pub(super) fn protect_chain(&mut self, sender: &str, db: Database) {
        if self.request_cache.get(sender).is_some() {
            tracing::debug!("request already open, rejecting exchange from {sender}");
            self.send_reject(sender);
            return;
        }
        if self.ignore_list.contains(sender) {
            tracing::warn!("agent {sender} is in the ignore list, rejecting");
            self.send(sender, MessageType::ProtectReject, Payload::Empty);
            return;
        }

        let chain = db.blocks;
        match verify_chain(&chain) {
            Ok(()) => {
                // The disclosure transfers the chain itself.
                for block in &chain {
                    self.store.add(block.clone());
                }
                self.request_cache.open(sender, Some(chain));
                self.send(sender, MessageType::ProtectIndexRequest, Payload::Empty);
            }
            Err(e) => {
                self.reject_and_ignore(sender, e);
            }
        }
    }

    /// Handler for PROTECT_INDEX_REQUEST: disclose our exchange
    /// attestations.
    pub(super) fn protect_index_request(&mut self, sender: &str) {
        if self.request_cache.get(sender).is_none() {
            tracing::warn!("no open request for index request from {sender}");
            return;
        }

        let message = self.exchange_storage.as_message();
        self.send(
            sender,
            MessageType::ProtectIndexReply,
            Payload::ExchangeIndex(message),
        );
    }

    /// Handler for PROTECT_INDEX_REPLY (responder side).
    ///
    /// Reconstructs the initiator's complete knowledge from its
    /// attestations and disclosed chain, then requests every block of it
    /// we do not hold ourselves.
    pub(super) fn protect_index_reply(&mut self, sender: &str, exchange: ExchangeIndex) {
        let Some(state) = self.request_cache.get(sender) else {
            tracing::warn!("no open request for index reply from {sender}");
            return;
        };
        let Some(chain) = state.chain.as_deref() else {
            tracing::warn!("index reply from {sender} arrived out of order");
            return;
        };

        let partner_index = combined_wire_index(&exchange).union(&BlockIndex::from_chain(chain));
        let own_index = BlockIndex::from_blocks(&self.store.get_all_blocks());
        let missing = partner_index.difference(&own_index);

        if let Some(state) = self.request_cache.get_mut(sender) {
            state.index = Some(partner_index);
            state.transfer_down = Some(missing.clone());
        }

        self.send(
            sender,
            MessageType::ProtectBlocksRequest,
            Payload::Index(missing),
        );
    }

    /// Handler for PROTECT_BLOCKS_REQUEST (initiator side): record what
    /// we are about to upload and send the selected blocks.
    pub(super) fn protect_blocks_request(&mut self, sender: &str, index: BlockIndex) {
        let Some(state) = self.request_cache.get_mut(sender) else {
            tracing::warn!("no open request for blocks request from {sender}");
            return;
        };

        state.transfer_up = Some(index.clone());
        let blocks = self.store.index(&index);

        self.send(
            sender,
            MessageType::ProtectBlocksReply,
            Payload::Database(Database {
                info: self.info().clone(),
                blocks,
            }),
        );

        tracing::debug!("sending blocks to {sender}");
    }

    /// Handler for PROTECT_BLOCKS_REPLY (responder side).
    ///
    /// The delivered set must cover everything we asked for. If it does,
    /// we store it, compute the delta the initiator is missing beyond our
    /// own chain, and disclose chain, blocks, and attestations.
    pub(super) fn protect_blocks_reply(&mut self, sender: &str, db: Database) {
        let Some(state) = self.request_cache.get(sender) else {
            tracing::warn!("no open request for blocks reply from {sender}");
            return;
        };
        let (Some(requested), Some(partner_index)) =
            (state.transfer_down.clone(), state.index.clone())
        else {
            tracing::warn!("blocks reply from {sender} arrived out of order");
            return;
        };

        if let Err(e) = verify_blocks(&db.blocks, &requested) {
            self.reject_and_ignore(sender, e);
            return;
        }

        for block in &db.blocks {
            self.store.add(block.clone());
        }
        self.metrics
            .protocol
            .blocks_received
            .inc_by(db.blocks.len() as u64);

        // What the initiator is missing, beyond our chain which travels
        // alongside anyway.
        let own_chain = self.store.get_chain(&self.public_key());
        let own_chain_index = BlockIndex::from_blocks(&own_chain);
        let own_index = BlockIndex::from_blocks(&self.store.get_all_blocks());
        let transfer_up = own_index
            .difference(&partner_index)
            .difference(&own_chain_index);

        if let Some(state) = self.request_cache.get_mut(sender) {
            state.transfer_up = Some(transfer_up.clone());
        }

        let blocks = self.store.index(&transfer_up);

        self.send(
            sender,
            MessageType::ProtectChainBlocks,
            Payload::ChainAndBlocks(ChainAndBlocks {
                chain: own_chain,
                blocks,
                exchange: self.exchange_storage.as_message(),
            }),
        );

        tracing::debug!("sending chain and blocks to {sender}");
    }

    /// Handler for PROTECT_CHAIN_BLOCKS (initiator side).
    ///
    /// Verifies the responder's closing disclosure, stores it, and
    /// commits the session by proposing the exchange block whose payload
    /// summarizes both transfers.
    pub(super) fn protect_chain_blocks(
        &mut self,
        sender: &str,
        cab: ChainAndBlocks,
    ) -> Result<(), AgentError> {
        let Some(state) = self.request_cache.get(sender) else {
            tracing::warn!("no open request for chain and blocks from {sender}");
            return Ok(());
        };
        let Some(transfer_up) = state.transfer_up.clone() else {
            tracing::warn!("chain and blocks from {sender} arrived out of order");
            return Ok(());
        };

        // Everything the responder's records attest beyond what we hold
        // (its chain included, since it arrives with this very message).
        let partner_index =
            combined_wire_index(&cab.exchange).union(&BlockIndex::from_chain(&cab.chain));
        let chain_index = BlockIndex::from_blocks(&cab.chain);
        let own_index = BlockIndex::from_blocks(&self.store.get_all_blocks());
        let expected = partner_index
            .difference(&own_index)
            .difference(&chain_index);

        if let Err(e) = verify_chain_and_blocks(&cab.chain, &cab.blocks, &expected) {
            self.reject_and_ignore(sender, e);
            return Ok(());
        }

        for block in cab.chain.iter().chain(cab.blocks.iter()) {
            self.store.add(block.clone());
        }
        self.metrics
            .protocol
            .blocks_received
            .inc_by(cab.blocks.len() as u64);

        let transfer_down = BlockIndex::from_blocks(&cab.blocks);
        if let Some(state) = self.request_cache.get_mut(sender) {
            state.transfer_down = Some(transfer_down.clone());
        }

        // The chain was verified non-empty with a single author.
        let partner_key = cab.chain[0].public_key;
        let payload = Transaction::Exchange(ExchangeSummary {
            transfer_up,
            transfer_down: transfer_down.clone(),
        });
        let proposal = self
            .factory
            .create_new(&mut self.store, partner_key, payload)?;

        self.send(
            sender,
            MessageType::ProtectBlockProposal,
            Payload::Block(proposal.clone()),
        );
        self.exchange_storage.add_exchange(&proposal, transfer_down);

        tracing::debug!("sending exchange proposal to {sender}");
        Ok(())
    }

    /// Handler for PROTECT_BLOCK_PROPOSAL (responder side).
    ///
    /// The proposal's payload must summarize exactly the two block sets
    /// observed during this session. If it does, the responder stores the
    /// proposal, answers with the linked agreement, records its own
    /// attestation, and closes the session.
    pub(super) fn protect_block_proposal(
        &mut self,
        sender: &str,
        block: Block,
    ) -> Result<(), AgentError> {
        let Some(state) = self.request_cache.get(sender) else {
            tracing::warn!("no open request for exchange proposal from {sender}");
            return Ok(());
        };
        let (Some(transfer_down), Some(transfer_up)) =
            (state.transfer_down.clone(), state.transfer_up.clone())
        else {
            tracing::warn!("exchange proposal from {sender} arrived out of order");
            return Ok(());
        };
        let opened_at = state.opened_at;

        if block.verify_signature().is_err() {
            self.reject_and_ignore(sender, "invalid signature on exchange proposal");
            return Ok(());
        }
        // The proposal is written from the initiator's point of view:
        // what it uploaded is what we downloaded, and vice versa.
        match block.exchange_summary() {
            Some(summary)
                if summary.transfer_up == transfer_down
                    && summary.transfer_down == transfer_up => {}
            Some(_) => {
                self.reject_and_ignore(sender, "exchange proposal does not match the session");
                return Ok(());
            }
            None => {
                self.reject_and_ignore(sender, "exchange proposal carries no exchange payload");
                return Ok(());
            }
        }

        self.store.add(block.clone());

        let agreement = self.factory.create_linked(&mut self.store, &block)?;
        self.send(
            sender,
            MessageType::ProtectBlockAgreement,
            Payload::Block(agreement.clone()),
        );
        self.exchange_storage.add_exchange(&agreement, transfer_down);

        self.request_cache.remove(sender);
        self.metrics.protocol.sessions_completed.inc();
        self.metrics
            .protocol
            .session_seconds
            .observe(opened_at.elapsed().as_secs_f64());

        tracing::debug!("sending exchange agreement to {sender}");
        Ok(())
    }

    /// Handler for PROTECT_BLOCK_AGREEMENT (initiator side).
    ///
    /// Checks the agreement against our proposal, stores it, closes the
    /// session, and hands off to a normal interaction with the partner.
    pub(super) fn protect_block_agreement(
        &mut self,
        sender: &str,
        block: Block,
    ) -> Result<(), AgentError> {
        let Some(state) = self.request_cache.get(sender) else {
            tracing::warn!("no open request for exchange agreement from {sender}");
            return Ok(());
        };
        let opened_at = state.opened_at;

        let proposal = self
            .store
            .get(&self.public_key(), block.link_sequence_number);
        let Some(proposal) = proposal else {
            self.reject_and_ignore(sender, "agreement links to an unknown proposal");
            return Ok(());
        };
        if block.verify_signature().is_err() {
            self.reject_and_ignore(sender, "invalid signature on exchange agreement");
            return Ok(());
        }
        if let Err(e) = verify_linked_pair(&proposal, &block) {
            self.reject_and_ignore(sender, e);
            return Ok(());
        }

        self.store.add(block);

        self.request_cache.remove(sender);
        self.metrics.protocol.sessions_completed.inc();
        self.metrics
            .protocol
            .session_seconds
            .observe(opened_at.elapsed().as_secs_f64());

        tracing::debug!("storing exchange agreement from {sender}");

        // Both sides trust each other now; record the actual interaction.
        let partner = self.peer_by_address(sender);
        self.request_interaction(partner.as_ref())
    }

    /// Handler for PROTECT_REJECT: close the session so a later tick can
    /// open a new one. Receiving a reject never changes the ignore list.
    pub(super) fn protect_reject(&mut self, sender: &str) {
        if self.request_cache.get(sender).is_none() {
            tracing::warn!("no open request for reject from {sender}");
            return;
        }
        self.request_cache.remove(sender);
        self.metrics.protocol.sessions_rejected.inc();
        tracing::debug!("exchange with {sender} rejected");
    }
}
