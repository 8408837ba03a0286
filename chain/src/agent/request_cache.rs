//! Per-peer scratch state for in-flight exchange sessions.
//!
//! Each open session with a peer occupies one slot keyed by the peer's
//! reply address. The slot accumulates what the session learns as the
//! messages go back and forth and is dropped on any terminal event
//! (agreement stored, reject sent or received, verification failure, or
//! expiry).

use std::collections::HashMap;

use tokio::time::Instant;

use crate::types::{Block, BlockIndex};

/// State of one open exchange session with a peer.
#[derive(Debug)]
pub struct RequestState {
    /// The peer's disclosed chain (responder side only, from the opening
    /// message), kept for the closing verification.
    pub chain: Option<Vec<Block>>,
    /// The peer's full reconstructed knowledge index.
    pub index: Option<BlockIndex>,
    /// Blocks this agent uploads during the session.
    pub transfer_up: Option<BlockIndex>,
    /// Blocks this agent downloads during the session.
    pub transfer_down: Option<BlockIndex>,
    /// When the slot was opened; used for expiry.
    pub opened_at: Instant,
}

impl RequestState {
    fn new(chain: Option<Vec<Block>>) -> Self {
        Self {
            chain,
            index: None,
            transfer_up: None,
            transfer_down: None,
            opened_at: Instant::now(),
        }
    }
}

/// Map from peer address to the open session with that peer.
#[derive(Debug, Default)]
pub struct RequestCache {
    requests: HashMap<String, RequestState>,
}

impl RequestCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens (or replaces) the slot for a peer. The responder passes the
    /// peer's disclosed chain; the initiator passes `None`.
    pub fn open(&mut self, address: &str, chain: Option<Vec<Block>>) {
        self.requests
            .insert(address.to_string(), RequestState::new(chain));
    }

    /// Returns the open session for a peer, if any.
    pub fn get(&self, address: &str) -> Option<&RequestState> {
        self.requests.get(address)
    }

    /// Mutable access to the open session for a peer, if any.
    pub fn get_mut(&mut self, address: &str) -> Option<&mut RequestState> {
        self.requests.get_mut(address)
    }

    /// Drops the slot for a peer. No-op if absent.
    pub fn remove(&mut self, address: &str) {
        self.requests.remove(address);
    }

    /// Number of open sessions.
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// True if no sessions are open.
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Removes every session older than `ttl` and returns the addresses
    /// of the dropped peers.
    ///
    /// Expiry is the internal equivalent of a reject: the slot is freed
    /// so a later tick can retry the peer, but nothing is sent.
    pub fn expire(&mut self, ttl: std::time::Duration) -> Vec<String> {
        let now = Instant::now();
        let expired: Vec<String> = self
            .requests
            .iter()
            .filter(|(_, state)| now.duration_since(state.opened_at) >= ttl)
            .map(|(addr, _)| addr.clone())
            .collect();
        for addr in &expired {
            self.requests.remove(addr);
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn open_get_remove_lifecycle() {
        let mut cache = RequestCache::new();
        assert!(cache.get("a:1").is_none());

        cache.open("a:1", None);
        assert!(cache.get("a:1").is_some());
        assert_eq!(cache.len(), 1);

        cache.remove("a:1");
        assert!(cache.get("a:1").is_none());

        // Removing an absent entry is a no-op.
        cache.remove("a:1");
        assert!(cache.is_empty());
    }

    #[test]
    fn open_replaces_an_existing_slot() {
        let mut cache = RequestCache::new();
        cache.open("a:1", None);
        cache.get_mut("a:1").unwrap().transfer_up = Some(BlockIndex::new());

        cache.open("a:1", Some(Vec::new()));
        let state = cache.get("a:1").unwrap();
        assert!(state.transfer_up.is_none());
        assert!(state.chain.is_some());
    }

    #[test]
    fn expire_drops_only_stale_slots() {
        let mut cache = RequestCache::new();
        cache.open("stale:1", None);
        std::thread::sleep(Duration::from_millis(30));
        cache.open("fresh:1", None);

        let expired = cache.expire(Duration::from_millis(20));
        assert_eq!(expired, vec!["stale:1".to_string()]);
        assert!(cache.get("stale:1").is_none());
        assert!(cache.get("fresh:1").is_some());
    }
}
