//! The peer registry behind the directory service.
//!
//! Pure bookkeeping: agents register and unregister by reply address, and
//! a request returns a snapshot of everyone currently registered. The
//! directory makes no liveness promises; an agent that crashes without
//! unregistering stays listed.

use std::collections::BTreeMap;

use chain::types::AgentInfo;

/// Registered agents, keyed by reply address.
#[derive(Debug, Default)]
pub struct AgentRegistry {
    agents: BTreeMap<String, AgentInfo>,
}

impl AgentRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or refreshes an agent entry.
    pub fn register(&mut self, agent: AgentInfo) {
        self.agents.insert(agent.address.clone(), agent);
    }

    /// Removes the agent registered under the given address. No-op if the
    /// address is unknown.
    pub fn unregister(&mut self, address: &str) {
        self.agents.remove(address);
    }

    /// Snapshot of all registered agents, ordered by address.
    pub fn list(&self) -> Vec<AgentInfo> {
        self.agents.values().cloned().collect()
    }

    /// Number of registered agents.
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// True if no agent is registered.
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
