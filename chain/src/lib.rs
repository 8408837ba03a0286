//! Trust-chain agent library.
//!
//! This crate provides the building blocks for a peer-to-peer agent that
//! records pairwise interactions as signed, hash-chained blocks and
//! mutually audits peer chains before committing new interactions:
//!
//! - strongly-typed domain types (`types`),
//! - Ed25519 identities and block signing (`crypto`),
//! - storage backends (`storage`),
//! - chain and transfer verification (`validation`),
//! - the wire envelope and frame codec (`protocol`),
//! - the agent with its exchange protocol (`agent`),
//! - a TCP message bus (`net`),
//! - Prometheus-based metrics (`metrics`),
//! - and a top-level node configuration (`config`).
//!
//! The node binary composes these pieces into a single-threaded agent
//! process; the directory binary reuses the protocol and bus to serve
//! peer discovery.

pub mod agent;
pub mod config;
pub mod crypto;
pub mod metrics;
pub mod net;
pub mod protocol;
pub mod storage;
pub mod types;
pub mod validation;

// Re-export top-level configuration types.
pub use config::{AgentConfig, MetricsConfig, NodeConfig};

// Re-export the agent and its components.
pub use agent::{Agent, AgentError, BlockFactory, ExchangeStorage, OutboundMessage, RequestCache};

// Re-export identity handling.
pub use crypto::{CryptoError, Identity};

// Re-export storage backends.
pub use storage::{BlockStore, InMemoryBlockStore, RocksDbBlockStore, RocksDbConfig, StorageError};

// Re-export verification entry points.
pub use validation::{
    ValidationError, verify_blocks, verify_chain, verify_chain_and_blocks, verify_linked_pair,
};

// Re-export the wire protocol and bus.
pub use net::{Transport, run_listener};
pub use protocol::{Envelope, MessageType, Payload};

// Re-export metrics registry and exporter.
pub use metrics::{MetricsRegistry, ProtocolMetrics, run_metrics_http_server};

// Re-export domain types at the crate root for convenience.
pub use types::*;

/// Type alias for the block store backend of a "typical" node.
pub type DefaultBlockStore = RocksDbBlockStore;

/// Type alias for the agent stack of a "typical" node.
pub type NodeAgent = Agent<DefaultBlockStore>;
