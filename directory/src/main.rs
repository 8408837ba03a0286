// directory/src/main.rs

//! Directory service binary.
//!
//! Speaks the same wire envelope as the agents over the TCP bus:
//!
//! - `REGISTER` adds or refreshes an agent entry,
//! - `UNREGISTER` removes it,
//! - `AGENT_REQUEST` is answered with `AGENT_REPLY` carrying the current
//!   peer list, sent back to the requester's reply address.
//!
//! One task owns the registry and the outbound transport; handlers are
//! synchronous, mirroring the agents' cooperative model.

mod registry;

use std::net::SocketAddr;

use tokio::signal;
use tokio::sync::mpsc;

use chain::net::{Transport, run_listener};
use chain::protocol::{AgentReply, Envelope, MessageType, Payload};

use registry::AgentRegistry;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "directory=info,chain=info".to_string()),
        )
        .init();

    if let Err(e) = run().await {
        eprintln!("fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), String> {
    let listen_addr: SocketAddr = std::env::var("DIRECTORY_LISTEN")
        .unwrap_or_else(|_| "127.0.0.1:9000".to_string())
        .parse()
        .map_err(|e| format!("invalid DIRECTORY_LISTEN address: {e}"))?;

    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .map_err(|e| format!("failed to bind {listen_addr}: {e}"))?;

    tracing::info!("directory listening on {listen_addr}");

    let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel();
    tokio::spawn(run_listener(listener, inbound_tx));

    let mut transport = Transport::new();
    let mut registry = AgentRegistry::new();
    let own_address = listen_addr.to_string();

    let shutdown = signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            Some(envelope) = inbound_rx.recv() => {
                handle_envelope(envelope, &mut registry, &mut transport, &own_address);
            }
            _ = &mut shutdown => {
                tracing::info!("shutdown signal received");
                break;
            }
        }
    }

    Ok(())
}

fn handle_envelope(
    envelope: Envelope,
    registry: &mut AgentRegistry,
    transport: &mut Transport,
    own_address: &str,
) {
    match (envelope.kind, envelope.payload) {
        (MessageType::Register, Payload::Register(register)) => {
            tracing::info!(
                address = %register.agent.address,
                agent_type = %register.agent.agent_type,
                "agent registered"
            );
            registry.register(register.agent);
        }
        (MessageType::Unregister, Payload::Unregister(unregister)) => {
            tracing::info!(address = %unregister.agent.address, "agent unregistered");
            registry.unregister(&unregister.agent.address);
        }
        (MessageType::AgentRequest, Payload::Empty) => {
            let reply = Envelope::new(
                MessageType::AgentReply,
                own_address,
                Payload::AgentReply(AgentReply {
                    agents: registry.list(),
                }),
            );
            transport.send(&envelope.sender, reply);
            tracing::debug!(
                requester = %envelope.sender,
                agents = registry.len(),
                "answered agent request"
            );
        }
        (kind, _) => {
            tracing::warn!("dropping unexpected {kind:?} message from {}", envelope.sender);
        }
    }
}
