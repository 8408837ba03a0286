//! TCP message bus.
//!
//! The bus is asymmetric: one listener task accepts connections and
//! decodes frames into the owner's inbound channel, while outbound
//! traffic goes through a [`Transport`] that keeps one writer task per
//! destination address. A single connection per peer preserves per-peer
//! send order; between different peers no ordering is guaranteed.
//!
//! Connection failures are logged and otherwise surface only as silence:
//! the affected exchange session times out and its slot is reclaimed.

use std::collections::HashMap;
use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use crate::protocol::codec::{read_frame, write_frame};
use crate::protocol::Envelope;

/// Accepts connections and forwards every decoded envelope to `inbound`.
///
/// Runs until the listener fails or the inbound receiver is dropped.
pub async fn run_listener(listener: TcpListener, inbound: mpsc::UnboundedSender<Envelope>) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::error!("listener accept failed: {e}");
                return;
            }
        };

        let inbound = inbound.clone();
        tokio::spawn(async move {
            if let Err(e) = read_connection(stream, inbound).await {
                tracing::warn!("connection from {peer} closed: {e}");
            }
        });
    }
}

async fn read_connection(
    mut stream: TcpStream,
    inbound: mpsc::UnboundedSender<Envelope>,
) -> Result<(), crate::protocol::CodecError> {
    while let Some(envelope) = read_frame(&mut stream).await? {
        if inbound.send(envelope).is_err() {
            // Receiver is gone; the owner is shutting down.
            return Ok(());
        }
    }
    Ok(())
}

/// Outbound side of the bus: one lazily-connected writer per peer.
#[derive(Default)]
pub struct Transport {
    peers: HashMap<String, mpsc::UnboundedSender<Envelope>>,
}

impl Transport {
    /// Creates a transport with no open connections.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an envelope for a peer, spawning its writer task on first
    /// use (and again after a connection failure).
    pub fn send(&mut self, to: &str, envelope: Envelope) {
        if let Some(queue) = self.peers.get(to) {
            match queue.send(envelope) {
                Ok(()) => return,
                Err(mpsc::error::SendError(envelope)) => {
                    // Writer died with its connection; start over.
                    self.peers.remove(to);
                    self.send(to, envelope);
                    return;
                }
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        if tx.send(envelope).is_err() {
            return;
        }
        self.peers.insert(to.to_string(), tx);

        let address = to.to_string();
        tokio::spawn(run_writer(address, rx));
    }
}

async fn run_writer(address: String, mut queue: mpsc::UnboundedReceiver<Envelope>) {
    let target: SocketAddr = match address.parse() {
        Ok(addr) => addr,
        Err(e) => {
            tracing::warn!("dropping messages for unparsable address {address}: {e}");
            return;
        }
    };

    let mut stream = match TcpStream::connect(target).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!("could not connect to {address}: {e}");
            return;
        }
    };

    while let Some(envelope) = queue.recv().await {
        if let Err(e) = write_frame(&mut stream, &envelope).await {
            tracing::warn!("send to {address} failed: {e}");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{MessageType, Payload};

    #[tokio::test]
    async fn envelopes_flow_through_listener_and_transport() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let address = listener.local_addr().expect("local addr").to_string();

        let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_listener(listener, inbound_tx));

        let mut transport = Transport::new();
        for i in 0..3u32 {
            transport.send(
                &address,
                Envelope::new(
                    MessageType::ProtectIndexRequest,
                    format!("127.0.0.1:91{i:02}"),
                    Payload::Empty,
                ),
            );
        }

        // Per-peer order is preserved across one connection.
        for i in 0..3u32 {
            let envelope = inbound_rx.recv().await.expect("envelope");
            assert_eq!(envelope.kind, MessageType::ProtectIndexRequest);
            assert_eq!(envelope.sender, format!("127.0.0.1:91{i:02}"));
        }
    }

    #[tokio::test]
    async fn unreachable_peer_only_logs() {
        let mut transport = Transport::new();
        // Port 1 is essentially never listening; the send must not panic
        // or block.
        transport.send(
            "127.0.0.1:1",
            Envelope::new(MessageType::ProtectReject, "127.0.0.1:9100", Payload::Empty),
        );
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
}
