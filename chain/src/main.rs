// src/main.rs
//
// Agent node binary that wires up the chain library:
//
// - RocksDB-backed block store
// - Ed25519 identity (fresh per process)
// - TCP message bus (listener + per-peer writers)
// - Prometheus metrics exporter on /metrics
// - Single-threaded event loop owning the agent: inbound messages,
//   scheduler ticks, and the experiment timeline all run here.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};

use chain::{
    Agent, Identity, MetricsRegistry, NodeConfig, RocksDbBlockStore, Transport,
    net::run_listener, run_metrics_http_server,
};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "chain=info".to_string()),
        )
        .init();

    if let Err(err) = run_node().await {
        eprintln!("fatal error: {err}");
        std::process::exit(1);
    }
}

async fn run_node() -> Result<(), String> {
    let cfg = NodeConfig::from_env();

    // ---------------------------
    // Metrics registry + exporter
    // ---------------------------

    let metrics = Arc::new(
        MetricsRegistry::new()
            .map_err(|e| format!("failed to initialise metrics registry: {e}"))?,
    );

    if cfg.metrics.enabled {
        let metrics_clone = metrics.clone();
        let addr = cfg.metrics.listen_addr;
        tokio::spawn(async move {
            if let Err(e) = run_metrics_http_server(metrics_clone, addr).await {
                tracing::warn!("metrics HTTP server error: {e}");
            }
        });
        tracing::info!("metrics exporter listening on http://{}/metrics", addr);
    }

    // ---------------------------
    // Storage backend (RocksDB)
    // ---------------------------

    let store = RocksDbBlockStore::open(&cfg.storage).map_err(|e| {
        format!(
            "failed to open RocksDB store at {}: {e}",
            cfg.storage.path
        )
    })?;

    // ---------------------------
    // Message bus
    // ---------------------------

    let listener = tokio::net::TcpListener::bind(cfg.agent.listen_addr)
        .await
        .map_err(|e| format!("failed to bind {}: {e}", cfg.agent.listen_addr))?;

    let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel();
    tokio::spawn(run_listener(listener, inbound_tx));

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
    let mut transport = Transport::new();

    // ---------------------------
    // The agent
    // ---------------------------

    let identity = Identity::generate();
    let mut agent = Agent::new(
        cfg.agent.clone(),
        identity,
        store,
        metrics.clone(),
        outbound_tx,
    );

    tracing::info!(
        address = %agent.info().address,
        public_key = %agent.public_key().as_readable(),
        "agent starting"
    );

    agent.register();

    // ---------------------------
    // Experiment timeline
    // ---------------------------

    let discovery_at = tokio::time::sleep(cfg.agent.startup_delay);
    let shutdown_at = tokio::time::sleep(cfg.agent.duration);
    tokio::pin!(discovery_at, shutdown_at);

    let first_tick = Instant::now() + cfg.agent.startup_delay + cfg.agent.step_start_delay;
    let mut step_timer = tokio::time::interval_at(first_tick, cfg.agent.step_interval);
    let mut discovered = false;

    loop {
        tokio::select! {
            _ = &mut discovery_at, if !discovered => {
                discovered = true;
                agent.request_agents();
            }
            _ = step_timer.tick() => {
                agent.step().map_err(|e| e.to_string())?;
            }
            Some(envelope) = inbound_rx.recv() => {
                agent.handle_envelope(envelope).map_err(|e| e.to_string())?;
            }
            Some(outbound) = outbound_rx.recv() => {
                transport.send(&outbound.to, outbound.envelope);
            }
            _ = &mut shutdown_at => break,
        }
    }

    // ---------------------------
    // Shutdown: unregister, drain, dump
    // ---------------------------

    agent.unregister();
    while let Ok(outbound) = outbound_rx.try_recv() {
        transport.send(&outbound.to, outbound.envelope);
    }
    // Leave the writer tasks a moment to flush in-flight sends.
    tokio::time::sleep(Duration::from_secs(1)).await;

    let path = agent
        .write_data()
        .map_err(|e| format!("failed to write data dump: {e}"))?;
    tracing::info!("wrote data dump to {}", path.display());

    Ok(())
}
