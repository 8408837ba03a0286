//! Prometheus-backed metrics and HTTP exporter.
//!
//! This module defines a [`MetricsRegistry`] that owns a Prometheus
//! registry and a set of strongly-typed protocol metrics, and an async
//! HTTP exporter that serves `/metrics` using `hyper`.

use std::{convert::Infallible, net::SocketAddr, sync::Arc};

use bytes::Bytes;
use http_body_util::Full;
use hyper::{
    Method, Request, Response, StatusCode, body::Incoming, header, server::conn::http1,
    service::service_fn,
};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry, TextEncoder,
};

/// Exchange-protocol Prometheus metrics.
///
/// These are registered into a [`Registry`] and updated from the agent's
/// message handlers.
#[derive(Clone)]
pub struct ProtocolMetrics {
    /// Exchange sessions this agent has initiated.
    pub sessions_initiated: IntCounter,
    /// Exchange sessions that reached the final agreement.
    pub sessions_completed: IntCounter,
    /// Exchange sessions terminated by a reject (sent or received).
    pub sessions_rejected: IntCounter,
    /// Sessions dropped locally after their slot expired.
    pub sessions_expired: IntCounter,
    /// Blocks received from peers during exchange sessions.
    pub blocks_received: IntCounter,
    /// Wall-clock duration of completed sessions, in seconds.
    pub session_seconds: Histogram,
    /// Number of peers currently known from the directory.
    pub known_peers: IntGauge,
}

impl ProtocolMetrics {
    /// Registers protocol metrics into the given `Registry`.
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let sessions_initiated = IntCounter::with_opts(Opts::new(
            "protocol_sessions_initiated",
            "Total number of exchange sessions initiated by this agent",
        ))?;
        registry.register(Box::new(sessions_initiated.clone()))?;

        let sessions_completed = IntCounter::with_opts(Opts::new(
            "protocol_sessions_completed",
            "Total number of exchange sessions that reached the final agreement",
        ))?;
        registry.register(Box::new(sessions_completed.clone()))?;

        let sessions_rejected = IntCounter::with_opts(Opts::new(
            "protocol_sessions_rejected",
            "Total number of exchange sessions terminated by a reject",
        ))?;
        registry.register(Box::new(sessions_rejected.clone()))?;

        let sessions_expired = IntCounter::with_opts(Opts::new(
            "protocol_sessions_expired",
            "Total number of exchange sessions dropped after their slot expired",
        ))?;
        registry.register(Box::new(sessions_expired.clone()))?;

        let blocks_received = IntCounter::with_opts(Opts::new(
            "protocol_blocks_received",
            "Total number of blocks received from peers during exchange sessions",
        ))?;
        registry.register(Box::new(blocks_received.clone()))?;

        // Session duration.
        let session_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "protocol_session_seconds",
                "Wall-clock duration of completed exchange sessions in seconds",
            )
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ]),
        )?;
        registry.register(Box::new(session_seconds.clone()))?;

        let known_peers = IntGauge::with_opts(Opts::new(
            "protocol_known_peers",
            "Number of peers currently known from the directory",
        ))?;
        registry.register(Box::new(known_peers.clone()))?;

        Ok(Self {
            sessions_initiated,
            sessions_completed,
            sessions_rejected,
            sessions_expired,
            blocks_received,
            session_seconds,
            known_peers,
        })
    }
}

/// Wrapper around a Prometheus registry and the protocol metrics.
///
/// This is the main handle you pass around in the node. It can be wrapped
/// in an [`Arc`] and shared across tasks.
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Registry,
    pub protocol: ProtocolMetrics,
}

impl MetricsRegistry {
    /// Creates a new `MetricsRegistry` with a fresh underlying `Registry`
    /// and registers the protocol metrics.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("agent".to_string()), None)?;
        let protocol = ProtocolMetrics::register(&registry)?;
        Ok(Self { registry, protocol })
    }

    /// Encodes all metrics in this registry into the Prometheus text format.
    pub fn gather_text(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!("failed to encode Prometheus metrics: {e}");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Runs an HTTP server that exposes Prometheus metrics.
///
/// The server listens on `addr` and serves `GET /metrics` with the
/// Prometheus text exposition format. All other paths return 404.
pub async fn run_metrics_http_server(
    metrics: Arc<MetricsRegistry>,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let svc = service_fn(move |req| {
                let metrics = metrics.clone();
                handle_request(req, metrics)
            });

            if let Err(err) = http1::Builder::new().serve_connection(io, svc).await {
                tracing::warn!("metrics HTTP server error: {err}");
            }
        });
    }
}

async fn handle_request(
    req: Request<Incoming>,
    metrics: Arc<MetricsRegistry>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => {
            let body = metrics.gather_text();
            Ok(Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "text/plain; version=0.0.4")
                .body(Full::new(Bytes::from(body)))
                .unwrap())
        }
        _ => Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from("not found")))
            .unwrap()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::Registry;

    #[test]
    fn protocol_metrics_register_and_record() {
        let registry = Registry::new();
        let metrics = ProtocolMetrics::register(&registry).expect("register metrics");

        metrics.sessions_initiated.inc();
        metrics.sessions_completed.inc();
        metrics.sessions_rejected.inc();
        metrics.blocks_received.inc_by(3);
        metrics.session_seconds.observe(0.042);
        metrics.known_peers.set(7);

        let metric_families = registry.gather();
        assert!(!metric_families.is_empty());
    }

    #[test]
    fn metrics_registry_gather_text_works() {
        let registry = MetricsRegistry::new().expect("create metrics registry");
        registry.protocol.sessions_completed.inc();
        let text = registry.gather_text();
        assert!(text.contains("protocol_sessions_completed"));
    }
}
