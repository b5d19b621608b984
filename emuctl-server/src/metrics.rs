//! Prometheus metrics for the debug endpoint.
//!
//! This module provides:
//! - Metrics registry with connection and frame counters
//! - HTTP server to expose metrics at `/metrics` endpoint

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{Counter, CounterVec, Encoder, Gauge, Opts, Registry, TextEncoder};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

/// Prometheus metrics for the debug endpoint.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    /// Total controller connections accepted.
    pub connections_total: Counter,
    /// Currently open controller connections.
    pub connections_active: Gauge,
    /// Connections turned away at the limit.
    pub connections_rejected_total: Counter,
    /// Frames received by opcode name.
    pub frames_total: CounterVec,
    /// Frames whose opcode is not in the table.
    pub unknown_opcodes_total: Counter,
    /// Raw bytes read from controllers.
    pub bytes_received_total: Counter,
    /// Bytes discarded as a partial trailing frame on disconnect.
    pub bytes_discarded_total: Counter,
    /// Connection errors by kind.
    pub errors_total: CounterVec,
}

impl Metrics {
    /// Creates a new Metrics instance with all metrics registered.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let connections_total = Counter::with_opts(Opts::new(
            "emuctl_connections_total",
            "Total number of controller connections accepted",
        ))?;
        registry.register(Box::new(connections_total.clone()))?;

        let connections_active = Gauge::with_opts(Opts::new(
            "emuctl_connections_active",
            "Number of currently open controller connections",
        ))?;
        registry.register(Box::new(connections_active.clone()))?;

        let connections_rejected_total = Counter::with_opts(Opts::new(
            "emuctl_connections_rejected_total",
            "Connections rejected because the limit was reached",
        ))?;
        registry.register(Box::new(connections_rejected_total.clone()))?;

        let frames_total = CounterVec::new(
            Opts::new("emuctl_frames_total", "Command frames received by opcode"),
            &["opcode"],
        )?;
        registry.register(Box::new(frames_total.clone()))?;

        let unknown_opcodes_total = Counter::with_opts(Opts::new(
            "emuctl_unknown_opcodes_total",
            "Command frames carrying an opcode outside the table",
        ))?;
        registry.register(Box::new(unknown_opcodes_total.clone()))?;

        let bytes_received_total = Counter::with_opts(Opts::new(
            "emuctl_bytes_received_total",
            "Raw bytes read from controller connections",
        ))?;
        registry.register(Box::new(bytes_received_total.clone()))?;

        let bytes_discarded_total = Counter::with_opts(Opts::new(
            "emuctl_bytes_discarded_total",
            "Partial frame bytes dropped when a controller disconnected",
        ))?;
        registry.register(Box::new(bytes_discarded_total.clone()))?;

        let errors_total = CounterVec::new(
            Opts::new("emuctl_errors_total", "Connection errors by kind"),
            &["kind"],
        )?;
        registry.register(Box::new(errors_total.clone()))?;

        Ok(Self {
            registry,
            connections_total,
            connections_active,
            connections_rejected_total,
            frames_total,
            unknown_opcodes_total,
            bytes_received_total,
            bytes_discarded_total,
            errors_total,
        })
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(buffer)
    }

    /// Returns a reference to the registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

/// Runs the HTTP metrics server.
///
/// The server listens on the given address and serves metrics at `/metrics`.
pub async fn run_metrics_server(
    addr: SocketAddr,
    metrics: Arc<Metrics>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Metrics server listening on http://{}/metrics", addr);

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _)) => {
                        let metrics = metrics.clone();
                        tokio::spawn(async move {
                            let io = TokioIo::new(stream);
                            let service = service_fn(move |req| {
                                let metrics = metrics.clone();
                                async move { handle_request(req, metrics).await }
                            });
                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                tracing::debug!("Metrics connection error: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!("Metrics server accept error: {}", e);
                    }
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Metrics server shutting down");
                break;
            }
        }
    }

    Ok(())
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    metrics: Arc<Metrics>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let response = match req.uri().path() {
        "/metrics" => match metrics.encode() {
            Ok(body) => {
                let mut response = respond(StatusCode::OK, body);
                response.headers_mut().insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8"),
                );
                response
            }
            Err(e) => {
                tracing::warn!("Failed to encode metrics: {}", e);
                respond(StatusCode::INTERNAL_SERVER_ERROR, "encode failed")
            }
        },
        "/health" | "/healthz" => respond(StatusCode::OK, "OK"),
        _ => respond(StatusCode::NOT_FOUND, "Not Found"),
    };

    Ok(response)
}

fn respond(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
}
