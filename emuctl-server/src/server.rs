//! TCP server implementation.

use crate::config::NetworkConfig;
use crate::error::ServerError;
use crate::handler::{CommandHandler, CommandSink};
use crate::metrics::Metrics;
use crate::session::Session;
use emuctl_protocol::FrameDecoder;
use std::future::pending;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Idle connection timeout (`None` keeps idle controllers forever).
    pub idle_timeout: Option<Duration>,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Metrics instance (if metrics are enabled).
    pub metrics: Option<Arc<Metrics>>,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind_addr", &self.bind_addr)
            .field("idle_timeout", &self.idle_timeout)
            .field("max_connections", &self.max_connections)
            .field("metrics_enabled", &self.metrics.is_some())
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_network(&NetworkConfig::default())
    }
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }

    /// Builds a server configuration from the network section.
    pub fn from_network(network: &NetworkConfig) -> Self {
        Self {
            bind_addr: network.bind_addr,
            idle_timeout: network.idle_timeout(),
            max_connections: network.max_connections,
            metrics: None,
        }
    }

    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the metrics instance.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Returns whether metrics are enabled.
    pub fn metrics_enabled(&self) -> bool {
        self.metrics.is_some()
    }
}

/// Server statistics.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU64,
    pub connections_rejected: AtomicU64,
    pub frames_total: AtomicU64,
    pub unknown_frames: AtomicU64,
    pub bytes_discarded: AtomicU64,
    pub errors_total: AtomicU64,
}

/// Debug endpoint: accepts controller connections and decodes their frames.
pub struct Server {
    config: ServerConfig,
    handler: Arc<CommandHandler>,
    stats: Arc<ServerStats>,
    shutdown: broadcast::Sender<()>,
    running: AtomicBool,
    next_session: AtomicU64,
}

impl Server {
    /// Creates a new server delivering commands to `sink`.
    pub fn new(config: ServerConfig, sink: Arc<dyn CommandSink>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let mut handler = CommandHandler::new(sink);
        if let Some(ref metrics) = config.metrics {
            handler = handler.with_metrics(metrics.clone());
        }
        Self {
            config,
            handler: Arc::new(handler),
            stats: Arc::new(ServerStats::default()),
            shutdown: shutdown_tx,
            running: AtomicBool::new(false),
            next_session: AtomicU64::new(1),
        }
    }

    /// Binds the configured address and serves until shutdown.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serves an already bound listener until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        let mut shutdown_rx = self.shutdown.subscribe();
        self.running.store(true, Ordering::SeqCst);
        tracing::info!("Debug endpoint listening on {}", listener.local_addr()?);

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => self.accept(stream, addr),
                        Err(e) => {
                            tracing::error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Server shutting down");
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn accept(&self, stream: TcpStream, addr: SocketAddr) {
        if self.stats.connections_active.load(Ordering::Relaxed)
            >= self.config.max_connections as u64
        {
            tracing::warn!("Connection limit reached, rejecting {}", addr);
            self.stats
                .connections_rejected
                .fetch_add(1, Ordering::Relaxed);
            if let Some(ref metrics) = self.config.metrics {
                metrics.connections_rejected_total.inc();
            }
            return;
        }

        self.stats.connections_total.fetch_add(1, Ordering::Relaxed);
        self.stats.connections_active.fetch_add(1, Ordering::Relaxed);
        if let Some(ref metrics) = self.config.metrics {
            metrics.connections_total.inc();
            metrics.connections_active.inc();
        }

        let session = Session::new(self.next_session.fetch_add(1, Ordering::Relaxed), addr);
        let handler = self.handler.clone();
        let stats = self.stats.clone();
        let config = self.config.clone();
        let mut conn_shutdown = self.shutdown.subscribe();

        tokio::spawn(async move {
            let result = Self::handle_connection(
                stream,
                &session,
                &handler,
                &stats,
                &config,
                &mut conn_shutdown,
            )
            .await;

            match result {
                Ok(()) | Err(ServerError::ShuttingDown) => {}
                Err(e) => {
                    tracing::debug!("Connection {} error: {}", addr, e);
                    stats.errors_total.fetch_add(1, Ordering::Relaxed);
                    if let Some(ref metrics) = config.metrics {
                        metrics.errors_total.with_label_values(&[e.kind()]).inc();
                    }
                }
            }

            stats.connections_active.fetch_sub(1, Ordering::Relaxed);
            if let Some(ref metrics) = config.metrics {
                metrics.connections_active.dec();
            }

            tracing::info!(
                "Controller disconnected: {} ({} frames, {} unknown)",
                addr,
                session.frames_received(),
                session.unknown_frames()
            );
        });
    }

    /// Reads frames until EOF, idle timeout, error or shutdown.
    async fn handle_connection(
        mut stream: TcpStream,
        session: &Session,
        handler: &CommandHandler,
        stats: &ServerStats,
        config: &ServerConfig,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let addr = session.remote_addr;
        tracing::info!("Controller connected: {} (session {})", addr, session.id);

        let mut decoder = FrameDecoder::new();
        let mut buf = [0u8; 4096];

        let result = 'conn: loop {
            let idle = async {
                match config.idle_timeout {
                    Some(timeout) => tokio::time::sleep(timeout).await,
                    None => pending::<()>().await,
                }
            };

            tokio::select! {
                result = stream.read(&mut buf) => {
                    match result {
                        Ok(0) => {
                            tracing::debug!("[{}] Connection closed by controller", addr);
                            break Ok(());
                        }
                        Ok(n) => {
                            tracing::trace!("[{}] Received {} bytes", addr, n);
                            session.record_bytes(n);
                            if let Some(ref metrics) = config.metrics {
                                metrics.bytes_received_total.inc_by(n as f64);
                            }
                            decoder.extend(&buf[..n]);
                        }
                        Err(e) => {
                            tracing::debug!("[{}] Read error: {}", addr, e);
                            break Err(ServerError::Io(e));
                        }
                    }
                }

                _ = idle => {
                    tracing::debug!("[{}] Idle timeout", addr);
                    break Ok(());
                }

                _ = shutdown.recv() => {
                    tracing::debug!("[{}] Shutdown signal received", addr);
                    break Err(ServerError::ShuttingDown);
                }
            }

            while let Some(frame) = decoder.decode_frame() {
                stats.frames_total.fetch_add(1, Ordering::Relaxed);
                match handler.handle_frame(session, frame) {
                    Ok(Some(_)) => {}
                    Ok(None) => {
                        stats.unknown_frames.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => break 'conn Err(e),
                }
            }
        };

        let discarded = decoder.clear();
        if discarded > 0 {
            tracing::debug!("[{}] Discarding {} bytes of partial frame", addr, discarded);
            stats
                .bytes_discarded
                .fetch_add(discarded as u64, Ordering::Relaxed);
            if let Some(ref metrics) = config.metrics {
                metrics.bytes_discarded_total.inc_by(discarded as f64);
            }
        }

        result
    }

    /// Initiates server shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    /// Returns whether the server is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns server statistics.
    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}
