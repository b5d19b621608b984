//! emuctl - emulator debug endpoint
//!
//! Listens for controller connections and reports every command frame received.

use emuctl_server::{
    run_metrics_server, CommandSink, Config, JsonlSink, LogSink, Metrics, OutputMode, Server,
    ServerConfig,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // File from EMUCTL_CONFIG if set, then env overrides
    let config = match Config::load() {
        Ok(c) => {
            if let Ok(path) = std::env::var("EMUCTL_CONFIG") {
                tracing::info!("Loaded config from {}", path);
            }
            c
        }
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            return Err(e.into());
        }
    };

    tracing::info!("Starting emuctl debug endpoint");
    tracing::info!("  Bind address: {}", config.network.bind_addr);
    tracing::info!("  Max connections: {}", config.network.max_connections);
    match config.network.idle_timeout() {
        Some(timeout) => tracing::info!("  Idle timeout: {:?}", timeout),
        None => tracing::info!("  Idle timeout: disabled"),
    }
    tracing::info!("  Output: {}", config.output.mode);

    let sink: Arc<dyn CommandSink> = match config.output.mode {
        OutputMode::Log => Arc::new(LogSink),
        OutputMode::Jsonl => Arc::new(JsonlSink::stdout()),
    };

    let mut server_config = ServerConfig::from_network(&config.network);
    let (metrics_shutdown, _) = broadcast::channel::<()>(1);
    let metrics_handle = if config.metrics.enabled {
        let metrics = Arc::new(Metrics::new()?);
        server_config = server_config.with_metrics(metrics.clone());
        let addr = config.metrics.bind_addr;
        let rx = metrics_shutdown.subscribe();
        Some(tokio::spawn(async move {
            if let Err(e) = run_metrics_server(addr, metrics, rx).await {
                tracing::error!("Metrics server failed: {}", e);
            }
        }))
    } else {
        tracing::info!("  Metrics: disabled");
        None
    };

    let server = Arc::new(Server::new(server_config, sink));

    let shutdown_server = server.clone();
    let shutdown_metrics = metrics_shutdown.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal, stopping endpoint...");
        shutdown_server.shutdown();
        let _ = shutdown_metrics.send(());
    });

    // Blocks until shutdown
    server.run().await?;

    if let Some(handle) = metrics_handle {
        let _ = handle.await;
    }

    let stats = server.stats();
    tracing::info!(
        "Endpoint stopped ({} connections, {} frames, {} unknown)",
        stats
            .connections_total
            .load(std::sync::atomic::Ordering::Relaxed),
        stats.frames_total.load(std::sync::atomic::Ordering::Relaxed),
        stats.unknown_frames.load(std::sync::atomic::Ordering::Relaxed)
    );
    Ok(())
}
