use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use wormhole_core::http_share::{create_router, serve};
use wormhole_core::{AppState, MailboxBackend, ServerConfig, TransferBackend};

/// Web front end for wormhole text and file transfers
#[derive(Parser, Debug)]
#[command(name = "wormhole-web", version)]
struct Args {
    /// Port to listen on
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// Address to bind
    #[arg(long, env = "WORMHOLE_WEB_BIND")]
    bind: Option<String>,

    /// Root directory for transfer files (removed on shutdown)
    #[arg(long, env = "WORMHOLE_WEB_STORAGE_DIR")]
    storage_dir: Option<PathBuf>,

    /// Directory with the web client
    #[arg(long, env = "WORMHOLE_WEB_STATIC_DIR")]
    static_dir: Option<PathBuf>,

    /// Seconds a transfer is kept before cleanup
    #[arg(long)]
    transfer_ttl_secs: Option<u64>,

    /// Seconds between cleanup runs
    #[arg(long)]
    cleanup_interval_secs: Option<u64>,

    /// Seconds to wait for connections and transfers on shutdown
    #[arg(long)]
    shutdown_timeout_secs: Option<u64>,

    /// Largest accepted upload, in bytes
    #[arg(long)]
    max_upload_bytes: Option<u64>,

    /// Write the effective configuration to the config file
    #[arg(long)]
    save_config: bool,
}

impl Args {
    fn apply(self, config: &mut ServerConfig) {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(bind) = self.bind {
            config.bind_address = bind;
        }
        if let Some(dir) = self.storage_dir {
            config.storage_dir = dir;
        }
        if let Some(dir) = self.static_dir {
            config.static_dir = Some(dir);
        }
        if let Some(secs) = self.transfer_ttl_secs {
            config.transfer_ttl_secs = secs;
        }
        if let Some(secs) = self.cleanup_interval_secs {
            config.cleanup_interval_secs = secs;
        }
        if let Some(secs) = self.shutdown_timeout_secs {
            config.shutdown_timeout_secs = secs;
        }
        if let Some(bytes) = self.max_upload_bytes {
            config.max_upload_bytes = bytes;
        }
    }
}

/// Local IPv4 address, preferring LAN ranges (192.168.x.x, 10.x.x.x, 172.x.x.x)
fn lan_ip() -> Option<String> {
    let ips = local_ip_address::list_afinet_netifas().ok()?;
    let mut best_ip = None;
    for (_name, ip) in ips {
        if ip.is_loopback() || !ip.is_ipv4() {
            continue;
        }
        let ip_str = ip.to_string();
        if ip_str.starts_with("192.168.") {
            return Some(ip_str);
        }
        if ip_str.starts_with("10.") {
            best_ip = Some(ip_str);
            continue;
        }
        if best_ip.is_none() {
            best_ip = Some(ip_str);
        }
    }
    best_ip
}

/// Resolves on SIGINT, or SIGTERM on Unix
async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file (PORT etc.)
    let _ = dotenvy::dotenv();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,wormhole_core=debug"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    let save_config = args.save_config;
    let mut config = ServerConfig::load();
    args.apply(&mut config);

    if save_config {
        match config.save() {
            Ok(path) => tracing::info!("Saved configuration to {}", path.display()),
            Err(e) => tracing::warn!("Could not save configuration: {}", e),
        }
    }

    let shutdown = CancellationToken::new();
    let backend: Arc<dyn TransferBackend> = Arc::new(MailboxBackend::new());
    let state = AppState::new(config.clone(), backend, shutdown.clone())
        .await
        .with_context(|| {
            format!(
                "failed to prepare storage directory {}",
                config.storage_dir.display()
            )
        })?;
    let state = Arc::new(state);
    state.spawn_sweeper();

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!("Starting wormhole-web server on port {}", config.port);
    if let Some(ip) = lan_ip() {
        tracing::info!("Open http://{}:{} from another device", ip, config.port);
    }

    let router = create_router(Arc::clone(&state));
    let mut server = tokio::spawn(serve(listener, router, shutdown.clone()));

    tokio::select! {
        _ = wait_for_signal() => {}
        result = &mut server => {
            // The server only returns on its own if something went wrong
            shutdown.cancel();
            state.drain(config.shutdown_timeout()).await;
            state.storage.remove_all().await;
            return match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e).context("HTTP server failed"),
                Err(e) => Err(e).context("HTTP server task failed"),
            };
        }
    }

    tracing::info!("Shutting down server...");
    shutdown.cancel();

    let timeout = config.shutdown_timeout();
    match tokio::time::timeout(timeout, server).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => tracing::error!("HTTP server error: {}", e),
        Ok(Err(e)) => tracing::error!("HTTP server task failed: {}", e),
        Err(_) => tracing::warn!("Server forced to shutdown after {:?}", timeout),
    }

    state.drain(timeout).await;
    state.storage.remove_all().await;
    tracing::info!("Server stopped");
    Ok(())
}
