use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use rmcp::transport::sse_server::SseServer;
use rmcp::{transport::stdio, ServiceExt};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use toolgate::{Gateway, GatewayConfig, Metrics, PluginRegistry};

#[derive(Parser)]
#[command(name = "toolgate")]
#[command(about = "Gateway exposing CLI plugins as MCP tools", version)]
struct Cli {
    /// Directory scanned for plugin subdirectories
    #[arg(long)]
    plugins_dir: Option<PathBuf>,

    /// Host for the SSE transport
    #[arg(long)]
    host: Option<String>,

    /// Port for the SSE transport
    #[arg(long)]
    port: Option<u16>,

    /// Bind to all interfaces (0.0.0.0) instead of loopback
    #[arg(long)]
    allow_external: bool,

    /// Serve over stdin/stdout instead of SSE
    #[arg(long)]
    stdio: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Logging always goes to stderr: in stdio mode stdout carries the
    // protocol stream and a single stray line corrupts it.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = GatewayConfig::from_env();
    if let Some(plugins_dir) = cli.plugins_dir {
        config.plugins_dir = plugins_dir;
    }
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if cli.allow_external {
        config.allow_external = true;
        warn!("External access enabled, binding on all interfaces");
    }

    let metrics = Arc::new(Metrics::new());

    info!(dir = %config.plugins_dir.display(), "Discovering plugins");
    let registry = PluginRegistry::discover(&config.plugins_dir, &metrics).await;
    info!(plugins = registry.plugin_count(), "Discovery complete");

    let gateway = Gateway::new(Arc::new(registry), Arc::clone(&metrics));
    info!(tools = metrics.tools_registered(), "Tool registry built");

    if cli.stdio {
        run_stdio(gateway).await
    } else {
        run_sse(gateway, config.bind_addr()?).await
    }
}

/// Serve over SSE until interrupted.
async fn run_sse(gateway: Gateway, addr: SocketAddr) -> anyhow::Result<()> {
    info!(%addr, "Starting SSE server");
    let ct = SseServer::serve(addr)
        .await?
        .with_service(move || gateway.clone());

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    ct.cancel();
    Ok(())
}

/// Serve a single session over stdin/stdout.
async fn run_stdio(gateway: Gateway) -> anyhow::Result<()> {
    info!("Starting stdio server");
    let service = gateway.serve(stdio()).await?;
    service.waiting().await?;
    Ok(())
}
