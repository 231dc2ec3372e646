use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use blobnode::config::{Config, PeerCfg};
use blobnode::node::{api::grpc::blob_node_server::BlobNodeServer, StorageNode};
use clap::Parser;
use tokio::select;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::oneshot;
use tokio::time;
use tonic::transport::Server;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(short, long)]
    port: Option<u16>,
    #[arg(short, long)]
    data_dir: Option<PathBuf>,
    /// Comma-separated peer addresses to bootstrap from
    #[arg(long, value_delimiter = ',')]
    peers: Vec<String>,
    /// Node id, defaults to node-<port>
    #[arg(short, long)]
    id: Option<String>,
    /// Address peers use to reach this node, defaults to 127.0.0.1:<port>
    #[arg(short, long)]
    advertise: Option<String>,
    #[arg(short, long)]
    config: Option<String>,
}

fn load_config(args: Args) -> Result<Config> {
    let mut cfg = match &args.config {
        Some(path) => Config::new(path)?,
        None => Config::default(),
    };
    if let Some(port) = args.port {
        cfg.port = port;
    }
    if let Some(data_dir) = args.data_dir {
        cfg.data_dir = data_dir;
    }
    if args.id.is_some() {
        cfg.id = args.id;
    }
    if args.advertise.is_some() {
        cfg.advertise_addr = args.advertise;
    }
    if !args.peers.is_empty() {
        cfg.peers = args
            .peers
            .into_iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .map(|addr| PeerCfg { addr })
            .collect();
    }
    Ok(cfg)
}

async fn shutdown_signal() -> Result<()> {
    let mut term = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    select! {
        res = tokio::signal::ctrl_c() => res.context("waiting for SIGINT")?,
        _ = term.recv() => {},
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cfg = load_config(Args::parse())?;
    let addr = cfg.listen_addr()?;
    let node = Arc::new(StorageNode::new(&cfg)?);
    node.start();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let mut server = tokio::spawn(
        Server::builder()
            .timeout(cfg.request_timeout())
            .add_service(BlobNodeServer::from_arc(node.clone()))
            .serve_with_shutdown(addr, async move {
                let _ = stop_rx.await;
            }),
    );
    info!(%addr, "serving rpc");

    select! {
        res = &mut server => {
            node.shutdown();
            return res.context("rpc server task")?.context("serving rpc");
        }
        res = shutdown_signal() => {
            res?;
            info!("received shutdown signal");
        }
    }

    // stop admitting requests, stop gossip, then drain
    node.shutdown();
    let _ = stop_tx.send(());
    match time::timeout(cfg.shutdown_grace(), server).await {
        Ok(res) => res
            .context("rpc server task")?
            .context("draining rpc server")?,
        Err(_) => warn!(
            grace_ms = cfg.shutdown_grace_ms,
            "in-flight requests still running after grace period"
        ),
    }
    info!("shutdown complete");
    Ok(())
}
