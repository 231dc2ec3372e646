use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::Config;
use anyhow::{Context, Result};
use gossip::GossipProtocol;
use storage::{LocalStore, Object, StoreError};
use tokio::task::{self, JoinHandle};
use tonic::Status;
use tracing::info;
use transport::GrpcTransport;

pub mod api;
pub mod gossip;
pub mod storage;
pub mod transport;

/// One storage node: the local blob store plus cluster membership, served
/// through the `BlobNode` RPC service.
pub struct StorageNode {
    store: Arc<LocalStore>,
    gossip: Arc<GossipProtocol>,
    shutting_down: AtomicBool,
}

impl StorageNode {
    pub fn new(cfg: &Config) -> Result<Self> {
        let store = LocalStore::open(&cfg.data_dir, cfg.fsync)
            .with_context(|| format!("opening data dir {}", cfg.data_dir.display()))?;
        let gossip = GossipProtocol::new(
            cfg.node_id(),
            cfg.advertise_addr(),
            cfg.peers.iter().map(|p| p.addr.clone()).collect(),
            cfg.gossip_config(),
            Arc::new(GrpcTransport::new()),
        );

        info!(
            node_id = gossip.id(),
            addr = gossip.addr(),
            data_dir = %store.root().display(),
            peers = cfg.peers.len(),
            "starting storage node"
        );
        Ok(Self::with_parts(store, gossip))
    }

    pub fn with_parts(store: LocalStore, gossip: GossipProtocol) -> Self {
        StorageNode {
            store: Arc::new(store),
            gossip: Arc::new(gossip),
            shutting_down: AtomicBool::new(false),
        }
    }

    pub fn local_store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    pub fn membership(&self) -> &Arc<GossipProtocol> {
        &self.gossip
    }

    /// Start the background gossip tasks.
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        self.gossip.spawn()
    }

    /// Refuse new requests and stop gossiping. Requests already running
    /// are left to finish.
    pub fn shutdown(&self) {
        if !self.shutting_down.swap(true, Ordering::SeqCst) {
            info!(node_id = self.gossip.id(), "shutting down");
        }
        self.gossip.stop();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    fn ensure_serving(&self) -> Result<(), Status> {
        if self.is_shutting_down() {
            return Err(Status::unavailable("node is shutting down"));
        }
        Ok(())
    }

    async fn put_object(
        &self,
        bucket: String,
        key: String,
        data: Vec<u8>,
        timestamp: i64,
    ) -> storage::Result<()> {
        self.blocking(move |store| store.write(&bucket, &key, &data, timestamp))
            .await
    }

    async fn get_object(&self, bucket: String, key: String) -> storage::Result<Object> {
        self.blocking(move |store| store.read(&bucket, &key)).await
    }

    async fn delete_object(&self, bucket: String, key: String) -> storage::Result<()> {
        self.blocking(move |store| store.delete(&bucket, &key)).await
    }

    async fn assemble_object(
        &self,
        bucket: String,
        key: String,
        parts: Vec<String>,
    ) -> storage::Result<u64> {
        self.blocking(move |store| store.assemble(&bucket, &key, &parts))
            .await
    }

    /// Run a store call on the blocking pool so disk I/O never parks a
    /// runtime worker.
    async fn blocking<T, F>(&self, f: F) -> storage::Result<T>
    where
        F: FnOnce(&LocalStore) -> storage::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.store.clone();
        task::spawn_blocking(move || f(&store))
            .await
            .map_err(|err| StoreError::Io(io::Error::other(err)))?
    }
}
