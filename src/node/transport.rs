//! Outbound gossip over gRPC.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::sync::RwLock;
use tonic::transport::Channel;
use tonic::Request;
use tracing::debug;

use super::api::grpc::{self, blob_node_client::BlobNodeClient};
use super::gossip::GossipTransport;

/// Sends gossip with one lazily-connected client per peer.
///
/// Clients are cached by peer id together with the address they dial; when
/// gossip moves a peer to a new address the next send rebuilds its client.
#[derive(Debug, Default)]
pub struct GrpcTransport {
    clients: RwLock<HashMap<String, (String, BlobNodeClient<Channel>)>>,
}

impl GrpcTransport {
    pub fn new() -> Self {
        Self::default()
    }

    async fn client(&self, peer_id: &str, addr: &str) -> Result<BlobNodeClient<Channel>> {
        if let Some((cached_addr, client)) = self.clients.read().await.get(peer_id) {
            if cached_addr == addr {
                return Ok(client.clone());
            }
        }

        let channel = Channel::from_shared(format!("http://{addr}"))
            .with_context(|| format!("bad peer address {addr:?}"))?
            .connect_lazy();
        let client = BlobNodeClient::new(channel);
        let previous = self
            .clients
            .write()
            .await
            .insert(peer_id.to_string(), (addr.to_string(), client.clone()));
        if let Some((old_addr, _)) = previous {
            debug!(peer_id, old_addr, addr, "replaced cached client");
        }
        Ok(client)
    }

    #[cfg(test)]
    async fn cached_addr(&self, peer_id: &str) -> Option<String> {
        self.clients
            .read()
            .await
            .get(peer_id)
            .map(|(addr, _)| addr.clone())
    }
}

#[tonic::async_trait]
impl GossipTransport for GrpcTransport {
    async fn send_gossip(
        &self,
        peer_id: &str,
        addr: &str,
        msg: grpc::GossipMessage,
        deadline: Duration,
    ) -> Result<()> {
        let mut client = self.client(peer_id, addr).await?;
        let mut req = Request::new(msg);
        req.set_timeout(deadline);
        let resp = client
            .gossip(req)
            .await
            .with_context(|| format!("gossip to {peer_id} at {addr}"))?;
        if !resp.into_inner().success {
            bail!("{peer_id} at {addr} refused gossip");
        }
        Ok(())
    }

    async fn forget(&self, peer_id: &str) {
        if self.clients.write().await.remove(peer_id).is_some() {
            debug!(peer_id, "dropped cached client");
        }
    }
}
