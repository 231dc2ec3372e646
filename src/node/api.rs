use grpc::{
    blob_node_server::BlobNode, AssembleRequest, AssembleResponse, ClusterStatusResponse,
    DeleteRequest, DeleteResponse, Empty, GossipMessage, GossipResponse, RetrieveRequest,
    RetrieveResponse, StoreRequest, StoreResponse,
};
use tonic::{Request, Response, Status};
use tracing::warn;

use super::storage::StoreError;

pub mod grpc {
    tonic::include_proto!("blobnode");
}

// Store failures travel in the response body; only shutdown is a transport
// error, so callers can tell "reachable but failed" from "go elsewhere".
#[tonic::async_trait]
impl BlobNode for super::StorageNode {
    async fn store(&self, req: Request<StoreRequest>) -> Result<Response<StoreResponse>, Status> {
        self.ensure_serving()?;
        let req = req.into_inner();
        let (bucket, key) = (req.bucket.clone(), req.key.clone());
        match self
            .put_object(req.bucket, req.key, req.data, req.timestamp)
            .await
        {
            Ok(()) => Ok(Response::new(StoreResponse {
                success: true,
                error: String::new(),
            })),
            Err(err) => {
                warn!(bucket, key, error = %err, "store failed");
                Ok(Response::new(StoreResponse {
                    success: false,
                    error: err.to_string(),
                }))
            }
        }
    }

    async fn retrieve(
        &self,
        req: Request<RetrieveRequest>,
    ) -> Result<Response<RetrieveResponse>, Status> {
        self.ensure_serving()?;
        let req = req.into_inner();
        let (bucket, key) = (req.bucket.clone(), req.key.clone());
        let resp = match self.get_object(req.bucket, req.key).await {
            Ok(obj) => RetrieveResponse {
                data: obj.data,
                found: true,
                timestamp: obj.timestamp,
                error: String::new(),
            },
            Err(StoreError::NotFound(_)) => RetrieveResponse::default(),
            Err(err) => {
                warn!(bucket, key, error = %err, "retrieve failed");
                RetrieveResponse {
                    error: err.to_string(),
                    ..Default::default()
                }
            }
        };
        Ok(Response::new(resp))
    }

    async fn delete(&self, req: Request<DeleteRequest>) -> Result<Response<DeleteResponse>, Status> {
        self.ensure_serving()?;
        let req = req.into_inner();
        let (bucket, key) = (req.bucket.clone(), req.key.clone());
        let resp = match self.delete_object(req.bucket, req.key).await {
            Ok(()) | Err(StoreError::NotFound(_)) => DeleteResponse {
                success: true,
                error: String::new(),
            },
            Err(err) => {
                warn!(bucket, key, error = %err, "delete failed");
                DeleteResponse {
                    success: false,
                    error: err.to_string(),
                }
            }
        };
        Ok(Response::new(resp))
    }

    async fn assemble(
        &self,
        req: Request<AssembleRequest>,
    ) -> Result<Response<AssembleResponse>, Status> {
        self.ensure_serving()?;
        let req = req.into_inner();
        let (bucket, key) = (req.bucket.clone(), req.key.clone());
        let resp = match self.assemble_object(req.bucket, req.key, req.parts).await {
            Ok(size) => AssembleResponse {
                size: size as i64,
                error: String::new(),
            },
            Err(err) => {
                warn!(bucket, key, error = %err, "assemble failed");
                AssembleResponse {
                    size: 0,
                    error: err.to_string(),
                }
            }
        };
        Ok(Response::new(resp))
    }

    async fn gossip(&self, req: Request<GossipMessage>) -> Result<Response<GossipResponse>, Status> {
        self.ensure_serving()?;
        self.gossip.merge(req.into_inner()).await;
        Ok(Response::new(GossipResponse { success: true }))
    }

    async fn get_cluster_status(
        &self,
        _req: Request<Empty>,
    ) -> Result<Response<ClusterStatusResponse>, Status> {
        self.ensure_serving()?;
        Ok(Response::new(ClusterStatusResponse {
            members: self.gossip.snapshot().await,
        }))
    }
}
