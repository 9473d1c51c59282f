//! Tonic implementation of the `Pcfg` service.
//!
//! Workers are identified by the remote address of their connection, so a
//! worker must keep one channel open for the whole session.

use super::coordinator::Coordinator;
use pcfg_tonic_core::{
    Error,
    proto::{
        ConnectResponse, CrackingResults, Empty, ResultAck, WorkChunk, pcfg_server::Pcfg,
    },
};
use std::sync::Arc;
use tonic::{Request, Response, Status};

#[derive(Clone)]
pub struct PcfgService {
    coordinator: Arc<Coordinator>,
}

impl PcfgService {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        Self { coordinator }
    }
}

fn peer<T>(req: &Request<T>) -> Result<String, Error> {
    req.remote_addr()
        .map(|addr| addr.to_string())
        .ok_or(Error::MissingPeer)
}

#[tonic::async_trait]
impl Pcfg for PcfgService {
    #[tracing::instrument(skip_all)]
    async fn connect(&self, req: Request<Empty>) -> Result<Response<ConnectResponse>, Status> {
        let peer = peer(&req)?;
        Ok(Response::new(self.coordinator.connect(&peer)?))
    }

    #[tracing::instrument(skip_all)]
    async fn disconnect(&self, req: Request<Empty>) -> Result<Response<Empty>, Status> {
        let peer = peer(&req)?;
        self.coordinator.disconnect(&peer);
        Ok(Response::new(Empty {}))
    }

    #[tracing::instrument(skip_all)]
    async fn get_next_work(&self, req: Request<Empty>) -> Result<Response<WorkChunk>, Status> {
        let peer = peer(&req)?;
        let chunk = self.coordinator.get_next_work(&peer).await.inspect_err(|e| {
            tracing::debug!(peer = %peer, error = %e, "Work request refused");
        })?;
        Ok(Response::new(chunk))
    }

    #[tracing::instrument(skip_all, fields(hashes = req.get_ref().hashes.len()))]
    async fn submit_results(
        &self,
        req: Request<CrackingResults>,
    ) -> Result<Response<ResultAck>, Status> {
        let peer = peer(&req)?;
        let run_ended = self
            .coordinator
            .submit_results(&peer, req.into_inner().hashes);
        Ok(Response::new(ResultAck { run_ended }))
    }
}
