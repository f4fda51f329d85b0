//! Timeout-bounded request/response between routers.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::net::SocketAddr;
use std::time::Duration;

use super::protocol::{ENDPOINT_IDENTIFY, ENDPOINT_PING, ENDPOINT_RETRIEVE, PeerIdentified, PeerIdentify};
use super::types::{QueryResult, Request};
use crate::error::{Result, RouterError};
use crate::membership::types::{NodeId, PeerHandle};

/// How the router reaches other routers. Every call gives up after `timeout`.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Asks `peer` to answer `request` from its own storage.
    async fn retrieve(
        &self,
        peer: &PeerHandle,
        request: &Request,
        timeout: Duration,
    ) -> Result<QueryResult>;

    /// Identity handshake: tells the router at `address` who we are, returns its id.
    async fn identify(
        &self,
        address: SocketAddr,
        from: &NodeId,
        timeout: Duration,
    ) -> Result<NodeId>;

    /// Liveness probe.
    async fn ping(&self, peer: &PeerHandle, timeout: Duration) -> Result<()>;
}

/// JSON over HTTP, one request per call, no retries.
#[derive(Clone, Default)]
pub struct HttpTransport {
    http_client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            http_client: reqwest::Client::new(),
        }
    }

    async fn post_json<T, R>(
        &self,
        addr: SocketAddr,
        endpoint: &str,
        payload: &T,
        timeout: Duration,
    ) -> Result<R>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .http_client
            .post(format!("http://{}{}", addr, endpoint))
            .json(payload)
            .timeout(timeout)
            .send()
            .await
            .map_err(|source| RouterError::Transport { addr, source })?;

        if !response.status().is_success() {
            return Err(RouterError::PeerStatus {
                addr,
                status: response.status().as_u16(),
            });
        }

        response
            .json()
            .await
            .map_err(|source| RouterError::Transport { addr, source })
    }
}

#[async_trait]
impl PeerTransport for HttpTransport {
    async fn retrieve(
        &self,
        peer: &PeerHandle,
        request: &Request,
        timeout: Duration,
    ) -> Result<QueryResult> {
        self.post_json(peer.http_addr, ENDPOINT_RETRIEVE, request, timeout)
            .await
    }

    async fn identify(
        &self,
        address: SocketAddr,
        from: &NodeId,
        timeout: Duration,
    ) -> Result<NodeId> {
        let payload = PeerIdentify {
            from_id: from.clone(),
        };
        let answer: PeerIdentified = self
            .post_json(address, ENDPOINT_IDENTIFY, &payload, timeout)
            .await?;
        Ok(answer.id)
    }

    async fn ping(&self, peer: &PeerHandle, timeout: Duration) -> Result<()> {
        let addr = peer.http_addr;
        let response = self
            .http_client
            .get(format!("http://{}{}", addr, ENDPOINT_PING))
            .timeout(timeout)
            .send()
            .await
            .map_err(|source| RouterError::Transport { addr, source })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(RouterError::PeerStatus {
                addr,
                status: response.status().as_u16(),
            })
        }
    }
}
