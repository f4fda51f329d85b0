//! Error types for the routing layer.
//!
//! Data-not-found never shows up here: an exhausted fallback chain is a successful,
//! empty answer. These variants cover infrastructure failures only.

use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

use crate::membership::types::NodeId;

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("peer {peer} did not answer within {after:?}")]
    HopTimeout { peer: NodeId, after: Duration },

    #[error("transport error talking to {addr}: {source}")]
    Transport {
        addr: SocketAddr,
        #[source]
        source: reqwest::Error,
    },

    #[error("peer {addr} answered with status {status}")]
    PeerStatus { addr: SocketAddr, status: u16 },

    #[error("router is not running")]
    Stopped,
}

pub type Result<T> = std::result::Result<T, RouterError>;
