//! Router Network Protocol
//!
//! Endpoints and Data Transfer Objects used between routers and by clients.
//! `Request` and `QueryResult` travel as-is; the DTOs here cover the handshake and
//! the diagnostic peer listing.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::membership::types::{NodeId, PeerHandle};

// --- API Endpoints ---

/// Public endpoint for multi-key reads (cached, routed).
pub const ENDPOINT_REQUEST: &str = "/request";
/// Internal endpoint answered by the local storage only (no routing, no cache).
pub const ENDPOINT_RETRIEVE: &str = "/internal/retrieve";
/// Internal endpoint signalling a data version change.
pub const ENDPOINT_SWITCH: &str = "/internal/switch";
/// Identity handshake between routers.
pub const ENDPOINT_IDENTIFY: &str = "/internal/identify";
/// Liveness probe used by peer monitors.
pub const ENDPOINT_PING: &str = "/internal/ping";
/// Diagnostic listing of the peer registry.
pub const ENDPOINT_PEERS: &str = "/peers";

// --- Data Transfer Objects ---

/// Sent to a newly joined peer: "this is who is asking".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerIdentify {
    pub from_id: NodeId,
}

/// Handshake answer carrying the responder's own id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerIdentified {
    pub id: NodeId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeersResponse {
    pub peers: BTreeMap<NodeId, PeerHandle>,
}
