use axum::{
    Json, Router,
    extract::{Extension, rejection::JsonRejection},
    http::{Method, StatusCode, Uri},
    routing::{get, post},
};

use super::protocol::{
    ENDPOINT_IDENTIFY, ENDPOINT_PEERS, ENDPOINT_PING, ENDPOINT_REQUEST, ENDPOINT_RETRIEVE,
    ENDPOINT_SWITCH, PeerIdentified, PeerIdentify, PeersResponse,
};
use super::service::RouterHandle;
use super::types::{QueryResult, Request};

/// HTTP surface of a router node.
pub fn router(handle: RouterHandle) -> Router {
    Router::new()
        .route(ENDPOINT_REQUEST, post(handle_request))
        .route(ENDPOINT_RETRIEVE, post(handle_retrieve))
        .route(ENDPOINT_SWITCH, post(handle_switch))
        .route(ENDPOINT_IDENTIFY, post(handle_identify))
        .route(ENDPOINT_PING, get(handle_ping))
        .route(ENDPOINT_PEERS, get(handle_list_peers))
        .fallback(handle_unrecognized)
        .layer(Extension(handle))
}

pub async fn handle_request(
    Extension(router): Extension<RouterHandle>,
    body: Result<Json<Request>, JsonRejection>,
) -> (StatusCode, Json<QueryResult>) {
    let request = match body {
        Ok(Json(request)) => request,
        Err(e) => {
            tracing::warn!("Rejected request body: {}", e.body_text());
            return (StatusCode::BAD_REQUEST, Json(QueryResult::empty()));
        }
    };

    match router.request(request).await {
        Ok(result) => (StatusCode::OK, Json(result)),
        Err(e) => {
            tracing::error!("Request failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, Json(QueryResult::empty()))
        }
    }
}

pub async fn handle_retrieve(
    Extension(router): Extension<RouterHandle>,
    body: Result<Json<Request>, JsonRejection>,
) -> (StatusCode, Json<QueryResult>) {
    let request = match body {
        Ok(Json(request)) => request,
        Err(e) => {
            tracing::warn!("Rejected retrieve body: {}", e.body_text());
            return (StatusCode::BAD_REQUEST, Json(QueryResult::empty()));
        }
    };

    match router.retrieve(request).await {
        Ok(result) => (StatusCode::OK, Json(result)),
        Err(e) => {
            tracing::error!("Retrieve failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, Json(QueryResult::empty()))
        }
    }
}

pub async fn handle_switch(Extension(router): Extension<RouterHandle>) -> StatusCode {
    match router.switch().await {
        Ok(()) => StatusCode::ACCEPTED,
        Err(e) => {
            tracing::error!("Switch failed: {}", e);
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// Answers with our own id. The caller is not registered here: it becomes a peer
/// only once membership reports it.
pub async fn handle_identify(
    Extension(router): Extension<RouterHandle>,
    body: Result<Json<PeerIdentify>, JsonRejection>,
) -> (StatusCode, Json<PeerIdentified>) {
    let answer = PeerIdentified {
        id: router.local_id().clone(),
    };
    match body {
        Ok(Json(identify)) => {
            tracing::debug!("Identity handshake from {}", identify.from_id);
            (StatusCode::OK, Json(answer))
        }
        Err(e) => {
            tracing::warn!("Rejected identify body: {}", e.body_text());
            (StatusCode::BAD_REQUEST, Json(answer))
        }
    }
}

pub async fn handle_ping() -> StatusCode {
    StatusCode::OK
}

pub async fn handle_list_peers(
    Extension(router): Extension<RouterHandle>,
) -> (StatusCode, Json<PeersResponse>) {
    match router.list_peers().await {
        Ok(peers) => (StatusCode::OK, Json(PeersResponse { peers })),
        Err(e) => {
            tracing::error!("Listing peers failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(PeersResponse {
                    peers: Default::default(),
                }),
            )
        }
    }
}

pub async fn handle_unrecognized(method: Method, uri: Uri) -> StatusCode {
    tracing::warn!("Ignoring unrecognized request {} {}", method, uri);
    StatusCode::NOT_FOUND
}
