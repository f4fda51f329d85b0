//! Fallback chain: one key, tried against its candidates one at a time.
//!
//! The chain is an explicit loop: the next candidate is contacted only once the
//! previous one is known to have failed, so a successful early hop means later
//! replicas never see the lookup. Errors and timeouts count as failed hops, and so does
//! an answer without data for the key; failures are logged, never surfaced. Running out
//! of candidates (including having none) yields the empty result.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use super::transport::PeerTransport;
use super::types::{Candidate, QueryResult, Request};
use crate::error::{Result, RouterError};
use crate::membership::types::NodeId;
use crate::storage::Storage;

pub struct FallbackRetriever {
    local_id: NodeId,
    storage: Arc<dyn Storage>,
    transport: Arc<dyn PeerTransport>,
    hop_timeout: Duration,
}

impl FallbackRetriever {
    pub fn new(
        local_id: NodeId,
        storage: Arc<dyn Storage>,
        transport: Arc<dyn PeerTransport>,
        hop_timeout: Duration,
    ) -> Self {
        Self {
            local_id,
            storage,
            transport,
            hop_timeout,
        }
    }

    pub fn hop_timeout(&self) -> Duration {
        self.hop_timeout
    }

    pub async fn resolve(
        &self,
        table: &str,
        key: &str,
        columns: &BTreeSet<String>,
        candidates: &[Candidate],
    ) -> QueryResult {
        let lookup = Request::single(table, key, columns);

        for (hop, candidate) in candidates.iter().enumerate() {
            match self.attempt(&lookup, candidate).await {
                Ok(result) if result.has_data_for(key) => {
                    tracing::debug!("{}/{}: served by {} (hop {})", table, key, candidate.id, hop);
                    return result.restrict_to(key);
                }
                Ok(_) => {
                    tracing::debug!("{}/{}: no data on {}", table, key, candidate.id);
                }
                Err(e) => {
                    tracing::debug!("{}/{}: hop to {} failed: {}", table, key, candidate.id, e);
                }
            }
        }

        tracing::debug!(
            "{}/{}: exhausted {} candidate(s)",
            table,
            key,
            candidates.len()
        );
        QueryResult::empty()
    }

    async fn attempt(&self, lookup: &Request, candidate: &Candidate) -> Result<QueryResult> {
        let hop = async {
            if candidate.id == self.local_id {
                Ok(self.storage.retrieve(lookup).await)
            } else {
                self.transport
                    .retrieve(&candidate.handle, lookup, self.hop_timeout)
                    .await
            }
        };

        tokio::time::timeout(self.hop_timeout, hop)
            .await
            .map_err(|_| RouterError::HopTimeout {
                peer: candidate.id.clone(),
                after: self.hop_timeout,
            })?
    }
}
