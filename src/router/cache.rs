//! Single-flight cache of pending request computations.
//!
//! Entries are shared handles to a spawned computation, not resolved values. Equal
//! requests attach to the same handle whether it is still running or already done,
//! and `invalidate_all` only forgets handles: callers already attached still get
//! their answer, while anyone asking afterwards starts a fresh computation.

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use lru::LruCache;
use std::future::Future;
use std::num::NonZeroUsize;

use super::types::{QueryResult, Request};

pub type PendingResult = Shared<BoxFuture<'static, QueryResult>>;

pub struct RequestCache {
    entries: LruCache<Request, PendingResult>,
}

impl RequestCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: LruCache::new(capacity),
        }
    }

    /// Returns the computation for `request`, starting it with `compute` if none is cached.
    ///
    /// Must be called from within a tokio runtime: a new computation is spawned right
    /// away, so it makes progress even if nobody polls the returned handle.
    pub fn get_or_compute<F, Fut>(&mut self, request: Request, compute: F) -> PendingResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = QueryResult> + Send + 'static,
    {
        if let Some(pending) = self.entries.get(&request) {
            tracing::debug!("Cache hit for {} ({} keys)", request.table, request.keys.len());
            return pending.clone();
        }

        let task = tokio::spawn(compute());
        let pending = async move {
            match task.await {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!("Request computation failed: {}", e);
                    QueryResult::empty()
                }
            }
        }
        .boxed()
        .shared();

        if let Some((evicted, _)) = self.entries.push(request, pending.clone()) {
            tracing::debug!("Evicted cached request for {}", evicted.table);
        }
        pending
    }

    pub fn invalidate_all(&mut self) {
        let dropped = self.entries.len();
        self.entries.clear();
        tracing::debug!("Invalidated {} cached request(s)", dropped);
    }

    pub fn contains(&self, request: &Request) -> bool {
        self.entries.contains(request)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }
}
