//! Local Storage Module
//!
//! The storage collaborator answering single-node lookups, plus the default placement
//! function used to decide which nodes hold a key.
//!
//! ## Core Concepts
//! - **Versions**: Data is loaded into a staging area and made visible in one step by a
//!   version switch.
//! - **Missing rows**: A key with no row is simply absent from the answer; it is never an error.
//! - **Partitioning**: `PartitionManager` hashes keys into fixed partitions and maps them
//!   onto the known nodes (primary + following replicas).

pub mod memory;
pub mod partitioner;

#[cfg(test)]
mod tests;

use async_trait::async_trait;

use crate::router::types::{QueryResult, Request};

/// Answers lookups against this node's own data.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Rows for the requested keys; keys without a row are left out.
    async fn retrieve(&self, request: &Request) -> QueryResult;

    /// Makes the next data version live.
    async fn switch(&self);
}
