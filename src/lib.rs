//! Distributed Read Router Library
//!
//! This library crate defines the modules that make up a router node.
//! It serves as the foundation for the binary executable (`main.rs`).
//!
//! ## Architecture Modules
//! The node is composed of three loosely coupled subsystems:
//!
//! - **`membership`**: The cluster coordination layer. Uses a UDP-based Gossip protocol
//!   (SWIM-like) for node discovery and failure detection, and reports peers joining and
//!   leaving as events.
//! - **`router`**: The read path. Orders replicas per key, walks the fallback chain under a
//!   time budget, merges per-key answers and caches whole computations.
//! - **`storage`**: The node's own versioned table data, and the partitioner deciding which
//!   nodes hold a key.

pub mod error;
pub mod membership;
pub mod router;
pub mod storage;
