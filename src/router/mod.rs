//! Read Router Module
//!
//! Answers multi-key reads for a sharded, replicated table store. Every key is looked up
//! on its replicas (local node first), keys are resolved concurrently and the per-key
//! answers are merged into one result. Identical requests share a single computation.
//!
//! ## Core Concepts
//! - **Peer Registry**: The node ids the router can reach, kept up to date from membership
//!   events and read through immutable snapshots.
//! - **Fallback Chain**: Replicas of a key are tried one after another, each bounded by the
//!   hop timeout, until one of them has data for the key.
//! - **Hop Timeout**: 95% of the request timeout divided by the replica count, so an
//!   exhausted key settles inside the request budget.
//! - **Single-Flight Cache**: An LRU of pending computations keyed by request, dropped as a
//!   whole when the data version switches.
//!
//! ## Responsibilities
//! - **Worker Loop** (`service`): The only place registry and cache are mutated.
//! - **HTTP API** (`handlers`): Client and inter-router endpoints.
//! - **Transport** (`transport`): Timeout-bounded calls to other routers.

pub mod cache;
pub mod config;
pub mod fallback;
pub mod handlers;
pub mod merge;
pub mod orderer;
pub mod peers;
pub mod protocol;
pub mod service;
pub mod transport;
pub mod types;
