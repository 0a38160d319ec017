//! # zk-coordination
//!
//! Client-side adapter over a hierarchical coordination store (ZooKeeper
//! style) used for configuration distribution and service discovery.
//!
//! This library provides:
//! - **Node reads** returning a node's value, treating a missing value as empty.
//! - **Children listing** in a stable, byte-wise sorted order.
//! - **Service status aggregation** decoding each child's up/down/offline value.
//! - **Ephemeral registration** with idempotent creation of persistent ancestors.
//! - **Retry policy** classifying store errors into not-found, transient and fatal.
//! - **Diagnostics log** routing the store's own warnings into a dedicated file.
//! - **In-memory store** implementing the handle trait, with sessions, watches
//!   and fault injection.
//!
//! ## Design Principles
//!
//! - The store connection is abstracted behind [`CoordinationHandle`], so the
//!   adapter never depends on a particular client library.
//! - Every read arms a watch on the node it reads; watch delivery belongs to the
//!   handle.
//! - Failures carry a kind (param, not-found, remote failure, invariant
//!   violation) instead of integer codes.

pub mod config;
pub mod coordinator;
pub mod diagnostics;
pub mod error;
pub mod handle;
pub mod memory;
pub mod path;
mod register;
pub mod retry;
pub mod status;
pub mod trace;

// Re-export key types for convenient access
pub use config::CoordinationConfig;
pub use coordinator::{ChildrenStatus, Coordinator};
pub use diagnostics::{DiagnosticsLog, STORE_DIAGNOSTICS_TARGET};
pub use error::{CoordinationError, CoordinationResult, ErrorKind};
pub use handle::{Acl, CoordinationHandle, CreateMode, MAX_VALUE_SIZE, StoreError, WatchEvent, WatchKind};
pub use memory::{MemorySession, MemoryStore, Operation};
pub use retry::RetryPolicy;
pub use status::ServiceStatus;
