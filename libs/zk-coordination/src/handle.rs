//! The capability set consumed from the coordination service.
//!
//! A `CoordinationHandle` is whatever the composing process connected to the
//! store with. This crate never creates or destroys one; it only issues reads
//! and creates through it and interprets the outcomes.

use async_trait::async_trait;
use thiserror::Error;

/// Largest value a node may hold.
pub const MAX_VALUE_SIZE: usize = 1024 * 1024;

/// Raw outcome reported by the coordination store for a failed call.
///
/// Mirrors the store's own result codes closely enough that
/// [`crate::retry::classify`] can tell transient conditions apart from
/// structural ones.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The addressed node does not exist.
    #[error("no node")]
    NoNode,
    /// A node already exists at the path being created.
    #[error("node exists")]
    NodeExists,
    /// The session is in an invalid state (connecting, or between reconnects).
    #[error("invalid zhandle state")]
    InvalidState,
    /// The request or response could not be (de)serialized.
    #[error("marshalling error")]
    Marshalling,
    /// Ephemeral nodes may not have children.
    #[error("ephemerals cannot have children")]
    NoChildrenForEphemerals,
    /// The session has expired; every further call on it fails.
    #[error("session expired")]
    SessionExpired,
    /// The connection to the server was lost mid-request.
    #[error("connection loss")]
    ConnectionLoss,
    /// Any other store error, with its numeric code and description.
    #[error("{message} (code {code})")]
    Other { code: i32, message: String },
}

/// How a node is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CreateMode {
    /// Lives until explicitly deleted.
    Persistent,
    /// Removed by the store when the creating session ends.
    Ephemeral,
}

impl CreateMode {
    pub fn is_ephemeral(&self) -> bool {
        matches!(self, CreateMode::Ephemeral)
    }
}

/// Predefined ACL sets understood by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Acl {
    /// world:anyone with all permissions
    OpenUnsafe,
    /// world:anyone with read permission
    ReadUnsafe,
    /// all permissions for the creator's authenticated identity
    CreatorAll,
}

/// Kind of change reported by a fired watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchKind {
    DataChanged,
    ChildrenChanged,
    Deleted,
}

/// One-shot notification that a watched path changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub path: String,
    pub kind: WatchKind,
}

/// Operations this crate needs from a coordination service connection.
///
/// Implementations arm a one-shot watch on `path` when `watch` is true and the
/// call reached the store. Delivery of the resulting [`WatchEvent`] is up to
/// the implementation.
#[async_trait]
pub trait CoordinationHandle: Send + Sync {
    /// Read the value stored at `path`. `None` means the node carries no data.
    async fn get_data(&self, path: &str, watch: bool) -> Result<Option<Vec<u8>>, StoreError>;

    /// List the direct children of `path`, in whatever order the store keeps them.
    async fn get_children(&self, path: &str, watch: bool) -> Result<Vec<String>, StoreError>;

    /// Create a node at `path` holding `value`.
    async fn create(
        &self,
        path: &str,
        value: &[u8],
        acl: Acl,
        mode: CreateMode,
    ) -> Result<(), StoreError>;
}

#[async_trait]
impl<H> CoordinationHandle for std::sync::Arc<H>
where
    H: CoordinationHandle + ?Sized,
{
    async fn get_data(&self, path: &str, watch: bool) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).get_data(path, watch).await
    }

    async fn get_children(&self, path: &str, watch: bool) -> Result<Vec<String>, StoreError> {
        (**self).get_children(path, watch).await
    }

    async fn create(
        &self,
        path: &str,
        value: &[u8],
        acl: Acl,
        mode: CreateMode,
    ) -> Result<(), StoreError> {
        (**self).create(path, value, acl, mode).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        assert_eq!(StoreError::NoNode.to_string(), "no node");
        assert_eq!(StoreError::InvalidState.to_string(), "invalid zhandle state");
        let other = StoreError::Other {
            code: -113,
            message: "not authenticated".into(),
        };
        assert_eq!(other.to_string(), "not authenticated (code -113)");
    }

    #[test]
    fn test_create_mode() {
        assert!(CreateMode::Ephemeral.is_ephemeral());
        assert!(!CreateMode::Persistent.is_ephemeral());
    }
}
