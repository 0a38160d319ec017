//! Ephemeral presence registration.

use tracing::{debug, error, info};

use crate::coordinator::Coordinator;
use crate::error::{CoordinationError, CoordinationResult};
use crate::handle::{Acl, CoordinationHandle, CreateMode, StoreError};
use crate::path;

impl<H: CoordinationHandle> Coordinator<H> {
    /// Publish `value` at `path` as an ephemeral node owned by the handle's
    /// session, creating any missing ancestors as empty persistent nodes.
    ///
    /// Ancestors that already exist and an ephemeral node that already exists
    /// both count as success, so concurrent registrants sharing ancestors and
    /// a registrant retrying after a restart all succeed. The existing node's
    /// value is left as is. The sequence is not transactional: a failure
    /// part way leaves the ancestors created so far, and the next attempt
    /// completes the chain.
    pub async fn register_ephemeral(&self, path: &str, value: &[u8]) -> CoordinationResult<()> {
        if path.is_empty() || value.is_empty() {
            return Err(CoordinationError::param(
                "ephemeral registration needs a path and a non-empty value",
            ));
        }
        path::validate(path)?;
        if path == path::ROOT {
            return Err(CoordinationError::param("cannot register the root path"));
        }
        if value.len() > self.max_value_size {
            return Err(CoordinationError::param(format!(
                "value of {} bytes exceeds limit of {}",
                value.len(),
                self.max_value_size
            )));
        }

        for ancestor in path::ancestors(path) {
            match self
                .handle
                .create(ancestor, &[], Acl::OpenUnsafe, CreateMode::Persistent)
                .await
            {
                Ok(()) => debug!(path = ancestor, "created ancestor node"),
                Err(StoreError::NodeExists) => {}
                Err(err) => {
                    error!(path = ancestor, error = %err, "failed to create ancestor of ephemeral node");
                    return Err(CoordinationError::RemoteFailure {
                        op: "create",
                        path: ancestor.to_owned(),
                        attempts: 1,
                        source: err,
                    });
                }
            }
        }

        match self
            .handle
            .create(path, value, Acl::OpenUnsafe, CreateMode::Ephemeral)
            .await
        {
            Ok(()) => {
                debug!(path, "registered ephemeral node");
                Ok(())
            }
            Err(StoreError::NodeExists) => {
                info!(path, "ephemeral node already exists");
                Ok(())
            }
            Err(err) => {
                error!(path, error = %err, "failed to register ephemeral node");
                Err(CoordinationError::RemoteFailure {
                    op: "create",
                    path: path.to_owned(),
                    attempts: 1,
                    source: err,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use tracing_test::traced_test;

    use super::*;
    use crate::config::CoordinationConfig;
    use crate::error::ErrorKind;
    use crate::handle::MAX_VALUE_SIZE;
    use crate::memory::{MemorySession, MemoryStore, Operation};

    /// Records every create before passing it on.
    struct Recording {
        inner: MemorySession,
        creates: Mutex<Vec<(String, Vec<u8>, Acl, CreateMode)>>,
    }

    #[async_trait]
    impl CoordinationHandle for Recording {
        async fn get_data(&self, path: &str, watch: bool) -> Result<Option<Vec<u8>>, StoreError> {
            self.inner.get_data(path, watch).await
        }

        async fn get_children(&self, path: &str, watch: bool) -> Result<Vec<String>, StoreError> {
            self.inner.get_children(path, watch).await
        }

        async fn create(
            &self,
            path: &str,
            value: &[u8],
            acl: Acl,
            mode: CreateMode,
        ) -> Result<(), StoreError> {
            self.creates
                .lock()
                .unwrap()
                .push((path.to_owned(), value.to_vec(), acl, mode));
            self.inner.create(path, value, acl, mode).await
        }
    }

    #[tokio::test]
    async fn test_register_creates_chain_in_order() {
        let store = MemoryStore::new();
        let coord = Coordinator::new(Recording {
            inner: store.session(),
            creates: Mutex::new(Vec::new()),
        });

        coord.register_ephemeral("/a/b/c", b"v").await.unwrap();

        let creates = coord.handle().creates.lock().unwrap().clone();
        let expected: Vec<(String, Vec<u8>, Acl, CreateMode)> = vec![
            ("/a".into(), vec![], Acl::OpenUnsafe, CreateMode::Persistent),
            ("/a/b".into(), vec![], Acl::OpenUnsafe, CreateMode::Persistent),
            ("/a/b/c".into(), b"v".to_vec(), Acl::OpenUnsafe, CreateMode::Ephemeral),
        ];
        assert_eq!(creates, expected);
        assert!(!store.is_ephemeral("/a"));
        assert!(!store.is_ephemeral("/a/b"));
        assert!(store.is_ephemeral("/a/b/c"));
        assert_eq!(store.get("/a/b"), Some(Vec::new()));
        assert_eq!(store.get("/a/b/c"), Some(b"v".to_vec()));
        assert_eq!(store.acl("/a/b/c"), Some(Acl::OpenUnsafe));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_register_twice_is_idempotent() {
        let store = MemoryStore::new();
        let coord = Coordinator::new(store.session());

        coord.register_ephemeral("/a/b/c", b"v").await.unwrap();
        coord.register_ephemeral("/a/b/c", b"v").await.unwrap();
        assert!(logs_contain("ephemeral node already exists"));
        assert_eq!(store.calls(Operation::Create), 6);
    }

    #[tokio::test]
    async fn test_register_keeps_existing_value() {
        let store = MemoryStore::new();
        let coord = Coordinator::new(store.session());

        coord.register_ephemeral("/svc/a", b"first").await.unwrap();
        coord.register_ephemeral("/svc/a", b"second").await.unwrap();
        assert_eq!(store.get("/svc/a"), Some(b"first".to_vec()));
    }

    #[tokio::test]
    async fn test_register_top_level() {
        let store = MemoryStore::new();
        let coord = Coordinator::new(store.session());

        coord.register_ephemeral("/solo", b"1").await.unwrap();
        assert!(store.is_ephemeral("/solo"));
        assert_eq!(store.calls(Operation::Create), 1);
    }

    #[tokio::test]
    async fn test_register_rejects_bad_params() {
        let store = MemoryStore::new();
        let coord = Coordinator::new(store.session());

        assert!(coord.register_ephemeral("", b"v").await.unwrap_err().is_param());
        assert!(coord.register_ephemeral("/a", b"").await.unwrap_err().is_param());
        assert!(coord.register_ephemeral("/", b"v").await.unwrap_err().is_param());
        assert!(coord.register_ephemeral("a/b", b"v").await.unwrap_err().is_param());
        assert_eq!(store.calls(Operation::Create), 0);
    }

    #[tokio::test]
    async fn test_register_rejects_oversized_value() {
        let store = MemoryStore::new();
        let mut coord = Coordinator::new(store.session());
        coord.max_value_size = 4;

        let err = coord.register_ephemeral("/a", b"12345").await.unwrap_err();
        assert!(err.is_param());
        assert_eq!(store.calls(Operation::Create), 0);
    }

    #[tokio::test]
    async fn test_register_limit_capped_at_store_maximum() {
        let store = MemoryStore::new();
        let config = CoordinationConfig {
            max_value_size: 4 * MAX_VALUE_SIZE,
            ..CoordinationConfig::default()
        };
        let coord = Coordinator::from_config(store.session(), &config);

        let err = coord
            .register_ephemeral("/a", &vec![b'x'; 2 * MAX_VALUE_SIZE])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Param);
        assert_eq!(store.calls(Operation::Create), 0);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_register_ancestor_failure() {
        let store = MemoryStore::new();
        store.fail_next(Operation::Create, StoreError::ConnectionLoss);
        let coord = Coordinator::new(store.session());

        let err = coord.register_ephemeral("/a/b/c", b"v").await.unwrap_err();
        match err {
            CoordinationError::RemoteFailure { path, source, .. } => {
                assert_eq!(path, "/a");
                assert_eq!(source, StoreError::ConnectionLoss);
            }
            other => panic!("expected RemoteFailure, got: {other:?}"),
        }
        assert!(logs_contain("failed to create ancestor"));
        assert!(!store.exists("/a"));

        // the next attempt completes the chain
        coord.register_ephemeral("/a/b/c", b"v").await.unwrap();
        assert!(store.is_ephemeral("/a/b/c"));
    }

    #[tokio::test]
    async fn test_register_final_create_failure() {
        let store = MemoryStore::new();
        let other = Coordinator::new(store.session());
        other.register_ephemeral("/a/b", b"owner").await.unwrap();
        let coord = Coordinator::new(store.session());

        let err = coord.register_ephemeral("/a/b/c", b"v").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RemoteFailure);
        assert!(matches!(
            err,
            CoordinationError::RemoteFailure {
                source: StoreError::NoChildrenForEphemerals,
                ..
            }
        ));
    }

    /// Yields to the runtime before every create so registrants interleave.
    struct Yielding {
        inner: MemorySession,
        log: Arc<Mutex<Vec<(u64, String)>>>,
    }

    #[async_trait]
    impl CoordinationHandle for Yielding {
        async fn get_data(&self, path: &str, watch: bool) -> Result<Option<Vec<u8>>, StoreError> {
            self.inner.get_data(path, watch).await
        }

        async fn get_children(&self, path: &str, watch: bool) -> Result<Vec<String>, StoreError> {
            self.inner.get_children(path, watch).await
        }

        async fn create(
            &self,
            path: &str,
            value: &[u8],
            acl: Acl,
            mode: CreateMode,
        ) -> Result<(), StoreError> {
            tokio::task::yield_now().await;
            self.log
                .lock()
                .unwrap()
                .push((self.inner.id(), path.to_owned()));
            self.inner.create(path, value, acl, mode).await
        }
    }

    #[tokio::test]
    async fn test_concurrent_registrants_share_ancestors() {
        let store = MemoryStore::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let yielding = |session: MemorySession| {
            Coordinator::new(Yielding {
                inner: session,
                log: Arc::clone(&log),
            })
        };
        let first = yielding(store.session());
        let second = yielding(store.session());

        let (a, b) = tokio::join!(
            first.register_ephemeral("/qconf/svc/10.0.0.1:80", b"0"),
            second.register_ephemeral("/qconf/svc/10.0.0.2:80", b"0"),
        );
        a.unwrap();
        b.unwrap();

        // both registrants raced on the shared ancestor before moving on
        let log = log.lock().unwrap().clone();
        assert_eq!(log.len(), 6);
        assert_eq!(log[0].1, "/qconf");
        assert_eq!(log[1].1, "/qconf");
        assert_ne!(log[0].0, log[1].0);
        assert_eq!(store.calls(Operation::Create), 6);

        let reader = Coordinator::new(store.session());
        assert_eq!(
            reader.get_children("/qconf/svc").await.unwrap(),
            vec!["10.0.0.1:80", "10.0.0.2:80"]
        );
        assert!(store.is_ephemeral("/qconf/svc/10.0.0.1:80"));
        assert!(store.is_ephemeral("/qconf/svc/10.0.0.2:80"));
    }
}
