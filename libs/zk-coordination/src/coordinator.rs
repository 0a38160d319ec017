//! Watch-arming reads and child status aggregation.
//!
//! Every read here asks the store to arm a one-shot watch. Watches fire once,
//! so a caller that wants to keep observing a path re-reads it after each
//! notification, which arms the next one.

use tracing::{debug, error};

use crate::config::CoordinationConfig;
use crate::error::{CoordinationError, CoordinationResult};
use crate::handle::{CoordinationHandle, MAX_VALUE_SIZE};
use crate::path;
use crate::retry::RetryPolicy;
use crate::status::ServiceStatus;

/// Sorted child names with the status of each, positionally aligned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChildrenStatus {
    pub names: Vec<String>,
    pub statuses: Vec<ServiceStatus>,
}

impl ChildrenStatus {
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Iterate `(name, status)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, ServiceStatus)> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.statuses.iter().copied())
    }
}

/// Policy layer over a [`CoordinationHandle`].
///
/// Cheap to clone when the handle is. No locking is added: concurrent
/// operations against the same path see the store's own interleaving.
#[derive(Debug, Clone)]
pub struct Coordinator<H> {
    pub(crate) handle: H,
    pub(crate) retry_policy: RetryPolicy,
    pub(crate) max_value_size: usize,
}

impl<H: CoordinationHandle> Coordinator<H> {
    /// Create a coordinator with the default retry policy.
    pub fn new(handle: H) -> Self {
        Self {
            handle,
            retry_policy: RetryPolicy::default(),
            max_value_size: MAX_VALUE_SIZE,
        }
    }

    /// Create a coordinator with a custom retry policy.
    pub fn with_retry_policy(handle: H, retry_policy: RetryPolicy) -> Self {
        Self {
            handle,
            retry_policy,
            max_value_size: MAX_VALUE_SIZE,
        }
    }

    /// Create a coordinator from parsed configuration. The value limit never
    /// exceeds what the store accepts.
    pub fn from_config(handle: H, config: &CoordinationConfig) -> Self {
        Self {
            handle,
            retry_policy: config.retry_policy(),
            max_value_size: config.max_value_size.min(MAX_VALUE_SIZE),
        }
    }

    pub fn handle(&self) -> &H {
        &self.handle
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Read the value at `path` and arm a data watch on it.
    ///
    /// A node without data reads as an empty vector.
    pub async fn get_node(&self, path: &str) -> CoordinationResult<Vec<u8>> {
        path::validate(path)?;
        let value = self
            .retry_policy
            .run("get_data", path, || self.handle.get_data(path, true))
            .await?
            .unwrap_or_default();
        debug!(path, len = value.len(), "read node");
        Ok(value)
    }

    /// List the children of `path`, sorted byte-wise, and arm a child watch
    /// on `path`.
    pub async fn get_children(&self, path: &str) -> CoordinationResult<Vec<String>> {
        path::validate(path)?;
        let mut children = self
            .retry_policy
            .run("get_children", path, || self.handle.get_children(path, true))
            .await?;
        children.sort();
        debug!(path, count = children.len(), "listed children");
        Ok(children)
    }

    /// Read the status flag stored at `path`.
    pub async fn get_service_status(&self, path: &str) -> CoordinationResult<ServiceStatus> {
        let raw = self.get_node(path).await.inspect_err(|err| {
            error!(path, error = %err, "failed to get service status");
        })?;
        ServiceStatus::decode(path, &raw).inspect_err(|err| {
            error!(path, error = %err, fatal = true, "invalid service status");
        })
    }

    /// List the children of `path` together with each child's status.
    ///
    /// Listing errors are returned as-is. The first child whose status cannot
    /// be read or decoded aborts the call; no partial result is produced.
    pub async fn get_children_with_status(&self, path: &str) -> CoordinationResult<ChildrenStatus> {
        let names = self.get_children(path).await?;
        let mut statuses = Vec::with_capacity(names.len());
        for name in &names {
            let child = path::join(path, name);
            let status = self.get_service_status(&child).await.map_err(|source| {
                CoordinationError::ChildStatus {
                    path: child.clone(),
                    source: Box::new(source),
                }
            })?;
            statuses.push(status);
        }
        Ok(ChildrenStatus { names, statuses })
    }
}
