//! Node directory abstraction

use super::types::{Node, NodeStatus};
use crate::Result;

/// Read access to the set of managed nodes, plus the status write-back used
/// by the health monitor
///
/// Implementations must return fresh data on every call; the engine re-reads
/// the directory at the start of each cluster operation and never caches it.
pub trait NodeDirectory: Send + Sync {
    /// Every registered node, regardless of status
    ///
    /// # Errors
    ///
    /// Returns error if the backing store cannot be read
    fn list_all(&self) -> Result<Vec<Node>>;

    /// Nodes eligible for default cluster operations (`status != offline`)
    ///
    /// # Errors
    ///
    /// Returns error if the backing store cannot be read
    fn list_active(&self) -> Result<Vec<Node>> {
        Ok(self
            .list_all()?
            .into_iter()
            .filter(|n| n.status.is_active())
            .collect())
    }

    /// Look up a node by its opaque id
    ///
    /// # Errors
    ///
    /// Returns error if the backing store cannot be read
    fn get_by_id(&self, id: &str) -> Result<Option<Node>>;

    /// Look up a node by its unique logical name
    ///
    /// # Errors
    ///
    /// Returns error if the backing store cannot be read
    fn get_by_name(&self, name: &str) -> Result<Option<Node>>;

    /// Record the outcome of a health probe
    ///
    /// # Errors
    ///
    /// Returns error if the node does not exist or the store cannot be written
    fn set_status(&self, id: &str, status: NodeStatus) -> Result<()>;
}
