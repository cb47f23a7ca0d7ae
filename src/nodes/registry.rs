//! In-memory node registry
//!
//! Useful for embedding the engine without a database and for tests. The
//! persistent directory lives in [`crate::db::NodeRepo`].

use std::sync::RwLock;

use uuid::Uuid;

use super::directory::NodeDirectory;
use super::types::{NewNode, Node, NodeStatus};
use crate::{Error, Result};

/// Registry of nodes held in process memory, in registration order
#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: RwLock<Vec<Node>>,
}

impl NodeRegistry {
    /// Create a new empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node and return its assigned id
    ///
    /// # Errors
    ///
    /// Returns error if the registration is invalid or a node with the same
    /// name is already registered
    pub fn register(&self, registration: NewNode) -> Result<String> {
        registration.validate()?;
        let mut nodes = self.write()?;
        if nodes.iter().any(|n| n.name == registration.name) {
            return Err(Error::NodeExists(registration.name));
        }

        let id = Uuid::new_v4().to_string();
        nodes.push(Node {
            id: id.clone(),
            name: registration.name,
            host: registration.host,
            port: registration.port,
            username: registration.username,
            password: registration.password,
            status: NodeStatus::Unknown,
            last_seen: None,
        });
        Ok(id)
    }

    /// Remove a node
    ///
    /// # Errors
    ///
    /// Returns error if the registry lock is poisoned
    pub fn unregister(&self, id: &str) -> Result<Option<Node>> {
        let mut nodes = self.write()?;
        Ok(nodes
            .iter()
            .position(|n| n.id == id)
            .map(|idx| nodes.remove(idx)))
    }

    /// Number of registered nodes
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.read().map_or(0, |n| n.len())
    }

    /// Whether the registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Vec<Node>>> {
        self.nodes
            .read()
            .map_err(|_| Error::Database("node registry lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Vec<Node>>> {
        self.nodes
            .write()
            .map_err(|_| Error::Database("node registry lock poisoned".to_string()))
    }
}

impl NodeDirectory for NodeRegistry {
    fn list_all(&self) -> Result<Vec<Node>> {
        Ok(self.read()?.clone())
    }

    fn get_by_id(&self, id: &str) -> Result<Option<Node>> {
        Ok(self.read()?.iter().find(|n| n.id == id).cloned())
    }

    fn get_by_name(&self, name: &str) -> Result<Option<Node>> {
        Ok(self.read()?.iter().find(|n| n.name == name).cloned())
    }

    fn set_status(&self, id: &str, status: NodeStatus) -> Result<()> {
        let mut nodes = self.write()?;
        let node = nodes
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| Error::NotFound(format!("node '{id}'")))?;
        node.status = status;
        if status == NodeStatus::Online {
            node.last_seen = Some(chrono::Utc::now());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    fn sample(name: &str) -> NewNode {
        NewNode {
            name: name.to_string(),
            host: "10.0.0.1".to_string(),
            port: 443,
            username: "admin".to_string(),
            password: SecretString::from("secret".to_string()),
        }
    }

    #[test]
    fn register_and_get() {
        let registry = NodeRegistry::new();
        let id = registry.register(sample("edge-1")).unwrap();

        let node = registry.get_by_id(&id).unwrap().unwrap();
        assert_eq!(node.name, "edge-1");
        assert_eq!(node.status, NodeStatus::Unknown);
        assert_eq!(registry.get_by_name("edge-1").unwrap().unwrap().id, id);
    }

    #[test]
    fn duplicate_name_rejected() {
        let registry = NodeRegistry::new();
        registry.register(sample("edge-1")).unwrap();
        assert!(matches!(
            registry.register(sample("edge-1")),
            Err(Error::NodeExists(_))
        ));
    }

    #[test]
    fn unregister_removes_node() {
        let registry = NodeRegistry::new();
        let id = registry.register(sample("edge-1")).unwrap();
        assert_eq!(registry.len(), 1);

        assert!(registry.unregister(&id).unwrap().is_some());
        assert!(registry.is_empty());
    }

    #[test]
    fn offline_nodes_are_not_active() {
        let registry = NodeRegistry::new();
        let a = registry.register(sample("edge-1")).unwrap();
        let b = registry.register(sample("edge-2")).unwrap();
        registry.set_status(&a, NodeStatus::Online).unwrap();
        registry.set_status(&b, NodeStatus::Offline).unwrap();

        let active = registry.list_active().unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, a);
        assert!(active[0].last_seen.is_some());
        assert_eq!(registry.list_all().unwrap().len(), 2);
    }

    #[test]
    fn set_status_unknown_node() {
        let registry = NodeRegistry::new();
        assert!(registry.set_status("missing", NodeStatus::Online).is_err());
    }
}
