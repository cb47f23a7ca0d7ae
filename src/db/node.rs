//! Node repository, the persistent node directory

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row};
use secrecy::{ExposeSecret, SecretString};
use uuid::Uuid;

use super::DbPool;
use crate::nodes::{NewNode, Node, NodeDirectory, NodeStatus};
use crate::{Error, Result};

const NODE_COLUMNS: &str = "id, name, host, port, username, password, status, last_seen";

/// Node repository
#[derive(Clone)]
pub struct NodeRepo {
    pool: DbPool,
}

impl NodeRepo {
    /// Create a new node repository
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Register a new node
    ///
    /// # Errors
    ///
    /// Returns error if the registration is invalid, the name is taken or the
    /// database operation fails
    pub fn create(&self, node: &NewNode) -> Result<Node> {
        node.validate()?;
        if self.get_by_name(&node.name)?.is_some() {
            return Err(Error::NodeExists(node.name.clone()));
        }

        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO nodes (id, name, host, port, username, password, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            rusqlite::params![
                id,
                node.name,
                node.host,
                node.port,
                node.username,
                node.password.expose_secret(),
                NodeStatus::Unknown.as_str(),
                now,
            ],
        )?;

        tracing::info!(node = %node.name, host = %node.host, "registered node");

        Ok(Node {
            id,
            name: node.name.clone(),
            host: node.host.clone(),
            port: node.port,
            username: node.username.clone(),
            password: node.password.clone(),
            status: NodeStatus::Unknown,
            last_seen: None,
        })
    }

    /// Delete a node by id
    ///
    /// Returns whether a row was removed
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn delete(&self, id: &str) -> Result<bool> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let removed = conn.execute("DELETE FROM nodes WHERE id = ?1", [id])?;
        Ok(removed > 0)
    }

    fn query_one(&self, column: &str, value: &str) -> Result<Option<Node>> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let node = conn
            .query_row(
                &format!("SELECT {NODE_COLUMNS} FROM nodes WHERE {column} = ?1"),
                [value],
                row_to_node,
            )
            .optional()?;

        Ok(node)
    }
}

impl NodeDirectory for NodeRepo {
    fn list_all(&self) -> Result<Vec<Node>> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let mut stmt =
            conn.prepare(&format!("SELECT {NODE_COLUMNS} FROM nodes ORDER BY name"))?;

        let nodes = stmt
            .query_map([], row_to_node)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(nodes)
    }

    fn list_active(&self) -> Result<Vec<Node>> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {NODE_COLUMNS} FROM nodes WHERE status != 'offline' ORDER BY name"
        ))?;

        let nodes = stmt
            .query_map([], row_to_node)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(nodes)
    }

    fn get_by_id(&self, id: &str) -> Result<Option<Node>> {
        self.query_one("id", id)
    }

    fn get_by_name(&self, name: &str) -> Result<Option<Node>> {
        self.query_one("name", name)
    }

    fn set_status(&self, id: &str, status: NodeStatus) -> Result<()> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let now = Utc::now().to_rfc3339();
        let updated = if status == NodeStatus::Online {
            conn.execute(
                "UPDATE nodes SET status = ?1, last_seen = ?2, updated_at = ?2 WHERE id = ?3",
                rusqlite::params![status.as_str(), now, id],
            )?
        } else {
            conn.execute(
                "UPDATE nodes SET status = ?1, updated_at = ?2 WHERE id = ?3",
                rusqlite::params![status.as_str(), now, id],
            )?
        };

        if updated == 0 {
            return Err(Error::NotFound(format!("node '{id}'")));
        }
        Ok(())
    }
}

fn row_to_node(row: &Row<'_>) -> rusqlite::Result<Node> {
    Ok(Node {
        id: row.get(0)?,
        name: row.get(1)?,
        host: row.get(2)?,
        port: row.get(3)?,
        username: row.get(4)?,
        password: SecretString::from(row.get::<_, String>(5)?),
        status: row
            .get::<_, String>(6)?
            .parse()
            .unwrap_or(NodeStatus::Unknown),
        last_seen: row
            .get::<_, Option<String>>(7)?
            .as_deref()
            .map(parse_datetime),
    })
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory;

    fn new_node(name: &str, host: &str) -> NewNode {
        NewNode {
            name: name.to_string(),
            host: host.to_string(),
            port: 443,
            username: "admin".to_string(),
            password: SecretString::from("secret".to_string()),
        }
    }

    #[test]
    fn create_and_lookup() {
        let repo = NodeRepo::new(init_memory().unwrap());
        let created = repo.create(&new_node("edge-1", "10.0.0.1")).unwrap();

        let by_id = repo.get_by_id(&created.id).unwrap().unwrap();
        assert_eq!(by_id, created);
        assert_eq!(by_id.password.expose_secret(), "secret");

        let by_name = repo.get_by_name("edge-1").unwrap().unwrap();
        assert_eq!(by_name.id, created.id);
        assert!(repo.get_by_name("edge-9").unwrap().is_none());
    }

    #[test]
    fn duplicate_name_rejected() {
        let repo = NodeRepo::new(init_memory().unwrap());
        repo.create(&new_node("edge-1", "10.0.0.1")).unwrap();

        assert!(matches!(
            repo.create(&new_node("edge-1", "10.0.0.2")),
            Err(Error::NodeExists(_))
        ));
    }

    #[test]
    fn list_active_skips_offline() {
        let repo = NodeRepo::new(init_memory().unwrap());
        let a = repo.create(&new_node("edge-1", "10.0.0.1")).unwrap();
        let b = repo.create(&new_node("edge-2", "10.0.0.2")).unwrap();
        repo.create(&new_node("edge-3", "10.0.0.3")).unwrap();

        repo.set_status(&a.id, NodeStatus::Online).unwrap();
        repo.set_status(&b.id, NodeStatus::Offline).unwrap();

        let active: Vec<String> = repo
            .list_active()
            .unwrap()
            .into_iter()
            .map(|n| n.name)
            .collect();
        assert_eq!(active, vec!["edge-1", "edge-3"]);
        assert_eq!(repo.list_all().unwrap().len(), 3);

        let online = repo.get_by_id(&a.id).unwrap().unwrap();
        assert_eq!(online.status, NodeStatus::Online);
        assert!(online.last_seen.is_some());
    }

    #[test]
    fn set_status_unknown_node() {
        let repo = NodeRepo::new(init_memory().unwrap());
        assert!(matches!(
            repo.set_status("missing", NodeStatus::Online),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn delete_removes_node() {
        let repo = NodeRepo::new(init_memory().unwrap());
        let node = repo.create(&new_node("edge-1", "10.0.0.1")).unwrap();

        assert!(repo.delete(&node.id).unwrap());
        assert!(!repo.delete(&node.id).unwrap());
        assert!(repo.list_all().unwrap().is_empty());
    }
}
