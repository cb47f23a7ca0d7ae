//! Node types shared by the directory and the orchestration engine

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Reachability state recorded by the health monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Online,
    Offline,
    #[default]
    Unknown,
}

impl NodeStatus {
    /// Whether a node in this state takes part in default cluster operations
    #[must_use]
    pub const fn is_active(self) -> bool {
        !matches!(self, Self::Offline)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeStatus {
    type Err = std::convert::Infallible;

    /// Unrecognized values map to `Unknown`; the status column is free-form
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "online" => Self::Online,
            "offline" => Self::Offline,
            _ => Self::Unknown,
        })
    }
}

/// A managed device endpoint
///
/// Snapshots of this struct are handed to the engine; the directory owns
/// the lifecycle. The password is kept behind [`SecretString`] so it never
/// shows up in `Debug` output or logs.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: String,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub status: NodeStatus,
    pub last_seen: Option<DateTime<Utc>>,
}

impl Node {
    /// Address used to reach the node's configuration API, `host:port`
    ///
    /// IPv6 literals are bracketed: `[fd00::1]:443`.
    #[must_use]
    pub fn address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.host == other.host
            && self.port == other.port
            && self.username == other.username
            && self.password.expose_secret() == other.password.expose_secret()
            && self.status == other.status
            && self.last_seen == other.last_seen
    }
}

impl Eq for Node {}

/// Registration data for a node that does not exist yet
#[derive(Debug, Clone)]
pub struct NewNode {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
}

impl NewNode {
    /// Reject registrations that could never be dispatched to
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] naming the offending field
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidInput("node name is empty".to_string()));
        }
        if self.host.trim().is_empty() || self.host.contains(['/', ' ']) {
            return Err(Error::InvalidInput(format!("invalid host '{}'", self.host)));
        }
        if self.port == 0 {
            return Err(Error::InvalidInput("port must be non-zero".to_string()));
        }
        if self.username.is_empty() {
            return Err(Error::InvalidInput("username is empty".to_string()));
        }
        Ok(())
    }
}
