//! Request, response and error types for device configuration APIs

use std::fmt;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Attribute map sent with create and update calls
pub type Attributes = serde_json::Map<String, Value>;

/// Field holding the node-local identifier of a configuration entry
pub const LOCAL_ID_FIELD: &str = ".id";

/// Kinds of configuration entries managed across the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    WireguardInterface,
    WireguardPeer,
    IpAddress,
    DnsRecord,
    User,
}

impl ResourceKind {
    /// Path of the collection below the API root
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::WireguardInterface => "interface/wireguard",
            Self::WireguardPeer => "interface/wireguard/peers",
            Self::IpAddress => "ip/address",
            Self::DnsRecord => "ip/dns/static",
            Self::User => "user",
        }
    }

    /// Field that carries the logical name shared across nodes
    #[must_use]
    pub const fn name_field(self) -> &'static str {
        match self {
            Self::WireguardPeer => "public-key",
            Self::IpAddress => "address",
            Self::WireguardInterface | Self::DnsRecord | Self::User => "name",
        }
    }

    /// Resource type recorded in audit entries
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WireguardInterface => "wireguard_interface",
            Self::WireguardPeer => "wireguard_peer",
            Self::IpAddress => "ip_address",
            Self::DnsRecord => "dns_record",
            Self::User => "user",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single call against one node's configuration API
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceRequest {
    /// List every entry of a kind
    List(ResourceKind),
    /// Create an entry
    Create {
        kind: ResourceKind,
        attributes: Attributes,
    },
    /// Update an entry addressed by its node-local id
    Update {
        kind: ResourceKind,
        id: String,
        attributes: Attributes,
    },
    /// Delete an entry addressed by its node-local id
    Delete { kind: ResourceKind, id: String },
    /// Lightweight reachability check
    Probe,
}

/// Error reported by a device client for one node
///
/// The orchestration engine treats the value as opaque and passes it
/// through to the aggregate result unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// Connection, TLS or request-level failure
    #[error("transport error: {0}")]
    Transport(String),

    /// The device answered with a non-success status
    #[error("device returned {status}: {message}")]
    Status { status: u16, message: String },

    /// The device reported that the addressed entry does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// The response could not be interpreted
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The unit executing the call failed locally
    #[error("internal error: {0}")]
    Internal(String),
}

/// One creation payload applied to many addresses with shared credentials
#[derive(Debug, Clone)]
pub struct GroupCreateRequest {
    pub kind: ResourceKind,
    /// Target addresses, `host:port`
    pub addresses: Vec<String>,
    pub username: String,
    pub password: SecretString,
    pub attributes: Attributes,
}

/// Per-address result of a group creation call
#[derive(Debug, Clone, PartialEq)]
pub struct GroupMemberResult {
    pub address: String,
    pub outcome: Result<Value, DeviceError>,
}

/// Response of a group creation call, one entry per address that answered
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupCreateResponse {
    pub results: Vec<GroupMemberResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peers_are_named_by_public_key() {
        assert_eq!(ResourceKind::WireguardPeer.name_field(), "public-key");
        assert_eq!(ResourceKind::DnsRecord.name_field(), "name");
    }

    #[test]
    fn peer_path_nests_under_interface() {
        assert!(
            ResourceKind::WireguardPeer
                .path()
                .starts_with(ResourceKind::WireguardInterface.path())
        );
    }

    #[test]
    fn device_error_display() {
        let err = DeviceError::Status {
            status: 400,
            message: "failure: already have such entry".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "device returned 400: failure: already have such entry"
        );
    }
}
