//! Creation of resources that must carry identical secret material on
//! every node
//!
//! A failover tunnel only works if every replica holds the same private
//! key. Fanning out a plain create would let each node generate its own, so
//! the key is generated here once and one group call applies the same
//! payload to every address. The group call owns its own concurrency and
//! timeouts; this module only maps the per-address results back to nodes.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::RngCore;
use secrecy::SecretString;
use serde_json::Value;

use super::outcome::{Outcome, PerNodeResult};
use crate::device::{Attributes, DeviceClient, GroupCreateRequest, GroupCreateResponse, ResourceKind};
use crate::nodes::Node;
use crate::{Error, Result};

/// Issues one multi-target creation call and maps results to nodes
#[derive(Clone)]
pub struct SyncGroupCreator {
    client: Arc<dyn DeviceClient>,
}

impl SyncGroupCreator {
    #[must_use]
    pub fn new(client: Arc<dyn DeviceClient>) -> Self {
        Self { client }
    }

    /// Create the same entry on every node in one group call
    ///
    /// The first node is the primary: its credentials authenticate the group
    /// call. Addresses missing from the response produce no entry and
    /// addresses that match no node are dropped. If the group call fails as
    /// a whole, every node is reported with that error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoTargets`] if `nodes` is empty
    pub async fn create(
        &self,
        nodes: &[Node],
        kind: ResourceKind,
        attributes: Attributes,
    ) -> Result<Vec<PerNodeResult<Value>>> {
        let Some(primary) = nodes.first() else {
            return Err(Error::NoTargets);
        };

        let mut addresses: Vec<String> = Vec::with_capacity(nodes.len());
        for node in nodes {
            let address = node.address();
            if !addresses.contains(&address) {
                addresses.push(address);
            }
        }

        tracing::info!(
            %kind,
            primary = %primary.name,
            targets = addresses.len(),
            "issuing synchronized group creation"
        );

        let request = GroupCreateRequest {
            kind,
            addresses,
            username: primary.username.clone(),
            password: primary.password.clone(),
            attributes,
        };

        match self.client.create_group(request).await {
            Ok(response) => Ok(map_group_response(nodes, response)),
            Err(e) => {
                tracing::warn!(%kind, error = %e, "group creation call failed");
                Ok(nodes
                    .iter()
                    .map(|n| PerNodeResult::new(n.clone(), Outcome::Err(e.clone())))
                    .collect())
            }
        }
    }
}

impl std::fmt::Debug for SyncGroupCreator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncGroupCreator").finish_non_exhaustive()
    }
}

/// Map each per-address result to the node with that address
///
/// A response address matches a node on `host:port` or on the bare host.
/// Unknown addresses and repeated answers for an already mapped node are
/// dropped, so every node appears at most once.
#[must_use]
pub fn map_group_response(nodes: &[Node], response: GroupCreateResponse) -> Vec<PerNodeResult<Value>> {
    let mut mapped: Vec<PerNodeResult<Value>> = Vec::with_capacity(response.results.len());

    for member in response.results {
        let Some(node) = nodes
            .iter()
            .find(|n| answers_to(n, &member.address))
        else {
            tracing::warn!(address = %member.address, "group result for unknown address dropped");
            continue;
        };

        if mapped.iter().any(|r| r.node.id == node.id) {
            tracing::warn!(
                node = %node.name,
                address = %member.address,
                "duplicate group result dropped"
            );
            continue;
        }

        mapped.push(PerNodeResult::new(node.clone(), Outcome::from(member.outcome)));
    }

    mapped
}

/// Whether a group response address refers to `node`, as `host:port` or bare host
fn answers_to(node: &Node, address: &str) -> bool {
    fn unbracketed(host: &str) -> &str {
        host.trim_start_matches('[').trim_end_matches(']')
    }
    node.address() == address || unbracketed(&node.host) == unbracketed(address)
}

/// Generate a WireGuard private key: 32 random bytes, clamped, base64
#[must_use]
pub fn generate_private_key() -> SecretString {
    let mut key = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut key);
    key[0] &= 248;
    key[31] &= 127;
    key[31] |= 64;
    SecretString::from(BASE64.encode(key))
}
