//! By-name operations: list, match, then act, independently per node
//!
//! Each node stores a logical resource under its own local id. To mutate
//! by name, every node is listed, the entry whose name field matches is
//! located, and the mutation is issued with that node's id. A node that
//! does not have the resource reports [`Reconciled::NotFound`], which is a
//! success: in a loosely replicated cluster a node may simply not have it
//! yet. A failed listing is a real failure and is never reported as
//! not-found.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use super::dispatch::Dispatcher;
use super::outcome::PerNodeResult;
use crate::Result;
use crate::device::{
    Attributes, DeviceClient, DeviceError, DeviceRequest, LOCAL_ID_FIELD, ResourceKind,
};
use crate::nodes::Node;

/// Change applied to the matched entry
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Delete,
    Update(Attributes),
}

impl Mutation {
    #[must_use]
    pub const fn verb(&self) -> &'static str {
        match self {
            Self::Delete => "delete",
            Self::Update(_) => "update",
        }
    }
}

/// Per-node result of a by-name operation
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciled {
    /// The entry existed and the mutation returned `response`
    Applied { local_id: String, response: Value },
    /// No entry with that name on this node; nothing was done
    NotFound,
}

impl Reconciled {
    #[must_use]
    pub const fn was_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// Runs name-addressed mutations on top of the [`Dispatcher`]
///
/// Both phases run inside the same dispatch unit, so one deadline covers
/// listing and mutation together.
#[derive(Clone)]
pub struct NameReconciler {
    dispatcher: Dispatcher,
    client: Arc<dyn DeviceClient>,
}

impl NameReconciler {
    #[must_use]
    pub fn new(dispatcher: Dispatcher, client: Arc<dyn DeviceClient>) -> Self {
        Self { dispatcher, client }
    }

    /// Apply `mutation` to the entry named `name` on every node
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NoTargets`] if `nodes` is empty
    pub async fn apply(
        &self,
        nodes: Vec<Node>,
        kind: ResourceKind,
        name: &str,
        mutation: Mutation,
        timeout: Duration,
    ) -> Result<Vec<PerNodeResult<Reconciled>>> {
        let name = Arc::<str>::from(name);
        let mutation = Arc::new(mutation);

        self.dispatcher
            .dispatch(nodes, timeout, |node| {
                let client = Arc::clone(&self.client);
                let name = Arc::clone(&name);
                let mutation = Arc::clone(&mutation);
                async move { reconcile_node(client.as_ref(), &node, kind, &name, &mutation).await }
            })
            .await
    }
}

impl std::fmt::Debug for NameReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NameReconciler")
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

async fn reconcile_node(
    client: &dyn DeviceClient,
    node: &Node,
    kind: ResourceKind,
    name: &str,
    mutation: &Mutation,
) -> std::result::Result<Reconciled, DeviceError> {
    let listing = client.execute(node, DeviceRequest::List(kind)).await?;

    let Some(local_id) = find_local_id(&listing, kind.name_field(), name)? else {
        tracing::debug!(node = %node.name, %kind, name, "not present on node, nothing to do");
        return Ok(Reconciled::NotFound);
    };

    let request = match mutation {
        Mutation::Delete => DeviceRequest::Delete {
            kind,
            id: local_id.clone(),
        },
        Mutation::Update(attributes) => DeviceRequest::Update {
            kind,
            id: local_id.clone(),
            attributes: attributes.clone(),
        },
    };

    tracing::debug!(
        node = %node.name,
        %kind,
        name,
        local_id = %local_id,
        action = mutation.verb(),
        "applying by-name mutation"
    );

    let response = client.execute(node, request).await?;
    Ok(Reconciled::Applied { local_id, response })
}

/// Find the node-local id of the entry whose `name_field` equals `name`
///
/// # Errors
///
/// Returns [`DeviceError::Malformed`] if the listing is not an array or the
/// matching entry has no local id
pub fn find_local_id(
    listing: &Value,
    name_field: &str,
    name: &str,
) -> std::result::Result<Option<String>, DeviceError> {
    let entries = listing
        .as_array()
        .ok_or_else(|| DeviceError::Malformed("listing is not an array".to_string()))?;

    let Some(entry) = entries
        .iter()
        .find(|e| e.get(name_field).and_then(Value::as_str) == Some(name))
    else {
        return Ok(None);
    };

    entry
        .get(LOCAL_ID_FIELD)
        .and_then(Value::as_str)
        .map(|id| Some(id.to_string()))
        .ok_or_else(|| {
            DeviceError::Malformed(format!("entry '{name}' has no {LOCAL_ID_FIELD} field"))
        })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn finds_matching_entry() {
        let listing = json!([
            {".id": "*1", "name": "other.example.com"},
            {".id": "*2", "name": "example.com"},
        ]);
        assert_eq!(
            find_local_id(&listing, "name", "example.com").unwrap(),
            Some("*2".to_string())
        );
    }

    #[test]
    fn absent_name_is_none() {
        let listing = json!([{".id": "*1", "name": "other.example.com"}]);
        assert_eq!(find_local_id(&listing, "name", "example.com").unwrap(), None);
        assert_eq!(find_local_id(&json!([]), "name", "example.com").unwrap(), None);
    }

    #[test]
    fn matches_on_kind_specific_field() {
        let listing = json!([{".id": "*7", "public-key": "abc=", "name": "peer1"}]);
        assert_eq!(
            find_local_id(&listing, ResourceKind::WireguardPeer.name_field(), "abc=").unwrap(),
            Some("*7".to_string())
        );
    }

    #[test]
    fn non_array_listing_is_malformed() {
        assert!(matches!(
            find_local_id(&json!({"name": "example.com"}), "name", "example.com"),
            Err(DeviceError::Malformed(_))
        ));
    }

    #[test]
    fn match_without_id_is_malformed() {
        let listing = json!([{"name": "example.com"}]);
        assert!(matches!(
            find_local_id(&listing, "name", "example.com"),
            Err(DeviceError::Malformed(_))
        ));
    }
}
