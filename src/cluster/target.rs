//! Resolution of an addressing request into a concrete node list

use crate::nodes::{Node, NodeDirectory};
use crate::{Error, Result};

/// How a cluster operation addresses its nodes
///
/// Precedence: `cluster_wide` wins over `nodes`; with neither set the request
/// targets every active node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetRequest {
    /// Address every active node, evaluated when the operation runs
    pub cluster_wide: bool,

    /// Explicit node ids or names
    pub nodes: Vec<String>,
}

impl TargetRequest {
    /// Every active node, read from the directory at call time
    #[must_use]
    pub fn cluster_wide() -> Self {
        Self {
            cluster_wide: true,
            nodes: Vec::new(),
        }
    }

    /// An explicit subset, each entry an id or a name
    #[must_use]
    pub fn nodes<I, S>(nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cluster_wide: false,
            nodes: nodes.into_iter().map(Into::into).collect(),
        }
    }
}

/// Turn a request into the node list for one operation
///
/// An identifier is looked up by id first, then by name. Repeated
/// identifiers collapse to one node. Explicitly named nodes are included
/// whatever their status. The returned list may be empty; callers decide
/// how to surface that.
///
/// # Errors
///
/// Returns [`Error::UnknownNode`] if any named node is missing, failing the
/// whole request, or a directory error if the lookup itself fails
pub fn resolve_targets(directory: &dyn NodeDirectory, request: &TargetRequest) -> Result<Vec<Node>> {
    if request.cluster_wide || request.nodes.is_empty() {
        return directory.list_active();
    }

    let mut resolved: Vec<Node> = Vec::with_capacity(request.nodes.len());
    for ident in &request.nodes {
        let node = match directory.get_by_id(ident)? {
            Some(node) => node,
            None => directory
                .get_by_name(ident)?
                .ok_or_else(|| Error::UnknownNode(ident.clone()))?,
        };

        if resolved.iter().all(|n| n.id != node.id) {
            resolved.push(node);
        }
    }

    Ok(resolved)
}
