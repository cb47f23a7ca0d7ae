//! Device clients
//!
//! A device client turns a logical request into a call against one node's
//! configuration API. The orchestration engine only sees the
//! [`DeviceClient`] trait; transport details stay in the implementations.

mod http;
pub mod types;

use async_trait::async_trait;
use serde_json::Value;

pub use http::HttpDeviceClient;
pub use types::{
    Attributes, DeviceError, DeviceRequest, GroupCreateRequest, GroupCreateResponse,
    GroupMemberResult, LOCAL_ID_FIELD, ResourceKind,
};

use crate::nodes::Node;

/// Executes configuration calls against individual nodes
///
/// Implementations must be safe to call concurrently from many dispatch
/// units at once and must not share mutable per-node state.
#[async_trait]
pub trait DeviceClient: Send + Sync {
    /// Run one request against one node
    async fn execute(&self, node: &Node, request: DeviceRequest) -> Result<Value, DeviceError>;

    /// Apply one creation payload to every address in the request
    ///
    /// The implementation owns concurrency and timeouts for the member calls.
    /// The response holds one entry per address that produced a result.
    async fn create_group(
        &self,
        request: GroupCreateRequest,
    ) -> Result<GroupCreateResponse, DeviceError>;

    /// Check that the node answers on its configuration API
    async fn probe(&self, node: &Node) -> Result<Value, DeviceError> {
        self.execute(node, DeviceRequest::Probe).await
    }
}
