//! Cluster operations: resolve targets, fan out, aggregate, audit

use std::sync::Arc;

use secrecy::ExposeSecret;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use super::aggregate::{AggregateResult, aggregate};
use super::audit::{AuditContext, AuditSink, emit};
use super::dispatch::Dispatcher;
use super::group::{SyncGroupCreator, generate_private_key};
use super::reconcile::{Mutation, NameReconciler, Reconciled};
use super::target::{TargetRequest, resolve_targets};
use crate::config::DispatchConfig;
use crate::device::{Attributes, DeviceClient, DeviceError, DeviceRequest, ResourceKind};
use crate::nodes::{Node, NodeDirectory};
use crate::{Error, Result};

/// Orchestrates operations across the managed cluster
///
/// Every call re-reads the directory, so node additions and status changes
/// take effect on the next operation. Mutating calls write exactly one audit
/// entry; listing is not audited. Per-node failures are returned as data in
/// the [`AggregateResult`]; only caller mistakes are errors.
#[derive(Clone)]
pub struct ClusterEngine {
    directory: Arc<dyn NodeDirectory>,
    client: Arc<dyn DeviceClient>,
    audit: Arc<dyn AuditSink>,
    dispatcher: Dispatcher,
    timeouts: DispatchConfig,
}

impl ClusterEngine {
    #[must_use]
    pub fn new(
        directory: Arc<dyn NodeDirectory>,
        client: Arc<dyn DeviceClient>,
        audit: Arc<dyn AuditSink>,
        timeouts: DispatchConfig,
    ) -> Self {
        Self {
            directory,
            client,
            audit,
            dispatcher: Dispatcher::with_shutdown(CancellationToken::new()),
            timeouts,
        }
    }

    /// Resolve a target request to a non-empty node list
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShuttingDown`] after [`Self::shutdown`],
    /// [`Error::NoTargets`] if nothing matches, or [`Error::UnknownNode`] if
    /// an explicitly named node does not exist
    pub fn resolve(&self, target: &TargetRequest) -> Result<Vec<Node>> {
        if self.dispatcher.is_shut_down() {
            return Err(Error::ShuttingDown);
        }
        let nodes = resolve_targets(self.directory.as_ref(), target)?;
        if nodes.is_empty() {
            tracing::info!(?target, "no target nodes, nothing dispatched");
            return Err(Error::NoTargets);
        }
        Ok(nodes)
    }

    /// List every entry of `kind` on each targeted node
    ///
    /// # Errors
    ///
    /// Returns error if target resolution fails
    pub async fn list(
        &self,
        kind: ResourceKind,
        target: &TargetRequest,
    ) -> Result<AggregateResult<Vec<Value>>> {
        let nodes = self.resolve(target)?;
        let client = Arc::clone(&self.client);

        let results = self
            .dispatcher
            .dispatch(nodes, self.timeouts.read_timeout, move |node| {
                let client = Arc::clone(&client);
                async move {
                    match client.execute(&node, DeviceRequest::List(kind)).await? {
                        Value::Array(entries) => Ok(entries),
                        _ => Err(DeviceError::Malformed("listing is not an array".to_string())),
                    }
                }
            })
            .await?;

        let result = aggregate(&results);
        tracing::debug!(%kind, verdict = %result.verdict, "listed resources");
        Ok(result)
    }

    /// Create an entry on each targeted node
    ///
    /// Each node generates its own local id. Use
    /// [`Self::create_synchronized_tunnel`] when the entry must carry shared
    /// secret material.
    ///
    /// # Errors
    ///
    /// Returns error if target resolution fails
    pub async fn create(
        &self,
        kind: ResourceKind,
        attributes: Attributes,
        target: &TargetRequest,
        actor: Option<&str>,
    ) -> Result<AggregateResult<Value>> {
        let resource_id = attributes
            .get(kind.name_field())
            .and_then(Value::as_str)
            .unwrap_or("-")
            .to_string();
        let context = AuditContext::new(&format!("{kind}.create"), kind.as_str(), &resource_id, actor);

        let nodes = self.resolve(target)?;
        let client = Arc::clone(&self.client);
        let attributes = Arc::new(attributes);

        let results = self
            .dispatcher
            .dispatch(nodes, self.timeouts.write_timeout, move |node| {
                let client = Arc::clone(&client);
                let attributes = Arc::clone(&attributes);
                async move {
                    let request = DeviceRequest::Create {
                        kind,
                        attributes: attributes.as_ref().clone(),
                    };
                    client.execute(&node, request).await
                }
            })
            .await?;

        Ok(self.finish(&context, aggregate(&results)))
    }

    /// Delete the entry named `name` wherever it exists
    ///
    /// Nodes without the entry count as successful no-ops.
    ///
    /// # Errors
    ///
    /// Returns error if target resolution fails
    pub async fn delete_by_name(
        &self,
        kind: ResourceKind,
        name: &str,
        target: &TargetRequest,
        actor: Option<&str>,
    ) -> Result<AggregateResult<Reconciled>> {
        self.reconcile(kind, name, Mutation::Delete, target, actor)
            .await
    }

    /// Update the entry named `name` wherever it exists
    ///
    /// # Errors
    ///
    /// Returns error if target resolution fails
    pub async fn update_by_name(
        &self,
        kind: ResourceKind,
        name: &str,
        attributes: Attributes,
        target: &TargetRequest,
        actor: Option<&str>,
    ) -> Result<AggregateResult<Reconciled>> {
        self.reconcile(kind, name, Mutation::Update(attributes), target, actor)
            .await
    }

    async fn reconcile(
        &self,
        kind: ResourceKind,
        name: &str,
        mutation: Mutation,
        target: &TargetRequest,
        actor: Option<&str>,
    ) -> Result<AggregateResult<Reconciled>> {
        let context = AuditContext::new(
            &format!("{kind}.{}", mutation.verb()),
            kind.as_str(),
            name,
            actor,
        );

        let nodes = self.resolve(target)?;
        let reconciler = NameReconciler::new(self.dispatcher.clone(), Arc::clone(&self.client));
        let results = reconciler
            .apply(nodes, kind, name, mutation, self.timeouts.write_timeout)
            .await?;

        let result = aggregate(&results);
        let applied = result.successes.iter().filter(|(_, r)| r.was_applied()).count();
        let context = context
            .with_detail("applied", json!(applied))
            .with_detail("not_found", json!(result.successes.len() - applied));

        Ok(self.finish(&context, result))
    }

    /// Create a WireGuard interface sharing one private key across all targets
    ///
    /// The key is generated once and applied through a single group call
    /// authenticated as the first target. Nodes missing from the group
    /// response do not appear in the result.
    ///
    /// # Errors
    ///
    /// Returns error if target resolution fails
    pub async fn create_synchronized_tunnel(
        &self,
        name: &str,
        listen_port: u16,
        target: &TargetRequest,
        actor: Option<&str>,
    ) -> Result<AggregateResult<Value>> {
        let kind = ResourceKind::WireguardInterface;
        let context = AuditContext::new("wireguard_interface.create_synchronized", kind.as_str(), name, actor)
            .with_detail("listen_port", json!(listen_port));

        let nodes = self.resolve(target)?;
        let private_key = generate_private_key();

        let mut attributes = Attributes::new();
        attributes.insert("name".to_string(), json!(name));
        attributes.insert("listen-port".to_string(), json!(listen_port.to_string()));
        attributes.insert(
            "private-key".to_string(),
            json!(private_key.expose_secret()),
        );

        let results = SyncGroupCreator::new(Arc::clone(&self.client))
            .create(&nodes, kind, attributes)
            .await?;

        Ok(self.finish(&context, aggregate(&results)))
    }

    /// Cancel every in-flight dispatch; unfinished nodes report timeouts and
    /// later operations fail with [`Error::ShuttingDown`]
    pub fn shutdown(&self) {
        self.dispatcher.shutdown();
    }

    /// Log the verdict and write the single audit entry for the operation
    fn finish<T>(&self, context: &AuditContext, result: AggregateResult<T>) -> AggregateResult<T> {
        if result.all_succeeded() {
            tracing::info!(
                action = %context.action,
                resource = %context.resource_id,
                nodes = result.total(),
                "cluster operation succeeded"
            );
        } else {
            tracing::warn!(
                action = %context.action,
                resource = %context.resource_id,
                verdict = %result.verdict,
                succeeded = result.successes.len(),
                failed = result.failures.len(),
                "cluster operation incomplete"
            );
        }

        emit(self.audit.as_ref(), context, &result);
        result
    }
}

impl std::fmt::Debug for ClusterEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterEngine")
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}
