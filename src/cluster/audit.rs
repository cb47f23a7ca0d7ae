//! Audit records for cluster operations
//!
//! One entry is written per cluster operation, after aggregation, never
//! per node.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use super::aggregate::{AggregateResult, Verdict};
use crate::Result;
use crate::device::Attributes;

/// A durable "who did what, to what, with what result" record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub actor_id: Option<String>,
    pub details: Attributes,
    pub success: bool,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    /// A successful entry with empty details, stamped now
    #[must_use]
    pub fn new(action: &str, resource_type: &str, resource_id: &str, actor_id: Option<&str>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            action: action.to_string(),
            resource_type: resource_type.to_string(),
            resource_id: resource_id.to_string(),
            actor_id: actor_id.map(str::to_string),
            details: Attributes::new(),
            success: true,
            created_at: Utc::now(),
        }
    }
}

/// Destination for audit entries
pub trait AuditSink: Send + Sync {
    /// Persist one entry
    ///
    /// # Errors
    ///
    /// Returns error if the entry cannot be stored
    fn record(&self, entry: &AuditEntry) -> Result<()>;
}

/// What a cluster operation was, for the audit log
#[derive(Debug, Clone, PartialEq)]
pub struct AuditContext {
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub actor_id: Option<String>,
    /// Extra caller-supplied details merged into the entry
    pub details: Attributes,
}

impl AuditContext {
    #[must_use]
    pub fn new(action: &str, resource_type: &str, resource_id: &str, actor_id: Option<&str>) -> Self {
        Self {
            action: action.to_string(),
            resource_type: resource_type.to_string(),
            resource_id: resource_id.to_string(),
            actor_id: actor_id.map(str::to_string),
            details: Attributes::new(),
        }
    }

    /// Attach an extra detail
    #[must_use]
    pub fn with_detail(mut self, key: &str, value: Value) -> Self {
        self.details.insert(key.to_string(), value);
        self
    }
}

/// Build the audit entry for an aggregated operation
///
/// Returns `None` for [`Verdict::NoTargets`]: nothing was attempted, so
/// there is nothing to record.
#[must_use]
pub fn audit_entry<T>(context: &AuditContext, result: &AggregateResult<T>) -> Option<AuditEntry> {
    if result.verdict == Verdict::NoTargets {
        return None;
    }

    let mut entry = AuditEntry::new(
        &context.action,
        &context.resource_type,
        &context.resource_id,
        context.actor_id.as_deref(),
    );
    entry.success = result.verdict == Verdict::AllSucceeded;
    entry.details = context.details.clone();

    entry
        .details
        .insert("status".to_string(), json!(result.verdict.as_str()));
    entry
        .details
        .insert("nodes".to_string(), json!(result.succeeded_node_ids()));

    if !entry.success {
        entry.details.insert(
            "success_count".to_string(),
            json!(result.successes.len()),
        );
        entry.details.insert(
            "failure_count".to_string(),
            json!(result.failures.len()),
        );
        let failures: Vec<Value> = result
            .failures
            .iter()
            .map(|(node, reason)| {
                json!({
                    "node_id": node.id,
                    "node": node.name,
                    "kind": reason.tag(),
                    "reason": reason.to_string(),
                })
            })
            .collect();
        entry.details.insert("failures".to_string(), Value::Array(failures));
    }

    Some(entry)
}

/// Write the audit entry for an operation, logging instead of failing
///
/// Audit storage problems never change the outcome of an operation that has
/// already been applied to the cluster.
pub fn emit<T>(sink: &dyn AuditSink, context: &AuditContext, result: &AggregateResult<T>) {
    let Some(entry) = audit_entry(context, result) else {
        return;
    };

    if let Err(e) = sink.record(&entry) {
        tracing::warn!(
            action = %entry.action,
            resource = %entry.resource_id,
            error = %e,
            "failed to write audit entry"
        );
    }
}
