//! Cluster-wide orchestration
//!
//! One logical operation is fanned out to many nodes, each node's outcome is
//! collected under a shared deadline, the outcomes are classified into one
//! verdict, and a single audit entry is written for the whole operation.

pub mod aggregate;
pub mod audit;
pub mod dispatch;
mod engine;
pub mod group;
pub mod outcome;
pub mod reconcile;
pub mod target;

pub use aggregate::{AggregateResult, Verdict, aggregate};
pub use audit::{AuditContext, AuditEntry, AuditSink, audit_entry};
pub use dispatch::Dispatcher;
pub use engine::ClusterEngine;
pub use group::{SyncGroupCreator, generate_private_key, map_group_response};
pub use outcome::{FailureReason, Outcome, PerNodeResult};
pub use reconcile::{Mutation, NameReconciler, Reconciled, find_local_id};
pub use target::{TargetRequest, resolve_targets};
