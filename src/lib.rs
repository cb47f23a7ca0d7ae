//! Fleet Orchestrator - cluster-wide configuration for independently managed
//! network devices
//!
//! This library provides the core functionality for the `fleet` tool:
//! - Node directory (in-memory or `SQLite`-backed)
//! - Concurrent fan-out of one operation to many nodes under a deadline
//! - By-name reconciliation across per-node local ids
//! - Synchronized creation of resources sharing secret material
//! - Verdict aggregation and a single audit entry per operation
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                   ClusterEngine                      │
//! │  resolve targets → dispatch → aggregate → audit      │
//! └──────────┬──────────────────────────┬───────────────┘
//!            │                          │
//! ┌──────────▼──────────┐    ┌──────────▼──────────────┐
//! │    NodeDirectory     │    │      DeviceClient        │
//! │  registry │ SQLite   │    │  REST API per node       │
//! └─────────────────────┘    └─────────────────────────┘
//! ```

pub mod cluster;
pub mod config;
pub mod db;
pub mod device;
pub mod error;
pub mod nodes;
pub mod workers;

pub use cluster::{
    AggregateResult, AuditEntry, AuditSink, ClusterEngine, Dispatcher, Outcome, PerNodeResult,
    TargetRequest, Verdict,
};
pub use config::Config;
pub use db::{AuditRepo, DbConn, DbPool, NodeRepo};
pub use device::{DeviceClient, DeviceError, HttpDeviceClient, ResourceKind};
pub use error::{Error, Result};
pub use nodes::{NewNode, Node, NodeDirectory, NodeRegistry, NodeStatus};
pub use workers::{AuditRetention, HealthMonitor, HealthReport};
