//! Background maintenance: node health probing and audit retention

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{Error, Result};
use crate::config::{AuditConfig, HealthConfig};
use crate::db::AuditRepo;
use crate::device::DeviceClient;
use crate::nodes::{NodeDirectory, NodeStatus};

/// Outcome of one health sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthReport {
    pub online: Vec<String>,
    pub offline: Vec<String>,
}

/// Probes every registered node and records whether it answers
///
/// Offline nodes drop out of default cluster-wide targeting until a later
/// probe marks them online again.
#[derive(Clone)]
pub struct HealthMonitor {
    directory: Arc<dyn NodeDirectory>,
    client: Arc<dyn DeviceClient>,
    config: HealthConfig,
}

impl HealthMonitor {
    #[must_use]
    pub fn new(
        directory: Arc<dyn NodeDirectory>,
        client: Arc<dyn DeviceClient>,
        config: HealthConfig,
    ) -> Self {
        Self {
            directory,
            client,
            config,
        }
    }

    /// Probe every node once, concurrently, and write back the status
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be read
    pub async fn check_once(&self) -> Result<HealthReport> {
        let nodes = self.directory.list_all()?;

        let probes = nodes.iter().map(|node| async move {
            let answered = matches!(
                tokio::time::timeout(self.config.probe_timeout, self.client.probe(node)).await,
                Ok(Ok(_))
            );
            (node, answered)
        });

        let mut report = HealthReport::default();
        for (node, answered) in join_all(probes).await {
            let status = if answered {
                NodeStatus::Online
            } else {
                NodeStatus::Offline
            };

            if node.status != status {
                tracing::info!(node = %node.name, from = %node.status, to = %status, "node status changed");
            }
            if let Err(e) = self.directory.set_status(&node.id, status) {
                tracing::warn!(node = %node.name, error = %e, "failed to record node status");
            }

            if answered {
                report.online.push(node.name.clone());
            } else {
                report.offline.push(node.name.clone());
            }
        }

        tracing::debug!(
            online = report.online.len(),
            offline = report.offline.len(),
            "health sweep complete"
        );
        Ok(report)
    }

    /// Run sweeps on the configured interval until `shutdown` is cancelled
    #[must_use]
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.interval);

            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        if let Err(e) = self.check_once().await {
                            tracing::warn!(error = %e, "health sweep failed");
                        }
                    }
                }
            }

            tracing::debug!("health monitor stopped");
        })
    }
}

/// Deletes audit entries past the retention window
#[derive(Clone)]
pub struct AuditRetention {
    repo: AuditRepo,
    config: AuditConfig,
}

impl AuditRetention {
    #[must_use]
    pub const fn new(repo: AuditRepo, config: AuditConfig) -> Self {
        Self { repo, config }
    }

    /// Remove expired entries once
    ///
    /// # Errors
    ///
    /// Returns error if the retention window reaches past the representable
    /// date range, or if the database operation fails
    pub fn sweep_once(&self) -> Result<usize> {
        let retention_days = self.config.retention_days;
        let cutoff = ChronoDuration::try_days(i64::from(retention_days))
            .and_then(|window| Utc::now().checked_sub_signed(window))
            .ok_or_else(|| {
                Error::Config(format!("audit retention of {retention_days} days is out of range"))
            })?;
        let removed = self.repo.delete_older_than(cutoff)?;
        if removed > 0 {
            tracing::info!(removed, retention_days = self.config.retention_days, "pruned audit log");
        }
        Ok(removed)
    }

    /// Sweep on the configured interval until `shutdown` is cancelled
    #[must_use]
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.sweep_interval);

            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        if let Err(e) = self.sweep_once() {
                            tracing::warn!(error = %e, "audit retention sweep failed");
                        }
                    }
                }
            }

            tracing::debug!("audit retention stopped");
        })
    }
}
