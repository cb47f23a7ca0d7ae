//! Concurrent fan-out of one operation across a node set
//!
//! Every node gets its own task. The caller waits at a barrier until each
//! task has produced a value, failed, or been cut off by the deadline. One
//! deadline covers the whole dispatch; it is not reset per node.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use tokio::task::{Id, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::outcome::{Outcome, PerNodeResult};
use crate::device::DeviceError;
use crate::nodes::Node;
use crate::{Error, Result};

/// Runs operations across nodes under a shared deadline
///
/// Cloning is cheap; clones share the shutdown token, so cancelling it ends
/// every in-flight dispatch started from any clone.
#[derive(Debug, Clone, Default)]
pub struct Dispatcher {
    shutdown: CancellationToken,
}

impl Dispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a dispatcher whose in-flight work stops when `shutdown` is cancelled
    #[must_use]
    pub const fn with_shutdown(shutdown: CancellationToken) -> Self {
        Self { shutdown }
    }

    /// Stop every in-flight dispatch; unfinished units are recorded as timed out
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Whether [`Self::shutdown`] has been called on this or any clone
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Invoke `op` once per node concurrently and wait for all of them
    ///
    /// Results are in completion order, followed by the units cut off at the
    /// deadline in submission order. Exactly one entry is returned per input
    /// node. A unit that panics is reported as an internal device error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoTargets`] if `nodes` is empty, or
    /// [`Error::ShuttingDown`] if the dispatcher was shut down; nothing is
    /// spawned in either case
    pub async fn dispatch<T, F, Fut>(
        &self,
        nodes: Vec<Node>,
        timeout: Duration,
        op: F,
    ) -> Result<Vec<PerNodeResult<T>>>
    where
        T: Send + 'static,
        F: Fn(Node) -> Fut,
        Fut: Future<Output = std::result::Result<T, DeviceError>> + Send + 'static,
    {
        if nodes.is_empty() {
            return Err(Error::NoTargets);
        }
        if self.is_shut_down() {
            return Err(Error::ShuttingDown);
        }

        let deadline = Instant::now() + timeout;
        let cancel = self.shutdown.child_token();
        let mut units = JoinSet::new();
        let mut index_of: HashMap<Id, usize> = HashMap::with_capacity(nodes.len());

        for (idx, node) in nodes.iter().enumerate() {
            let call = op(node.clone());
            let token = cancel.clone();
            let handle = units.spawn(async move {
                tokio::select! {
                    biased;
                    () = token.cancelled() => None,
                    result = call => Some(result),
                }
            });
            index_of.insert(handle.id(), idx);
        }

        let mut outcomes: Vec<Option<Outcome<T>>> = nodes.iter().map(|_| None).collect();
        let mut completion_order = Vec::with_capacity(nodes.len());

        // Cancelled units finish with `None`; joining continues through shutdown
        loop {
            let joined = tokio::time::timeout_at(deadline, units.join_next_with_id()).await;

            let (id, outcome) = match joined {
                // Deadline reached with units still running
                Err(_) => break,
                // Every unit has reported
                Ok(None) => break,
                Ok(Some(Ok((id, Some(result))))) => (id, Outcome::from(result)),
                Ok(Some(Ok((id, None)))) => (id, Outcome::TimedOut),
                Ok(Some(Err(e))) if e.is_panic() => (
                    e.id(),
                    Outcome::Err(DeviceError::Internal("dispatch unit panicked".to_string())),
                ),
                Ok(Some(Err(e))) => (e.id(), Outcome::TimedOut),
            };

            let Some(&idx) = index_of.get(&id) else {
                continue;
            };
            tracing::debug!(
                node = %nodes[idx].name,
                ok = outcome.is_ok(),
                "dispatch unit finished"
            );
            outcomes[idx] = Some(outcome);
            completion_order.push(idx);
        }

        // Stop waiting on stragglers; their eventual results are never counted
        cancel.cancel();
        units.abort_all();

        let mut slots: Vec<Option<Node>> = nodes.into_iter().map(Some).collect();
        let mut results = Vec::with_capacity(slots.len());
        for idx in completion_order {
            if let (Some(node), Some(outcome)) = (slots[idx].take(), outcomes[idx].take()) {
                results.push(PerNodeResult::new(node, outcome));
            }
        }
        for node in slots.into_iter().flatten() {
            tracing::warn!(
                node = %node.name,
                timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                "node did not answer before the dispatch deadline"
            );
            results.push(PerNodeResult::new(node, Outcome::TimedOut));
        }

        Ok(results)
    }
}
