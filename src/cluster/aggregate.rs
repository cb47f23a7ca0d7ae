//! Classification of per-node outcomes into one verdict

use std::fmt;
use std::fmt::Write as _;

use super::outcome::{FailureReason, Outcome, PerNodeResult};
use crate::nodes::Node;

/// Overall result of a cluster operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    /// Every targeted node succeeded
    AllSucceeded,
    /// Some nodes succeeded, some failed
    PartialFailure,
    /// No node succeeded
    TotalFailure,
    /// There was nothing to target
    NoTargets,
}

impl Verdict {
    /// Status string written to the audit log
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AllSucceeded => "success",
            Self::PartialFailure => "partial_failure",
            Self::TotalFailure => "failure",
            Self::NoTargets => "no_targets",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Successes and failures of one cluster operation, keyed by node
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateResult<T> {
    pub successes: Vec<(Node, T)>,
    pub failures: Vec<(Node, FailureReason)>,
    pub verdict: Verdict,
}

impl<T> AggregateResult<T> {
    /// Number of nodes accounted for
    #[must_use]
    pub fn total(&self) -> usize {
        self.successes.len() + self.failures.len()
    }

    /// Whether every node succeeded
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.verdict == Verdict::AllSucceeded
    }

    /// Ids of the nodes that succeeded
    #[must_use]
    pub fn succeeded_node_ids(&self) -> Vec<String> {
        self.successes.iter().map(|(n, _)| n.id.clone()).collect()
    }

    /// Counts only, e.g. `created on 3 of 4 nodes`
    #[must_use]
    pub fn headline(&self, verb: &str) -> String {
        if self.verdict == Verdict::NoTargets {
            return "no target nodes".to_string();
        }
        format!("{verb} on {} of {} nodes", self.successes.len(), self.total())
    }

    /// Human-readable line, e.g. `created on 3 of 4 nodes; failed on edge-2: timeout`
    #[must_use]
    pub fn summary(&self, verb: &str) -> String {
        let mut line = self.headline(verb);
        for (node, reason) in &self.failures {
            let _ = write!(line, "; failed on {}: {reason}", node.name);
        }
        line
    }
}

/// Partition per-node results and decide the verdict
///
/// Pure: no I/O and no side effects, so repeated calls on the same input
/// return equal results. Timeouts become failures with reason `timeout`.
#[must_use]
pub fn aggregate<T: Clone>(results: &[PerNodeResult<T>]) -> AggregateResult<T> {
    let mut successes = Vec::new();
    let mut failures = Vec::new();

    for result in results {
        match &result.outcome {
            Outcome::Ok(value) => successes.push((result.node.clone(), value.clone())),
            Outcome::Err(e) => {
                failures.push((result.node.clone(), FailureReason::Device(e.clone())));
            }
            Outcome::TimedOut => failures.push((result.node.clone(), FailureReason::Timeout)),
        }
    }

    let verdict = match (successes.len(), failures.len()) {
        (0, 0) => Verdict::NoTargets,
        (_, 0) => Verdict::AllSucceeded,
        (0, _) => Verdict::TotalFailure,
        _ => Verdict::PartialFailure,
    };

    AggregateResult {
        successes,
        failures,
        verdict,
    }
}
