//! Per-node outcomes produced by a fan-out

use std::fmt;

use crate::device::DeviceError;
use crate::nodes::Node;

/// What happened on one node
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    /// The operation completed and returned a value
    Ok(T),
    /// The device client reported an error
    Err(DeviceError),
    /// The dispatch deadline expired before the operation completed
    TimedOut,
}

impl<T> Outcome<T> {
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    /// Transform the success value, leaving failures untouched
    pub fn map<U, F>(self, f: F) -> Outcome<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Self::Ok(value) => Outcome::Ok(f(value)),
            Self::Err(e) => Outcome::Err(e),
            Self::TimedOut => Outcome::TimedOut,
        }
    }
}

impl<T> From<Result<T, DeviceError>> for Outcome<T> {
    fn from(result: Result<T, DeviceError>) -> Self {
        match result {
            Ok(value) => Self::Ok(value),
            Err(e) => Self::Err(e),
        }
    }
}

/// One node paired with its outcome
#[derive(Debug, Clone, PartialEq)]
pub struct PerNodeResult<T> {
    pub node: Node,
    pub outcome: Outcome<T>,
}

impl<T> PerNodeResult<T> {
    #[must_use]
    pub const fn new(node: Node, outcome: Outcome<T>) -> Self {
        Self { node, outcome }
    }
}

/// Why a node ended up in the failure list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    Timeout,
    Device(DeviceError),
}

impl FailureReason {
    /// Short machine-readable tag used in audit details
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Device(_) => "device_error",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => f.write_str("timeout"),
            Self::Device(e) => write!(f, "{e}"),
        }
    }
}
