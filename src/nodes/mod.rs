//! Managed nodes and the directory that lists them
//!
//! Nodes are independently reachable devices, each with its own
//! configuration API and credentials

pub mod directory;
pub mod registry;
pub mod types;

pub use directory::NodeDirectory;
pub use registry::NodeRegistry;
pub use types::{NewNode, Node, NodeStatus};
