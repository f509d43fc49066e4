//! Per-type behavior hooks
//!
//! Node types register a [`NodeBehavior`] with their class. The graph core
//! never computes anything itself; `evaluate` and `execute` are dispatched
//! here so plugins can fill them in.

use crate::nodes::attribute::AttrValue;
use crate::nodes::Node;

/// Trait for node-type specific evaluation
pub trait NodeBehavior: Send + Sync {
    /// Called to check whether the node is ready to execute
    fn evaluate(&self, _node: &Node) -> bool {
        // Default: always ready
        true
    }

    /// Run the node and return its results
    fn execute(&self, _node: &Node) -> Result<Vec<AttrValue>, String> {
        // Default: nothing to compute
        Ok(Vec::new())
    }
}

/// Default implementation for types that don't need special handling
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultBehavior;

impl NodeBehavior for DefaultBehavior {}
