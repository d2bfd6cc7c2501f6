use std::fmt::Debug;

use crate::common::Node;
use crate::error::ContactError;

/// A hook deciding whether a freshly contacted node may join the results.
///
/// It runs on the worker thread with the search unlocked, so it may itself
/// talk to the node, for example to check protocol compatibility.
///
/// Returning `Ok(false)` or an error both exclude the node from the results
/// and from further neighbor expansion, the rest of the search is unaffected.
pub trait NodeFilter: Send + Sync + Debug {
    /// Returns true if this node is acceptable as a lookup result.
    fn allow_node(&self, node: &Node) -> Result<bool, ContactError>;
}

#[derive(Debug, Clone, Default)]
/// Accepts every node.
pub struct DefaultFilter;

impl NodeFilter for DefaultFilter {
    fn allow_node(&self, _node: &Node) -> Result<bool, ContactError> {
        Ok(true)
    }
}
