//! The contract a lookup consumes from the node that owns it.

use std::net::SocketAddr;

use crate::common::{Distance, Id, Node};
use crate::error::ContactError;

/// The local node a [crate::KadSearch] runs on behalf of.
///
/// Implementations own the routing table, the transport and the RPC encoding;
/// the search only drives them. Methods that talk to the network may block the
/// calling worker thread.
pub trait LocalNode: Send + Sync + 'static {
    /// This node's own [Id].
    fn id(&self) -> Id;

    /// Up to `n` nodes from the local routing table closest to `target`.
    ///
    /// Must not touch the network.
    fn find_nodes_near(&self, target: &Id, n: usize) -> Vec<Node>;

    /// Establish that a node is alive at `address` and return its authoritative [Id].
    fn contact(&self, address: SocketAddr) -> Result<Id, ContactError>;

    /// Ask an already contacted `peer` for up to `n` nodes it knows near `target`.
    ///
    /// When `limit` is set, the peer should not return nodes at or beyond that
    /// distance from `target`. It is a hint, the search prunes on its own anyway.
    fn query_neighbors(
        &self,
        peer: &Node,
        target: &Id,
        n: usize,
        limit: Option<&Distance>,
    ) -> Result<Vec<Node>, ContactError>;
}
