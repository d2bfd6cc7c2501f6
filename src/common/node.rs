//! A peer known by its Id and the address it can be reached at.
use std::net::SocketAddr;

use crate::common::{Distance, Id};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// A peer in the overlay: its [Id] and its network address.
///
/// Two nodes are equal only if both Id and address match. Lookups key nodes
/// by their distance to the target, so only the Id decides their order.
pub struct Node {
    pub id: Id,
    pub address: SocketAddr,
}

impl Node {
    /// Creates a new Node from an id and socket address.
    pub fn new(id: Id, address: SocketAddr) -> Node {
        Node { id, address }
    }

    /// Creates a node with random Id for testing purposes.
    pub fn random() -> Node {
        Node {
            id: Id::random(),
            address: SocketAddr::from(([0, 0, 0, 0], 0)),
        }
    }

    /// XOR distance from this node to a target.
    pub fn distance(&self, target: &Id) -> Distance {
        self.id.xor(target)
    }
}
