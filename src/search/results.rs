use std::collections::BTreeMap;

use crate::common::{Distance, Id, Node};

#[derive(Debug, Clone)]
/// The best `n` nodes a lookup accepted so far, ordered by distance to the target.
pub struct ResultSet {
    target: Id,
    capacity: usize,
    nodes: BTreeMap<Distance, Node>,
}

impl ResultSet {
    pub fn new(target: Id, capacity: usize) -> Self {
        Self {
            target,
            capacity,
            nodes: BTreeMap::new(),
        }
    }

    // === Getters ===

    pub fn target(&self) -> Id {
        self.target
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns true once `n` results were accepted.
    pub fn is_full(&self) -> bool {
        self.capacity > 0 && self.nodes.len() >= self.capacity
    }

    pub fn contains(&self, id: &Id) -> bool {
        self.nodes.contains_key(&id.xor(&self.target))
    }

    /// Distance of the farthest accepted result, only once the set is full.
    ///
    /// Nothing farther than this can improve the results.
    pub fn worst_distance(&self) -> Option<Distance> {
        if !self.is_full() {
            return None;
        }

        self.nodes.keys().next_back().copied()
    }

    /// Accepted Ids, closest first.
    pub fn snapshot(&self) -> Vec<Id> {
        self.nodes.values().map(|node| node.id).collect()
    }

    /// Accepted nodes, closest first.
    pub fn nodes(&self) -> Vec<Node> {
        self.nodes.values().copied().collect()
    }

    // === Public Methods ===

    /// Insert a node, evicting the farthest result if over capacity.
    ///
    /// Returns true if the node is among the results afterwards.
    pub fn offer(&mut self, node: Node) -> bool {
        let distance = node.distance(&self.target);

        if self.nodes.contains_key(&distance) {
            return true;
        }

        self.nodes.insert(distance, node);

        if self.nodes.len() > self.capacity {
            if let Some((evicted, _)) = self.nodes.pop_last() {
                return evicted != distance;
            }
        }

        true
    }
}
