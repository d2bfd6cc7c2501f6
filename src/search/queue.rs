use std::collections::{BTreeMap, HashSet};

use crate::common::{Distance, Id, Node};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// What [CandidateQueue::offer] did with a candidate.
pub enum Offer {
    Enqueued,
    /// This node, or a node already queued or visited.
    Known,
    /// Not strictly closer than the worst accepted result.
    Pruned,
}

#[derive(Debug, Clone)]
/// Nodes discovered but not yet contacted, popped closest to the target first.
///
/// Keyed by distance to the target rather than by raw Id, which is what makes
/// [Self::pop_closest] return the closest known candidate.
pub struct CandidateQueue {
    target: Id,
    local_id: Id,
    candidates: BTreeMap<Distance, Node>,
    /// Every Id ever popped or accepted, so no node is contacted twice.
    visited: HashSet<Id>,
}

impl CandidateQueue {
    pub fn new(target: Id, local_id: Id) -> Self {
        Self {
            target,
            local_id,
            candidates: BTreeMap::new(),
            visited: HashSet::new(),
        }
    }

    // === Getters ===

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn contains(&self, id: &Id) -> bool {
        self.candidates.contains_key(&id.xor(&self.target))
    }

    pub fn visited(&self, id: &Id) -> bool {
        self.visited.contains(id)
    }

    // === Public Methods ===

    /// Bulk insert the local node's own view, without any pruning bound.
    pub fn seed<I: IntoIterator<Item = Node>>(&mut self, nodes: I) {
        for node in nodes {
            self.offer(node, None);
        }
    }

    /// Remove and return the candidate closest to the target.
    pub fn pop_closest(&mut self) -> Option<Node> {
        let (_, node) = self.candidates.pop_first()?;
        self.visited.insert(node.id);

        Some(node)
    }

    /// Drop `id` from the queue and never enqueue it again, even if it was
    /// never popped.
    ///
    /// For contacted nodes, whose authoritative Id may differ from the Id
    /// they were queued under.
    pub fn mark_visited(&mut self, id: Id) {
        self.candidates.remove(&id.xor(&self.target));
        self.visited.insert(id);
    }

    /// Enqueue a candidate unless it is this node, already queued, already
    /// visited, or not strictly closer than `worst_accepted`.
    pub fn offer(&mut self, node: Node, worst_accepted: Option<&Distance>) -> Offer {
        let distance = node.distance(&self.target);

        if node.id == self.local_id
            || self.visited.contains(&node.id)
            || self.candidates.contains_key(&distance)
        {
            return Offer::Known;
        }

        if let Some(worst) = worst_accepted {
            if &distance >= worst {
                return Offer::Pruned;
            }
        }

        self.candidates.insert(distance, node);

        Offer::Enqueued
    }
}
