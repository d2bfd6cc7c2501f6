//! The loop each lookup worker runs against the shared search state.

use std::sync::Arc;

use flume::Sender;
use tracing::{debug, info, trace};

use crate::common::Node;
use crate::error::ContactError;
use crate::network::LocalNode;

use super::{NodeFilter, Offer, SearchStatus, Shared};

/// What a worker does after probing one candidate.
enum Probe {
    Continue,
    Stop,
}

#[derive(Debug)]
pub(crate) struct Worker<N: LocalNode> {
    index: usize,
    shared: Arc<Shared>,
    node: Arc<N>,
    filter: Arc<dyn NodeFilter>,
    /// Dropped last, disconnecting once every worker is gone.
    done: Sender<usize>,
}

impl<N: LocalNode> Worker<N> {
    pub fn new(
        index: usize,
        shared: Arc<Shared>,
        node: Arc<N>,
        filter: Arc<dyn NodeFilter>,
        done: Sender<usize>,
    ) -> Self {
        Self {
            index,
            shared,
            node,
            filter,
            done,
        }
    }

    /// Probe candidates closest first until the queue is empty or the search
    /// is no longer [SearchStatus::Searching].
    pub fn run(self) {
        trace!(worker = self.index, "Lookup worker started");

        while let Some(candidate) = self.next_candidate() {
            match self.probe(candidate) {
                Ok(Probe::Continue) => {}
                Ok(Probe::Stop) => break,
                Err(error) => {
                    let mut state = self.shared.lock();
                    if state.status != SearchStatus::Searching {
                        break;
                    }
                    match error {
                        ContactError::Rejected(_) => state.stats.rejected += 1,
                        _ => state.stats.failed += 1,
                    }
                    drop(state);

                    debug!(
                        worker = self.index,
                        address = ?candidate.address,
                        %error,
                        "Skipping candidate"
                    );
                }
            }
        }
    }

    // === Private Methods ===

    fn next_candidate(&self) -> Option<Node> {
        let mut state = self.shared.lock();

        if state.status != SearchStatus::Searching {
            return None;
        }

        state.queue.pop_closest()
    }

    fn probe(&self, candidate: Node) -> Result<Probe, ContactError> {
        let target = self.shared.target;

        let id = self.node.contact(candidate.address)?;
        let peer = Node::new(id, candidate.address);

        {
            let mut state = self.shared.lock();
            if state.status != SearchStatus::Searching {
                return Ok(Probe::Stop);
            }
            state.stats.contacted += 1;
            // The answering Id may differ from the one it was queued under.
            state.queue.mark_visited(id);
        }

        trace!(worker = self.index, %id, address = ?peer.address, "Node found");

        // May involve network calls of its own.
        match self.filter.allow_node(&peer) {
            Ok(true) => {}
            Ok(false) => return Err(ContactError::Rejected(id)),
            Err(error) => {
                trace!(worker = self.index, %id, %error, "Filter failed");
                return Err(ContactError::Rejected(id));
            }
        }

        let limit = {
            let mut state = self.shared.lock();
            if state.status != SearchStatus::Searching {
                return Ok(Probe::Stop);
            }

            state.results.offer(peer);

            if id == target {
                state.transition(SearchStatus::Done);
                info!(%target, address = ?peer.address, "Found lookup target");

                return Ok(Probe::Stop);
            }

            state.results.worst_distance()
        };

        trace!(
            worker = self.index,
            peer = %id,
            %target,
            limit = ?limit.map(|distance| distance.bucket_index()),
            "Querying neighbors"
        );

        let neighbors =
            self.node
                .query_neighbors(&peer, &target, self.shared.closest, limit.as_ref())?;

        let mut state = self.shared.lock();
        if state.status != SearchStatus::Searching {
            return Ok(Probe::Stop);
        }

        // Results may have narrowed while the query was in flight.
        let worst = state.results.worst_distance();

        for neighbor in neighbors {
            match state.queue.offer(neighbor, worst.as_ref()) {
                Offer::Enqueued => state.stats.enqueued += 1,
                Offer::Pruned => state.stats.pruned += 1,
                Offer::Known => {}
            }
        }

        trace!(
            worker = self.index,
            candidates = state.queue.len(),
            results = state.results.len(),
            "Expanded node"
        );

        Ok(Probe::Continue)
    }
}

impl<N: LocalNode> Drop for Worker<N> {
    fn drop(&mut self) {
        let mut state = self.shared.lock();

        if state.release_workers(1) {
            debug!(
                target = %self.shared.target,
                results = state.results.len(),
                stats = ?state.stats,
                "Lookup exhausted its candidates"
            );
        }
        drop(state);

        trace!(worker = self.index, "Lookup worker exited");

        let _ = self.done.send(self.index);
    }
}
