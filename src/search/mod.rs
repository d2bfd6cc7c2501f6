//! Iterative parallel node lookup.

mod config;
mod filter;
mod queue;
mod results;
mod worker;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use flume::{Receiver, RecvTimeoutError};
use tracing::{debug, trace, warn};

use crate::common::{Id, Node};
use crate::network::LocalNode;
use crate::{Error, Result};

pub use config::{Config, DEFAULT_FANOUT};
pub use filter::{DefaultFilter, NodeFilter};
pub use queue::{CandidateQueue, Offer};
pub use results::ResultSet;

use worker::Worker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Lifecycle of a [KadSearch].
///
/// Only ever moves forward: `Idle → Searching → Done | Exhausted | Cancelled`.
pub enum SearchStatus {
    /// Created, not started yet.
    Idle,
    /// Workers are probing candidates.
    Searching,
    /// A worker contacted the exact target.
    Done,
    /// Every worker ran out of candidates without finding the exact target.
    Exhausted,
    /// [KadSearch::cancel] was called while searching.
    Cancelled,
}

impl SearchStatus {
    /// Returns true for `Done`, `Exhausted` and `Cancelled`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SearchStatus::Done | SearchStatus::Exhausted | SearchStatus::Cancelled
        )
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
/// Counters of what a lookup did so far.
pub struct SearchStats {
    /// Nodes that answered a contact.
    pub contacted: usize,
    /// Candidates skipped because contacting or querying them failed.
    pub failed: usize,
    /// Contacted nodes refused by the [NodeFilter].
    pub rejected: usize,
    /// Discovered nodes added to the candidate queue.
    pub enqueued: usize,
    /// Discovered nodes dropped for being no closer than the worst result.
    pub pruned: usize,
}

#[derive(Debug)]
pub(crate) struct SearchState {
    status: SearchStatus,
    queue: CandidateQueue,
    results: ResultSet,
    stats: SearchStats,
    active_workers: usize,
}

impl SearchState {
    /// Move to `next` if that is a forward transition, returns true if it did.
    fn transition(&mut self, next: SearchStatus) -> bool {
        let allowed = match (self.status, next) {
            (SearchStatus::Idle, SearchStatus::Searching) => true,
            (SearchStatus::Searching, next) => next.is_terminal(),
            _ => false,
        };

        if allowed {
            self.status = next;
        }

        allowed
    }

    /// Account for `count` workers that will never pop again.
    ///
    /// Returns true if that left no worker and the search became exhausted.
    fn release_workers(&mut self, count: usize) -> bool {
        self.active_workers = self.active_workers.saturating_sub(count);

        self.active_workers == 0 && self.transition(SearchStatus::Exhausted)
    }
}

/// State shared between a [KadSearch] and its workers.
///
/// Queue, results and status sit behind one lock, so every
/// pop, accept or prune decision is made against a consistent view.
#[derive(Debug)]
pub(crate) struct Shared {
    target: Id,
    closest: usize,
    state: Mutex<SearchState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SearchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug)]
/// A single use lookup of the nodes closest to a target [Id].
///
/// [Self::start] seeds candidates from the local routing table and dispatches
/// `fanout` worker threads. Each worker repeatedly contacts the closest
/// remaining candidate, accepts it into the results, and queues the neighbors
/// it reports that could still improve them. A worker that contacts the exact
/// target ends the whole search.
///
/// Results are readable at any time, and are final once [Self::wait] returns `true`.
pub struct KadSearch<N: LocalNode> {
    node: Arc<N>,
    config: Config,
    shared: Arc<Shared>,
    /// Disconnects once every worker has exited.
    completion: Option<Receiver<usize>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl<N: LocalNode> KadSearch<N> {
    /// Create an idle lookup for `target` on behalf of `node`.
    pub fn new(node: Arc<N>, target: Id, config: Config) -> Result<Self> {
        config.validate()?;

        let local_id = node.id();

        let state = SearchState {
            status: SearchStatus::Idle,
            queue: CandidateQueue::new(target, local_id),
            results: ResultSet::new(target, config.closest),
            stats: SearchStats::default(),
            active_workers: 0,
        };

        Ok(Self {
            node,
            shared: Arc::new(Shared {
                target,
                closest: config.closest,
                state: Mutex::new(state),
            }),
            config,
            completion: None,
            handles: Mutex::new(Vec::new()),
        })
    }

    // === Getters ===

    pub fn target(&self) -> Id {
        self.shared.target
    }

    pub fn status(&self) -> SearchStatus {
        self.shared.lock().status
    }

    pub fn stats(&self) -> SearchStats {
        self.shared.lock().stats
    }

    /// Ids of the closest nodes accepted so far, closest first.
    pub fn results(&self) -> Vec<Id> {
        self.shared.lock().results.snapshot()
    }

    /// Closest nodes accepted so far, closest first.
    pub fn nodes(&self) -> Vec<Node> {
        self.shared.lock().results.nodes()
    }

    // === Public Methods ===

    /// Seed the candidate queue from the local routing table and dispatch the workers.
    ///
    /// No network calls happen before the workers run.
    pub fn start(&mut self) -> Result<()> {
        if self.completion.is_some() {
            return Err(Error::AlreadyStarted);
        }

        let target = self.shared.target;
        let seeds = self.node.find_nodes_near(&target, self.config.closest);

        {
            let mut state = self.shared.lock();
            if !state.transition(SearchStatus::Searching) {
                return Err(Error::AlreadyStarted);
            }

            state.queue.seed(seeds);
            state.active_workers = self.config.fanout;

            debug!(
                %target,
                closest = self.config.closest,
                fanout = self.config.fanout,
                candidates = state.queue.len(),
                "Starting lookup"
            );
        }

        let (sender, receiver) = flume::unbounded::<usize>();
        self.completion = Some(receiver);

        let mut handles = self.lock_handles();

        for index in 0..self.config.fanout {
            let worker = Worker::new(
                index,
                self.shared.clone(),
                self.node.clone(),
                self.config.filter.clone(),
                sender.clone(),
            );

            // A worker that fails to spawn is dropped, and counts as exited.
            match thread::Builder::new()
                .name(format!("kad-search-{}", index))
                .spawn(move || worker.run())
            {
                Ok(handle) => handles.push(handle),
                Err(error) => {
                    let never_spawned = self.config.fanout - index - 1;
                    self.shared.lock().release_workers(never_spawned);

                    return Err(error.into());
                }
            }
        }

        Ok(())
    }

    /// Block until every worker exited, or until `timeout` elapsed.
    ///
    /// `None` waits without bound. Returns `true` if every worker exited in time.
    /// Timing out does not stop the workers, see [Self::cancel].
    pub fn wait(&self, timeout: Option<Duration>) -> Result<bool> {
        let deadline = timeout.and_then(|timeout| Instant::now().checked_add(timeout));

        self.wait_deadline(deadline)
    }

    /// Same as [Self::wait] with an absolute deadline shared by all workers.
    pub fn wait_until(&self, deadline: Instant) -> Result<bool> {
        self.wait_deadline(Some(deadline))
    }

    /// Await every worker's exit without blocking the current thread.
    #[cfg(feature = "async")]
    pub async fn wait_async(&self) -> Result<()> {
        let receiver = self.completion.as_ref().ok_or(Error::NotStarted)?;

        while let Ok(index) = receiver.recv_async().await {
            trace!(worker = index, "Worker finished");
        }

        self.join_workers();

        Ok(())
    }

    /// Stop a running search.
    ///
    /// Workers notice before their next candidate or after their current
    /// network call, and exit without touching queue or results again.
    /// Returns true if the search was running.
    pub fn cancel(&self) -> bool {
        let cancelled = self.shared.lock().transition(SearchStatus::Cancelled);

        if cancelled {
            debug!(target = %self.shared.target, "Lookup cancelled");
        }

        cancelled
    }

    /// Run the whole lookup: start, wait up to `timeout`, and cancel whatever
    /// is still running after it.
    pub fn find(&mut self, timeout: Option<Duration>) -> Result<Lookup> {
        self.start()?;

        let completed = self.wait(timeout)?;

        if !completed {
            self.cancel();
        }

        Ok(Lookup {
            target: self.shared.target,
            status: self.status(),
            nodes: self.nodes(),
            completed,
        })
    }

    // === Private Methods ===

    fn wait_deadline(&self, deadline: Option<Instant>) -> Result<bool> {
        let receiver = self.completion.as_ref().ok_or(Error::NotStarted)?;

        loop {
            let received = match deadline {
                Some(deadline) => receiver.recv_deadline(deadline),
                None => receiver
                    .recv()
                    .map_err(|_| RecvTimeoutError::Disconnected),
            };

            match received {
                Ok(index) => trace!(worker = index, "Worker finished"),
                Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    debug!(
                        target = %self.shared.target,
                        "Timed out waiting for lookup workers"
                    );
                    return Ok(false);
                }
            }
        }

        self.join_workers();

        Ok(true)
    }

    fn join_workers(&self) {
        let handles = std::mem::take(&mut *self.lock_handles());

        for handle in handles {
            if handle.join().is_err() {
                warn!(target = %self.shared.target, "Lookup worker panicked");
            }
        }
    }

    fn lock_handles(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Clone)]
/// Outcome of [KadSearch::find].
pub struct Lookup {
    target: Id,
    status: SearchStatus,
    nodes: Vec<Node>,
    completed: bool,
}

impl Lookup {
    pub fn target(&self) -> Id {
        self.target
    }

    pub fn status(&self) -> SearchStatus {
        self.status
    }

    /// Closest nodes found, closest first.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Returns false if the lookup was cancelled after timing out.
    pub fn completed(&self) -> bool {
        self.completed
    }

    /// The node whose Id is exactly the target, if it was reached.
    pub fn found(&self) -> Option<&Node> {
        self.nodes.first().filter(|node| node.id == self.target)
    }
}

#[cfg(test)]
mod test {
    use std::net::SocketAddr;

    use super::*;
    use crate::common::{Distance, ID_SIZE};
    use crate::ContactError;

    /// A local node that knows nobody.
    #[derive(Debug)]
    struct Lonely(Id);

    impl LocalNode for Lonely {
        fn id(&self) -> Id {
            self.0
        }

        fn find_nodes_near(&self, _target: &Id, _n: usize) -> Vec<Node> {
            vec![]
        }

        fn contact(&self, address: SocketAddr) -> std::result::Result<Id, ContactError> {
            Err(ContactError::Unreachable(address))
        }

        fn query_neighbors(
            &self,
            _peer: &Node,
            _target: &Id,
            _n: usize,
            _limit: Option<&Distance>,
        ) -> std::result::Result<Vec<Node>, ContactError> {
            Ok(vec![])
        }
    }

    fn lonely_search() -> KadSearch<Lonely> {
        KadSearch::new(Arc::new(Lonely(Id::random())), Id::random(), Config::default()).unwrap()
    }

    #[test]
    fn transitions_are_monotonic() {
        let mut state = SearchState {
            status: SearchStatus::Idle,
            queue: CandidateQueue::new(Id::random(), Id::random()),
            results: ResultSet::new(Id::random(), 1),
            stats: SearchStats::default(),
            active_workers: 0,
        };

        assert!(!state.transition(SearchStatus::Done));
        assert!(state.transition(SearchStatus::Searching));
        assert!(!state.transition(SearchStatus::Searching));
        assert!(state.transition(SearchStatus::Done));
        assert!(!state.transition(SearchStatus::Exhausted));
        assert!(!state.transition(SearchStatus::Cancelled));
        assert_eq!(state.status, SearchStatus::Done);
    }

    #[test]
    fn wait_before_start() {
        let search = lonely_search();

        assert_eq!(search.status(), SearchStatus::Idle);
        assert!(matches!(search.wait(None), Err(Error::NotStarted)));
    }

    #[test]
    fn start_twice() {
        let mut search = lonely_search();

        search.start().unwrap();
        assert!(matches!(search.start(), Err(Error::AlreadyStarted)));
    }

    #[test]
    fn empty_routing_table_exhausts() {
        let mut search = lonely_search();

        search.start().unwrap();
        assert!(search.wait(None).unwrap());

        assert_eq!(search.status(), SearchStatus::Exhausted);
        assert!(search.results().is_empty());

        // Waiting again returns right away.
        assert!(search.wait(Some(Duration::from_millis(1))).unwrap());
    }

    #[test]
    fn cancel_after_exhausted_is_noop() {
        let mut search = lonely_search();

        let lookup = search.find(None).unwrap();

        assert!(lookup.completed());
        assert!(lookup.found().is_none());
        assert!(!search.cancel());
        assert_eq!(search.status(), SearchStatus::Exhausted);
    }

    #[test]
    fn invalid_config() {
        let config = Config {
            closest: 0,
            ..Default::default()
        };

        let result = KadSearch::new(Arc::new(Lonely(Id::random())), Id([0; ID_SIZE]), config);

        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[cfg(feature = "async")]
    #[test]
    fn wait_async() {
        let mut search = lonely_search();

        search.start().unwrap();
        futures::executor::block_on(search.wait_async()).unwrap();

        assert_eq!(search.status(), SearchStatus::Exhausted);
    }
}
