//! In-memory overlay network for tests, demos and benchmarks.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use crate::common::{Distance, Id, Node, ID_SIZE, MAX_BUCKET_SIZE_K};
use crate::error::ContactError;
use crate::network::LocalNode;

const FIRST_PORT: u16 = 10_000;
const PORTS_PER_HOST: usize = 50_000;

#[derive(Debug)]
/// A simulated overlay of nodes living on loopback addresses, none of them real.
///
/// Every node has a Kademlia style view of the others: for each bucket (shared
/// prefix length) it knows up to `k` nodes, the ones closest to itself.
/// The first node acts as the [LocalNode] a lookup runs on.
pub struct Testnet {
    nodes: Vec<Node>,
    by_address: HashMap<SocketAddr, Id>,
    tables: HashMap<Id, Vec<Node>>,
    unreachable: HashSet<SocketAddr>,
    latency: Duration,
    contacts: AtomicUsize,
    queries: AtomicUsize,
}

impl Testnet {
    /// Create a network of `count` nodes with random Ids.
    pub fn new(count: usize) -> Testnet {
        Self::with_bucket_size(count, MAX_BUCKET_SIZE_K)
    }

    /// Same as [Self::new], with `k` nodes per bucket instead of [MAX_BUCKET_SIZE_K].
    pub fn with_bucket_size(count: usize, k: usize) -> Testnet {
        let nodes = (0..count)
            .map(|i| Node::new(Id::random(), address_of(i)))
            .collect::<Vec<_>>();

        let tables = nodes
            .iter()
            .map(|node| (node.id, build_table(node, &nodes, k)))
            .collect();

        let by_address = nodes.iter().map(|node| (node.address, node.id)).collect();

        Testnet {
            nodes,
            by_address,
            tables,
            unreachable: HashSet::new(),
            latency: Duration::ZERO,
            contacts: AtomicUsize::new(0),
            queries: AtomicUsize::new(0),
        }
    }

    // === Options ===

    /// Sleep this long in every simulated network call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make these nodes fail every contact and query.
    pub fn with_unreachable<'a, I: IntoIterator<Item = &'a Node>>(mut self, nodes: I) -> Self {
        self.unreachable
            .extend(nodes.into_iter().map(|node| node.address));
        self
    }

    // === Getters ===

    /// All nodes, the local node first.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// The node lookups run on.
    pub fn local(&self) -> Option<&Node> {
        self.nodes.first()
    }

    /// Number of successful and failed [LocalNode::contact] calls so far.
    pub fn contacts(&self) -> usize {
        self.contacts.load(Ordering::Relaxed)
    }

    /// Number of [LocalNode::query_neighbors] calls so far.
    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::Relaxed)
    }

    /// The `n` reachable nodes closest to `target`, other than the local node.
    ///
    /// The ideal answer of a lookup.
    pub fn closest(&self, target: &Id, n: usize) -> Vec<Node> {
        let local = self.local().map(|node| node.id);

        let sorted = self
            .nodes
            .iter()
            .filter(|node| Some(node.id) != local)
            .filter(|node| !self.unreachable.contains(&node.address))
            .map(|node| (node.distance(target), *node))
            .collect::<BTreeMap<_, _>>();

        sorted.into_values().take(n).collect()
    }

    // === Private Methods ===

    fn table(&self, address: SocketAddr) -> Result<&Vec<Node>, ContactError> {
        if self.unreachable.contains(&address) {
            return Err(ContactError::Unreachable(address));
        }

        self.by_address
            .get(&address)
            .and_then(|id| self.tables.get(id))
            .ok_or(ContactError::Unreachable(address))
    }

    fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }
    }
}

impl LocalNode for Testnet {
    fn id(&self) -> Id {
        self.local().map(|node| node.id).unwrap_or(Id([0; ID_SIZE]))
    }

    fn find_nodes_near(&self, target: &Id, n: usize) -> Vec<Node> {
        match self.local() {
            Some(local) => closest_in(self.tables.get(&local.id), target, n, None),
            None => vec![],
        }
    }

    fn contact(&self, address: SocketAddr) -> Result<Id, ContactError> {
        self.contacts.fetch_add(1, Ordering::Relaxed);
        self.simulate_latency();

        self.table(address)?;

        self.by_address
            .get(&address)
            .copied()
            .ok_or(ContactError::Unreachable(address))
    }

    fn query_neighbors(
        &self,
        peer: &Node,
        target: &Id,
        n: usize,
        limit: Option<&Distance>,
    ) -> Result<Vec<Node>, ContactError> {
        self.queries.fetch_add(1, Ordering::Relaxed);
        self.simulate_latency();

        let table = self.table(peer.address)?;

        Ok(closest_in(Some(table), target, n, limit))
    }
}

/// A distinct loopback address for the `index`th node, moving to the next
/// host after [PORTS_PER_HOST] ports.
fn address_of(index: usize) -> SocketAddr {
    let host = u32::from(Ipv4Addr::LOCALHOST).wrapping_add((index / PORTS_PER_HOST) as u32);
    let port = FIRST_PORT + (index % PORTS_PER_HOST) as u16;

    SocketAddr::from((Ipv4Addr::from(host), port))
}

/// For every bucket around `node`, keep the `k` members closest to it.
fn build_table(node: &Node, nodes: &[Node], k: usize) -> Vec<Node> {
    let mut buckets: BTreeMap<u8, BTreeMap<Distance, Node>> = BTreeMap::new();

    for other in nodes {
        let distance = other.distance(&node.id);
        if distance.is_zero() {
            continue;
        }

        let bucket = buckets.entry(distance.bucket_index()).or_default();
        bucket.insert(distance, *other);

        if bucket.len() > k {
            bucket.pop_last();
        }
    }

    buckets
        .into_values()
        .flat_map(|bucket| bucket.into_values())
        .collect()
}

fn closest_in(
    table: Option<&Vec<Node>>,
    target: &Id,
    n: usize,
    limit: Option<&Distance>,
) -> Vec<Node> {
    let Some(table) = table else {
        return vec![];
    };

    let sorted = table
        .iter()
        .map(|node| (node.distance(target), *node))
        .filter(|(distance, _)| limit.map_or(true, |limit| distance < limit))
        .collect::<BTreeMap<_, _>>();

    sorted.into_values().take(n).collect()
}
