//! Scripted [LocalNode] double shared by integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use flume::Receiver;
use kad_search::{ContactError, Distance, Id, LocalNode, Node, ID_SIZE};

/// Every lookup target in these tests is the all-zero Id, so a node's
/// last byte is its distance to the target.
pub fn target() -> Id {
    Id([0; ID_SIZE])
}

pub fn id_at(distance: u8) -> Id {
    let mut bytes = [0; ID_SIZE];
    bytes[ID_SIZE - 1] = distance;
    Id(bytes)
}

/// Poll `condition` until it holds, panicking after a few seconds.
pub fn eventually<F: Fn() -> bool>(condition: F) {
    let deadline = Instant::now() + Duration::from_secs(5);

    while !condition() {
        assert!(Instant::now() < deadline, "condition never held");
        thread::sleep(Duration::from_millis(1));
    }
}

pub fn node_at(distance: u8) -> Node {
    Node::new(
        id_at(distance),
        SocketAddr::from(([127, 0, 0, 1], 20_000 + distance as u16)),
    )
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Contact(SocketAddr),
    Query {
        peer: Id,
        limit: Option<Distance>,
    },
}

#[derive(Debug, Default)]
struct Peer {
    reachable: bool,
    neighbors: Vec<Node>,
    failing_query: bool,
}

#[derive(Debug)]
pub struct ScriptedNode {
    local: Id,
    seeds: Vec<Node>,
    peers: HashMap<SocketAddr, (Id, Peer)>,
    gate: Option<Receiver<()>>,
    gates: HashMap<SocketAddr, Receiver<()>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedNode {
    pub fn new() -> Self {
        let mut local = [0xff; ID_SIZE];
        local[0] = 0x7f;

        Self {
            local: Id(local),
            seeds: vec![],
            peers: HashMap::new(),
            gate: None,
            gates: HashMap::new(),
            calls: Mutex::new(vec![]),
        }
    }

    /// Known by the local routing table.
    pub fn seed(mut self, node: Node) -> Self {
        self.seeds.push(node);
        self
    }

    /// Reachable, answering a neighbors query with `neighbors`.
    pub fn peer(mut self, node: Node, neighbors: Vec<Node>) -> Self {
        self.peers.insert(
            node.address,
            (
                node.id,
                Peer {
                    reachable: true,
                    neighbors,
                    failing_query: false,
                },
            ),
        );
        self
    }

    /// Fails every contact.
    pub fn unreachable(mut self, node: Node) -> Self {
        self.peers.insert(node.address, (node.id, Peer::default()));
        self
    }

    /// Reachable, but its neighbors query fails.
    pub fn failing_query(mut self, node: Node) -> Self {
        self.peers.insert(
            node.address,
            (
                node.id,
                Peer {
                    reachable: true,
                    neighbors: vec![],
                    failing_query: true,
                },
            ),
        );
        self
    }

    /// Every contact blocks until `gate` yields or disconnects.
    pub fn gated(mut self, gate: Receiver<()>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Contacts to `node` block until `gate` yields or disconnects.
    pub fn gated_at(mut self, node: Node, gate: Receiver<()>) -> Self {
        self.gates.insert(node.address, gate);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn contacted(&self, node: &Node) -> bool {
        self.calls().contains(&Call::Contact(node.address))
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl LocalNode for ScriptedNode {
    fn id(&self) -> Id {
        self.local
    }

    /// Every seed, whatever `n` is, so tests control the initial queue exactly.
    fn find_nodes_near(&self, _target: &Id, _n: usize) -> Vec<Node> {
        self.seeds.clone()
    }

    fn contact(&self, address: SocketAddr) -> Result<Id, ContactError> {
        self.record(Call::Contact(address));

        if let Some(gate) = &self.gate {
            let _ = gate.recv();
        }
        if let Some(gate) = self.gates.get(&address) {
            let _ = gate.recv();
        }

        match self.peers.get(&address) {
            Some((id, peer)) if peer.reachable => Ok(*id),
            _ => Err(ContactError::Unreachable(address)),
        }
    }

    fn query_neighbors(
        &self,
        peer: &Node,
        _target: &Id,
        n: usize,
        limit: Option<&Distance>,
    ) -> Result<Vec<Node>, ContactError> {
        self.record(Call::Query {
            peer: peer.id,
            limit: limit.copied(),
        });

        match self.peers.get(&peer.address) {
            Some((_, peer)) if peer.failing_query => {
                Err(ContactError::Protocol("malformed response".to_string()))
            }
            // Ignores `limit`, pruning is up to the search.
            Some((_, peer)) => Ok(peer.neighbors.iter().take(n).copied().collect()),
            None => Err(ContactError::Unreachable(peer.address)),
        }
    }
}
