//! Main Crate Error

use std::net::SocketAddr;

use crate::Id;

#[derive(thiserror::Error, Debug)]
/// kad-search crate error enum.
pub enum Error {
    /// Id was built from a byte slice of the wrong length.
    #[error("Invalid Id size, expected 20, got {0}")]
    InvalidIdSize(usize),

    /// Id string is not 40 hex characters.
    #[error("Invalid Id encoding: {0}")]
    InvalidIdEncoding(String),

    /// Search configuration can not produce a meaningful lookup.
    #[error("Invalid search config: {0}")]
    InvalidConfig(&'static str),

    /// [crate::KadSearch::start] was called more than once.
    #[error("Search was already started")]
    AlreadyStarted,

    /// [crate::KadSearch::wait] was called before [crate::KadSearch::start].
    #[error("Search was not started")]
    NotStarted,

    #[error(transparent)]
    /// Failed to spawn a worker thread.
    Spawn(#[from] std::io::Error),
}

#[derive(thiserror::Error, Debug)]
/// Failure to contact a single candidate, or to get its neighbors.
///
/// These errors never abort a search, the candidate is skipped instead.
pub enum ContactError {
    /// Nothing answered at this address.
    #[error("Node at {0} is unreachable")]
    Unreachable(SocketAddr),

    /// The node did not answer in time.
    #[error("Request to {0} timed out")]
    Timeout(SocketAddr),

    /// The node answered with something unexpected.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The [crate::NodeFilter] refused this node.
    #[error("Node {0} was rejected by the filter")]
    Rejected(Id),

    #[error(transparent)]
    /// Transparent [std::io::Error]
    IO(#[from] std::io::Error),
}
