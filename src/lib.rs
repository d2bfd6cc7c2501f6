#![doc = include_str!("../README.md")]
//! ## Feature flags
#![doc = document_features::document_features!()]
//!

// Public modules
mod common;

mod error;
mod network;
pub mod search;
pub mod testnet;

pub use crate::common::{Distance, Id, Node, ID_SIZE, MAX_BUCKET_SIZE_K, MAX_DISTANCE};
pub use error::{ContactError, Error};
pub use network::LocalNode;
pub use search::{
    Config, DefaultFilter, KadSearch, Lookup, NodeFilter, SearchStats, SearchStatus,
};
pub use testnet::Testnet;

/// Alias for `Result<T, kad_search::Error>`
pub type Result<T, E = Error> = std::result::Result<T, E>;
