//! Miscellaneous common structs used throughout the library.

mod id;
mod node;

pub use id::*;
pub use node::*;

/// K = the default number of closest nodes a lookup collects.
pub const MAX_BUCKET_SIZE_K: usize = 20;
