use std::sync::Arc;

use crate::common::MAX_BUCKET_SIZE_K;
use crate::{Error, Result};

use super::filter::{DefaultFilter, NodeFilter};

/// Default number of concurrent workers, Kademlia's `α`.
pub const DEFAULT_FANOUT: usize = 3;

#[derive(Debug, Clone)]
/// Lookup Configurations
pub struct Config {
    /// Maximum number of closest nodes to collect.
    ///
    /// Defaults to [MAX_BUCKET_SIZE_K]
    pub closest: usize,
    /// Number of workers probing candidates concurrently.
    ///
    /// The higher this is, the faster a lookup converges on a slow network,
    /// at the cost of contacting nodes that a sequential lookup would prune.
    ///
    /// Defaults to [DEFAULT_FANOUT]
    pub fanout: usize,
    /// Filter applied to every contacted node before accepting it as a result.
    ///
    /// Defaults to [DefaultFilter], which accepts every node.
    pub filter: Arc<dyn NodeFilter>,
}

impl Config {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.closest == 0 {
            return Err(Error::InvalidConfig("closest must be at least 1"));
        }
        if self.fanout == 0 {
            return Err(Error::InvalidConfig("fanout must be at least 1"));
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            closest: MAX_BUCKET_SIZE_K,
            fanout: DEFAULT_FANOUT,
            filter: Arc::new(DefaultFilter),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn zero_sizes_are_rejected() {
        let config = Config {
            closest: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let config = Config {
            fanout: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }
}
