use std::time::Duration;

use crate::error::{Result, RouterError};
use crate::membership::types::NodeId;

/// Share of the request budget available to hops; the rest covers scheduling and merge.
const HOP_BUDGET_PERCENT: u32 = 95;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_REPLICA_COUNT: usize = 3;
pub const DEFAULT_CACHE_SIZE: usize = 1024;

#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub local_id: NodeId,
    /// Total budget for one request, across every hop of every key.
    pub request_timeout: Duration,
    /// Replicas consulted per key.
    pub replica_count: usize,
    /// Maximum number of cached computations.
    pub cache_size: usize,
}

impl RouterConfig {
    pub fn new(local_id: NodeId) -> Self {
        Self {
            local_id,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            replica_count: DEFAULT_REPLICA_COUNT,
            cache_size: DEFAULT_CACHE_SIZE,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.local_id.0.is_empty() {
            return Err(RouterError::InvalidConfig("local-id must not be empty".into()));
        }
        if self.request_timeout.is_zero() {
            return Err(RouterError::InvalidConfig(
                "request-timeout must be positive".into(),
            ));
        }
        if self.replica_count == 0 || u32::try_from(self.replica_count).is_err() {
            return Err(RouterError::InvalidConfig(format!(
                "replica-count must be between 1 and {}, got {}",
                u32::MAX,
                self.replica_count
            )));
        }
        if self.cache_size == 0 {
            return Err(RouterError::InvalidConfig("cache-size must be at least 1".into()));
        }
        Ok(())
    }

    /// Budget for a single candidate lookup.
    ///
    /// Hops of one key run back to back, so even if all of them time out the key is
    /// settled within 95% of `request_timeout`.
    pub fn hop_timeout(&self) -> Duration {
        let replicas = u32::try_from(self.replica_count.max(1)).unwrap_or(u32::MAX);
        self.request_timeout * HOP_BUDGET_PERCENT / 100 / replicas
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hop_timeout_for_five_seconds_and_four_replicas() {
        let config = RouterConfig {
            request_timeout: Duration::from_secs(5),
            replica_count: 4,
            ..RouterConfig::new(NodeId::from("local"))
        };

        assert_eq!(config.hop_timeout(), Duration::from_micros(1_187_500));
        assert_eq!(config.hop_timeout() * 4, Duration::from_millis(4750));
    }

    #[test]
    fn single_replica_gets_the_whole_hop_budget() {
        let config = RouterConfig {
            request_timeout: Duration::from_secs(2),
            replica_count: 1,
            ..RouterConfig::new(NodeId::from("local"))
        };

        assert_eq!(config.hop_timeout(), Duration::from_millis(1900));
    }

    #[test]
    fn validate_rejects_degenerate_values() {
        let base = RouterConfig::new(NodeId::from("local"));
        assert!(base.validate().is_ok());

        let no_replicas = RouterConfig { replica_count: 0, ..base.clone() };
        assert!(matches!(no_replicas.validate(), Err(RouterError::InvalidConfig(_))));

        let no_cache = RouterConfig { cache_size: 0, ..base.clone() };
        assert!(no_cache.validate().is_err());

        let no_time = RouterConfig { request_timeout: Duration::ZERO, ..base.clone() };
        assert!(no_time.validate().is_err());

        let no_id = RouterConfig { local_id: NodeId::from(""), ..base };
        assert!(no_id.validate().is_err());
    }
}
