//! Engine configuration
//!
//! [`DsrConfig`] combines the settings of every DSR component. The defaults
//! are the protocol's standard timing and sizing constants.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Largest value the 4-bit salvage field can carry
pub const SALVAGE_FIELD_MAX: u8 = 15;

/// Route discovery timing and escalation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Hop limit of the first, neighbors-only request
    pub non_propagating_ttl: u8,
    /// Hop limit of every retried request
    pub propagating_ttl: u8,
    /// Wait before the first retry
    pub non_propagating_timeout: Duration,
    /// Backoff after the first propagating request
    pub request_period: Duration,
    /// Backoff cap
    pub max_request_period: Duration,
    /// Retries before discovery restarts from the non-propagating phase
    pub max_request_retransmissions: u32,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            non_propagating_ttl: 1,
            propagating_ttl: 65,
            non_propagating_timeout: Duration::from_millis(30),
            request_period: Duration::from_millis(500),
            max_request_period: Duration::from_secs(10),
            max_request_retransmissions: 16,
        }
    }
}

/// Route cache sizing and lifetime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteCacheConfig {
    /// How long a route survives without being refreshed
    pub timeout: Duration,
    /// Number of hash buckets
    pub buckets: usize,
    /// Pool growth step
    pub pool_chunk: usize,
}

impl Default for RouteCacheConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            buckets: 100,
            pool_chunk: 100,
        }
    }
}

/// Request table sizing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestTableConfig {
    /// Seen and sent entries combined
    pub capacity: usize,
    /// (identification, target) pairs remembered per source
    pub ids_per_source: usize,
}

impl Default for RequestTableConfig {
    fn default() -> Self {
        Self {
            capacity: 64,
            ids_per_source: 16,
        }
    }
}

/// Send buffer limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendBufferConfig {
    /// Packet limit, used when `max_bytes` is zero
    pub max_packets: usize,
    /// Byte limit; zero means limit by packet count
    pub max_bytes: usize,
    /// How long a packet may wait for a route
    pub timeout: Duration,
}

impl Default for SendBufferConfig {
    fn default() -> Self {
        Self {
            max_packets: 50,
            max_bytes: 0,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Route maintenance: retransmission and salvage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceConfig {
    /// Retransmission buffer capacity
    pub rexmt_buffer_size: usize,
    /// Retransmissions to a next hop before declaring the link broken
    pub max_retransmissions: u32,
    /// Times a single packet may be salvaged
    pub max_salvage_count: u8,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            rexmt_buffer_size: 50,
            max_retransmissions: 2,
            max_salvage_count: SALVAGE_FIELD_MAX,
        }
    }
}

/// Configuration for a DSR instance
///
/// Combines configuration for all DSR components.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DsrConfig {
    /// Route discovery configuration
    pub discovery: DiscoveryConfig,
    /// Route cache configuration
    pub route_cache: RouteCacheConfig,
    /// Request table configuration
    pub request_table: RequestTableConfig,
    /// Send buffer configuration
    pub send_buffer: SendBufferConfig,
    /// Retransmission and salvage configuration
    pub maintenance: MaintenanceConfig,
    /// Upper bound of the random delay applied to requests and replies
    pub broadcast_jitter: Duration,
    /// Largest datagram handed to the link layer, header included
    pub mtu: usize,
    /// Seed for the jitter generator
    pub seed: u64,
    /// Log a statistics summary at finalize
    pub collect_statistics: bool,
}

impl Default for DsrConfig {
    fn default() -> Self {
        Self {
            discovery: DiscoveryConfig::default(),
            route_cache: RouteCacheConfig::default(),
            request_table: RequestTableConfig::default(),
            send_buffer: SendBufferConfig::default(),
            maintenance: MaintenanceConfig::default(),
            broadcast_jitter: Duration::from_millis(100),
            mtu: 2048,
            seed: 0,
            collect_statistics: true,
        }
    }
}

impl DsrConfig {
    /// Default configuration with jitter disabled
    ///
    /// Every request and reply leaves immediately, which makes runs easy to
    /// follow step by step.
    pub fn without_jitter() -> Self {
        Self {
            broadcast_jitter: Duration::ZERO,
            ..Default::default()
        }
    }

    /// Set the jitter seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Check the configuration for values the engine cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.route_cache.buckets == 0 {
            return Err(ConfigError::Invalid("route cache needs at least one bucket".into()));
        }
        if self.request_table.capacity == 0 || self.request_table.ids_per_source == 0 {
            return Err(ConfigError::Invalid("request table capacity must be non-zero".into()));
        }
        if self.send_buffer.max_packets == 0 && self.send_buffer.max_bytes == 0 {
            return Err(ConfigError::Invalid("send buffer has no capacity".into()));
        }
        if self.maintenance.rexmt_buffer_size == 0 {
            return Err(ConfigError::Invalid(
                "retransmission buffer capacity must be non-zero".into(),
            ));
        }
        if self.maintenance.max_salvage_count > SALVAGE_FIELD_MAX {
            return Err(ConfigError::Invalid(format!(
                "salvage count {} does not fit the 4-bit field",
                self.maintenance.max_salvage_count
            )));
        }
        if self.discovery.non_propagating_ttl == 0
            || self.discovery.propagating_ttl <= self.discovery.non_propagating_ttl
        {
            return Err(ConfigError::Invalid(format!(
                "propagating TTL {} must exceed non-propagating TTL {}",
                self.discovery.propagating_ttl, self.discovery.non_propagating_ttl
            )));
        }
        if self.discovery.request_period > self.discovery.max_request_period {
            return Err(ConfigError::Invalid("request period exceeds its cap".into()));
        }
        if self.mtu == 0 {
            return Err(ConfigError::Invalid("mtu is zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = DsrConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.discovery.propagating_ttl, 65);
        assert_eq!(config.send_buffer.max_packets, 50);
        assert_eq!(config.maintenance.max_salvage_count, 15);
    }

    #[test]
    fn test_without_jitter() {
        let config = DsrConfig::without_jitter().with_seed(7);
        assert_eq!(config.broadcast_jitter, Duration::ZERO);
        assert_eq!(config.seed, 7);
        assert_eq!(config.route_cache, RouteCacheConfig::default());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = DsrConfig::default();
        config.maintenance.max_salvage_count = 16;
        assert!(config.validate().is_err());

        let mut config = DsrConfig::default();
        config.discovery.propagating_ttl = 1;
        assert!(config.validate().is_err());

        let mut config = DsrConfig::default();
        config.send_buffer.max_packets = 0;
        assert!(config.validate().is_err());

        // A byte limit alone is enough
        config.send_buffer.max_bytes = 4096;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{ "mtu": 1500, "send_buffer": { "max_packets": 10, "max_bytes": 0, "timeout": { "secs": 5, "nanos": 0 } } }"#;
        let config: DsrConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.mtu, 1500);
        assert_eq!(config.send_buffer.max_packets, 10);
        assert_eq!(config.send_buffer.timeout, Duration::from_secs(5));
        assert_eq!(config.discovery, DiscoveryConfig::default());
    }
}
