//! Cache provisioning unit settings

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_MEMORY_SIZE_GB: u32 = 5;
pub const DEFAULT_REPLICA_COUNT: u32 = 1;
pub const MAX_REPLICA_COUNT: u32 = 5;
pub const DEFAULT_REDIS_VERSION: &str = "REDIS_7_0";
pub const DEFAULT_NETWORK: &str = "default";

/// Capacity/availability class of the cache instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tier {
    /// Single node, no failover
    Basic,
    /// Automatic failover, supports read replicas
    #[default]
    HighAvailability,
}

impl Tier {
    pub fn supports_replicas(&self) -> bool {
        matches!(self, Tier::HighAvailability)
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "basic" => Ok(Tier::Basic),
            "high-availability" | "standard-ha" | "ha" => Ok(Tier::HighAvailability),
            other => Err(format!(
                "unknown tier '{}' (expected 'basic' or 'high-availability')",
                other
            )),
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Basic => write!(f, "basic"),
            Tier::HighAvailability => write!(f, "high-availability"),
        }
    }
}

/// In-transit encryption between clients and the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransitEncryption {
    #[default]
    Disabled,
    ServerAuthentication,
}

impl TransitEncryption {
    /// URI scheme clients must use
    pub fn uri_scheme(&self) -> &'static str {
        match self {
            TransitEncryption::Disabled => "redis",
            TransitEncryption::ServerAuthentication => "rediss",
        }
    }
}

impl FromStr for TransitEncryption {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "disabled" | "none" => Ok(TransitEncryption::Disabled),
            "server-authentication" | "tls" => Ok(TransitEncryption::ServerAuthentication),
            other => Err(format!(
                "unknown transit encryption mode '{}' (expected 'disabled' or 'server-authentication')",
                other
            )),
        }
    }
}

/// Weekly slot in which the provider may restart or upgrade the instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceWindow {
    /// Upper-case weekday as the API expects it (SUNDAY, MONDAY, ...)
    pub day: String,
    pub start_hour: u8,
    pub duration_hours: u8,
}

impl Default for MaintenanceWindow {
    /// Sunday 02:00-04:00
    fn default() -> Self {
        Self {
            day: "SUNDAY".to_string(),
            start_hour: 2,
            duration_hours: 2,
        }
    }
}

/// Settings of the cache provisioning unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    pub tier: Tier,

    /// Memory size in GB
    pub memory_size_gb: u32,

    /// Number of read replicas (high-availability only)
    pub replica_count: u32,

    pub redis_version: String,

    /// VPC network name or full resource path
    pub network: String,

    pub auth_enabled: bool,

    pub transit_encryption: TransitEncryption,

    /// IAM member granted read access to the connection secrets
    /// (defaults to the stack's service account)
    pub accessor: Option<String>,

    pub maintenance: MaintenanceWindow,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            tier: Tier::default(),
            memory_size_gb: DEFAULT_MEMORY_SIZE_GB,
            replica_count: DEFAULT_REPLICA_COUNT,
            redis_version: DEFAULT_REDIS_VERSION.to_string(),
            network: DEFAULT_NETWORK.to_string(),
            auth_enabled: true,
            transit_encryption: TransitEncryption::default(),
            accessor: None,
            maintenance: MaintenanceWindow::default(),
        }
    }
}

impl CacheConfig {
    /// Read replicas are enabled exactly when replicas are requested
    pub fn read_replicas_enabled(&self) -> bool {
        self.replica_count > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_parse_aliases() {
        assert_eq!("basic".parse::<Tier>().unwrap(), Tier::Basic);
        assert_eq!("STANDARD_HA".parse::<Tier>().unwrap(), Tier::HighAvailability);
        assert_eq!(
            "high-availability".parse::<Tier>().unwrap(),
            Tier::HighAvailability
        );
        assert!("premium".parse::<Tier>().is_err());
    }

    #[test]
    fn test_defaults_match_parameter_table() {
        let cache = CacheConfig::default();
        assert_eq!(cache.tier, Tier::HighAvailability);
        assert_eq!(cache.memory_size_gb, 5);
        assert_eq!(cache.replica_count, 1);
        assert!(cache.read_replicas_enabled());
        assert_eq!(cache.maintenance.day, "SUNDAY");
        assert_eq!(cache.maintenance.start_hour, 2);
    }

    #[test]
    fn test_transit_encryption_scheme() {
        assert_eq!(TransitEncryption::Disabled.uri_scheme(), "redis");
        assert_eq!(
            "server-authentication"
                .parse::<TransitEncryption>()
                .unwrap()
                .uri_scheme(),
            "rediss"
        );
    }
}
