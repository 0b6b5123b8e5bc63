//! cache block

use super::{required_string, required_switch, required_u32};
use crate::error::{Result, StackError};
use crate::model::CacheConfig;
use kdl::KdlNode;

pub fn parse_cache(node: &KdlNode) -> Result<CacheConfig> {
    let mut cache = CacheConfig::default();

    let Some(children) = node.children() else {
        return Ok(cache);
    };

    for child in children.nodes() {
        match child.name().value() {
            "tier" => {
                cache.tier = required_string(child)?
                    .parse()
                    .map_err(StackError::InvalidConfig)?;
            }
            "memory-size-gb" | "memory_size_gb" | "memory-size" => {
                cache.memory_size_gb = required_u32(child)?;
            }
            "replica-count" | "replica_count" | "replicas" => {
                cache.replica_count = required_u32(child)?;
            }
            "redis-version" | "redis_version" | "version" => {
                cache.redis_version = required_string(child)?;
            }
            "network" => cache.network = required_string(child)?,
            "auth" => cache.auth_enabled = required_switch(child)?,
            "transit-encryption" | "transit_encryption" => {
                cache.transit_encryption = required_string(child)?
                    .parse()
                    .map_err(StackError::InvalidConfig)?;
            }
            "accessor" => cache.accessor = Some(required_string(child)?),
            other => {
                return Err(StackError::InvalidConfig(format!(
                    "unknown cache setting '{}'",
                    other
                )));
            }
        }
    }

    Ok(cache)
}
