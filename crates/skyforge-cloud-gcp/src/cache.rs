//! Cache provisioning unit
//!
//! One Memorystore for Redis instance, a secret per connection coordinate
//! filled from the instance's runtime attributes, and an accessor binding on
//! each secret.

use crate::PROVIDER_NAME;
use crate::api::ResourceId;
use crate::names::{Names, SECRET_ACCESSOR_ROLE};
use serde_json::{Value, json};
use skyforge_cloud::reference::attr;
use skyforge_cloud::{ResourceConfig, ResourceSet};
use skyforge_core::{CacheConfig, StackContext, Tier};

/// Connection coordinates published as secrets, with the instance attribute
/// each one is read from
pub fn coordinates(cache: &CacheConfig) -> Vec<(&'static str, &'static str)> {
    let mut coordinates = vec![("host", "host"), ("port", "port")];
    if cache.auth_enabled {
        coordinates.push(("auth", "authString"));
    }
    coordinates
}

/// Eviction and keyspace settings applied to every instance
fn redis_configs() -> Value {
    json!({
        "maxmemory-policy": "allkeys-lru",
        "notify-keyspace-events": "Ex",
        "timeout": "300",
    })
}

/// `default` becomes `projects/<project>/global/networks/default`
fn network_path(project: &str, network: &str) -> String {
    if network.contains('/') {
        network.to_string()
    } else {
        format!("projects/{}/global/networks/{}", project, network)
    }
}

fn instance_body(ctx: &StackContext, cache: &CacheConfig) -> Value {
    let mut body = json!({
        "tier": match cache.tier {
            Tier::Basic => "BASIC",
            Tier::HighAvailability => "STANDARD_HA",
        },
        "memorySizeGb": cache.memory_size_gb,
        "redisVersion": cache.redis_version,
        "authorizedNetwork": network_path(&ctx.project, &cache.network),
        "connectMode": "DIRECT_PEERING",
        "authEnabled": cache.auth_enabled,
        "transitEncryptionMode": match cache.transit_encryption {
            skyforge_core::TransitEncryption::Disabled => "DISABLED",
            skyforge_core::TransitEncryption::ServerAuthentication => "SERVER_AUTHENTICATION",
        },
        "readReplicasMode": if cache.read_replicas_enabled() {
            "READ_REPLICAS_ENABLED"
        } else {
            "READ_REPLICAS_DISABLED"
        },
        "redisConfigs": redis_configs(),
        "maintenancePolicy": {
            "weeklyMaintenanceWindow": [{
                "day": cache.maintenance.day,
                "startTime": { "hours": cache.maintenance.start_hour, "minutes": 0 },
            }],
        },
        "labels": ctx.resource_labels(),
    });

    // BASIC instances reject a replica count
    if cache.tier == Tier::HighAvailability {
        body["replicaCount"] = json!(cache.replica_count);
    }
    body
}

/// Desired resources of the cache unit
pub fn cache_resources(ctx: &StackContext, cache: &CacheConfig) -> ResourceSet {
    let names = Names::new(ctx);
    let instance = names.redis_instance();
    let accessor = cache
        .accessor
        .clone()
        .unwrap_or_else(|| ctx.default_accessor());

    let mut set = ResourceSet::new();
    set.add(resource(&instance, instance_body(ctx, cache)));

    for (coordinate, attribute) in coordinates(cache) {
        let secret = names.secret(coordinate);
        set.add(resource(
            &secret,
            json!({
                "replication": { "automatic": {} },
                "labels": ctx.resource_labels(),
            }),
        ));

        set.add(
            resource(
                &names.secret_version(coordinate),
                json!({
                    "secret": secret.name,
                    "payload": attr(instance.key(), attribute),
                }),
            )
            .depends_on(secret.key()),
        );

        set.add(
            resource(
                &names.iam_member(&secret, SECRET_ACCESSOR_ROLE),
                json!({
                    "target": { "kind": secret.kind, "name": secret.name },
                    "role": SECRET_ACCESSOR_ROLE,
                    "members": [accessor],
                    "exclusive": true,
                }),
            )
            .depends_on(secret.key()),
        );
    }

    set
}

pub(crate) fn resource(id: &ResourceId, body: Value) -> ResourceConfig {
    ResourceConfig::new(id.kind.as_str(), id.name.clone(), PROVIDER_NAME, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use skyforge_cloud::DependencyGraph;
    use skyforge_core::Stack;

    fn ctx() -> StackContext {
        Stack {
            project: "demo-project".to_string(),
            ..Default::default()
        }
        .context()
    }

    #[test]
    fn test_high_availability_body() {
        let cache = CacheConfig {
            replica_count: 2,
            ..Default::default()
        };
        let set = cache_resources(&ctx(), &cache);
        let instance = set.get("redis-instance", "chatbot-production-cache").unwrap();

        assert_eq!(instance.config["tier"], "STANDARD_HA");
        assert_eq!(instance.config["replicaCount"], 2);
        assert_eq!(instance.config["readReplicasMode"], "READ_REPLICAS_ENABLED");
        assert_eq!(
            instance.config["authorizedNetwork"],
            "projects/demo-project/global/networks/default"
        );
        assert_eq!(instance.config["redisConfigs"]["maxmemory-policy"], "allkeys-lru");
        assert_eq!(
            instance.config["maintenancePolicy"]["weeklyMaintenanceWindow"][0]["day"],
            "SUNDAY"
        );
    }

    #[test]
    fn test_read_replicas_disabled_without_replicas() {
        let cache = CacheConfig {
            tier: Tier::Basic,
            replica_count: 0,
            ..Default::default()
        };
        let set = cache_resources(&ctx(), &cache);
        let instance = set.get("redis-instance", "chatbot-production-cache").unwrap();

        assert_eq!(instance.config["tier"], "BASIC");
        assert_eq!(instance.config["readReplicasMode"], "READ_REPLICAS_DISABLED");
        assert!(instance.config.get("replicaCount").is_none());
    }

    #[test]
    fn test_three_secrets_with_versions_and_bindings() {
        let set = cache_resources(&ctx(), &CacheConfig::default());

        assert_eq!(set.by_type("secret").len(), 3);
        assert_eq!(set.by_type("secret-version").len(), 3);
        assert_eq!(set.by_type("iam-member").len(), 3);

        for binding in set.by_type("iam-member") {
            assert_eq!(
                binding.config["members"],
                json!(["serviceAccount:chatbot-production@demo-project.iam.gserviceaccount.com"])
            );
            assert_eq!(binding.config["exclusive"], true);
        }
    }

    #[test]
    fn test_auth_secret_omitted_when_auth_disabled() {
        let cache = CacheConfig {
            auth_enabled: false,
            ..Default::default()
        };
        let set = cache_resources(&ctx(), &cache);
        assert_eq!(set.by_type("secret").len(), 2);
        assert!(set.get("secret", "chatbot-production-redis-auth").is_none());
    }

    #[test]
    fn test_versions_wait_for_instance() {
        let set = cache_resources(&ctx(), &CacheConfig::default());
        let graph = DependencyGraph::from_resources(&set).unwrap();
        let waves = graph.wave_index().unwrap();

        let instance = waves["redis-instance:chatbot-production-cache"];
        for version in set.by_type("secret-version") {
            assert!(waves[&version.key()] > instance);
            assert!(waves[&version.key()] > waves[&format!("secret:{}", version.id)]);
        }
    }
}
