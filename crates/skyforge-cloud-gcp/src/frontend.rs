//! Frontend delivery unit
//!
//! A public website bucket behind Cloud CDN and a global external HTTPS
//! load balancer with a managed certificate, plus a port 80 redirect to
//! HTTPS. Both forwarding rules share one reserved address.

use crate::cache::resource;
use crate::names::{Names, OBJECT_VIEWER_ROLE};
use serde_json::{Value, json};
use skyforge_cloud::ResourceSet;
use skyforge_cloud::reference::attr;
use skyforge_core::{FrontendConfig, StackContext};

pub const DEFAULT_TTL_SECS: u32 = 3600;
pub const CLIENT_TTL_SECS: u32 = 3600;
pub const MAX_TTL_SECS: u32 = 86400;

/// Cache-key fields a backend bucket accepts; host and protocol are never
/// part of its key and query strings only through the allowlist
pub const BACKEND_BUCKET_CACHE_KEY_FIELDS: &[&str] =
    &["includeHttpHeaders", "queryStringWhitelist"];

/// Public read grantee on the bucket
pub const PUBLIC_MEMBER: &str = "allUsers";

fn cdn_policy() -> Value {
    json!({
        "cacheMode": "CACHE_ALL_STATIC",
        "defaultTtl": DEFAULT_TTL_SECS,
        "clientTtl": CLIENT_TTL_SECS,
        "maxTtl": MAX_TTL_SECS,
        "negativeCaching": true,
    })
}

fn bucket_body(ctx: &StackContext, frontend: &FrontendConfig, name: &str) -> Value {
    json!({
        "name": name,
        "location": frontend.location,
        "storageClass": "STANDARD",
        "website": {
            "mainPageSuffix": frontend.entry_document,
            // client-side routing: unknown paths serve the app
            "notFoundPage": frontend.entry_document,
        },
        "iamConfiguration": {
            "uniformBucketLevelAccess": { "enabled": true },
        },
        "cors": [{
            "origin": ["*"],
            "method": ["GET", "HEAD"],
            "responseHeader": ["Content-Type"],
            "maxAgeSeconds": 3600,
        }],
        "labels": ctx.resource_labels(),
    })
}

/// Desired resources of the frontend unit
pub fn frontend_resources(ctx: &StackContext, frontend: &FrontendConfig) -> ResourceSet {
    let names = Names::new(ctx);
    let bucket = names.bucket();
    let address = names.address();
    let certificate = names.certificate(&frontend.normalized_domains());
    let backend = names.backend_bucket();
    let url_map = names.https_url_map();
    let https_proxy = names.https_proxy();
    let redirect_map = names.redirect_url_map();
    let http_proxy = names.http_proxy();

    let mut set = ResourceSet::new();

    set.add(resource(&bucket, bucket_body(ctx, frontend, &bucket.name)));

    set.add(
        resource(
            &names.iam_member(&bucket, OBJECT_VIEWER_ROLE),
            json!({
                "target": { "kind": bucket.kind, "name": bucket.name },
                "role": OBJECT_VIEWER_ROLE,
                "members": [PUBLIC_MEMBER],
                "exclusive": false,
            }),
        )
        .depends_on(bucket.key()),
    );

    set.add(resource(
        &address,
        json!({
            "name": address.name,
            "addressType": "EXTERNAL",
            "ipVersion": "IPV4",
        }),
    ));

    set.add(
        resource(
            &certificate,
            json!({
                "name": certificate.name,
                "type": "MANAGED",
                "managed": { "domains": frontend.normalized_domains() },
            }),
        )
        .create_before_destroy(),
    );

    set.add(resource(
        &backend,
        json!({
            "name": backend.name,
            "bucketName": attr(bucket.key(), "name"),
            "enableCdn": true,
            "cdnPolicy": cdn_policy(),
        }),
    ));

    set.add(resource(
        &url_map,
        json!({
            "name": url_map.name,
            "defaultService": attr(backend.key(), "selfLink"),
        }),
    ));

    set.add(resource(
        &https_proxy,
        json!({
            "name": https_proxy.name,
            "urlMap": attr(url_map.key(), "selfLink"),
            "sslCertificates": [attr(certificate.key(), "selfLink")],
        }),
    ));

    set.add(forwarding_rule(&names.https_rule().name, &address.key(), &https_proxy.key(), 443));

    set.add(resource(
        &redirect_map,
        json!({
            "name": redirect_map.name,
            "defaultUrlRedirect": {
                "httpsRedirect": true,
                "redirectResponseCode": "MOVED_PERMANENTLY_DEFAULT",
                "stripQuery": false,
            },
        }),
    ));

    set.add(resource(
        &http_proxy,
        json!({
            "name": http_proxy.name,
            "urlMap": attr(redirect_map.key(), "selfLink"),
        }),
    ));

    set.add(forwarding_rule(&names.http_rule().name, &address.key(), &http_proxy.key(), 80));

    set
}

fn forwarding_rule(
    name: &str,
    address_key: &str,
    target_key: &str,
    port: u16,
) -> skyforge_cloud::ResourceConfig {
    let id = crate::api::ResourceId::new(crate::api::ResourceKind::ForwardingRule, name);
    resource(
        &id,
        json!({
            "name": name,
            "IPAddress": attr(address_key, "address"),
            "IPProtocol": "TCP",
            "portRange": port.to_string(),
            "loadBalancingScheme": "EXTERNAL",
            "target": attr(target_key, "selfLink"),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use skyforge_cloud::DependencyGraph;
    use skyforge_cloud::reference::references;
    use skyforge_core::Stack;

    fn ctx() -> StackContext {
        Stack {
            project: "demo-project".to_string(),
            ..Default::default()
        }
        .context()
    }

    fn two_domains() -> FrontendConfig {
        FrontendConfig {
            domains: vec!["b.example.com".to_string(), "a.example.com".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_bucket_serves_entry_document_for_missing_paths() {
        let set = frontend_resources(&ctx(), &FrontendConfig::default());
        let bucket = &set.by_type("storage-bucket")[0].config;
        assert_eq!(bucket["website"]["mainPageSuffix"], bucket["website"]["notFoundPage"]);
        assert_eq!(bucket["website"]["notFoundPage"], "index.html");
        assert_eq!(bucket["iamConfiguration"]["uniformBucketLevelAccess"]["enabled"], true);
    }

    #[test]
    fn test_one_certificate_covers_all_domains() {
        let set = frontend_resources(&ctx(), &two_domains());
        let certs = set.by_type("ssl-certificate");
        assert_eq!(certs.len(), 1);
        assert_eq!(
            certs[0].config["managed"]["domains"],
            json!(["a.example.com", "b.example.com"])
        );
        assert!(certs[0].lifecycle.create_before_destroy);
    }

    #[test]
    fn test_rules_share_one_address() {
        let set = frontend_resources(&ctx(), &two_domains());
        assert_eq!(set.by_type("global-address").len(), 1);

        let rules = set.by_type("forwarding-rule");
        assert_eq!(rules.len(), 2);

        let mut ports: Vec<&str> = rules
            .iter()
            .map(|r| r.config["portRange"].as_str().unwrap())
            .collect();
        ports.sort();
        assert_eq!(ports, vec!["443", "80"]);

        for rule in rules {
            let refs = references(&rule.config["IPAddress"]);
            assert_eq!(refs[0].resource, "global-address:chatbot-production-ip");
            assert_eq!(refs[0].attribute, "address");
        }
    }

    #[test]
    fn test_cdn_policy() {
        let set = frontend_resources(&ctx(), &FrontendConfig::default());
        let backend = &set.by_type("backend-bucket")[0].config;
        assert_eq!(backend["enableCdn"], true);
        assert_eq!(backend["cdnPolicy"]["cacheMode"], "CACHE_ALL_STATIC");
        assert_eq!(backend["cdnPolicy"]["defaultTtl"], 3600);
        assert_eq!(backend["cdnPolicy"]["maxTtl"], 86400);
        assert_eq!(backend["cdnPolicy"]["negativeCaching"], true);
        let key_policy = backend["cdnPolicy"]["cacheKeyPolicy"]
            .as_object()
            .cloned()
            .unwrap_or_default();
        assert!(
            key_policy
                .keys()
                .all(|k| BACKEND_BUCKET_CACHE_KEY_FIELDS.contains(&k.as_str()))
        );
        assert!(key_policy.get("queryStringWhitelist").is_none());
    }

    #[test]
    fn test_certificate_precedes_https_proxy() {
        let set = frontend_resources(&ctx(), &FrontendConfig::default());
        let graph = DependencyGraph::from_resources(&set).unwrap();
        let order = graph.order().unwrap();
        let pos = |prefix: &str| order.iter().position(|k| k.starts_with(prefix)).unwrap();

        assert!(pos("ssl-certificate:") < pos("target-https-proxy:"));
        assert!(pos("backend-bucket:") < pos("url-map:chatbot-production-url-map"));
        assert!(pos("target-https-proxy:") < pos("forwarding-rule:chatbot-production-https-rule"));
        assert!(pos("target-http-proxy:") < pos("forwarding-rule:chatbot-production-http-rule"));
    }

    #[test]
    fn test_bucket_is_public() {
        let set = frontend_resources(&ctx(), &FrontendConfig::default());
        let binding = &set.by_type("iam-member")[0].config;
        assert_eq!(binding["role"], OBJECT_VIEWER_ROLE);
        assert_eq!(binding["members"], json!(["allUsers"]));
        assert_eq!(binding["exclusive"], false);
    }
}
