//! Resource naming
//!
//! Every Google Cloud name is derived from the [`StackContext`], so builders
//! and the output computation agree on them.

use crate::api::{ResourceId, ResourceKind};
use sha2::{Digest, Sha256};
use skyforge_core::StackContext;

/// Role that lets the accessor read secret payloads
pub const SECRET_ACCESSOR_ROLE: &str = "roles/secretmanager.secretAccessor";

/// Role that makes bucket objects publicly readable
pub const OBJECT_VIEWER_ROLE: &str = "roles/storage.objectViewer";

/// Names of every resource of one stack
#[derive(Debug, Clone)]
pub struct Names {
    project: String,
    prefix: String,
    bucket: String,
}

impl Names {
    pub fn new(ctx: &StackContext) -> Self {
        Self {
            project: ctx.project.clone(),
            prefix: ctx.prefix(),
            bucket: ctx.frontend_bucket_name(),
        }
    }

    fn named(&self, suffix: &str) -> String {
        format!("{}-{}", self.prefix, suffix)
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn redis_instance(&self) -> ResourceId {
        ResourceId::new(ResourceKind::RedisInstance, self.named("cache"))
    }

    /// Secret holding one connection coordinate (`host`, `port`, `auth`)
    pub fn secret(&self, coordinate: &str) -> ResourceId {
        ResourceId::new(ResourceKind::Secret, self.named(&format!("redis-{}", coordinate)))
    }

    pub fn secret_version(&self, coordinate: &str) -> ResourceId {
        ResourceId::new(ResourceKind::SecretVersion, self.secret(coordinate).name)
    }

    /// Binding pseudo-resource; `--` separates target and role
    pub fn iam_member(&self, target: &ResourceId, role: &str) -> ResourceId {
        let role_short = role.rsplit('.').next().unwrap_or(role);
        ResourceId::new(
            ResourceKind::IamMember,
            format!("{}--{}", target.name, role_short),
        )
    }

    pub fn bucket(&self) -> ResourceId {
        ResourceId::new(ResourceKind::StorageBucket, self.bucket.clone())
    }

    pub fn address(&self) -> ResourceId {
        ResourceId::new(ResourceKind::GlobalAddress, self.named("ip"))
    }

    /// Prefix shared by every certificate of this stack
    pub fn certificate_prefix(&self) -> String {
        self.named("cert-")
    }

    /// Certificate for a domain set; a different set yields a different name
    pub fn certificate(&self, normalized_domains: &[String]) -> ResourceId {
        ResourceId::new(
            ResourceKind::SslCertificate,
            format!("{}{}", self.certificate_prefix(), domains_hash(normalized_domains)),
        )
    }

    pub fn backend_bucket(&self) -> ResourceId {
        ResourceId::new(ResourceKind::BackendBucket, self.named("backend"))
    }

    pub fn https_url_map(&self) -> ResourceId {
        ResourceId::new(ResourceKind::UrlMap, self.named("url-map"))
    }

    pub fn redirect_url_map(&self) -> ResourceId {
        ResourceId::new(ResourceKind::UrlMap, self.named("http-redirect"))
    }

    pub fn https_proxy(&self) -> ResourceId {
        ResourceId::new(ResourceKind::TargetHttpsProxy, self.named("https-proxy"))
    }

    pub fn http_proxy(&self) -> ResourceId {
        ResourceId::new(ResourceKind::TargetHttpProxy, self.named("http-proxy"))
    }

    pub fn https_rule(&self) -> ResourceId {
        ResourceId::new(ResourceKind::ForwardingRule, self.named("https-rule"))
    }

    pub fn http_rule(&self) -> ResourceId {
        ResourceId::new(ResourceKind::ForwardingRule, self.named("http-rule"))
    }
}

/// First 8 hex digits of the SHA-256 of the sorted domain list
fn domains_hash(normalized_domains: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized_domains.join(",").as_bytes());
    hex::encode(hasher.finalize())[..8].to_string()
}
