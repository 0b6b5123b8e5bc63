//! Google Cloud API seam
//!
//! The provider talks to Google Cloud only through [`GcpApi`]. The real
//! implementation is [`crate::rest::RestApi`]; tests substitute an in-memory
//! fake.

use crate::error::{GcpError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Resource types managed by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    RedisInstance,
    Secret,
    /// Latest version of a secret; not an addressable API object
    SecretVersion,
    /// One role binding on a secret or bucket policy
    IamMember,
    StorageBucket,
    GlobalAddress,
    SslCertificate,
    BackendBucket,
    UrlMap,
    TargetHttpsProxy,
    TargetHttpProxy,
    ForwardingRule,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 12] = [
        ResourceKind::RedisInstance,
        ResourceKind::Secret,
        ResourceKind::SecretVersion,
        ResourceKind::IamMember,
        ResourceKind::StorageBucket,
        ResourceKind::GlobalAddress,
        ResourceKind::SslCertificate,
        ResourceKind::BackendBucket,
        ResourceKind::UrlMap,
        ResourceKind::TargetHttpsProxy,
        ResourceKind::TargetHttpProxy,
        ResourceKind::ForwardingRule,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::RedisInstance => "redis-instance",
            ResourceKind::Secret => "secret",
            ResourceKind::SecretVersion => "secret-version",
            ResourceKind::IamMember => "iam-member",
            ResourceKind::StorageBucket => "storage-bucket",
            ResourceKind::GlobalAddress => "global-address",
            ResourceKind::SslCertificate => "ssl-certificate",
            ResourceKind::BackendBucket => "backend-bucket",
            ResourceKind::UrlMap => "url-map",
            ResourceKind::TargetHttpsProxy => "target-https-proxy",
            ResourceKind::TargetHttpProxy => "target-http-proxy",
            ResourceKind::ForwardingRule => "forwarding-rule",
        }
    }

    /// Compute Engine global collection name
    pub fn compute_collection(&self) -> Option<&'static str> {
        match self {
            ResourceKind::GlobalAddress => Some("addresses"),
            ResourceKind::SslCertificate => Some("sslCertificates"),
            ResourceKind::BackendBucket => Some("backendBuckets"),
            ResourceKind::UrlMap => Some("urlMaps"),
            ResourceKind::TargetHttpsProxy => Some("targetHttpsProxies"),
            ResourceKind::TargetHttpProxy => Some("targetHttpProxies"),
            ResourceKind::ForwardingRule => Some("forwardingRules"),
            _ => None,
        }
    }

    /// Kinds that exist as API objects of their own
    pub fn is_addressable(&self) -> bool {
        !matches!(self, ResourceKind::SecretVersion | ResourceKind::IamMember)
    }

    /// Kinds that cannot be changed in place
    pub fn replace_only(&self) -> bool {
        matches!(
            self,
            ResourceKind::GlobalAddress | ResourceKind::SslCertificate | ResourceKind::ForwardingRule
        )
    }

    /// Top-level fields whose change forces a replacement
    pub fn immutable_fields(&self) -> &'static [&'static str] {
        match self {
            ResourceKind::RedisInstance => &["tier", "authorizedNetwork", "transitEncryptionMode"],
            ResourceKind::StorageBucket => &["location"],
            _ => &[],
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = GcpError;

    fn from_str(s: &str) -> Result<Self> {
        ResourceKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| GcpError::Unsupported(s.to_string()))
    }
}

/// An API object, identified by kind and short name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId {
    pub kind: ResourceKind,
    pub name: String,
}

impl ResourceId {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    /// Engine resource key (`type:name`)
    pub fn key(&self) -> String {
        format!("{}:{}", self.kind, self.name)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.name)
    }
}

/// Operations the provider needs from Google Cloud
///
/// Mutations return once the change is durable; long-running operations are
/// awaited by the implementation. Instance readiness is polled separately by
/// the provider.
#[async_trait]
pub trait GcpApi: Send + Sync {
    /// Account the calls are made as
    async fn account(&self) -> Result<String>;

    /// Fetch an object; `None` when it does not exist
    async fn get(&self, id: &ResourceId) -> Result<Option<Value>>;

    async fn insert(&self, id: &ResourceId, body: &Value) -> Result<()>;

    /// Change an existing object in place
    async fn update(&self, id: &ResourceId, body: &Value) -> Result<()>;

    async fn delete(&self, id: &ResourceId) -> Result<()>;

    /// Delete every object stored in a bucket; returns how many were removed
    async fn empty_bucket(&self, bucket: &str) -> Result<usize>;

    /// Names of objects of `kind` whose name starts with `prefix`
    async fn list_names(&self, kind: ResourceKind, prefix: &str) -> Result<Vec<String>>;

    /// Payload of the latest enabled version; `None` if there is none
    async fn latest_secret_payload(&self, secret: &str) -> Result<Option<String>>;

    /// Add a version and return its resource name
    async fn add_secret_version(&self, secret: &str, payload: &str) -> Result<String>;

    /// Members bound to `role` on a secret or bucket
    async fn get_iam_members(&self, target: &ResourceId, role: &str) -> Result<Vec<String>>;

    /// Replace the members bound to `role`, leaving other roles untouched
    async fn set_iam_members(&self, target: &ResourceId, role: &str, members: &[String])
    -> Result<()>;
}

/// Set the members of one role in an IAM policy document
///
/// An empty member list removes the binding.
pub fn set_binding(policy: &mut Value, role: &str, members: &[String]) {
    let Some(obj) = policy.as_object_mut() else {
        return;
    };
    let bindings = obj
        .entry("bindings")
        .or_insert_with(|| Value::Array(Vec::new()));
    let Some(list) = bindings.as_array_mut() else {
        return;
    };

    list.retain(|b| b.get("role").and_then(Value::as_str) != Some(role));
    if !members.is_empty() {
        list.push(serde_json::json!({ "role": role, "members": members }));
    }
}

/// Members bound to one role in an IAM policy document
pub fn binding_members(policy: &Value, role: &str) -> Vec<String> {
    policy
        .get("bindings")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter(|b| b.get("role").and_then(Value::as_str) == Some(role))
        .filter_map(|b| b.get("members").and_then(Value::as_array))
        .flatten()
        .filter_map(|m| m.as_str().map(String::from))
        .collect()
}
