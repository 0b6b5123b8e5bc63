//! Cloud provider trait definition

use crate::action::{Action, ApplyResult, Plan};
use crate::error::Result;
use crate::reference::{self, Attributes};
use crate::state::ProviderState;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Cloud provider abstraction trait
///
/// A provider turns a desired [`ResourceSet`] into a [`Plan`] and knows how
/// to carry out a single planned [`Action`]. Wave ordering, reference
/// resolution and failure handling live in [`crate::executor`] and are
/// shared by every provider.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Returns the provider name (e.g., "google-cloud")
    fn name(&self) -> &str;

    /// Returns the provider display name for UI
    fn display_name(&self) -> &str;

    /// Check if the provider is properly configured and authenticated
    async fn check_auth(&self) -> Result<AuthStatus>;

    /// Get the live state of the resources named in `desired`
    async fn get_state(&self, desired: &ResourceSet) -> Result<ProviderState>;

    /// Calculate the diff between desired and live state
    async fn plan(&self, desired: &ResourceSet) -> Result<Plan>;

    /// Plan the removal of every resource in `desired` that still exists
    async fn plan_destroy(&self, desired: &ResourceSet) -> Result<Plan>;

    /// Carry out one action whose body has already been resolved
    ///
    /// Returns the runtime attributes of the resource afterwards, which
    /// downstream actions may reference. No-op actions still report
    /// attributes.
    async fn apply_action(&self, action: &Action) -> Result<Attributes>;

    /// Apply the planned actions wave by wave
    async fn apply(&self, plan: &Plan) -> Result<ApplyResult> {
        crate::executor::execute(self, plan).await
    }
}

/// Authentication status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStatus {
    /// Whether authentication is valid
    pub authenticated: bool,

    /// Account/user information if available
    pub account_info: Option<String>,

    /// Error message if not authenticated
    pub error: Option<String>,
}

impl AuthStatus {
    pub fn ok(account_info: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            account_info: Some(account_info.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            account_info: None,
            error: Some(error.into()),
        }
    }
}

/// Set of resources to be managed
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceSet {
    /// Resources indexed by `type:id`
    pub resources: BTreeMap<String, ResourceConfig>,
}

impl ResourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, resource: ResourceConfig) {
        self.resources.insert(resource.key(), resource);
    }

    /// Merge another set into this one
    pub fn extend(&mut self, other: ResourceSet) {
        self.resources.extend(other.resources);
    }

    pub fn get(&self, resource_type: &str, id: &str) -> Option<&ResourceConfig> {
        self.resources.get(&format!("{}:{}", resource_type, id))
    }

    pub fn get_key(&self, key: &str) -> Option<&ResourceConfig> {
        self.resources.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceConfig> {
        self.resources.values()
    }

    pub fn by_type(&self, resource_type: &str) -> Vec<&ResourceConfig> {
        self.resources
            .values()
            .filter(|r| r.resource_type == resource_type)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// Replacement discipline for a resource
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lifecycle {
    /// A superseded instance is removed only after its successor exists
    /// and every dependent has been switched over
    pub create_before_destroy: bool,
}

/// Configuration for a cloud resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Resource type (e.g., "redis-instance", "url-map")
    pub resource_type: String,

    /// Resource identifier
    pub id: String,

    /// Provider name
    pub provider: String,

    /// Resource body; may contain attribute references
    pub config: serde_json::Value,

    /// Explicit dependencies (resource keys) in addition to references
    #[serde(default)]
    pub depends_on: Vec<String>,

    #[serde(default)]
    pub lifecycle: Lifecycle,
}

impl ResourceConfig {
    pub fn new(
        resource_type: impl Into<String>,
        id: impl Into<String>,
        provider: impl Into<String>,
        config: serde_json::Value,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
            provider: provider.into(),
            config,
            depends_on: Vec::new(),
            lifecycle: Lifecycle::default(),
        }
    }

    /// Add an explicit dependency on another resource key
    pub fn depends_on(mut self, key: impl Into<String>) -> Self {
        self.depends_on.push(key.into());
        self
    }

    pub fn create_before_destroy(mut self) -> Self {
        self.lifecycle.create_before_destroy = true;
        self
    }

    /// Get the full resource key (type:id)
    pub fn key(&self) -> String {
        format!("{}:{}", self.resource_type, self.id)
    }

    /// Every resource key this resource must wait for
    pub fn dependencies(&self) -> Vec<String> {
        let mut deps: Vec<String> = self.depends_on.clone();
        for r in reference::references(&self.config) {
            if !deps.contains(&r.resource) {
                deps.push(r.resource);
            }
        }
        deps
    }
}
