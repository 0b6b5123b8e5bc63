//! Google Cloud provider implementation
//!
//! Plans every desired resource as an idempotent ensure: missing objects
//! are created, drifted ones updated or replaced, matching ones left alone.
//! Apply reports each resource's runtime attributes so later waves can
//! resolve references to them.

use crate::PROVIDER_NAME;
use crate::api::{GcpApi, ResourceId, ResourceKind};
use crate::diff::{changed_fields, needs_replace, normalize_live};
use async_trait::async_trait;
use serde_json::{Value, json};
use skyforge_cloud::reference::{self, Attributes};
use skyforge_cloud::{
    Action, ActionType, AuthStatus, CloudError, CloudProvider, DependencyGraph, Plan,
    ProviderState, ResourceConfig, ResourceSet, ResourceState, ResourceStatus, Result, WaitConfig,
    wait_until,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Members that make a grant public
const PUBLIC_MEMBERS: &[&str] = &["allUsers", "allAuthenticatedUsers"];

/// Google Cloud provider
pub struct GcpProvider {
    api: Arc<dyn GcpApi>,
    readiness: WaitConfig,
}

impl GcpProvider {
    pub fn new(api: Arc<dyn GcpApi>) -> Self {
        Self {
            api,
            readiness: WaitConfig::default(),
        }
    }

    /// Polling used while waiting for the cache instance to become ready
    pub fn with_readiness(mut self, readiness: WaitConfig) -> Self {
        self.readiness = readiness;
        self
    }

    /// Fetch the live object of every addressable desired resource
    async fn live_objects(&self, desired: &ResourceSet) -> Result<HashMap<String, Value>> {
        let mut live = HashMap::new();
        for resource in desired.iter() {
            let id = resource_id(&resource.resource_type, &resource.id)?;
            if !id.kind.is_addressable() {
                continue;
            }
            if let Some(object) = self.api.get(&id).await? {
                tracing::debug!(resource = %id.key(), "Found live object");
                live.insert(id.key(), normalize_live(id.kind, object));
            }
        }
        Ok(live)
    }

    async fn plan_secret_version(
        &self,
        resource: &ResourceConfig,
        live: &HashMap<String, Value>,
        known: &HashMap<String, Attributes>,
    ) -> Result<(ActionType, Vec<String>)> {
        let secret = ResourceId::new(ResourceKind::Secret, resource.id.clone());
        if !live.contains_key(&secret.key()) {
            return Ok((ActionType::Create, Vec::new()));
        }

        let latest = self.api.latest_secret_payload(&secret.name).await?;
        let resolved = reference::try_resolve(&resource.config["payload"], known);

        Ok(match (latest, resolved) {
            (None, _) => (ActionType::Create, Vec::new()),
            (Some(current), Some(Value::String(wanted))) if current == wanted => {
                (ActionType::NoOp, Vec::new())
            }
            // payload changed, or the instance is not ready to tell yet
            (Some(_), _) => (ActionType::Update, vec!["payload".to_string()]),
        })
    }

    async fn plan_iam_member(
        &self,
        resource: &ResourceConfig,
        live: &HashMap<String, Value>,
    ) -> Result<(ActionType, Vec<String>)> {
        let binding = Binding::from_config(&resource.config)?;
        if !live.contains_key(&binding.target.key()) {
            return Ok((ActionType::Create, Vec::new()));
        }

        let current = self
            .api
            .get_iam_members(&binding.target, &binding.role)
            .await?;
        if binding.is_satisfied_by(&current) {
            Ok((ActionType::NoOp, Vec::new()))
        } else if current.is_empty() {
            Ok((ActionType::Create, Vec::new()))
        } else {
            Ok((ActionType::Update, vec!["members".to_string()]))
        }
    }

    /// Wait until an object is usable and return its attributes
    async fn settle(&self, id: &ResourceId) -> Result<Attributes> {
        if id.kind == ResourceKind::RedisInstance {
            let api = &self.api;
            let live = wait_until(&id.key(), &self.readiness, || async move {
                let object = api.get(id).await?;
                Ok(object.filter(redis_ready))
            })
            .await?;
            tracing::info!(resource = %id.key(), "Cache instance is ready");
            return Ok(attributes_from(id.kind, &live));
        }

        match self.api.get(id).await? {
            Some(live) => Ok(attributes_from(id.kind, &live)),
            None => Err(CloudError::ResourceNotFound(id.key())),
        }
    }

    /// Create-or-update, tolerant of objects created since planning
    async fn ensure_object(&self, id: &ResourceId, body: &Value) -> Result<Attributes> {
        if self.api.get(id).await?.is_some() {
            self.api.update(id, body).await?;
        } else {
            self.api.insert(id, body).await?;
        }
        self.settle(id).await
    }

    async fn ensure_secret_version(&self, action: &Action) -> Result<Attributes> {
        let secret = &action.resource_id;
        let payload = match action.config.get("payload") {
            Some(Value::String(p)) if !p.is_empty() => p.as_str(),
            _ => {
                return Err(CloudError::InvalidConfig(format!(
                    "{} has no payload to publish",
                    action.key()
                )));
            }
        };

        let mut attributes = Attributes::new();
        attributes.insert("secret".to_string(), json!(secret));
        attributes.insert("payload".to_string(), json!(payload));

        if self.api.latest_secret_payload(secret).await?.as_deref() == Some(payload) {
            tracing::debug!(secret = %secret, "Latest version already holds the payload");
            return Ok(attributes);
        }

        let version = self.api.add_secret_version(secret, payload).await?;
        tracing::info!(secret = %secret, version = %version, "Added secret version");
        attributes.insert("version".to_string(), json!(version));
        Ok(attributes)
    }

    async fn ensure_iam_member(&self, action: &Action) -> Result<Attributes> {
        let binding = Binding::from_config(&action.config)?;
        let current = self
            .api
            .get_iam_members(&binding.target, &binding.role)
            .await?;

        let in_place =
            action.action_type != ActionType::Delete && binding.is_satisfied_by(&current);

        let members = if action.action_type == ActionType::Delete {
            current
                .into_iter()
                .filter(|m| !binding.members.contains(m))
                .collect()
        } else if in_place {
            current
        } else {
            binding.merged_with(current)
        };

        if in_place {
            tracing::debug!(target_resource = %binding.target.key(), role = %binding.role, "Binding already in place");
        } else {
            self.api
                .set_iam_members(&binding.target, &binding.role, &members)
                .await?;
        }

        let mut attributes = Attributes::new();
        attributes.insert("role".to_string(), json!(binding.role));
        attributes.insert("members".to_string(), json!(members));
        Ok(attributes)
    }

    /// Certificates of the same family that the desired one supersedes
    async fn superseded(&self, resource: &ResourceConfig) -> Result<Vec<ResourceId>> {
        let Some(prefix) = family_prefix(&resource.id) else {
            return Ok(Vec::new());
        };
        let kind = resource_kind(&resource.resource_type)?;
        let names = self.api.list_names(kind, &prefix).await?;
        Ok(names
            .into_iter()
            .filter(|n| *n != resource.id)
            .map(|n| ResourceId::new(kind, n))
            .collect())
    }
}

#[async_trait]
impl CloudProvider for GcpProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn display_name(&self) -> &str {
        "Google Cloud"
    }

    async fn check_auth(&self) -> Result<AuthStatus> {
        match self.api.account().await {
            Ok(account) => Ok(AuthStatus::ok(account)),
            Err(e) => Ok(AuthStatus::failed(e.to_string())),
        }
    }

    async fn get_state(&self, desired: &ResourceSet) -> Result<ProviderState> {
        let mut state = ProviderState::new();
        for (key, live) in self.live_objects(desired).await? {
            let Some((resource_type, id)) = key.split_once(':') else {
                continue;
            };
            let kind = resource_kind(resource_type)?;
            let status = if kind == ResourceKind::RedisInstance && !redis_ready(&live) {
                ResourceStatus::Creating
            } else {
                ResourceStatus::Ready
            };
            let mut resource = ResourceState::new(id, resource_type).with_status(status);
            resource.attributes = attributes_from(kind, &live);
            state.add(key, resource);
        }
        Ok(state)
    }

    async fn plan(&self, desired: &ResourceSet) -> Result<Plan> {
        let graph = DependencyGraph::from_resources(desired)?;
        let waves = graph.wave_index()?;
        let live = self.live_objects(desired).await?;

        let known: HashMap<String, Attributes> = live
            .iter()
            .filter_map(|(key, object)| {
                let (resource_type, _) = key.split_once(':')?;
                let kind = resource_type.parse().ok()?;
                Some((key.clone(), attributes_from(kind, object)))
            })
            .collect();

        let mut actions = Vec::new();
        let mut last_wave = 0;

        for resource in desired.iter() {
            let key = resource.key();
            let kind = resource_kind(&resource.resource_type)?;
            let wave = waves.get(&key).copied().unwrap_or_default();
            last_wave = last_wave.max(wave);

            let (action_type, changed) = match kind {
                ResourceKind::SecretVersion => {
                    self.plan_secret_version(resource, &live, &known).await?
                }
                ResourceKind::IamMember => self.plan_iam_member(resource, &live).await?,
                _ => plan_object(kind, resource, live.get(&key), &known),
            };

            let mut action = Action::new(
                action_type,
                &resource.resource_type,
                &resource.id,
                describe(action_type, kind, &resource.id),
            )
            .with_config(resource.config.clone())
            .in_wave(wave);
            if !changed.is_empty() {
                action = action.with_detail("changed", json!(changed));
            }
            actions.push(action);
        }

        // superseded instances go once every dependent has switched over
        for resource in desired.iter().filter(|r| r.lifecycle.create_before_destroy) {
            for old in self.superseded(resource).await? {
                actions.push(
                    Action::new(
                        ActionType::Delete,
                        old.kind.as_str(),
                        &old.name,
                        format!("delete superseded {} {}", old.kind, old.name),
                    )
                    .with_detail("replaced_by", json!(resource.id))
                    .in_wave(last_wave + 1),
                );
            }
        }

        let warnings = plan_warnings(desired);
        for warning in &warnings {
            tracing::warn!("{}", warning);
        }

        Ok(Plan::new(actions).with_warnings(warnings))
    }

    async fn plan_destroy(&self, desired: &ResourceSet) -> Result<Plan> {
        let graph = DependencyGraph::from_resources(desired)?;
        let waves = graph.wave_index()?;
        let last_wave = waves.values().copied().max().unwrap_or_default();
        let live = self.live_objects(desired).await?;

        let mut actions = Vec::new();
        let mut warnings = Vec::new();
        for resource in desired.iter() {
            let key = resource.key();
            let kind = resource_kind(&resource.resource_type)?;
            let wave = last_wave - waves.get(&key).copied().unwrap_or_default();

            let mut doomed = Vec::new();
            if live.contains_key(&key) {
                doomed.push(ResourceId::new(kind, resource.id.clone()));
            }
            if resource.lifecycle.create_before_destroy {
                doomed.extend(self.superseded(resource).await?);
            }

            for id in doomed {
                let mut action = Action::new(
                    ActionType::Delete,
                    id.kind.as_str(),
                    &id.name,
                    describe(ActionType::Delete, id.kind, &id.name),
                )
                .in_wave(wave);
                if id.kind == ResourceKind::StorageBucket {
                    action = action.with_detail("contents", json!("every object is deleted"));
                    warnings.push(format!(
                        "storage-bucket {}: destroy deletes every object in the bucket",
                        id.name
                    ));
                }
                actions.push(action);
            }
        }

        for warning in &warnings {
            tracing::warn!("{}", warning);
        }
        Ok(Plan::new(actions).with_warnings(warnings))
    }

    async fn apply_action(&self, action: &Action) -> Result<Attributes> {
        let kind = resource_kind(&action.resource_type)?;
        let id = ResourceId::new(kind, action.resource_id.clone());

        match kind {
            ResourceKind::SecretVersion => {
                if action.action_type == ActionType::Delete {
                    // versions go away with their secret
                    return Ok(Attributes::new());
                }
                self.ensure_secret_version(action).await
            }
            ResourceKind::IamMember => self.ensure_iam_member(action).await,
            _ => match action.action_type {
                ActionType::Create | ActionType::Update => {
                    self.ensure_object(&id, &action.config).await
                }
                ActionType::Replace => {
                    if self.api.get(&id).await?.is_some() {
                        self.api.delete(&id).await?;
                    }
                    self.api.insert(&id, &action.config).await?;
                    self.settle(&id).await
                }
                ActionType::Delete => {
                    if self.api.get(&id).await?.is_some() {
                        if kind == ResourceKind::StorageBucket {
                            self.api.empty_bucket(&id.name).await?;
                        }
                        self.api.delete(&id).await?;
                    }
                    Ok(Attributes::new())
                }
                ActionType::NoOp => self.settle(&id).await,
            },
        }
    }
}

/// A role grant as declared in an `iam-member` body
struct Binding {
    target: ResourceId,
    role: String,
    members: Vec<String>,
    /// The role is granted to exactly these members
    exclusive: bool,
}

impl Binding {
    fn from_config(config: &Value) -> Result<Self> {
        let invalid = |what: &str| CloudError::InvalidConfig(format!("iam-member: missing {}", what));

        let kind = config["target"]["kind"]
            .as_str()
            .ok_or_else(|| invalid("target kind"))?;
        let name = config["target"]["name"]
            .as_str()
            .ok_or_else(|| invalid("target name"))?;
        let role = config["role"].as_str().ok_or_else(|| invalid("role"))?;
        let members = config["members"]
            .as_array()
            .ok_or_else(|| invalid("members"))?
            .iter()
            .filter_map(|m| m.as_str().map(String::from))
            .collect();

        Ok(Self {
            target: ResourceId::new(resource_kind(kind)?, name),
            role: role.to_string(),
            members,
            exclusive: config["exclusive"].as_bool().unwrap_or(false),
        })
    }

    fn is_satisfied_by(&self, current: &[String]) -> bool {
        let has_all = self.members.iter().all(|m| current.contains(m));
        if self.exclusive {
            has_all && current.len() == self.members.len()
        } else {
            has_all
        }
    }

    fn merged_with(&self, current: Vec<String>) -> Vec<String> {
        if self.exclusive {
            return self.members.clone();
        }
        let mut members = current;
        for m in &self.members {
            if !members.contains(m) {
                members.push(m.clone());
            }
        }
        members
    }
}

fn plan_object(
    kind: ResourceKind,
    resource: &ResourceConfig,
    live: Option<&Value>,
    known: &HashMap<String, Attributes>,
) -> (ActionType, Vec<String>) {
    let Some(live) = live else {
        return (ActionType::Create, Vec::new());
    };

    let changed = match reference::try_resolve(&resource.config, known) {
        Some(resolved) => changed_fields(&resolved, live),
        // an upstream resource is about to change
        None => reference::references(&resource.config)
            .into_iter()
            .map(|r| r.to_string())
            .collect(),
    };

    if changed.is_empty() {
        (ActionType::NoOp, changed)
    } else if needs_replace(kind, &changed) {
        (ActionType::Replace, changed)
    } else {
        (ActionType::Update, changed)
    }
}

fn plan_warnings(desired: &ResourceSet) -> Vec<String> {
    let mut warnings = Vec::new();

    for binding in desired.by_type(ResourceKind::IamMember.as_str()) {
        let public: Vec<&str> = binding.config["members"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
            .filter(|m| PUBLIC_MEMBERS.contains(m))
            .collect();
        if !public.is_empty() {
            warnings.push(format!(
                "{} {} grants {} to {}: every object is readable without authentication",
                binding.config["target"]["kind"].as_str().unwrap_or("resource"),
                binding.config["target"]["name"].as_str().unwrap_or("?"),
                binding.config["role"].as_str().unwrap_or("?"),
                public.join(", ")
            ));
        }
    }

    for bucket in desired.by_type(ResourceKind::StorageBucket.as_str()) {
        let wildcard = bucket.config["cors"]
            .as_array()
            .into_iter()
            .flatten()
            .any(|rule| {
                rule["origin"]
                    .as_array()
                    .is_some_and(|o| o.iter().any(|v| v == "*"))
            });
        if wildcard {
            warnings.push(format!(
                "storage-bucket {}: CORS allows any origin",
                bucket.id
            ));
        }
    }

    for backend in desired.by_type(ResourceKind::BackendBucket.as_str()) {
        let allowlisted = backend.config["cdnPolicy"]["cacheKeyPolicy"]["queryStringWhitelist"]
            .as_array()
            .is_some_and(|a| !a.is_empty());
        if !allowlisted {
            warnings.push(format!(
                "backend-bucket {}: the CDN cache key is the object path only; \
                 URLs differing in host, scheme or query string share one cached response",
                backend.id
            ));
        }
    }

    warnings
}

fn describe(action_type: ActionType, kind: ResourceKind, name: &str) -> String {
    match action_type {
        ActionType::NoOp => format!("{} {} is up to date", kind, name),
        other => format!("{} {} {}", other, kind, name),
    }
}

fn resource_kind(resource_type: &str) -> Result<ResourceKind> {
    resource_type.parse::<ResourceKind>().map_err(CloudError::from)
}

fn resource_id(resource_type: &str, name: &str) -> Result<ResourceId> {
    Ok(ResourceId::new(resource_kind(resource_type)?, name))
}

/// `web-cert-1a2b3c4d` -> `web-cert-`
fn family_prefix(name: &str) -> Option<String> {
    name.rsplit_once('-')
        .filter(|(head, tail)| !head.is_empty() && !tail.is_empty())
        .map(|(head, _)| format!("{}-", head))
}

fn redis_ready(live: &Value) -> bool {
    live["state"] == "READY" && live["host"].as_str().is_some_and(|h| !h.is_empty())
}

/// Runtime attributes other resources may reference
pub fn attributes_from(kind: ResourceKind, live: &Value) -> Attributes {
    let mut attributes = Attributes::new();
    for field in ["name", "selfLink", "address"] {
        if let Some(value) = live.get(field).filter(|v| v.is_string()) {
            attributes.insert(field.to_string(), value.clone());
        }
    }

    match kind {
        ResourceKind::RedisInstance => {
            for field in ["host", "state", "readEndpoint", "currentLocationId", "authString"] {
                if let Some(value) = live.get(field).filter(|v| v.is_string()) {
                    attributes.insert(field.to_string(), value.clone());
                }
            }
            // secret payloads are strings
            for field in ["port", "readEndpointPort"] {
                if let Some(port) = live.get(field).and_then(port_string) {
                    attributes.insert(field.to_string(), json!(port));
                }
            }
        }
        ResourceKind::SslCertificate => {
            if let Some(status) = live["managed"]["status"].as_str() {
                attributes.insert("status".to_string(), json!(status));
            }
            if let Some(domains) = live["managed"].get("domainStatus") {
                attributes.insert("domainStatus".to_string(), domains.clone());
            }
        }
        ResourceKind::StorageBucket => {
            if let Some(name) = live["name"].as_str() {
                attributes.insert("url".to_string(), json!(format!("gs://{}", name)));
            }
        }
        _ => {}
    }

    attributes
}

fn port_string(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}
