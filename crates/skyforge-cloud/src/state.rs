//! State management for cloud resources
//!
//! Manages the `.skyforge/state.json` file which records every applied
//! resource together with the attributes it reported. Outputs are computed
//! from this file, so they always reflect what was last written.

use crate::action::{ActionType, ApplyResult};
use crate::error::{CloudError, Result};
use crate::reference::Attributes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

const STATE_VERSION: u32 = 1;
const STATE_DIR: &str = ".skyforge";
const STATE_FILE: &str = "state.json";
const STATE_BACKUP: &str = "state.json.backup";
const STATE_TMP: &str = "state.json.tmp";
const LOCK_FILE: &str = "lock.json";

/// Locks older than this are treated as left behind by a crashed run
pub const LOCK_TTL_HOURS: i64 = 1;

/// Global state containing all provider states
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalState {
    /// State file version
    pub version: u32,

    /// Last modified timestamp
    pub updated_at: DateTime<Utc>,

    /// Resources indexed by provider:type:id
    pub resources: HashMap<String, ResourceState>,
}

impl Default for GlobalState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            resources: HashMap::new(),
        }
    }
}

impl GlobalState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get resources for a specific provider
    pub fn get_provider_resources(&self, provider: &str) -> Vec<(&String, &ResourceState)> {
        self.resources
            .iter()
            .filter(|(k, _)| k.starts_with(&format!("{}:", provider)))
            .collect()
    }

    /// Add or update a resource
    pub fn set_resource(&mut self, key: String, state: ResourceState) {
        self.resources.insert(key, state);
        self.updated_at = Utc::now();
    }

    /// Remove a resource
    pub fn remove_resource(&mut self, key: &str) -> Option<ResourceState> {
        let result = self.resources.remove(key);
        if result.is_some() {
            self.updated_at = Utc::now();
        }
        result
    }

    /// Get a resource by key
    pub fn get_resource(&self, key: &str) -> Option<&ResourceState> {
        self.resources.get(key)
    }

    /// Record the outcome of an apply run for one provider
    ///
    /// Successful creates, updates and no-ops store the reported attributes;
    /// deletes drop the entry. Failed actions mark the resource as errored
    /// so a partially applied graph is visible.
    pub fn record_apply(&mut self, provider: &str, result: &ApplyResult) {
        for action in &result.succeeded {
            let key = format!("{}:{}", provider, action.resource_key);
            if action.action_type == ActionType::Delete {
                self.remove_resource(&key);
                continue;
            }
            let (resource_type, id) = split_key(&action.resource_key);
            let mut state = self
                .resources
                .remove(&key)
                .unwrap_or_else(|| ResourceState::new(id, resource_type));
            state.status = ResourceStatus::Ready;
            state.attributes = action.attributes.clone();
            state.updated_at = Utc::now();
            self.set_resource(key, state);
        }

        for action in &result.failed {
            let key = format!("{}:{}", provider, action.resource_key);
            let (resource_type, id) = split_key(&action.resource_key);
            let mut state = self
                .resources
                .remove(&key)
                .unwrap_or_else(|| ResourceState::new(id, resource_type));
            state.status = ResourceStatus::Error;
            state.updated_at = Utc::now();
            self.set_resource(key, state);
        }
    }

    /// Attributes recorded for a provider resource key (`type:id`)
    pub fn attributes(&self, provider: &str, resource_key: &str) -> Option<&Attributes> {
        self.resources
            .get(&format!("{}:{}", provider, resource_key))
            .map(|r| &r.attributes)
    }
}

fn split_key(key: &str) -> (&str, &str) {
    key.split_once(':').unwrap_or(("unknown", key))
}

/// Live view of one provider's resources, keyed by `type:id`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderState {
    pub resources: HashMap<String, ResourceState>,
}

impl ProviderState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: String, state: ResourceState) {
        self.resources.insert(key, state);
    }

    pub fn get(&self, key: &str) -> Option<&ResourceState> {
        self.resources.get(key)
    }
}

/// Recorded state of one resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceState {
    /// Resource name as known to the provider
    pub id: String,

    pub resource_type: String,

    pub status: ResourceStatus,

    /// Reported attributes (host, address, selfLink, payload...)
    pub attributes: Attributes,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ResourceState {
    pub fn new(id: impl Into<String>, resource_type: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            resource_type: resource_type.into(),
            status: ResourceStatus::Unknown,
            attributes: Attributes::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_status(mut self, status: ResourceStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Attribute as a string, if present and a string
    pub fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(|v| v.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    /// Exists but has not reported ready yet
    Creating,
    Ready,
    /// Last apply of this resource failed
    Error,
    Unknown,
}

impl std::fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResourceStatus::Creating => "creating",
            ResourceStatus::Ready => "ready",
            ResourceStatus::Error => "error",
            ResourceStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Reads and writes `.skyforge/` next to the stack file
pub struct StateManager {
    state_dir: PathBuf,
}

impl StateManager {
    /// `project_root` is the directory holding the stack file
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self {
            state_dir: project_root.as_ref().join(STATE_DIR),
        }
    }

    fn path(&self, file: &str) -> PathBuf {
        self.state_dir.join(file)
    }

    /// Load the recorded state; a missing file is an empty state
    pub async fn load(&self) -> Result<GlobalState> {
        let path = self.path(STATE_FILE);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No state file yet");
                return Ok(GlobalState::new());
            }
            Err(e) => return Err(e.into()),
        };

        let state: GlobalState = serde_json::from_str(&content)?;
        if state.version > STATE_VERSION {
            return Err(CloudError::StateError(format!(
                "{} was written by a newer skyforge (state version {}, supported {})",
                path.display(),
                state.version,
                STATE_VERSION
            )));
        }

        tracing::debug!(resources = state.resources.len(), "Loaded state");
        Ok(state)
    }

    /// Save the state, keeping the previous file as a backup
    ///
    /// The new content is written to a temporary file and renamed into
    /// place, so an interrupted save leaves the old state intact.
    pub async fn save(&self, state: &GlobalState) -> Result<()> {
        fs::create_dir_all(&self.state_dir).await?;

        let path = self.path(STATE_FILE);
        if fs::try_exists(&path).await? {
            fs::copy(&path, self.path(STATE_BACKUP)).await?;
        }

        let tmp = self.path(STATE_TMP);
        fs::write(&tmp, serde_json::to_string_pretty(state)?).await?;
        fs::rename(&tmp, &path).await?;

        tracing::debug!(resources = state.resources.len(), "Saved state");
        Ok(())
    }

    /// Take the exclusive apply lock
    ///
    /// A lock older than [`LOCK_TTL_HOURS`] is considered abandoned and
    /// replaced.
    pub async fn acquire_lock(&self) -> Result<StateLock> {
        fs::create_dir_all(&self.state_dir).await?;
        let lock_path = self.path(LOCK_FILE);

        if let Some(existing) = read_lock(&lock_path).await? {
            let age = Utc::now().signed_duration_since(existing.acquired_at);
            if age.num_hours() < LOCK_TTL_HOURS {
                return Err(CloudError::LockError(format!(
                    "state is locked by {} since {} (remove {} if that run is gone)",
                    existing.holder,
                    existing.acquired_at,
                    lock_path.display()
                )));
            }
            tracing::warn!(holder = %existing.holder, "Replacing stale state lock");
            fs::remove_file(&lock_path).await?;
        }

        let info = LockInfo {
            holder: lock_holder(),
            acquired_at: Utc::now(),
        };
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => {
                    CloudError::LockError("state lock was taken concurrently".to_string())
                }
                _ => e.into(),
            })?;
        file.write_all(serde_json::to_string_pretty(&info)?.as_bytes())
            .await?;

        tracing::debug!(holder = %info.holder, "Acquired state lock");
        Ok(StateLock {
            lock_path,
            released: false,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    acquired_at: DateTime<Utc>,
}

async fn read_lock(path: &Path) -> Result<Option<LockInfo>> {
    match fs::read_to_string(path).await {
        Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn lock_holder() -> String {
    let host = std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("HOST"))
        .unwrap_or_else(|_| "unknown".to_string());
    format!("{}:{}", host, std::process::id())
}

/// Held apply lock; dropped without [`StateLock::release`] it is still removed
pub struct StateLock {
    lock_path: PathBuf,
    released: bool,
}

impl StateLock {
    pub async fn release(mut self) -> Result<()> {
        self.released = true;
        match fs::remove_file(&self.lock_path).await {
            Ok(()) => {
                tracing::debug!("Released state lock");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if !self.released {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Action;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_state_save_load() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let mut state = GlobalState::new();
        state.set_resource(
            "google-cloud:global-address:chatbot-production-ip".to_string(),
            ResourceState::new("chatbot-production-ip", "global-address")
                .with_status(ResourceStatus::Ready)
                .with_attribute("address", serde_json::json!("34.120.1.1")),
        );

        manager.save(&state).await.unwrap();

        let loaded = manager.load().await.unwrap();
        assert_eq!(loaded.resources.len(), 1);
        let address = loaded
            .get_resource("google-cloud:global-address:chatbot-production-ip")
            .and_then(|r| r.attribute_str("address"));
        assert_eq!(address, Some("34.120.1.1"));
    }

    #[tokio::test]
    async fn test_empty_state() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let state = manager.load().await.unwrap();
        assert!(state.resources.is_empty());
    }

    #[tokio::test]
    async fn test_lock_is_exclusive_until_released() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let lock = manager.acquire_lock().await.unwrap();
        assert!(matches!(
            manager.acquire_lock().await,
            Err(CloudError::LockError(_))
        ));

        lock.release().await.unwrap();
        let again = manager.acquire_lock().await.unwrap();
        again.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_dropped_lock_is_removed() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        drop(manager.acquire_lock().await.unwrap());
        assert!(!temp_dir.path().join(".skyforge/lock.json").exists());
    }

    #[tokio::test]
    async fn test_stale_lock_is_replaced() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());
        std::fs::create_dir_all(temp_dir.path().join(".skyforge")).unwrap();
        let stale = LockInfo {
            holder: "old-host:1".to_string(),
            acquired_at: Utc::now() - chrono::Duration::hours(LOCK_TTL_HOURS + 1),
        };
        std::fs::write(
            temp_dir.path().join(".skyforge/lock.json"),
            serde_json::to_string(&stale).unwrap(),
        )
        .unwrap();

        let lock = manager.acquire_lock().await.unwrap();
        lock.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_save_keeps_backup_of_previous_state() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let mut state = GlobalState::new();
        manager.save(&state).await.unwrap();
        state.set_resource(
            "google-cloud:secret:chatbot-production-redis-host".to_string(),
            ResourceState::new("chatbot-production-redis-host", "secret"),
        );
        manager.save(&state).await.unwrap();

        let backup = std::fs::read_to_string(temp_dir.path().join(".skyforge/state.json.backup"))
            .unwrap();
        let previous: GlobalState = serde_json::from_str(&backup).unwrap();
        assert!(previous.resources.is_empty());
        assert_eq!(manager.load().await.unwrap().resources.len(), 1);
        assert!(!temp_dir.path().join(".skyforge/state.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_newer_state_version_is_rejected() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());
        let mut state = GlobalState::new();
        state.version = STATE_VERSION + 1;
        manager.save(&state).await.unwrap();

        assert!(matches!(
            manager.load().await,
            Err(CloudError::StateError(_))
        ));
    }

    #[test]
    fn test_record_apply_tracks_attributes_and_deletes() {
        let mut result = ApplyResult::new();
        let mut attrs = Attributes::new();
        attrs.insert("host".to_string(), serde_json::json!("10.0.0.3"));
        result.add_success(
            &Action::new(ActionType::Create, "redis-instance", "cache", ""),
            "created".to_string(),
            attrs,
        );
        result.add_failure(
            &Action::new(ActionType::Create, "secret", "host", ""),
            "denied".to_string(),
        );

        let mut state = GlobalState::new();
        state.set_resource(
            "google-cloud:ssl-certificate:old".to_string(),
            ResourceState::new("old", "ssl-certificate"),
        );
        result.add_success(
            &Action::new(ActionType::Delete, "ssl-certificate", "old", ""),
            "deleted".to_string(),
            Attributes::new(),
        );

        state.record_apply("google-cloud", &result);

        let host = state
            .attributes("google-cloud", "redis-instance:cache")
            .and_then(|a| a.get("host"))
            .cloned();
        assert_eq!(host, Some(serde_json::json!("10.0.0.3")));
        assert_eq!(
            state
                .get_resource("google-cloud:secret:host")
                .map(|r| r.status),
            Some(ResourceStatus::Error)
        );
        assert!(state.get_resource("google-cloud:ssl-certificate:old").is_none());
    }
}
