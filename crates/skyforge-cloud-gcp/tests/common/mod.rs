//! Shared fixtures: an in-memory Google Cloud

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{Value, json};
use skyforge_cloud::WaitConfig;
use skyforge_cloud_gcp::api::{GcpApi, ResourceId, ResourceKind};
use skyforge_cloud_gcp::frontend::BACKEND_BUCKET_CACHE_KEY_FIELDS;
use skyforge_cloud_gcp::{GcpError, GcpProvider, Result};
use skyforge_core::{Stack, load_stack_str};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

pub const PROJECT: &str = "demo-project";
pub const REDIS_HOST: &str = "10.0.0.3";
pub const REDIS_AUTH: &str = "auth-token-1";
pub const ADDRESS: &str = "34.120.0.10";

/// Gets that report a new instance as still creating
const CREATING_POLLS: u32 = 2;

#[derive(Default)]
struct Cloud {
    objects: BTreeMap<ResourceId, Value>,
    creating_polls: HashMap<String, u32>,
    versions: HashMap<String, Vec<String>>,
    iam: HashMap<(ResourceId, String), Vec<String>>,
    calls: Vec<String>,
    fail_insert: Option<String>,
    files: HashMap<String, Vec<String>>,
}

/// In-memory [`GcpApi`]
///
/// Rejects inserts that reference missing objects, deletes of objects still
/// referenced by others or of buckets that still hold files, and empty
/// secret payloads.
#[derive(Default)]
pub struct FakeApi {
    cloud: Mutex<Cloud>,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every mutating call, in order (`insert ssl-certificate:name`, ...)
    pub fn calls(&self) -> Vec<String> {
        self.cloud.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.cloud.lock().unwrap().calls.clear();
    }

    pub fn position(&self, call: &str) -> usize {
        self.calls()
            .iter()
            .position(|c| c == call)
            .unwrap_or_else(|| panic!("no call {call}: {:?}", self.calls()))
    }

    pub fn object(&self, kind: ResourceKind, name: &str) -> Option<Value> {
        self.cloud
            .lock()
            .unwrap()
            .objects
            .get(&ResourceId::new(kind, name))
            .cloned()
    }

    pub fn objects_of(&self, kind: ResourceKind) -> Vec<Value> {
        self.cloud
            .lock()
            .unwrap()
            .objects
            .iter()
            .filter(|(id, _)| id.kind == kind)
            .map(|(_, v)| v.clone())
            .collect()
    }

    pub fn versions(&self, secret: &str) -> Vec<String> {
        self.cloud
            .lock()
            .unwrap()
            .versions
            .get(secret)
            .cloned()
            .unwrap_or_default()
    }

    pub fn members(&self, kind: ResourceKind, name: &str, role: &str) -> Vec<String> {
        self.cloud
            .lock()
            .unwrap()
            .iam
            .get(&(ResourceId::new(kind, name), role.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    /// Make the next insert of `key` fail
    pub fn fail_insert(&self, key: &str) {
        self.cloud.lock().unwrap().fail_insert = Some(key.to_string());
    }

    /// Simulate an out-of-band change of the instance's AUTH string
    pub fn rotate_auth(&self, instance: &str, auth: &str) {
        let mut cloud = self.cloud.lock().unwrap();
        if let Some(object) = cloud
            .objects
            .get_mut(&ResourceId::new(ResourceKind::RedisInstance, instance))
        {
            object["authString"] = json!(auth);
        }
    }

    /// Put a site file into a bucket
    pub fn upload(&self, bucket: &str, object: &str) {
        let mut cloud = self.cloud.lock().unwrap();
        cloud
            .files
            .entry(bucket.to_string())
            .or_default()
            .push(object.to_string());
    }

    /// Grant a role outside of skyforge
    pub fn grant(&self, target: ResourceId, role: &str, member: &str) {
        let mut cloud = self.cloud.lock().unwrap();
        cloud
            .iam
            .entry((target, role.to_string()))
            .or_default()
            .push(member.to_string());
    }
}

fn self_link(id: &ResourceId) -> String {
    match id.kind.compute_collection() {
        Some(collection) => format!(
            "https://compute.googleapis.com/compute/v1/projects/{}/global/{}/{}",
            PROJECT, collection, id.name
        ),
        None => format!("https://fake.googleapis.com/{}/{}", id.kind, id.name),
    }
}

fn links(value: &Value, found: &mut Vec<String>) {
    match value {
        Value::String(s) if s.starts_with("https://compute.googleapis.com/") => {
            found.push(s.clone())
        }
        Value::Array(items) => items.iter().for_each(|v| links(v, found)),
        Value::Object(map) => map.values().for_each(|v| links(v, found)),
        _ => {}
    }
}

fn api_error(status: u16, message: String) -> GcpError {
    GcpError::Api { status, message }
}

#[async_trait]
impl GcpApi for FakeApi {
    async fn account(&self) -> Result<String> {
        Ok(format!("tester@{}.iam.gserviceaccount.com", PROJECT))
    }

    async fn get(&self, id: &ResourceId) -> Result<Option<Value>> {
        let mut guard = self.cloud.lock().unwrap();
        let cloud = &mut *guard;
        let key = id.key();

        if let Some(remaining) = cloud.creating_polls.get_mut(&key) {
            if *remaining > 0 {
                *remaining -= 1;
                let mut object = cloud.objects.get(id).cloned();
                if let Some(object) = object.as_mut() {
                    object["state"] = json!("CREATING");
                    object["host"] = json!("");
                    if let Some(map) = object.as_object_mut() {
                        map.remove("authString");
                    }
                }
                return Ok(object);
            }
            cloud.creating_polls.remove(&key);
            cloud.calls.push(format!("ready {}", key));
        }

        Ok(cloud.objects.get(id).cloned())
    }

    async fn insert(&self, id: &ResourceId, body: &Value) -> Result<()> {
        let mut cloud = self.cloud.lock().unwrap();
        let key = id.key();

        if cloud.fail_insert.as_deref() == Some(key.as_str()) {
            cloud.fail_insert = None;
            return Err(api_error(429, "quota exceeded".to_string()));
        }
        if cloud.objects.contains_key(id) {
            return Err(api_error(409, format!("{} already exists", key)));
        }

        let existing: Vec<String> = cloud
            .objects
            .values()
            .filter_map(|o| o["selfLink"].as_str().map(String::from))
            .collect();
        let mut referenced = Vec::new();
        links(body, &mut referenced);
        if let Some(missing) = referenced.iter().find(|l| !existing.contains(l)) {
            return Err(api_error(400, format!("{} references missing {}", key, missing)));
        }

        if id.kind == ResourceKind::BackendBucket {
            if let Some(policy) = body["cdnPolicy"]["cacheKeyPolicy"].as_object() {
                if let Some(field) = policy
                    .keys()
                    .find(|k| !BACKEND_BUCKET_CACHE_KEY_FIELDS.contains(&k.as_str()))
                {
                    return Err(api_error(400, format!("unknown field cacheKeyPolicy.{}", field)));
                }
            }
        }

        let mut object = body.clone();
        object["name"] = json!(id.name);
        object["selfLink"] = json!(self_link(id));
        match id.kind {
            ResourceKind::RedisInstance => {
                object["state"] = json!("READY");
                object["host"] = json!(REDIS_HOST);
                object["port"] = json!(6379);
                if body["authEnabled"] == json!(true) {
                    object["authString"] = json!(REDIS_AUTH);
                }
                cloud.creating_polls.insert(key.clone(), CREATING_POLLS);
            }
            ResourceKind::GlobalAddress => object["address"] = json!(ADDRESS),
            ResourceKind::SslCertificate => {
                object["managed"]["status"] = json!("PROVISIONING");
            }
            ResourceKind::ForwardingRule => {
                let port = body["portRange"].as_str().unwrap_or_default().to_string();
                object["portRange"] = json!(format!("{}-{}", port, port));
            }
            _ => {}
        }

        cloud.objects.insert(id.clone(), object);
        cloud.calls.push(format!("insert {}", key));
        Ok(())
    }

    async fn update(&self, id: &ResourceId, body: &Value) -> Result<()> {
        let mut cloud = self.cloud.lock().unwrap();
        let object = cloud
            .objects
            .get_mut(id)
            .ok_or_else(|| api_error(404, format!("{} not found", id.key())))?;
        if let (Some(target), Some(fields)) = (object.as_object_mut(), body.as_object()) {
            for (k, v) in fields {
                target.insert(k.clone(), v.clone());
            }
        }
        cloud.calls.push(format!("update {}", id.key()));
        Ok(())
    }

    async fn delete(&self, id: &ResourceId) -> Result<()> {
        let mut cloud = self.cloud.lock().unwrap();
        let link = self_link(id);
        let in_use = cloud.objects.iter().any(|(other, object)| {
            let mut referenced = Vec::new();
            links(object, &mut referenced);
            other != id && referenced.contains(&link)
        });
        if in_use {
            return Err(api_error(400, format!("{} is in use", id.key())));
        }
        if id.kind == ResourceKind::StorageBucket
            && cloud.files.get(&id.name).is_some_and(|f| !f.is_empty())
        {
            return Err(api_error(409, format!("bucket {} is not empty", id.name)));
        }
        if cloud.objects.remove(id).is_none() {
            return Err(api_error(404, format!("{} not found", id.key())));
        }
        if id.kind == ResourceKind::Secret {
            cloud.versions.remove(&id.name);
        }
        cloud.calls.push(format!("delete {}", id.key()));
        Ok(())
    }

    async fn empty_bucket(&self, bucket: &str) -> Result<usize> {
        let mut cloud = self.cloud.lock().unwrap();
        let removed = cloud.files.remove(bucket).map(|f| f.len()).unwrap_or_default();
        cloud.calls.push(format!("empty storage-bucket:{}", bucket));
        Ok(removed)
    }

    async fn list_names(&self, kind: ResourceKind, prefix: &str) -> Result<Vec<String>> {
        let cloud = self.cloud.lock().unwrap();
        Ok(cloud
            .objects
            .keys()
            .filter(|id| id.kind == kind && id.name.starts_with(prefix))
            .map(|id| id.name.clone())
            .collect())
    }

    async fn latest_secret_payload(&self, secret: &str) -> Result<Option<String>> {
        let cloud = self.cloud.lock().unwrap();
        Ok(cloud.versions.get(secret).and_then(|v| v.last().cloned()))
    }

    async fn add_secret_version(&self, secret: &str, payload: &str) -> Result<String> {
        let mut cloud = self.cloud.lock().unwrap();
        if payload.is_empty() {
            return Err(api_error(400, format!("empty payload for {}", secret)));
        }
        if !cloud
            .objects
            .contains_key(&ResourceId::new(ResourceKind::Secret, secret))
        {
            return Err(api_error(404, format!("secret {} not found", secret)));
        }
        let versions = cloud.versions.entry(secret.to_string()).or_default();
        versions.push(payload.to_string());
        let name = format!(
            "projects/{}/secrets/{}/versions/{}",
            PROJECT,
            secret,
            versions.len()
        );
        cloud.calls.push(format!("add-version {}", secret));
        Ok(name)
    }

    async fn get_iam_members(&self, target: &ResourceId, role: &str) -> Result<Vec<String>> {
        let cloud = self.cloud.lock().unwrap();
        if !cloud.objects.contains_key(target) {
            return Err(api_error(404, format!("{} not found", target.key())));
        }
        Ok(cloud
            .iam
            .get(&(target.clone(), role.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn set_iam_members(
        &self,
        target: &ResourceId,
        role: &str,
        members: &[String],
    ) -> Result<()> {
        let mut cloud = self.cloud.lock().unwrap();
        if !cloud.objects.contains_key(target) {
            return Err(api_error(404, format!("{} not found", target.key())));
        }
        cloud
            .iam
            .insert((target.clone(), role.to_string()), members.to_vec());
        cloud.calls.push(format!("set-iam {} {}", target.key(), role));
        Ok(())
    }
}

pub fn provider(api: &Arc<FakeApi>) -> GcpProvider {
    let api: Arc<dyn GcpApi> = api.clone();
    GcpProvider::new(api).with_readiness(WaitConfig::immediate(10))
}

pub fn stack(units: &str) -> Stack {
    let content = format!("project \"{}\"\n{}", PROJECT, units);
    load_stack_str(&content, None).unwrap()
}

pub const DEFAULT_UNITS: &str = r#"
cache {}
frontend {}
"#;
