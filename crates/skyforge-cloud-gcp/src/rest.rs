//! Google Cloud REST client
//!
//! Implements [`GcpApi`] against the public REST endpoints of Memorystore,
//! Secret Manager, Cloud Storage and Compute Engine. Long-running
//! operations are polled until they finish.

use crate::api::{GcpApi, ResourceId, ResourceKind, binding_members, set_binding};
use crate::error::{GcpError, Result};
use crate::gcloud::resolve_access_token;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::Method;
use serde_json::{Value, json};
use skyforge_cloud::{WaitConfig, wait_until};
use std::time::Duration;

const REDIS_API: &str = "https://redis.googleapis.com/v1";
const SECRETS_API: &str = "https://secretmanager.googleapis.com/v1";
const STORAGE_API: &str = "https://storage.googleapis.com/storage/v1";
const COMPUTE_API: &str = "https://compute.googleapis.com/compute/v1";
const TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";

/// Instance fields that may be changed with PATCH
const REDIS_UPDATABLE: &[&str] = &[
    "memorySizeGb",
    "replicaCount",
    "readReplicasMode",
    "redisConfigs",
    "labels",
    "maintenancePolicy",
    "authEnabled",
    "displayName",
];

/// Polling budget for long-running operations, about 40 minutes
fn operation_wait() -> WaitConfig {
    WaitConfig {
        max_attempts: 240,
        initial_delay: Duration::from_secs(1),
        max_delay: Duration::from_secs(10),
        backoff_multiplier: 1.5,
    }
}

/// REST implementation of [`GcpApi`]
pub struct RestApi {
    client: reqwest::Client,
    token: String,
    project: String,
    region: String,
    operations: WaitConfig,
}

impl RestApi {
    pub fn new(token: String, project: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
            project: project.into(),
            region: region.into(),
            operations: operation_wait(),
        }
    }

    /// Build a client with credentials from the environment or gcloud
    pub async fn connect(project: impl Into<String>, region: impl Into<String>) -> Result<Self> {
        let token = resolve_access_token().await?;
        Ok(Self::new(token, project, region))
    }

    fn redis_parent(&self) -> String {
        format!(
            "{}/projects/{}/locations/{}/instances",
            REDIS_API, self.project, self.region
        )
    }

    fn secrets_parent(&self) -> String {
        format!("{}/projects/{}/secrets", SECRETS_API, self.project)
    }

    fn compute_collection(&self, kind: ResourceKind) -> Result<String> {
        let collection = kind
            .compute_collection()
            .ok_or_else(|| GcpError::Unsupported(kind.to_string()))?;
        Ok(format!(
            "{}/projects/{}/global/{}",
            COMPUTE_API, self.project, collection
        ))
    }

    fn object_url(&self, id: &ResourceId) -> Result<String> {
        match id.kind {
            ResourceKind::RedisInstance => Ok(format!("{}/{}", self.redis_parent(), id.name)),
            ResourceKind::Secret => Ok(format!("{}/{}", self.secrets_parent(), id.name)),
            ResourceKind::StorageBucket => Ok(format!("{}/b/{}", STORAGE_API, id.name)),
            ResourceKind::SecretVersion | ResourceKind::IamMember => {
                Err(GcpError::Unsupported(id.kind.to_string()))
            }
            kind => Ok(format!("{}/{}", self.compute_collection(kind)?, id.name)),
        }
    }

    /// Proxy mutators live outside the `global/` path
    fn proxy_method_url(&self, id: &ResourceId, method: &str) -> Result<String> {
        let collection = id
            .kind
            .compute_collection()
            .ok_or_else(|| GcpError::Unsupported(id.kind.to_string()))?;
        Ok(format!(
            "{}/projects/{}/{}/{}/{}",
            COMPUTE_API, self.project, collection, id.name, method
        ))
    }

    /// Token introspection request; the token goes in the form body so it
    /// never appears in a URL
    fn tokeninfo_request(&self) -> Result<reqwest::Request> {
        Ok(self
            .client
            .post(TOKENINFO_URL)
            .form(&[("access_token", self.token.as_str())])
            .build()?)
    }

    /// Send a request; `None` on 404
    async fn send(&self, method: Method, url: &str, body: Option<&Value>) -> Result<Option<Value>> {
        tracing::debug!(%method, %url, "Calling Google Cloud API");

        let mut request = self
            .client
            .request(method, url)
            .bearer_auth(&self.token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let text = response.text().await?;
        if !status.is_success() {
            return Err(GcpError::Api {
                status: status.as_u16(),
                message: error_message(&text),
            });
        }

        if text.trim().is_empty() {
            Ok(Some(Value::Null))
        } else {
            Ok(Some(serde_json::from_str(&text)?))
        }
    }

    /// Like [`Self::send`], treating 404 as an error
    async fn send_expect(&self, method: Method, url: &str, body: Option<&Value>) -> Result<Value> {
        self.send(method, url, body)
            .await?
            .ok_or_else(|| GcpError::Api {
                status: 404,
                message: format!("{} not found", url),
            })
    }

    /// Poll a long-running operation until it is done
    async fn wait_operation(&self, operation: Value) -> Result<()> {
        if let Some(result) = operation_result(&operation) {
            return result;
        }

        let url = match (operation["selfLink"].as_str(), operation["name"].as_str()) {
            (Some(link), _) => link.to_string(),
            (None, Some(name)) => format!("{}/{}", REDIS_API, name),
            _ => return Ok(()),
        };

        let finished = wait_until(&url, &self.operations, || {
            let url = url.clone();
            async move {
                let op = self.send_expect(Method::GET, &url, None).await?;
                Ok(operation_result(&op).map(|r| r.map_err(|e| e.to_string())))
            }
        })
        .await?;

        finished.map_err(GcpError::OperationFailed)
    }

    async fn redis_auth_string(&self, id: &ResourceId) -> Result<Option<String>> {
        let url = format!("{}/authString", self.object_url(id)?);
        Ok(self
            .send(Method::GET, &url, None)
            .await?
            .and_then(|v| v["authString"].as_str().map(String::from)))
    }

    async fn iam_policy(&self, target: &ResourceId) -> Result<Value> {
        let url = self.object_url(target)?;
        match target.kind {
            ResourceKind::Secret => {
                self.send_expect(Method::GET, &format!("{}:getIamPolicy", url), None)
                    .await
            }
            ResourceKind::StorageBucket => {
                self.send_expect(Method::GET, &format!("{}/iam", url), None)
                    .await
            }
            other => Err(GcpError::Unsupported(format!("IAM policy on {}", other))),
        }
    }
}

#[async_trait]
impl GcpApi for RestApi {
    async fn account(&self) -> Result<String> {
        tracing::debug!(url = TOKENINFO_URL, "Checking access token");
        let response = self.client.execute(self.tokeninfo_request()?).await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(GcpError::Api {
                status: status.as_u16(),
                message: error_message(&text),
            });
        }

        let info: Value = serde_json::from_str(&text)?;
        Ok(info["email"]
            .as_str()
            .map(String::from)
            .unwrap_or_else(|| format!("token for project {}", self.project)))
    }

    async fn get(&self, id: &ResourceId) -> Result<Option<Value>> {
        let url = self.object_url(id)?;
        let Some(mut object) = self.send(Method::GET, &url, None).await? else {
            return Ok(None);
        };

        if id.kind == ResourceKind::RedisInstance
            && object["authEnabled"].as_bool() == Some(true)
            && object["state"] == "READY"
        {
            if let Some(auth) = self.redis_auth_string(id).await? {
                object["authString"] = json!(auth);
            }
        }

        Ok(Some(object))
    }

    async fn insert(&self, id: &ResourceId, body: &Value) -> Result<()> {
        tracing::info!(resource = %id.key(), "Creating");
        match id.kind {
            ResourceKind::RedisInstance => {
                let url = format!("{}?instanceId={}", self.redis_parent(), id.name);
                let op = self.send_expect(Method::POST, &url, Some(body)).await?;
                self.wait_operation(op).await
            }
            ResourceKind::Secret => {
                let url = format!("{}?secretId={}", self.secrets_parent(), id.name);
                self.send_expect(Method::POST, &url, Some(body)).await?;
                Ok(())
            }
            ResourceKind::StorageBucket => {
                let url = format!("{}/b?project={}", STORAGE_API, self.project);
                self.send_expect(Method::POST, &url, Some(body)).await?;
                Ok(())
            }
            ResourceKind::SecretVersion | ResourceKind::IamMember => {
                Err(GcpError::Unsupported(id.kind.to_string()))
            }
            kind => {
                let url = self.compute_collection(kind)?;
                let op = self.send_expect(Method::POST, &url, Some(body)).await?;
                self.wait_operation(op).await
            }
        }
    }

    async fn update(&self, id: &ResourceId, body: &Value) -> Result<()> {
        tracing::info!(resource = %id.key(), "Updating");
        let url = self.object_url(id)?;
        match id.kind {
            ResourceKind::RedisInstance => {
                let mask: Vec<&str> = REDIS_UPDATABLE
                    .iter()
                    .copied()
                    .filter(|f| body.get(f).is_some())
                    .collect();
                let url = format!("{}?updateMask={}", url, mask.join(","));
                let op = self.send_expect(Method::PATCH, &url, Some(body)).await?;
                self.wait_operation(op).await
            }
            ResourceKind::Secret => {
                let url = format!("{}?updateMask=labels", url);
                self.send_expect(Method::PATCH, &url, Some(body)).await?;
                Ok(())
            }
            ResourceKind::StorageBucket => {
                self.send_expect(Method::PATCH, &url, Some(body)).await?;
                Ok(())
            }
            ResourceKind::UrlMap | ResourceKind::BackendBucket => {
                // PUT needs the current fingerprint
                let live = self.send_expect(Method::GET, &url, None).await?;
                let mut body = body.clone();
                if let Some(fingerprint) = live.get("fingerprint") {
                    body["fingerprint"] = fingerprint.clone();
                }
                let op = self.send_expect(Method::PUT, &url, Some(&body)).await?;
                self.wait_operation(op).await
            }
            ResourceKind::TargetHttpsProxy => {
                let certs = json!({ "sslCertificates": body["sslCertificates"] });
                let op = self
                    .send_expect(
                        Method::POST,
                        &self.proxy_method_url(id, "setSslCertificates")?,
                        Some(&certs),
                    )
                    .await?;
                self.wait_operation(op).await?;

                let url_map = json!({ "urlMap": body["urlMap"] });
                let op = self
                    .send_expect(Method::POST, &self.proxy_method_url(id, "setUrlMap")?, Some(&url_map))
                    .await?;
                self.wait_operation(op).await
            }
            ResourceKind::TargetHttpProxy => {
                let url_map = json!({ "urlMap": body["urlMap"] });
                let op = self
                    .send_expect(Method::POST, &self.proxy_method_url(id, "setUrlMap")?, Some(&url_map))
                    .await?;
                self.wait_operation(op).await
            }
            kind => Err(GcpError::Unsupported(format!("in-place update of {}", kind))),
        }
    }

    async fn delete(&self, id: &ResourceId) -> Result<()> {
        tracing::info!(resource = %id.key(), "Deleting");
        let url = self.object_url(id)?;
        match self.send(Method::DELETE, &url, None).await? {
            Some(op) if op.is_object() => self.wait_operation(op).await,
            _ => Ok(()),
        }
    }

    async fn empty_bucket(&self, bucket: &str) -> Result<usize> {
        let base = format!("{}/b/{}/o", STORAGE_API, bucket);
        let mut removed = 0;

        // deleting while paging shifts the listing, so always read the first page
        loop {
            let url = format!("{}?fields=items(name)&maxResults=1000", base);
            let Some(page) = self.send(Method::GET, &url, None).await? else {
                return Ok(removed);
            };
            let names: Vec<String> = page["items"]
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(|item| item["name"].as_str().map(String::from))
                .collect();
            if names.is_empty() {
                break;
            }

            for name in names {
                let url = format!("{}/{}", base, urlencoding::encode(&name));
                self.send(Method::DELETE, &url, None).await?;
                removed += 1;
            }
        }

        tracing::info!(bucket, removed, "Emptied bucket");
        Ok(removed)
    }

    async fn list_names(&self, kind: ResourceKind, prefix: &str) -> Result<Vec<String>> {
        let base = self.compute_collection(kind)?;
        let mut names = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let url = match &page_token {
                Some(token) => format!("{}?pageToken={}", base, token),
                None => base.clone(),
            };
            let page = self.send_expect(Method::GET, &url, None).await?;

            names.extend(
                page["items"]
                    .as_array()
                    .into_iter()
                    .flatten()
                    .filter_map(|item| item["name"].as_str())
                    .filter(|name| name.starts_with(prefix))
                    .map(String::from),
            );

            match page["nextPageToken"].as_str() {
                Some(token) if !token.is_empty() => page_token = Some(token.to_string()),
                _ => break,
            }
        }

        Ok(names)
    }

    async fn latest_secret_payload(&self, secret: &str) -> Result<Option<String>> {
        let url = format!("{}/{}/versions/latest:access", self.secrets_parent(), secret);
        let response = match self.send(Method::GET, &url, None).await {
            Ok(response) => response,
            // no enabled version
            Err(GcpError::Api { status: 400, .. }) => None,
            Err(e) => return Err(e),
        };

        let Some(data) = response.as_ref().and_then(|v| v["payload"]["data"].as_str()) else {
            return Ok(None);
        };
        let bytes = BASE64
            .decode(data)
            .map_err(|e| GcpError::InvalidResponse(format!("secret payload: {}", e)))?;
        Ok(Some(String::from_utf8_lossy(&bytes).to_string()))
    }

    async fn add_secret_version(&self, secret: &str, payload: &str) -> Result<String> {
        let url = format!("{}/{}:addVersion", self.secrets_parent(), secret);
        let body = json!({ "payload": { "data": BASE64.encode(payload.as_bytes()) } });
        let version = self.send_expect(Method::POST, &url, Some(&body)).await?;
        Ok(version["name"].as_str().unwrap_or_default().to_string())
    }

    async fn get_iam_members(&self, target: &ResourceId, role: &str) -> Result<Vec<String>> {
        let policy = self.iam_policy(target).await?;
        Ok(binding_members(&policy, role))
    }

    async fn set_iam_members(
        &self,
        target: &ResourceId,
        role: &str,
        members: &[String],
    ) -> Result<()> {
        let mut policy = self.iam_policy(target).await?;
        set_binding(&mut policy, role, members);

        let url = self.object_url(target)?;
        match target.kind {
            ResourceKind::Secret => {
                let body = json!({ "policy": policy });
                self.send_expect(Method::POST, &format!("{}:setIamPolicy", url), Some(&body))
                    .await?;
            }
            _ => {
                self.send_expect(Method::PUT, &format!("{}/iam", url), Some(&policy))
                    .await?;
            }
        }
        tracing::info!(resource = %target.key(), role = %role, members = members.len(), "Set IAM binding");
        Ok(())
    }
}

/// Outcome of a finished operation; `None` while it is still running
///
/// Compute operations report `status`, other APIs report `done`.
fn operation_result(op: &Value) -> Option<Result<()>> {
    let finished = op["status"] == "DONE" || op["done"] == json!(true);
    if !finished {
        return None;
    }

    if let Some(errors) = op["error"]["errors"].as_array() {
        let messages: Vec<&str> = errors.iter().filter_map(|e| e["message"].as_str()).collect();
        return Some(Err(GcpError::OperationFailed(messages.join("; "))));
    }
    if let Some(message) = op["error"]["message"].as_str() {
        return Some(Err(GcpError::OperationFailed(message.to_string())));
    }
    Some(Ok(()))
}

/// Message from a Google API error body
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(String::from))
        .unwrap_or_else(|| body.trim().to_string())
}
