//! Published outputs
//!
//! Outputs are read back from the local state, from the very payloads that
//! were last written to the secrets, so the connection URI always matches
//! what the secrets hold.

use crate::PROVIDER_NAME;
use crate::names::Names;
use serde::Serialize;
use skyforge_cloud::GlobalState;
use skyforge_core::Stack;

/// Shown instead of sensitive values
pub const MASK: &str = "<sensitive>";

/// One published output
#[derive(Debug, Clone, Serialize)]
pub struct Output {
    pub name: &'static str,
    pub value: Option<String>,
    pub sensitive: bool,
    pub description: &'static str,
}

impl Output {
    fn new(name: &'static str, description: &'static str, value: Option<String>) -> Self {
        Self {
            name,
            value,
            sensitive: false,
            description,
        }
    }

    fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    /// Value as shown to the user
    pub fn display_value(&self, show_sensitive: bool) -> Option<String> {
        match &self.value {
            Some(_) if self.sensitive && !show_sensitive => Some(MASK.to_string()),
            other => other.clone(),
        }
    }
}

/// Compute every output of the declared units from the state
pub fn compute_outputs(stack: &Stack, state: &GlobalState) -> Vec<Output> {
    let names = Names::new(&stack.context());
    let mut outputs = Vec::new();

    if let Some(cache) = &stack.cache {
        let published = |coordinate: &str| -> Option<String> {
            state
                .attributes(PROVIDER_NAME, &names.secret_version(coordinate).key())
                .and_then(|attrs| attrs.get("payload"))
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .map(String::from)
        };

        let host = published("host");
        let port = published("port");
        let auth = if cache.auth_enabled {
            published("auth")
        } else {
            None
        };

        let uri = match (&host, &port) {
            (Some(host), Some(port)) if cache.auth_enabled => auth.as_ref().map(|auth| {
                format!(
                    "{}://:{}@{}:{}",
                    cache.transit_encryption.uri_scheme(),
                    urlencoding::encode(auth),
                    host,
                    port
                )
            }),
            (Some(host), Some(port)) => Some(format!(
                "{}://{}:{}",
                cache.transit_encryption.uri_scheme(),
                host,
                port
            )),
            _ => None,
        };

        outputs.push(Output::new("cache_host", "Cache instance host", host));
        outputs.push(Output::new("cache_port", "Cache instance port", port));
        if cache.auth_enabled {
            outputs.push(Output::new("cache_auth", "Cache AUTH string", auth).sensitive());
        }
        outputs.push(
            Output::new("cache_connection_uri", "Cache connection URI", uri).sensitive(),
        );
    }

    if let Some(frontend) = &stack.frontend {
        let attribute = |key: String, attr: &str| -> Option<String> {
            state
                .attributes(PROVIDER_NAME, &key)
                .and_then(|attrs| attrs.get(attr))
                .and_then(|v| v.as_str())
                .map(String::from)
        };

        let bucket = attribute(names.bucket().key(), "name");
        let ip = attribute(names.address().key(), "address");
        let url = frontend
            .primary_domain()
            .map(|domain| format!("https://{}", domain));
        let dns = ip.as_ref().map(|ip| {
            format!(
                "Create an A record for each of {} pointing to {}. \
                 The managed certificate is provisioned once DNS resolves to this address.",
                frontend.domains.join(", "),
                ip
            )
        });

        outputs.push(Output::new("frontend_bucket", "Bucket serving the frontend", bucket));
        outputs.push(Output::new("frontend_url", "Public frontend URL", url));
        outputs.push(Output::new("frontend_ip", "Load balancer address", ip));
        outputs.push(Output::new("dns_instructions", "DNS setup", dns));
    }

    outputs
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use skyforge_cloud::{ResourceState, ResourceStatus};
    use skyforge_core::{CacheConfig, FrontendConfig};

    fn stack() -> Stack {
        Stack {
            project: "demo-project".to_string(),
            cache: Some(CacheConfig::default()),
            frontend: Some(FrontendConfig::default()),
            ..Default::default()
        }
    }

    fn put(state: &mut GlobalState, key: &str, attrs: &[(&str, &str)]) {
        let (resource_type, id) = key.split_once(':').unwrap();
        let mut resource = ResourceState::new(id, resource_type).with_status(ResourceStatus::Ready);
        for (k, v) in attrs {
            resource = resource.with_attribute(*k, json!(v));
        }
        state.set_resource(format!("{}:{}", PROVIDER_NAME, key), resource);
    }

    fn find<'a>(outputs: &'a [Output], name: &str) -> &'a Output {
        outputs.iter().find(|o| o.name == name).unwrap()
    }

    #[test]
    fn test_uri_is_built_from_published_payloads() {
        let mut state = GlobalState::new();
        put(&mut state, "secret-version:chatbot-production-redis-host", &[("payload", "10.0.0.3")]);
        put(&mut state, "secret-version:chatbot-production-redis-port", &[("payload", "6379")]);
        put(&mut state, "secret-version:chatbot-production-redis-auth", &[("payload", "s3cret")]);

        let outputs = compute_outputs(&stack(), &state);
        assert_eq!(
            find(&outputs, "cache_connection_uri").value.as_deref(),
            Some("redis://:s3cret@10.0.0.3:6379")
        );
        assert_eq!(find(&outputs, "cache_host").value.as_deref(), Some("10.0.0.3"));
    }

    #[test]
    fn test_sensitive_values_are_masked() {
        let mut state = GlobalState::new();
        put(&mut state, "secret-version:chatbot-production-redis-auth", &[("payload", "s3cret")]);

        let outputs = compute_outputs(&stack(), &state);
        let auth = find(&outputs, "cache_auth");
        assert_eq!(auth.display_value(false).as_deref(), Some(MASK));
        assert_eq!(auth.display_value(true).as_deref(), Some("s3cret"));
        assert_eq!(find(&outputs, "cache_connection_uri").value, None);
    }

    #[test]
    fn test_frontend_outputs() {
        let mut state = GlobalState::new();
        put(&mut state, "global-address:chatbot-production-ip", &[("address", "34.1.2.3")]);
        put(
            &mut state,
            "storage-bucket:demo-project-chatbot-production-frontend",
            &[("name", "demo-project-chatbot-production-frontend")],
        );

        let outputs = compute_outputs(&stack(), &state);
        assert_eq!(find(&outputs, "frontend_ip").value.as_deref(), Some("34.1.2.3"));
        assert_eq!(
            find(&outputs, "frontend_url").value.as_deref(),
            Some("https://chatbot.example.com")
        );
        assert!(
            find(&outputs, "dns_instructions")
                .value
                .as_deref()
                .unwrap()
                .contains("chatbot.example.com pointing to 34.1.2.3")
        );
    }

    #[test]
    fn test_auth_is_percent_encoded_in_uri() {
        let mut state = GlobalState::new();
        put(&mut state, "secret-version:chatbot-production-redis-host", &[("payload", "10.0.0.3")]);
        put(&mut state, "secret-version:chatbot-production-redis-port", &[("payload", "6379")]);
        put(&mut state, "secret-version:chatbot-production-redis-auth", &[("payload", "a@b/c:d")]);

        let outputs = compute_outputs(&stack(), &state);
        assert_eq!(
            find(&outputs, "cache_connection_uri").value.as_deref(),
            Some("redis://:a%40b%2Fc%3Ad@10.0.0.3:6379")
        );
        assert_eq!(find(&outputs, "cache_auth").value.as_deref(), Some("a@b/c:d"));
    }

    #[test]
    fn test_uri_without_auth() {
        let mut stack = stack();
        if let Some(cache) = stack.cache.as_mut() {
            cache.auth_enabled = false;
        }
        let mut state = GlobalState::new();
        put(&mut state, "secret-version:chatbot-production-redis-host", &[("payload", "10.0.0.3")]);
        put(&mut state, "secret-version:chatbot-production-redis-port", &[("payload", "6379")]);

        let outputs = compute_outputs(&stack, &state);
        assert!(outputs.iter().all(|o| o.name != "cache_auth"));
        assert_eq!(
            find(&outputs, "cache_connection_uri").value.as_deref(),
            Some("redis://10.0.0.3:6379")
        );
    }
}
