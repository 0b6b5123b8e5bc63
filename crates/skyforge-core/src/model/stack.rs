//! Stack-wide settings

use crate::model::{CacheConfig, FrontendConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_REGION: &str = "us-central1";
pub const DEFAULT_ENVIRONMENT: &str = "production";
pub const DEFAULT_NAME: &str = "chatbot";

/// A loaded stack definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stack {
    /// GCP project ID
    pub project: String,

    /// Region for regional resources (the cache instance)
    pub region: String,

    /// Environment name (production, staging, ...)
    pub environment: String,

    /// Application name, first half of every resource name
    pub name: String,

    /// Extra labels added to every labelled resource
    pub labels: BTreeMap<String, String>,

    /// Cache provisioning unit, if declared
    pub cache: Option<CacheConfig>,

    /// Frontend delivery unit, if declared
    pub frontend: Option<FrontendConfig>,
}

impl Default for Stack {
    fn default() -> Self {
        Self {
            project: String::new(),
            region: DEFAULT_REGION.to_string(),
            environment: DEFAULT_ENVIRONMENT.to_string(),
            name: DEFAULT_NAME.to_string(),
            labels: BTreeMap::new(),
            cache: None,
            frontend: None,
        }
    }
}

impl Stack {
    /// The naming/location context handed to every unit builder
    pub fn context(&self) -> StackContext {
        StackContext {
            project: self.project.clone(),
            region: self.region.clone(),
            environment: self.environment.clone(),
            name: self.name.clone(),
            labels: self.labels.clone(),
        }
    }
}

/// Explicit naming context for resource builders
///
/// Resource names are derived from this value only; builders never look
/// anything up from the environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackContext {
    pub project: String,
    pub region: String,
    pub environment: String,
    pub name: String,
    pub labels: BTreeMap<String, String>,
}

impl StackContext {
    /// `<name>-<environment>`, e.g. `chatbot-production`
    pub fn prefix(&self) -> String {
        format!("{}-{}", self.name, self.environment)
    }

    /// Resource name with the stack prefix
    pub fn resource_name(&self, suffix: &str) -> String {
        format!("{}-{}", self.prefix(), suffix)
    }

    /// Name of the frontend bucket; bucket names are global, so the
    /// project ID is part of it
    pub fn frontend_bucket_name(&self) -> String {
        format!("{}-{}-frontend", self.project, self.prefix())
    }

    /// Service account granted read access to the cache secrets when none
    /// is configured
    pub fn default_accessor(&self) -> String {
        format!(
            "serviceAccount:{}@{}.iam.gserviceaccount.com",
            self.prefix(),
            self.project
        )
    }

    /// Labels applied to labelled resources
    pub fn resource_labels(&self) -> BTreeMap<String, String> {
        let mut labels = self.labels.clone();
        labels.insert("app".to_string(), self.name.clone());
        labels.insert("environment".to_string(), self.environment.clone());
        labels.insert("managed-by".to_string(), "skyforge".to_string());
        labels
    }
}
