//! Google Cloud provider for skyforge
//!
//! This crate implements the CloudProvider trait for Google Cloud and turns
//! a [`Stack`] into the resources of its two provisioning units.
//!
//! # Units
//!
//! - cache: Memorystore for Redis, its connection secrets and accessor
//!   bindings
//! - frontend: website bucket, Cloud CDN backend, HTTPS load balancer with
//!   a managed certificate, HTTP to HTTPS redirect
//!
//! # Requirements
//!
//! - `GOOGLE_OAUTH_ACCESS_TOKEN`, or `gcloud` logged in
//!   (`gcloud auth login`)
//!
//! # Example
//!
//! ```ignore
//! use skyforge_cloud::CloudProvider;
//! use skyforge_cloud_gcp::{GcpProvider, RestApi, desired_resources};
//! use std::sync::Arc;
//!
//! let api = RestApi::connect(&stack.project, &stack.region).await?;
//! let provider = GcpProvider::new(Arc::new(api));
//!
//! let plan = provider.plan(&desired_resources(&stack, None)?).await?;
//! let result = provider.apply(&plan).await?;
//! ```

pub mod api;
pub mod cache;
pub mod diff;
pub mod error;
pub mod frontend;
pub mod gcloud;
pub mod names;
pub mod outputs;
pub mod provider;
pub mod rest;

pub use api::{GcpApi, ResourceId, ResourceKind};
pub use error::{GcpError, Result};
pub use names::Names;
pub use outputs::{Output, compute_outputs};
pub use provider::GcpProvider;
pub use rest::RestApi;

use skyforge_cloud::ResourceSet;
use skyforge_core::Stack;
use std::fmt;
use std::str::FromStr;

/// Provider name recorded in state keys
pub const PROVIDER_NAME: &str = "google-cloud";

/// A provisioning unit of a stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Cache,
    Frontend,
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unit::Cache => write!(f, "cache"),
            Unit::Frontend => write!(f, "frontend"),
        }
    }
}

impl FromStr for Unit {
    type Err = GcpError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "cache" => Ok(Unit::Cache),
            "frontend" => Ok(Unit::Frontend),
            other => Err(GcpError::UnknownUnit(other.to_string())),
        }
    }
}

/// Resources of the declared units, optionally limited to one unit
///
/// Asking for a unit the stack does not declare is an error.
pub fn desired_resources(stack: &Stack, unit: Option<Unit>) -> Result<ResourceSet> {
    let ctx = stack.context();
    let mut set = ResourceSet::new();

    let wants = |u: Unit| unit.is_none_or(|selected| selected == u);

    if wants(Unit::Cache) {
        match &stack.cache {
            Some(cache) => set.extend(cache::cache_resources(&ctx, cache)),
            None if unit.is_some() => {
                return Err(GcpError::UnitNotDeclared(Unit::Cache.to_string()));
            }
            None => {}
        }
    }

    if wants(Unit::Frontend) {
        match &stack.frontend {
            Some(frontend) => set.extend(frontend::frontend_resources(&ctx, frontend)),
            None if unit.is_some() => {
                return Err(GcpError::UnitNotDeclared(Unit::Frontend.to_string()));
            }
            None => {}
        }
    }

    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use skyforge_core::{CacheConfig, FrontendConfig};

    fn stack() -> Stack {
        Stack {
            project: "demo-project".to_string(),
            cache: Some(CacheConfig::default()),
            frontend: Some(FrontendConfig::default()),
            ..Default::default()
        }
    }

    #[test]
    fn test_both_units_are_independent() {
        let all = desired_resources(&stack(), None).unwrap();
        let cache = desired_resources(&stack(), Some(Unit::Cache)).unwrap();
        let frontend = desired_resources(&stack(), Some(Unit::Frontend)).unwrap();

        assert_eq!(all.len(), cache.len() + frontend.len());
        assert!(cache.by_type("url-map").is_empty());
        assert!(frontend.by_type("redis-instance").is_empty());
    }

    #[test]
    fn test_missing_unit_is_an_error() {
        let mut stack = stack();
        stack.cache = None;
        assert!(desired_resources(&stack, Some(Unit::Cache)).is_err());
        assert_eq!(desired_resources(&stack, None).unwrap().by_type("redis-instance").len(), 0);
    }

    #[test]
    fn test_unit_parse() {
        assert_eq!("cache".parse::<Unit>().unwrap(), Unit::Cache);
        assert!("database".parse::<Unit>().is_err());
    }
}
