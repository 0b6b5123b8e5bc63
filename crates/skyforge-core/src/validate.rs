//! Stack validation
//!
//! Every rule is checked and all violations are reported together, before
//! any provider is constructed.

use crate::error::{Result, StackError};
use crate::model::{CacheConfig, FrontendConfig, MAX_REPLICA_COUNT, Stack};

/// Redis instance IDs are limited to 40 characters; `-cache` takes six
pub const MAX_PREFIX_LEN: usize = 34;

/// Bucket names are limited to 63 characters
pub const MAX_BUCKET_NAME_LEN: usize = 63;

/// Domains per managed certificate
pub const MAX_CERTIFICATE_DOMAINS: usize = 100;

/// Read replicas need at least this much memory
pub const MIN_REPLICA_MEMORY_GB: u32 = 5;

/// Validate a stack, collecting every violation
pub fn validate_stack(stack: &Stack) -> Result<()> {
    let mut issues = Vec::new();
    let ctx = stack.context();

    if stack.project.trim().is_empty() {
        issues.push("project must be set".to_string());
    }
    if stack.region.trim().is_empty() {
        issues.push("region must not be empty".to_string());
    }
    if !is_resource_name(&stack.name) {
        issues.push(format!(
            "name '{}' must start with a letter and contain only lowercase letters, digits and '-'",
            stack.name
        ));
    }
    if !is_resource_name(&stack.environment) {
        issues.push(format!(
            "environment '{}' must start with a letter and contain only lowercase letters, digits and '-'",
            stack.environment
        ));
    }
    if ctx.prefix().len() > MAX_PREFIX_LEN {
        issues.push(format!(
            "'{}' is too long: name and environment together may use at most {} characters",
            ctx.prefix(),
            MAX_PREFIX_LEN
        ));
    }

    if stack.cache.is_none() && stack.frontend.is_none() {
        issues.push("no unit declared: add a cache or frontend block".to_string());
    }

    if let Some(cache) = &stack.cache {
        validate_cache(cache, &mut issues);
    }

    if let Some(frontend) = &stack.frontend {
        validate_frontend(frontend, &mut issues);
        let bucket = ctx.frontend_bucket_name();
        if bucket.len() > MAX_BUCKET_NAME_LEN {
            issues.push(format!(
                "frontend bucket name '{}' exceeds {} characters",
                bucket, MAX_BUCKET_NAME_LEN
            ));
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        tracing::debug!(count = issues.len(), "Stack validation failed");
        Err(StackError::Validation(issues))
    }
}

fn validate_cache(cache: &CacheConfig, issues: &mut Vec<String>) {
    if cache.memory_size_gb == 0 {
        issues.push("cache memory-size-gb must be greater than 0".to_string());
    }

    if cache.replica_count > MAX_REPLICA_COUNT {
        issues.push(format!(
            "cache replica-count must be between 0 and {}, got {}",
            MAX_REPLICA_COUNT, cache.replica_count
        ));
    }

    if cache.replica_count > 0 {
        if !cache.tier.supports_replicas() {
            issues.push(format!(
                "cache replica-count {} requires tier \"high-availability\" (tier is \"{}\")",
                cache.replica_count, cache.tier
            ));
        }
        if cache.memory_size_gb > 0 && cache.memory_size_gb < MIN_REPLICA_MEMORY_GB {
            issues.push(format!(
                "cache read replicas require memory-size-gb of at least {}",
                MIN_REPLICA_MEMORY_GB
            ));
        }
    }

    if cache.redis_version.trim().is_empty() {
        issues.push("cache redis-version must not be empty".to_string());
    }
    if cache.network.trim().is_empty() {
        issues.push("cache network must not be empty".to_string());
    }

    if let Some(accessor) = &cache.accessor {
        if !accessor.contains(':') {
            issues.push(format!(
                "cache accessor '{}' must be an IAM member such as serviceAccount:name@project.iam.gserviceaccount.com",
                accessor
            ));
        }
    }
}

fn validate_frontend(frontend: &FrontendConfig, issues: &mut Vec<String>) {
    if frontend.domains.is_empty() {
        issues.push("frontend domains must list at least one domain".to_string());
    }

    for domain in &frontend.domains {
        if !is_hostname(domain) {
            issues.push(format!("frontend domain '{}' is not a valid hostname", domain));
        }
    }

    if frontend.normalized_domains().len() != frontend.domains.len() {
        issues.push("frontend domains contain duplicates".to_string());
    }

    if frontend.domains.len() > MAX_CERTIFICATE_DOMAINS {
        issues.push(format!(
            "a managed certificate covers at most {} domains",
            MAX_CERTIFICATE_DOMAINS
        ));
    }

    if frontend.location.trim().is_empty() {
        issues.push("frontend location must not be empty".to_string());
    }

    if frontend.entry_document.trim().is_empty() {
        issues.push("frontend entry-document must not be empty".to_string());
    } else if frontend.entry_document.starts_with('/') {
        issues.push(format!(
            "frontend entry-document '{}' must be an object name without a leading '/'",
            frontend.entry_document
        ));
    }
}

/// Lowercase letter first, then lowercase letters, digits and dashes; no
/// trailing dash
fn is_resource_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return false,
    }
    !s.ends_with('-')
        && s
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

fn is_hostname(s: &str) -> bool {
    let s = s.trim_end_matches('.');
    if s.is_empty() || s.len() > 253 || !s.contains('.') {
        return false;
    }
    s.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}
