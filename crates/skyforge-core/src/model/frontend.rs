//! Frontend delivery unit settings

use serde::{Deserialize, Serialize};

pub const DEFAULT_DOMAIN: &str = "chatbot.example.com";
pub const DEFAULT_LOCATION: &str = "US";
pub const DEFAULT_ENTRY_DOCUMENT: &str = "index.html";

/// Settings of the frontend delivery unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontendConfig {
    /// Domains covered by the managed certificate
    pub domains: Vec<String>,

    /// Bucket location (multi-region or region)
    pub location: String,

    /// Document served for `/` and for every missing object
    pub entry_document: String,
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            domains: vec![DEFAULT_DOMAIN.to_string()],
            location: DEFAULT_LOCATION.to_string(),
            entry_document: DEFAULT_ENTRY_DOCUMENT.to_string(),
        }
    }
}

impl FrontendConfig {
    /// Domains sorted and de-duplicated, as they identify the certificate
    pub fn normalized_domains(&self) -> Vec<String> {
        let mut domains: Vec<String> = self
            .domains
            .iter()
            .map(|d| d.trim().trim_end_matches('.').to_ascii_lowercase())
            .collect();
        domains.sort();
        domains.dedup();
        domains
    }

    /// The first configured domain, used for the public URL
    pub fn primary_domain(&self) -> Option<&str> {
        self.domains.first().map(String::as_str)
    }
}
