//! gcloud CLI wrapper
//!
//! Only used for credentials.

use crate::error::{GcpError, Result};
use std::process::Stdio;
use tokio::process::Command;

/// Access token taken as-is when set
pub const TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

/// gcloud CLI wrapper
#[derive(Debug, Clone, Default)]
pub struct Gcloud;

impl Gcloud {
    pub fn new() -> Self {
        Self
    }

    /// Run a gcloud command and return trimmed stdout
    async fn run_command(&self, args: &[&str]) -> Result<String> {
        let mut cmd = Command::new("gcloud");
        cmd.args(args);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!("Running: gcloud {}", args.join(" "));

        let output = cmd.output().await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => GcpError::GcloudNotFound,
            _ => GcpError::Io(e),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GcpError::CommandFailed(stderr.trim().to_string()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    pub async fn print_access_token(&self) -> Result<String> {
        let token = self.run_command(&["auth", "print-access-token"]).await?;
        if token.is_empty() {
            return Err(GcpError::TokenUnavailable(
                "gcloud returned an empty token; run `gcloud auth login`".to_string(),
            ));
        }
        Ok(token)
    }
}

/// Token from the environment, falling back to gcloud
pub async fn resolve_access_token() -> Result<String> {
    if let Some(token) = std::env::var(TOKEN_ENV).ok().and_then(non_empty) {
        tracing::debug!("Using access token from {}", TOKEN_ENV);
        return Ok(token);
    }

    Gcloud::new()
        .print_access_token()
        .await
        .map_err(|e| match e {
            GcpError::CommandFailed(msg) => GcpError::TokenUnavailable(msg),
            other => other,
        })
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() || trimmed == "(unset)" {
        None
    } else {
        Some(trimmed.to_string())
    }
}
