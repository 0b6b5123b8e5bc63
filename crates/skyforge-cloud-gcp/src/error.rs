//! Google Cloud provider error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GcpError {
    #[error("gcloud not found. Install the Google Cloud SDK or set GOOGLE_OAUTH_ACCESS_TOKEN")]
    GcloudNotFound,

    #[error("no access token available: {0}")]
    TokenUnavailable(String),

    #[error("gcloud command failed: {0}")]
    CommandFailed(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("operation failed: {0}")]
    OperationFailed(String),

    #[error("unexpected API response: {0}")]
    InvalidResponse(String),

    #[error("unsupported resource type: {0}")]
    Unsupported(String),

    #[error("the stack declares no {0} block")]
    UnitNotDeclared(String),

    #[error("unknown unit '{0}' (expected 'cache' or 'frontend')")]
    UnknownUnit(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cloud error: {0}")]
    Cloud(#[from] skyforge_cloud::CloudError),
}

impl From<GcpError> for skyforge_cloud::CloudError {
    fn from(e: GcpError) -> Self {
        match e {
            GcpError::Cloud(inner) => inner,
            GcpError::GcloudNotFound | GcpError::TokenUnavailable(_) => {
                skyforge_cloud::CloudError::AuthenticationFailed(e.to_string())
            }
            GcpError::Unsupported(kind) => skyforge_cloud::CloudError::UnsupportedResource(kind),
            other => skyforge_cloud::CloudError::ApiError(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, GcpError>;
