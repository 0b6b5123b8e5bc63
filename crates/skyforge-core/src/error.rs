use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StackError {
    #[error("KDL parse error: {0}")]
    KdlParse(#[from] kdl::KdlError),

    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO error: {path}\nreason: {message}")]
    IoError { path: PathBuf, message: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("template error: {file}\nreason: {message}")]
    TemplateError { file: PathBuf, message: String },

    #[error("template render error: {0}")]
    TemplateRenderError(String),

    #[error("invalid stack configuration:\n  - {}", .0.join("\n  - "))]
    Validation(Vec<String>),
}

impl StackError {
    /// Individual validation issues, if this is a validation error
    pub fn issues(&self) -> &[String] {
        match self {
            StackError::Validation(issues) => issues,
            _ => &[],
        }
    }
}

pub type Result<T> = std::result::Result<T, StackError>;
