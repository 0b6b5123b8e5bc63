use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config directory not found")]
    ConfigDirNotFound,

    #[error(
        "stack file not found. Looked in:\n\
        - current directory: stack.local.kdl, .stack.local.kdl, stack.kdl, .stack.kdl\n\
        - ./.skyforge/\n\
        - ~/.config/skyforge/stack.kdl\n\
        Set SKYFORGE_CONFIG_PATH or pass --config to point at a file directly"
    )]
    StackFileNotFound,

    #[error("{0} does not exist")]
    ExplicitPathMissing(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
