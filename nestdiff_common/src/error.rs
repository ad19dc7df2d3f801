use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NestDiffError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Hashing an artifact failed (missing file, permission denied, ...)
    #[error("Artifact unreadable: {path}: {source}")]
    ArtifactUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Extraction of {artifact} with {tool} failed: {reason}")]
    Extraction {
        tool: String,
        artifact: PathBuf,
        reason: String,
    },

    #[error("External tool not found: {0}")]
    ToolMissing(String),

    #[error("Path error: {0}")]
    Path(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Walk error: {0}")]
    Walk(String),
}

pub type Result<T> = std::result::Result<T, NestDiffError>;
