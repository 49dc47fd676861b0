//! Error types for the attribute store

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during state store operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored value could not be encoded or decoded
    #[error("invalid attribute value: {0}")]
    Json(#[from] serde_json::Error),

    /// The state file's parent directory could not be created
    #[error("cannot create state directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No deployment matches the given UUID or name
    #[error("deployment not found: {0}")]
    DeploymentNotFound(String),

    /// More than one deployment carries the given name
    #[error("deployment name '{0}' is ambiguous; use the UUID instead")]
    AmbiguousDeployment(String),

    /// A deployment with this UUID already exists
    #[error("deployment already exists: {0}")]
    DeploymentExists(String),

    /// No resource with this name exists in the deployment
    #[error("resource '{name}' not found in deployment {deployment}")]
    ResourceNotFound { deployment: String, name: String },

    /// A resource with this name already exists in the deployment
    #[error("resource '{name}' already exists in deployment {deployment}")]
    ResourceExists { deployment: String, name: String },

    /// A resource was re-declared with a different type
    #[error("resource '{name}' has type '{existing}', cannot redeclare it as '{requested}'")]
    TypeMismatch {
        name: String,
        existing: String,
        requested: String,
    },
}

/// Result type for state store operations
pub type Result<T> = std::result::Result<T, Error>;
