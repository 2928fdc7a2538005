use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Failed to read registry credentials: {0}")]
    Credentials(#[from] CredentialError),

    #[error("Invalid reference {reference:?}: {reason}")]
    InvalidReference { reference: String, reason: String },
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Failed to access credentials at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed credentials: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Credential task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("Failed to parse chart reference: {0}")]
    InvalidReference(#[source] RegistryError),

    #[error("Failed to list tags for {reference}: {source}")]
    ListTags {
        reference: String,
        #[source]
        source: RegistryError,
    },

    #[error("Failed to store registry credentials for {scope}: {source}")]
    Credentials {
        scope: String,
        #[source]
        source: CredentialError,
    },

    #[error("Failed to get chart {image:?}: {source}")]
    Fetch {
        image: String,
        #[source]
        source: RegistryError,
    },
}
