use std::fmt::Display;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A single source could not be turned into chunks. Never aborts a batch.
    #[error("Ingestion failed for '{source_name}': {reason}")]
    Ingestion { source_name: String, reason: String },

    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Embedder mismatch: index was built with '{stored}' but the active embedder is '{active}'")]
    EmbedderMismatch { stored: String, active: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Model error: {0}")]
    Model(String),
}

impl Error {
    pub fn ingestion(source_name: impl Into<String>, reason: impl Display) -> Self {
        Self::Ingestion { source_name: source_name.into(), reason: reason.to_string() }
    }

    pub fn index(err: impl Display) -> Self { Self::IndexUnavailable(err.to_string()) }

    pub fn model(err: impl Display) -> Self { Self::Model(err.to_string()) }
}

pub type Result<T> = std::result::Result<T, Error>;
