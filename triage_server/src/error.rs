//! Error type of the triage server.
//!
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TriageError {
    /// A file the loader needs is missing on disk.
    #[error("model file not found at {}", .0.display())]
    NotFound(PathBuf),

    /// The artifact exists but could not be turned into a runnable classifier.
    #[error("error loading model: {0}")]
    Load(String),

    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("prediction failed: {0}")]
    Prediction(String),

    /// The upload was rejected before any inference work.
    #[error("{0}")]
    Validation(String),

    #[error("no file uploaded under field `{0}`")]
    MissingUpload(&'static str),

    #[error("malformed upload: {0}")]
    Upload(String),

    #[error("upload too large: {0}")]
    TooLarge(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl TriageError {
    /// Wrap a tract/anyhow failure raised while assembling the model.
    pub fn load(err: impl Into<anyhow::Error>) -> Self {
        TriageError::Load(format!("{:#}", err.into()))
    }

    /// Wrap a tract/anyhow failure raised while running the model.
    pub fn prediction(err: impl Into<anyhow::Error>) -> Self {
        TriageError::Prediction(format!("{:#}", err.into()))
    }
}
