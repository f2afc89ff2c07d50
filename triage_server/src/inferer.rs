use bytes::Bytes;
use common::protocol::Label;

use crate::{
    config::FallbackPolicy,
    error::TriageError,
    loader::ModelLoader,
    nn::{decode_image, InferModel, Prediction},
};

/// Runs predictions on uploaded images with the classifier of its loader.
pub struct Inferer {
    loader: ModelLoader,
    fallback: FallbackPolicy,
}

impl Inferer {
    pub fn new(loader: ModelLoader, fallback: FallbackPolicy) -> Self {
        Self { loader, fallback }
    }

    pub fn loader(&self) -> &ModelLoader {
        &self.loader
    }

    pub fn fallback(&self) -> FallbackPolicy {
        self.fallback
    }

    /// Load the classifier ahead of the first request.
    pub async fn warm_up(&self) -> Result<(), TriageError> {
        self.loader.load().await.map(|_| ())
    }

    /// Classify raw image bytes.
    ///
    /// With [`FallbackPolicy::Lenient`] every failure is answered with
    /// [`Prediction::unknown`] instead of an error.
    pub async fn predict(&self, image: Bytes) -> Result<Prediction, TriageError> {
        match self.try_predict(image).await {
            Ok(prediction) => Ok(prediction),
            Err(e) => match self.fallback {
                FallbackPolicy::Lenient => {
                    log::error!("Prediction failed, answering {}: {e}", Label::Unknown);
                    Ok(Prediction::unknown())
                }
                FallbackPolicy::Strict => Err(e),
            },
        }
    }

    async fn try_predict(&self, image: Bytes) -> Result<Prediction, TriageError> {
        let classifier = self.loader.load().await?;

        // Decoding and the forward pass are CPU bound, keep them off the async workers.
        tokio::task::spawn_blocking(move || {
            let image = decode_image(&image)?;
            classifier.run(&image)
        })
        .await
        .map_err(|e| TriageError::Prediction(format!("inference task failed: {e}")))?
    }
}
