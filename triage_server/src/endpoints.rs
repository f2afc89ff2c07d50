//! Endpoints of HTTP server.
//!
use std::{sync::Arc, time::Instant};

use axum::{
    extract::{multipart::MultipartError, Multipart},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use bytes::Bytes;
use common::protocol::{ErrorDetail, HealthResponse, PredictionResponse};

use crate::{error::TriageError, inferer::Inferer};

/// Multipart field carrying the image.
pub const UPLOAD_FIELD: &str = "file";

/// Health check endpoint.
pub async fn healthcheck() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

/// Classify an uploaded image as acne or other.
pub async fn triage_image(
    Extension(inferer): Extension<Arc<Inferer>>,
    mut multipart: Multipart,
) -> Response {
    let start = Instant::now();

    let image = match read_image_upload(&mut multipart).await {
        Ok(image) => image,
        Err(e) => {
            log::info!("Rejected upload: {e}");
            return error_response(&e, start.elapsed().as_millis() as u64);
        }
    };
    log::debug!("Received image of {} bytes", image.len());

    let result = inferer.predict(image).await;
    let processing_time_ms = start.elapsed().as_millis() as u64;

    match result {
        Ok(prediction) => {
            log::info!(
                "Triaged image as {} ({:.4}) in {} ms",
                prediction.label,
                prediction.confidence,
                processing_time_ms
            );
            Json(PredictionResponse::new(
                prediction.label,
                prediction.confidence,
                processing_time_ms,
            ))
            .into_response()
        }
        Err(e) => {
            log::error!("Error processing image: {e}");
            error_response(&e, processing_time_ms)
        }
    }
}

/// Pull the image out of the multipart form, checking its declared content type before
/// reading any bytes.
async fn read_image_upload(multipart: &mut Multipart) -> Result<Bytes, TriageError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(upload_error)?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let is_image = field
            .content_type()
            .map_or(false, |content_type| content_type.starts_with("image/"));
        if !is_image {
            return Err(TriageError::Validation(
                "Uploaded file is not an image. Please upload an image file.".into(),
            ));
        }

        return field
            .bytes()
            .await
            .map_err(upload_error);
    }

    Err(TriageError::MissingUpload(UPLOAD_FIELD))
}

/// Body limit hits keep their own status, everything else is a malformed upload.
fn upload_error(err: MultipartError) -> TriageError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        TriageError::TooLarge(err.body_text())
    } else {
        TriageError::Upload(err.body_text())
    }
}

/// Client errors answer with a `detail` body, internal errors with an `error` prediction.
fn error_response(err: &TriageError, processing_time_ms: u64) -> Response {
    let status = match err {
        TriageError::Validation(_) | TriageError::Upload(_) => StatusCode::BAD_REQUEST,
        TriageError::TooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
        TriageError::MissingUpload(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(PredictionResponse::error(
                    format!("Error processing image: {err}"),
                    processing_time_ms,
                )),
            )
                .into_response()
        }
    };

    (status, Json(ErrorDetail::new(err.to_string()))).into_response()
}
