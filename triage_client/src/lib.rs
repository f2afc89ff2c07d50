//! Client of the triage server: upload images and report the answers.
use std::path::Path;

use anyhow::{bail, Context, Result};
use common::protocol::{ErrorDetail, HealthResponse, PredictionResponse};
use reqwest::{multipart, Client, StatusCode};

/// Guess the MIME type the server expects from the file extension.
pub fn guess_image_mime(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    match extension.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        Some("webp") => "image/webp",
        Some("tif") | Some("tiff") => "image/tiff",
        _ => "application/octet-stream",
    }
}

/// Upload an image file and return the server's answer.
///
/// Internal server errors still carry a prediction body with label `error`, which is
/// returned as is.
pub async fn triage_file(
    client: &Client,
    address: &str,
    path: &Path,
) -> Result<PredictionResponse> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("upload")
        .to_owned();

    let part = multipart::Part::bytes(data)
        .file_name(file_name)
        .mime_str(guess_image_mime(path))?;
    let form = multipart::Form::new().part("file", part);

    let resp = client
        .post(format!("http://{address}/triage-image"))
        .multipart(form)
        .send()
        .await?;

    match resp.status() {
        StatusCode::OK | StatusCode::INTERNAL_SERVER_ERROR => Ok(resp.json().await?),
        status => {
            let detail = resp
                .json::<ErrorDetail>()
                .await
                .map(|detail| detail.detail)
                .unwrap_or_else(|_| "no detail".into());
            bail!("server rejected {} with {status}: {detail}", path.display())
        }
    }
}

/// Ask the server whether it is alive.
pub async fn check_health(client: &Client, address: &str) -> Result<HealthResponse> {
    let resp = client
        .get(format!("http://{address}/health"))
        .send()
        .await?
        .error_for_status()?;

    Ok(resp.json().await?)
}

/// Human readable report of an answer.
pub fn format_prediction(prediction: &PredictionResponse) -> String {
    let mut report = format!(
        "Classification: {}\nConfidence: {:.2}%\nProcessing Time: {} ms",
        prediction.label,
        prediction.confidence * 100.0,
        prediction.processing_time_ms
    );
    if let Some(error) = &prediction.error {
        report.push_str(&format!("\nError: {error}"));
    }

    report
}
