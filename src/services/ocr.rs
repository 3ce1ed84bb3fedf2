use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::config::Settings;

#[derive(Debug, Error)]
pub(crate) enum ExtractionError {
    #[error("image not found or unreadable: {path}: {reason}")]
    ImageNotFound { path: PathBuf, reason: String },
    #[error("OCR service error: {0}")]
    Service(String),
    #[error("OCR job {request_id} did not finish after {attempts} polls")]
    Timeout { request_id: String, attempts: u32 },
}

/// One recognised line of text, in detection order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct TextDetection {
    pub(crate) text: String,
    /// In `[0, 1]`, rounded to two decimals.
    pub(crate) confidence: f64,
    /// Corners clockwise from top-left.
    pub(crate) bounding_box: [[f64; 2]; 4],
}

#[async_trait]
pub(crate) trait TextExtractor: Send + Sync {
    async fn extract_detailed(
        &self,
        image_path: &Path,
    ) -> Result<Vec<TextDetection>, ExtractionError>;

    async fn extract(&self, image_path: &Path) -> Result<String, ExtractionError> {
        let detections = self.extract_detailed(image_path).await?;
        Ok(join_detections(&detections))
    }
}

pub(crate) fn join_detections(detections: &[TextDetection]) -> String {
    detections
        .iter()
        .map(|detection| detection.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

pub(crate) struct LoadedImage {
    pub(crate) bytes: Vec<u8>,
    pub(crate) mime: &'static str,
    pub(crate) file_name: String,
}

/// Reads the file and proves it decodes as an image before anything is sent upstream.
pub(crate) async fn load_image(path: &Path) -> Result<LoadedImage, ExtractionError> {
    let not_found = |reason: String| ExtractionError::ImageNotFound {
        path: path.to_path_buf(),
        reason,
    };

    let bytes = tokio::fs::read(path).await.map_err(|err| not_found(err.to_string()))?;

    let (bytes, format) = tokio::task::spawn_blocking(move || {
        let format = image::guess_format(&bytes)?;
        image::load_from_memory_with_format(&bytes, format)?;
        Ok::<_, image::ImageError>((bytes, format))
    })
    .await
    .map_err(|err| not_found(format!("decode task failed: {err}")))?
    .map_err(|err| not_found(err.to_string()))?;

    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("image")
        .to_string();

    Ok(LoadedImage { bytes, mime: format.to_mime_type(), file_name })
}

#[derive(Debug, Clone)]
pub(crate) struct DatalabOcrService {
    client: Client,
    api_key: String,
    base_url: String,
    languages: String,
    poll_interval: Duration,
    max_poll_attempts: u32,
}

#[derive(Debug, Clone)]
struct OcrJobRef {
    request_id: String,
    request_check_url: String,
}

impl DatalabOcrService {
    pub(crate) fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let ocr = settings.ocr();
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(20))
            .timeout(Duration::from_secs(ocr.timeout_seconds))
            .build()
            .context("Failed to build OCR HTTP client")?;

        Ok(Self {
            client,
            api_key: ocr.api_key.clone(),
            base_url: ocr.base_url.trim_end_matches('/').to_string(),
            languages: ocr.languages.join(","),
            poll_interval: Duration::from_secs(ocr.poll_interval_seconds),
            max_poll_attempts: ocr.max_poll_attempts,
        })
    }

    async fn submit_job(&self, image: LoadedImage) -> Result<OcrJobRef, ExtractionError> {
        let endpoint = format!("{}/ocr", self.base_url);
        let part = Part::bytes(image.bytes)
            .file_name(image.file_name)
            .mime_str(image.mime)
            .map_err(|err| ExtractionError::Service(format!("invalid image mime: {err}")))?;
        let form = Form::new().part("file", part).text("langs", self.languages.clone());

        let response = self
            .client
            .post(&endpoint)
            .header("X-Api-Key", &self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|err| ExtractionError::Service(format!("failed to call OCR API: {err}")))?;

        let status = response.status();
        let parsed = read_json_body(response, "submit").await?;

        if !status.is_success() {
            return Err(ExtractionError::Service(format!(
                "OCR submit failed (status {status}): {}",
                extract_error_message(&parsed)
            )));
        }
        if parsed.get("success").and_then(Value::as_bool).is_some_and(|value| !value) {
            return Err(ExtractionError::Service(format!(
                "OCR submit returned success=false: {}",
                extract_error_message(&parsed)
            )));
        }

        extract_job_ref(&self.base_url, &parsed).ok_or_else(|| {
            ExtractionError::Service("OCR submit response missing request reference".to_string())
        })
    }

    async fn poll_result(&self, job: &OcrJobRef) -> Result<Value, ExtractionError> {
        for attempt in 0..self.max_poll_attempts {
            let response = self
                .client
                .get(&job.request_check_url)
                .header("X-Api-Key", &self.api_key)
                .send()
                .await
                .map_err(|err| {
                    ExtractionError::Service(format!("failed to poll OCR job: {err}"))
                })?;

            let status_code = response.status();
            let parsed = read_json_body(response, "poll").await?;

            if !status_code.is_success() {
                return Err(ExtractionError::Service(format!(
                    "OCR poll failed (status {status_code}): {}",
                    extract_error_message(&parsed)
                )));
            }

            let status = parsed
                .get("status")
                .and_then(Value::as_str)
                .map(|value| value.to_ascii_lowercase())
                .unwrap_or_else(|| "unknown".to_string());

            match status.as_str() {
                "complete" | "completed" => {
                    if parsed.get("success").and_then(Value::as_bool).is_some_and(|v| !v) {
                        return Err(ExtractionError::Service(format!(
                            "OCR job {} returned success=false: {}",
                            job.request_id,
                            extract_error_message(&parsed)
                        )));
                    }
                    return Ok(parsed);
                }
                "failed" | "error" => {
                    return Err(ExtractionError::Service(format!(
                        "OCR job {} failed: {}",
                        job.request_id,
                        extract_error_message(&parsed)
                    )));
                }
                _ => {}
            }

            if attempt + 1 < self.max_poll_attempts {
                tokio::time::sleep(self.poll_interval).await;
            }
        }

        Err(ExtractionError::Timeout {
            request_id: job.request_id.clone(),
            attempts: self.max_poll_attempts,
        })
    }
}

#[async_trait]
impl TextExtractor for DatalabOcrService {
    async fn extract_detailed(
        &self,
        image_path: &Path,
    ) -> Result<Vec<TextDetection>, ExtractionError> {
        let image = load_image(image_path).await?;
        let job = self.submit_job(image).await?;
        tracing::debug!(request_id = %job.request_id, "OCR job submitted");

        let payload = self.poll_result(&job).await?;
        let detections = detections_from_payload(&payload);
        tracing::info!(
            request_id = %job.request_id,
            lines = detections.len(),
            "OCR completed"
        );
        Ok(detections)
    }
}

async fn read_json_body(
    response: reqwest::Response,
    stage: &str,
) -> Result<Value, ExtractionError> {
    let status = response.status();
    let raw_body = response.text().await.map_err(|err| {
        ExtractionError::Service(format!("failed to read OCR {stage} response: {err}"))
    })?;

    serde_json::from_str::<Value>(&raw_body).map_err(|err| {
        ExtractionError::Service(format!(
            "OCR {stage} returned non-JSON body (status {status}): {err}: {raw_body}"
        ))
    })
}

fn extract_job_ref(base_url: &str, payload: &Value) -> Option<OcrJobRef> {
    let request_check_url = extract_request_check_url(base_url, payload);
    let request_id = payload
        .get("request_id")
        .and_then(Value::as_str)
        .map(ToString::to_string)
        .or_else(|| {
            request_check_url.as_deref().and_then(|url| {
                url.trim_end_matches('/').rsplit('/').next().map(ToString::to_string)
            })
        })?;

    let request_check_url =
        request_check_url.unwrap_or_else(|| format!("{base_url}/ocr/{request_id}"));

    Some(OcrJobRef { request_id, request_check_url })
}

fn extract_request_check_url(base_url: &str, payload: &Value) -> Option<String> {
    let raw = payload.get("request_check_url").and_then(Value::as_str)?;
    if raw.starts_with("http://") || raw.starts_with("https://") {
        return Some(raw.to_string());
    }
    let normalized_base = format!("{}/", base_url.trim_end_matches('/'));
    reqwest::Url::parse(&normalized_base)
        .ok()
        .and_then(|base| base.join(raw).ok())
        .map(|url| url.to_string())
}

/// Flattens `pages[].text_lines[]` into detections, preserving page then line order.
pub(crate) fn detections_from_payload(payload: &Value) -> Vec<TextDetection> {
    let pages = payload
        .get("pages")
        .or_else(|| payload.get("result").and_then(|result| result.get("pages")))
        .and_then(Value::as_array);

    let Some(pages) = pages else {
        return Vec::new();
    };

    pages
        .iter()
        .filter_map(|page| page.get("text_lines").and_then(Value::as_array))
        .flatten()
        .filter_map(detection_from_line)
        .collect()
}

fn detection_from_line(line: &Value) -> Option<TextDetection> {
    let text = line.get("text").and_then(Value::as_str)?.trim();
    if text.is_empty() {
        return None;
    }

    let confidence = line.get("confidence").and_then(Value::as_f64).unwrap_or(0.0);
    let bounding_box = line
        .get("polygon")
        .and_then(polygon_corners)
        .or_else(|| line.get("bbox").and_then(bbox_corners))
        .unwrap_or([[0.0; 2]; 4]);

    Some(TextDetection {
        text: text.to_string(),
        confidence: round_confidence(confidence),
        bounding_box,
    })
}

fn polygon_corners(value: &Value) -> Option<[[f64; 2]; 4]> {
    let points = value.as_array()?;
    if points.len() != 4 {
        return None;
    }

    let mut corners = [[0.0; 2]; 4];
    for (corner, point) in corners.iter_mut().zip(points) {
        let pair = point.as_array()?;
        *corner = [pair.first()?.as_f64()?, pair.get(1)?.as_f64()?];
    }
    Some(corners)
}

fn bbox_corners(value: &Value) -> Option<[[f64; 2]; 4]> {
    let coords = value.as_array()?.iter().map(Value::as_f64).collect::<Option<Vec<_>>>()?;
    let [x0, y0, x1, y1] = coords.as_slice() else {
        return None;
    };
    Some([[*x0, *y0], [*x1, *y0], [*x1, *y1], [*x0, *y1]])
}

fn round_confidence(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    (value.clamp(0.0, 1.0) * 100.0).round() / 100.0
}

fn extract_error_message(payload: &Value) -> String {
    if let Some(detail) = payload.get("detail") {
        if let Some(text) = detail.as_str() {
            return text.to_string();
        }
        if let Some(items) = detail.as_array() {
            let joined = items
                .iter()
                .filter_map(|item| {
                    item.get("msg")
                        .and_then(Value::as_str)
                        .or_else(|| item.get("message").and_then(Value::as_str))
                })
                .collect::<Vec<_>>()
                .join("; ");
            if !joined.is_empty() {
                return joined;
            }
        }
    }

    payload
        .get("error")
        .and_then(Value::as_str)
        .or_else(|| payload.get("message").and_then(Value::as_str))
        .unwrap_or("unknown_error")
        .to_string()
}
