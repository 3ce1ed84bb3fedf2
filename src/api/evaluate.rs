use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::Json;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::core::state::AppState;
use crate::schemas::result::{EvaluateForm, EvaluateResponse, ResultRecord};
use crate::services::pipeline::GradingRequest;


const DEFAULT_FILE_NAME: &str = "upload";

pub(crate) async fn evaluate(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<EvaluateResponse>, ApiError> {
    let mut multipart =
        multipart.map_err(|err| ApiError::bad_request_from(err, "Invalid multipart data"))?;

    let mut file: Option<(String, Vec<u8>)> = None;
    let mut student_id: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::bad_request_from(err, "Invalid multipart data"))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or(DEFAULT_FILE_NAME).to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| ApiError::bad_request_from(err, "Failed to read file"))?;
                file = Some((file_name, bytes.to_vec()));
            }
            "student_id" => {
                let text = field
                    .text()
                    .await
                    .map_err(|err| ApiError::bad_request_from(err, "Invalid student_id"))?;
                student_id = Some(text.trim().to_string());
            }
            _ => {}
        }
    }

    let (file_name, image) = file.ok_or_else(|| ApiError::bad_request("File is required"))?;
    let form = EvaluateForm {
        student_id: student_id.ok_or_else(|| ApiError::bad_request("student_id is required"))?,
    };
    form.validate().map_err(|err| ApiError::bad_request_from(&err, &err.to_string()))?;

    tracing::info!(
        student_id = %form.student_id,
        file_name = %file_name,
        size = image.len(),
        "Evaluate request received"
    );

    let request = GradingRequest { student_id: form.student_id, file_name, image };
    let pipeline = state.pipeline();
    // Panics inside a stage surface as JoinError.
    let result = tokio::spawn(async move { pipeline.evaluate(request).await })
        .await
        .map_err(|err| ApiError::unexpected(err, "Grading task failed"))?;

    Ok(Json(EvaluateResponse::success(result)))
}

pub(crate) async fn list_results(
    State(state): State<AppState>,
) -> Result<Json<Vec<ResultRecord>>, ApiError> {
    match state.results().list_all().await {
        Ok(records) => Ok(Json(records)),
        Err(err) => {
            tracing::warn!(error = %err, "Failed to list grading results");
            metrics::counter!("result_store_failures_total", "operation" => "list").increment(1);
            Err(ApiError::ResultsUnavailable)
        }
    }
}
