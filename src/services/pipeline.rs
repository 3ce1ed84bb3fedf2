//! Upload → OCR → grading → parsing → persistence.
//!
//! [`GradingPipeline::evaluate`] always produces a displayable [`ResultRecord`]: a failure
//! in any grading stage yields the fallback record, and a storage failure only annotates
//! the record it was trying to save.

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::schemas::result::ResultRecord;
use crate::services::grading_client::{GradingClient, ServiceError};
use crate::services::ocr::{ExtractionError, TextExtractor};
use crate::services::response_parser::{
    fallback_score, format_score, ResponseParser, FALLBACK_FEEDBACK,
};
use crate::services::result_store::ResultStore;
use crate::services::uploads::{UploadError, UploadStore};

pub(crate) const DB_INSERT_FAILED_NOTE: &str = "DB insertion failed.";

#[derive(Debug, Clone)]
pub(crate) struct GradingRequest {
    pub(crate) student_id: String,
    pub(crate) file_name: String,
    pub(crate) image: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PipelineStage {
    Received,
    ImageSaved,
    TextExtracted,
    GradeObtained,
    ResultAssembled,
    Persisted,
}

impl PipelineStage {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::ImageSaved => "image_saved",
            Self::TextExtracted => "text_extracted",
            Self::GradeObtained => "grade_obtained",
            Self::ResultAssembled => "result_assembled",
            Self::Persisted => "persisted",
        }
    }
}

#[derive(Debug, Error)]
pub(crate) enum PipelineError {
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl PipelineError {
    /// The last stage reached before the failure.
    pub(crate) fn reached(&self) -> PipelineStage {
        match self {
            Self::Upload(_) => PipelineStage::Received,
            Self::Extraction(_) => PipelineStage::ImageSaved,
            Self::Service(_) => PipelineStage::TextExtracted,
        }
    }
}

pub(crate) struct GradingPipeline {
    uploads: UploadStore,
    extractor: Arc<dyn TextExtractor>,
    grader: Arc<dyn GradingClient>,
    parser: Arc<dyn ResponseParser>,
    store: Arc<dyn ResultStore>,
    max_score: u32,
    grading_timeout: Duration,
}

impl GradingPipeline {
    pub(crate) fn new(
        uploads: UploadStore,
        extractor: Arc<dyn TextExtractor>,
        grader: Arc<dyn GradingClient>,
        parser: Arc<dyn ResponseParser>,
        store: Arc<dyn ResultStore>,
        max_score: u32,
        grading_timeout: Duration,
    ) -> Self {
        Self { uploads, extractor, grader, parser, store, max_score, grading_timeout }
    }

    pub(crate) async fn evaluate(&self, request: GradingRequest) -> ResultRecord {
        let timer = Instant::now();

        let mut record = match self.grade(&request).await {
            Ok(record) => {
                metrics::counter!("grading_requests_total", "outcome" => "graded").increment(1);
                record
            }
            Err(err) => {
                let reached = err.reached();
                tracing::error!(
                    student_id = %request.student_id,
                    file_name = %request.file_name,
                    stage = reached.as_str(),
                    error = %err,
                    "Grading failed; returning fallback result"
                );
                metrics::counter!("grading_requests_total", "outcome" => "fallback").increment(1);
                metrics::counter!("grading_stage_failures_total", "stage" => reached.as_str())
                    .increment(1);
                self.fallback_record(&request, &err)
            }
        };

        match self.store.save(&record).await {
            Ok(id) => {
                tracing::info!(
                    student_id = %record.student_id,
                    result_id = %id,
                    stage = PipelineStage::Persisted.as_str(),
                    "Result stored"
                );
            }
            Err(err) => {
                tracing::warn!(
                    student_id = %record.student_id,
                    error = %err,
                    "Failed to store result; returning it anyway"
                );
                metrics::counter!("result_store_failures_total", "operation" => "save")
                    .increment(1);
                record.append_note(DB_INSERT_FAILED_NOTE);
            }
        }

        metrics::histogram!("grading_duration_seconds").record(timer.elapsed().as_secs_f64());
        record
    }

    async fn grade(&self, request: &GradingRequest) -> Result<ResultRecord, PipelineError> {
        let saved = self.uploads.save(&request.file_name, &request.image).await?;
        tracing::info!(
            student_id = %request.student_id,
            storage_key = %saved.storage_key,
            size = saved.size,
            sha256 = %saved.sha256,
            stage = PipelineStage::ImageSaved.as_str(),
            "Answer sheet saved"
        );

        let text = self.extractor.extract(&saved.path).await?;
        tracing::info!(
            student_id = %request.student_id,
            storage_key = %saved.storage_key,
            chars = text.chars().count(),
            stage = PipelineStage::TextExtracted.as_str(),
            "Text extracted"
        );
        tracing::debug!(storage_key = %saved.storage_key, text = %text, "Extracted text");

        let raw = tokio::time::timeout(
            self.grading_timeout,
            self.grader.grade(&text, self.max_score),
        )
        .await
        .map_err(|_| ServiceError::Timeout(self.grading_timeout))??;
        tracing::debug!(storage_key = %saved.storage_key, raw = %raw, "Grading output");

        let grade = self.parser.parse(&raw, self.max_score);
        tracing::info!(
            student_id = %request.student_id,
            score = grade.score,
            parser_fallback = grade.fell_back,
            stage = PipelineStage::GradeObtained.as_str(),
            "Grade obtained"
        );

        let record = ResultRecord {
            student_id: request.student_id.clone(),
            file_name: request.file_name.clone(),
            score: format_score(grade.score, self.max_score),
            review: grade.feedback,
            note: None,
        };
        tracing::debug!(
            student_id = %record.student_id,
            stage = PipelineStage::ResultAssembled.as_str(),
            "Result assembled"
        );
        Ok(record)
    }

    fn fallback_record(&self, request: &GradingRequest, err: &PipelineError) -> ResultRecord {
        ResultRecord {
            student_id: request.student_id.clone(),
            file_name: request.file_name.clone(),
            score: format_score(fallback_score(self.max_score), self.max_score),
            review: FALLBACK_FEEDBACK.to_string(),
            note: Some(format!("Fallback due to unexpected error: {err}")),
        }
    }
}
