use serde::{Deserialize, Serialize};
use validator::Validate;

/// A graded answer sheet as returned to clients and kept in the result store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ResultRecord {
    pub(crate) student_id: String,
    pub(crate) file_name: String,
    /// `"N/total"`.
    pub(crate) score: String,
    pub(crate) review: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) note: Option<String>,
}

impl ResultRecord {
    /// Appends to the note, joining with `" | "` when one is already present.
    pub(crate) fn append_note(&mut self, extra: &str) {
        self.note = Some(match self.note.take() {
            Some(existing) if !existing.is_empty() => format!("{existing} | {extra}"),
            _ => extra.to_string(),
        });
    }
}

#[derive(Debug, Validate)]
pub(crate) struct EvaluateForm {
    #[validate(length(min = 1, max = 128, message = "student_id must be 1-128 characters"))]
    pub(crate) student_id: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct EvaluateResponse {
    pub(crate) status: &'static str,
    pub(crate) result: ResultRecord,
}

impl EvaluateResponse {
    pub(crate) fn success(result: ResultRecord) -> Self {
        Self { status: "success", result }
    }
}
