use sqlx::FromRow;
use time::OffsetDateTime;

#[derive(Debug, Clone, FromRow)]
pub(crate) struct GradingResultRow {
    #[allow(dead_code)]
    pub(crate) id: String,
    pub(crate) student_id: String,
    pub(crate) file_name: String,
    pub(crate) score: String,
    pub(crate) review: String,
    pub(crate) note: Option<String>,
    pub(crate) created_at: OffsetDateTime,
}
