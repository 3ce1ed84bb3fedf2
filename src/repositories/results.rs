use sqlx::PgPool;
use time::OffsetDateTime;

use crate::db::models::GradingResultRow;

pub(crate) const COLUMNS: &str =
    "id, student_id, file_name, score, review, note, created_at";

pub(crate) struct CreateResult<'a> {
    pub(crate) id: &'a str,
    pub(crate) student_id: &'a str,
    pub(crate) file_name: &'a str,
    pub(crate) score: &'a str,
    pub(crate) review: &'a str,
    pub(crate) note: Option<&'a str>,
    pub(crate) created_at: OffsetDateTime,
}

pub(crate) async fn insert(pool: &PgPool, params: CreateResult<'_>) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO grading_results (id, student_id, file_name, score, review, note, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(params.id)
    .bind(params.student_id)
    .bind(params.file_name)
    .bind(params.score)
    .bind(params.review)
    .bind(params.note)
    .bind(params.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub(crate) async fn list_all(pool: &PgPool) -> Result<Vec<GradingResultRow>, sqlx::Error> {
    sqlx::query_as::<_, GradingResultRow>(&format!(
        "SELECT {COLUMNS}
         FROM grading_results
         ORDER BY created_at"
    ))
    .fetch_all(pool)
    .await
}

pub(crate) async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
