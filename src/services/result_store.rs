use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::repositories;
use crate::schemas::result::ResultRecord;

#[derive(Debug, Error)]
#[error("result store unavailable: {0}")]
pub(crate) struct StorageError(#[from] pub(crate) sqlx::Error);

#[async_trait]
pub(crate) trait ResultStore: Send + Sync {
    /// Persists the record and returns its generated id.
    async fn save(&self, record: &ResultRecord) -> Result<String, StorageError>;

    /// Every stored record, without internal identifiers.
    async fn list_all(&self) -> Result<Vec<ResultRecord>, StorageError>;

    async fn ping(&self) -> Result<(), StorageError>;
}

#[derive(Debug, Clone)]
pub(crate) struct PgResultStore {
    pool: PgPool,
}

impl PgResultStore {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResultStore for PgResultStore {
    async fn save(&self, record: &ResultRecord) -> Result<String, StorageError> {
        let id = Uuid::new_v4().to_string();
        repositories::results::insert(
            &self.pool,
            repositories::results::CreateResult {
                id: &id,
                student_id: &record.student_id,
                file_name: &record.file_name,
                score: &record.score,
                review: &record.review,
                note: record.note.as_deref(),
                created_at: OffsetDateTime::now_utc(),
            },
        )
        .await?;
        Ok(id)
    }

    async fn list_all(&self) -> Result<Vec<ResultRecord>, StorageError> {
        let rows = repositories::results::list_all(&self.pool).await?;
        tracing::debug!(
            count = rows.len(),
            latest = ?rows.last().map(|row| row.created_at),
            "Loaded grading results"
        );
        Ok(rows
            .into_iter()
            .map(|row| ResultRecord {
                student_id: row.student_id,
                file_name: row.file_name,
                score: row.score,
                review: row.review,
                note: row.note,
            })
            .collect())
    }

    async fn ping(&self) -> Result<(), StorageError> {
        repositories::results::ping(&self.pool).await?;
        Ok(())
    }
}
