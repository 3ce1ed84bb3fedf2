use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::core::config::Settings;

#[derive(Debug, Error)]
pub(crate) enum UploadError {
    #[error("file must have an extension")]
    MissingExtension,
    #[error("file extension '{0}' is not allowed")]
    ExtensionNotAllowed(String),
    #[error("uploaded file is empty")]
    Empty,
    #[error("file size exceeds {limit_mb}MB limit")]
    TooLarge { limit_mb: u64 },
    #[error("failed to write upload to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub(crate) struct SavedUpload {
    pub(crate) path: PathBuf,
    pub(crate) storage_key: String,
    pub(crate) size: u64,
    pub(crate) sha256: String,
}

/// Local directory that receives uploaded answer sheets.
#[derive(Debug, Clone)]
pub(crate) struct UploadStore {
    root: PathBuf,
    max_bytes: u64,
    allowed_extensions: Vec<String>,
}

impl UploadStore {
    pub(crate) fn new(
        root: impl Into<PathBuf>,
        max_bytes: u64,
        allowed_extensions: Vec<String>,
    ) -> Self {
        Self { root: root.into(), max_bytes, allowed_extensions }
    }

    pub(crate) async fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let storage = settings.storage();
        let store = Self::new(
            &storage.upload_dir,
            storage.max_upload_bytes(),
            storage.allowed_image_extensions.clone(),
        );
        store.ensure_root().await?;
        Ok(store)
    }

    pub(crate) async fn ensure_root(&self) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.root).await.map_err(|err| {
            anyhow::anyhow!("failed to create upload dir {}: {err}", self.root.display())
        })
    }

    /// Writes the bytes under a fresh per-request key so identical filenames never collide.
    pub(crate) async fn save(
        &self,
        filename: &str,
        bytes: &[u8],
    ) -> Result<SavedUpload, UploadError> {
        self.check_extension(filename)?;

        if bytes.is_empty() {
            return Err(UploadError::Empty);
        }
        if bytes.len() as u64 > self.max_bytes {
            return Err(UploadError::TooLarge { limit_mb: self.max_bytes / (1024 * 1024) });
        }

        let storage_key = format!("{}_{}", Uuid::new_v4(), sanitized_filename(filename));
        let path = self.root.join(&storage_key);

        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| UploadError::Io { path: path.clone(), source })?;

        let sha256 = hex::encode(Sha256::digest(bytes));

        Ok(SavedUpload { path, storage_key, size: bytes.len() as u64, sha256 })
    }

    fn check_extension(&self, filename: &str) -> Result<(), UploadError> {
        let extension = Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .ok_or(UploadError::MissingExtension)?;

        if self.allowed_extensions.iter().any(|allowed| allowed == &extension) {
            Ok(())
        } else {
            Err(UploadError::ExtensionNotAllowed(extension))
        }
    }
}

pub(crate) fn sanitized_filename(name: &str) -> String {
    let base = name.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(name);
    let sanitized: String = base
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '.' || *c == '_' || *c == '-')
        .collect();

    if sanitized.is_empty() || sanitized.chars().all(|c| c == '.') {
        "upload".to_string()
    } else {
        sanitized
    }
}
