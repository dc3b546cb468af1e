use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;

use crate::error::{AppError, AppResult};

/// Receipt file storage keyed by payment id. Returns a path that can be
/// used to fetch the file later; only that path is persisted.
#[async_trait]
pub trait ReceiptStore: Send + Sync {
    async fn store(&self, payment_id: &str, content_type: &str, bytes: &[u8]) -> AppResult<String>;

    /// Drop a stored receipt whose status change did not go through.
    async fn remove(&self, path: &str) -> AppResult<()>;
}

pub fn receipt_extension(content_type: &str) -> Option<&'static str> {
    let mime = content_type.split(';').next().unwrap_or("").trim();
    match mime {
        "image/jpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "application/pdf" => Some("pdf"),
        _ => None,
    }
}

/// Checks that need neither the database nor the filesystem.
pub fn check_receipt(content_type: &str, bytes: &[u8]) -> AppResult<&'static str> {
    let ext = receipt_extension(content_type).ok_or_else(|| {
        AppError::BadRequest("Invalid file type. Use JPEG, PNG, or PDF.".into())
    })?;
    if bytes.is_empty() {
        return Err(AppError::BadRequest("No file uploaded".into()));
    }
    Ok(ext)
}

pub struct LocalReceiptStore {
    root: PathBuf,
}

impl LocalReceiptStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ReceiptStore for LocalReceiptStore {
    async fn store(&self, payment_id: &str, content_type: &str, bytes: &[u8]) -> AppResult<String> {
        let ext = check_receipt(content_type, bytes)?;
        // payment ids come from the database, but never let one escape the root
        if payment_id.is_empty()
            || !payment_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(AppError::BadRequest("Invalid payment id".into()));
        }

        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| AppError::Internal(e.into()))?;
        let path = self.root.join(format!("{payment_id}.{ext}"));
        fs::write(&path, bytes)
            .await
            .map_err(|e| AppError::Internal(e.into()))?;

        tracing::debug!(path = %path.display(), size = bytes.len(), "receipt stored");
        Ok(path.to_string_lossy().into_owned())
    }

    async fn remove(&self, path: &str) -> AppResult<()> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Internal(e.into())),
        }
    }
}
