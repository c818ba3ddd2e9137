//! Attachment lifecycle: storing uploads against an owning record, describing
//! stored files, and removing blobs once their rows are gone.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::models::{AttachedFile, ContentKind, Id, NewAttachment};
use crate::multipart::UploadedFile;
use crate::repo::Repo;
use crate::storage::{attachment_key, FileStore, FileStoreError};
use crate::validation::extension_of;

/// Font Awesome classes keyed by extension.
pub fn file_icon(filename: &str) -> &'static str {
    match extension_of(filename).as_deref() {
        Some("pdf") => "fas fa-file-pdf text-danger",
        Some("doc" | "docx") => "fas fa-file-word text-primary",
        Some("txt") => "fas fa-file-alt text-secondary",
        Some("jpg" | "jpeg" | "png" | "gif") => "fas fa-file-image text-success",
        Some("zip" | "rar") => "fas fa-file-archive text-warning",
        Some("xls" | "xlsx") => "fas fa-file-excel text-success",
        Some("ppt" | "pptx") => "fas fa-file-powerpoint text-danger",
        _ => "fas fa-file text-muted",
    }
}

/// `512.0 B`, `1.5 KB`, ... one decimal, binary multiples.
pub fn human_size(bytes: i64) -> String {
    let mut size = bytes.max(0) as f64;
    for unit in ["B", "KB", "MB", "GB"] {
        if size < 1024.0 {
            return format!("{size:.1} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.1} TB")
}

/// Client-facing description of a stored attachment.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FileInfo {
    pub id: Id,
    pub name: String,
    pub url: String,
    pub size: String,
    pub size_bytes: i64,
    pub icon: String,
    pub uploader: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

impl FileInfo {
    pub fn new(file: &AttachedFile, store: &dyn FileStore) -> Self {
        Self {
            id: file.id,
            name: file.name.clone(),
            url: store.url(&file.file_key),
            size: human_size(file.size_bytes),
            size_bytes: file.size_bytes,
            icon: file_icon(&file.name).to_string(),
            uploader: file.uploader_name.clone(),
            uploaded_at: file.uploaded_at,
        }
    }

    pub fn list(files: &[AttachedFile], store: &dyn FileStore) -> Vec<Self> {
        files.iter().map(|f| Self::new(f, store)).collect()
    }
}

/// Author of the record an attachment hangs off. Errors with `NotFound` when
/// the record does not exist.
pub async fn owner_author(repo: &dyn Repo, kind: ContentKind, object_id: Id) -> Result<Option<Id>, ApiError> {
    Ok(match kind {
        ContentKind::Question => repo.get_question(object_id).await?.author_id,
        ContentKind::Task => Some(repo.get_task(object_id).await?.author_id),
        ContentKind::TaskNote => Some(repo.get_note(object_id).await?.author_id),
    })
}

/// Write each upload to the blob store and record it. Uploads must already
/// have passed `validate_uploads`.
pub async fn store_uploads(
    repo: &dyn Repo,
    store: &dyn FileStore,
    kind: ContentKind,
    object_id: Id,
    uploaded_by: Option<Id>,
    files: Vec<UploadedFile>,
) -> Result<Vec<AttachedFile>, ApiError> {
    let mut stored = Vec::with_capacity(files.len());
    for upload in files {
        let key = attachment_key(kind, object_id, &upload.filename);
        let key = store.save(&key, &upload.bytes).await.map_err(|e| {
            tracing::error!("failed to store blob for {kind} {object_id}: {e}");
            ApiError::Internal
        })?;
        let new = NewAttachment {
            content_kind: kind,
            object_id,
            file_key: key.clone(),
            name: upload.filename,
            size_bytes: upload.size as i64,
            uploaded_by,
        };
        match repo.create_attachment(new).await {
            Ok(file) => stored.push(file),
            Err(e) => {
                // the row never existed, so nothing else will clean this blob up
                if let Err(cleanup) = store.delete(&key).await {
                    tracing::warn!("could not remove orphaned blob '{key}': {cleanup}");
                }
                return Err(e.into());
            }
        }
    }
    if !stored.is_empty() {
        tracing::info!("stored {} attachment(s) for {kind} {object_id}", stored.len());
    }
    Ok(stored)
}

/// Post-delete hook: remove the blobs behind attachment rows that are already
/// gone. Failures are logged and ignored.
pub async fn purge_blobs(store: &dyn FileStore, removed: &[AttachedFile]) {
    for file in removed {
        match store.delete(&file.file_key).await {
            Ok(()) => tracing::debug!("deleted blob '{}'", file.file_key),
            Err(FileStoreError::NotFound) => tracing::debug!("blob '{}' already absent", file.file_key),
            Err(e) => tracing::warn!("failed to delete blob '{}': {e}", file.file_key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn icons_by_extension() {
        assert_eq!(file_icon("report.PDF"), "fas fa-file-pdf text-danger");
        assert_eq!(file_icon("photo.jpeg"), "fas fa-file-image text-success");
        assert_eq!(file_icon("deck.pptx"), "fas fa-file-powerpoint text-danger");
        assert_eq!(file_icon("noext"), "fas fa-file text-muted");
    }

    #[test]
    fn sizes_are_human_readable() {
        assert_eq!(human_size(0), "0.0 B");
        assert_eq!(human_size(512), "512.0 B");
        assert_eq!(human_size(1536), "1.5 KB");
        assert_eq!(human_size(10 * 1024 * 1024), "10.0 MB");
        assert_eq!(human_size(3 * 1024_i64.pow(4)), "3.0 TB");
    }

    #[cfg(feature = "inmem-store")]
    #[tokio::test]
    async fn uploads_are_stored_under_owner_keys_and_purged() {
        use crate::models::NewQuestion;
        use crate::repo::inmem::InMemRepo;
        use crate::repo::QuestionRepo;
        use crate::storage::FsFileStore;

        let dir = tempfile::tempdir().unwrap();
        let store = FsFileStore::new(dir.path(), "/media/");
        let repo = InMemRepo::new();
        let q = repo
            .create_question(NewQuestion {
                title: "Where are the logs?".into(),
                content: "Looking for the log directory layout".into(),
                category_id: None,
                tags: vec![],
                author_id: None,
            })
            .await
            .unwrap();
        let upload = UploadedFile { filename: "my log.txt".into(), content_type: None, size: 4, bytes: b"logs".to_vec() };

        let stored = store_uploads(&repo, &store, ContentKind::Question, q.id, None, vec![upload]).await.unwrap();
        let key = format!("questions/question_{}/my_log.txt", q.id);
        assert_eq!(stored[0].file_key, key);
        assert_eq!(stored[0].name, "my log.txt");
        assert!(dir.path().join(&key).exists());

        let removed = repo.delete_question(q.id).await.unwrap();
        purge_blobs(&store, &removed).await;
        assert!(!dir.path().join(&key).exists());
    }
}
