use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use log::{error, info, warn};
use thiserror::Error;

use crate::config::{AppConfig, S3Settings, StorageBackend};
use crate::models::{ContentKind, Id};

#[derive(Debug, Error)]
pub enum FileStoreError {
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error("not_found")]
    NotFound,
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("other: {0}")]
    Other(String),
}

/// Blob storage for attachments. Keys are relative, `/`-separated paths.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Store `bytes` under `key`. When the key is already taken a random
    /// suffix is added before the extension; the key actually used is
    /// returned.
    async fn save(&self, key: &str, bytes: &[u8]) -> Result<String, FileStoreError>;
    async fn delete(&self, key: &str) -> Result<(), FileStoreError>;
    /// Public URL the blob is served from.
    fn url(&self, key: &str) -> String;
}

/// `questions/question_7/report.pdf` and friends.
pub fn attachment_key(kind: ContentKind, object_id: Id, filename: &str) -> String {
    format!("{}/{}_{}/{}", kind.folder(), kind.as_str(), object_id, sanitize_filename(filename))
}

/// Final path component only; whitespace becomes `_`, anything other than
/// letters, digits, `.`, `-` and `_` is dropped.
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .trim()
        .chars()
        .filter_map(|c| match c {
            c if c.is_whitespace() => Some('_'),
            c if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') => Some(c),
            _ => None,
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() { "file".to_string() } else { cleaned.to_string() }
}

/// `dir/name.ext` -> `dir/name_1a2b3c4d.ext`
fn with_random_suffix(key: &str) -> String {
    let token = uuid::Uuid::new_v4().simple().to_string();
    let suffix = &token[..8];
    let (dir, file) = match key.rsplit_once('/') {
        Some((dir, file)) => (Some(dir), file),
        None => (None, key),
    };
    let file = match file.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}_{suffix}.{ext}"),
        _ => format!("{file}_{suffix}"),
    };
    match dir {
        Some(dir) => format!("{dir}/{file}"),
        None => file,
    }
}

/// Join the media prefix and a key, percent-encoding each segment.
fn media_url(prefix: &str, key: &str) -> String {
    let encoded: Vec<String> = key.split('/').map(|s| urlencoding::encode(s).into_owned()).collect();
    format!("{}/{}", prefix.trim_end_matches('/'), encoded.join("/"))
}

fn ensure_relative(key: &str) -> Result<(), FileStoreError> {
    let safe = !key.is_empty()
        && Path::new(key).components().all(|c| matches!(c, Component::Normal(_)));
    if safe { Ok(()) } else { Err(FileStoreError::InvalidKey(key.to_string())) }
}

// ---------------- Filesystem ----------------

pub struct FsFileStore {
    root: PathBuf,
    media_url: String,
}

impl FsFileStore {
    pub fn new(root: impl Into<PathBuf>, media_url: impl Into<String>) -> Self {
        Self { root: root.into(), media_url: media_url.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, FileStoreError> {
        ensure_relative(key)?;
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl FileStore for FsFileStore {
    async fn save(&self, key: &str, bytes: &[u8]) -> Result<String, FileStoreError> {
        let mut key = key.to_string();
        let mut path = self.path_for(&key)?;
        while tokio::fs::metadata(&path).await.is_ok() {
            key = with_random_suffix(&key);
            path = self.path_for(&key)?;
        }
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        Ok(key)
    }

    async fn delete(&self, key: &str) -> Result<(), FileStoreError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(FileStoreError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    fn url(&self, key: &str) -> String {
        media_url(&self.media_url, key)
    }
}

// ---------------- S3 / MinIO ----------------

pub struct S3FileStore {
    bucket: String,
    client: aws_sdk_s3::Client,
    media_url: String,
}

impl S3FileStore {
    pub async fn new(settings: &S3Settings, media_url: &str) -> anyhow::Result<Self> {
        use aws_credential_types::provider::SharedCredentialsProvider;
        use aws_credential_types::Credentials;

        let endpoint = settings
            .endpoint
            .clone()
            .ok_or_else(|| anyhow::anyhow!("S3_ENDPOINT must be set (MinIO / S3 endpoint)"))?;
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(settings.region.clone()))
            .endpoint_url(endpoint);
        if !settings.access_key.is_empty() && !settings.secret_key.is_empty() {
            let creds = Credentials::new(&settings.access_key, &settings.secret_key, None, None, "static");
            loader = loader.credentials_provider(SharedCredentialsProvider::new(creds));
        }
        let conf = loader.load().await;
        // path-style addressing for MinIO / endpoints without wildcard DNS
        let s3_conf = aws_sdk_s3::config::Builder::from(&conf).force_path_style(true).build();
        let client = aws_sdk_s3::Client::from_conf(s3_conf);
        info!("initialized S3 client for bucket '{}'", settings.bucket);

        let bucket = settings.bucket.clone();
        if let Err(e) = client.head_bucket().bucket(&bucket).send().await {
            warn!("head_bucket failed for '{bucket}' (will attempt create): {e:?}");
            let max_attempts = 5u32;
            let mut attempt = 0u32;
            loop {
                attempt += 1;
                match client.create_bucket().bucket(&bucket).send().await {
                    Ok(_) => {
                        info!("created bucket '{bucket}' (attempt {attempt})");
                        break;
                    }
                    Err(e2) if attempt >= max_attempts => {
                        error!("create_bucket failed for '{bucket}' after {attempt} attempts: {e2:?}");
                        return Err(anyhow::anyhow!("failed to ensure bucket '{bucket}': {e2}"));
                    }
                    Err(e2) => {
                        let backoff_ms = 200 * u64::from(attempt.pow(2));
                        warn!("create_bucket attempt {attempt} failed for '{bucket}': {e2:?} (retrying in {backoff_ms}ms)");
                        tokio::time::sleep(std::time::Duration::from_millis(backoff_ms)).await;
                    }
                }
            }
        }

        Ok(Self { bucket, client, media_url: media_url.to_string() })
    }

    async fn exists(&self, key: &str) -> bool {
        self.client.head_object().bucket(&self.bucket).key(key).send().await.is_ok()
    }
}

#[async_trait]
impl FileStore for S3FileStore {
    async fn save(&self, key: &str, bytes: &[u8]) -> Result<String, FileStoreError> {
        use aws_sdk_s3::primitives::ByteStream;
        ensure_relative(key)?;
        let mut key = key.to_string();
        while self.exists(&key).await {
            key = with_random_suffix(&key);
        }
        let content_type = infer::get(bytes)
            .map(|t| t.mime_type().to_string())
            .unwrap_or_else(|| "application/octet-stream".into());
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(bytes.to_vec()))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| {
                error!("put_object failed key={key} bucket={} err={e:?}", self.bucket);
                FileStoreError::Other(e.to_string())
            })?;
        Ok(key)
    }

    async fn delete(&self, key: &str) -> Result<(), FileStoreError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| FileStoreError::Other(e.to_string()))?;
        Ok(())
    }

    fn url(&self, key: &str) -> String {
        media_url(&self.media_url, key)
    }
}

/// Store selected by `STORAGE_BACKEND`.
pub async fn build_file_store(config: &AppConfig) -> anyhow::Result<Arc<dyn FileStore>> {
    match config.storage_backend {
        StorageBackend::Fs => {
            std::fs::create_dir_all(&config.media_root)?;
            info!("storing attachments under '{}'", config.media_root.display());
            Ok(Arc::new(FsFileStore::new(&config.media_root, &config.media_url)))
        }
        StorageBackend::S3 => Ok(Arc::new(S3FileStore::new(&config.s3, &config.media_url).await?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_follow_owner_layout() {
        assert_eq!(attachment_key(ContentKind::Question, 7, "report.pdf"), "questions/question_7/report.pdf");
        assert_eq!(attachment_key(ContentKind::TaskNote, 3, "a b.txt"), "task_notes/tasknote_3/a_b.txt");
    }

    #[test]
    fn filenames_are_sanitized() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\Users\\me\\My Report (final).docx"), "My_Report_final.docx");
        assert_eq!(sanitize_filename(".hidden"), "hidden");
        assert_eq!(sanitize_filename("???"), "file");
    }

    #[test]
    fn suffix_goes_before_extension() {
        let key = with_random_suffix("tasks/task_1/notes.txt");
        assert!(key.starts_with("tasks/task_1/notes_"));
        assert!(key.ends_with(".txt"));
        assert_eq!(key.len(), "tasks/task_1/notes.txt".len() + 9);
    }

    #[test]
    fn urls_encode_segments() {
        assert_eq!(media_url("/media/", "questions/question_1/a+b.pdf"), "/media/questions/question_1/a%2Bb.pdf");
    }

    #[tokio::test]
    async fn fs_store_saves_renames_and_deletes() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsFileStore::new(dir.path(), "/media/");

        let first = store.save("questions/question_1/a.txt", b"one").await.unwrap();
        let second = store.save("questions/question_1/a.txt", b"two").await.unwrap();
        assert_eq!(first, "questions/question_1/a.txt");
        assert_ne!(first, second);
        assert_eq!(std::fs::read(dir.path().join(&second)).unwrap(), b"two");

        store.delete(&first).await.unwrap();
        assert!(!dir.path().join(&first).exists());
        assert!(matches!(store.delete(&first).await, Err(FileStoreError::NotFound)));
        assert!(matches!(store.save("../escape.txt", b"x").await, Err(FileStoreError::InvalidKey(_))));
    }
}
