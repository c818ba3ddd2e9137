use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Where attachment blobs are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    Fs,
    S3,
}

#[derive(Debug, Clone)]
pub struct S3Settings {
    pub bucket: String,
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
}

/// Runtime settings, read once at startup from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub database_url: Option<String>,
    pub data_dir: PathBuf,
    pub storage_backend: StorageBackend,
    pub media_root: PathBuf,
    pub media_url: String,
    pub s3: S3Settings,
    pub sidebar_ttl: Duration,
    pub frontend_url: Option<String>,
    pub enable_hsts: bool,
}

pub const DEFAULT_SIDEBAR_TTL_SECS: u64 = 15 * 60;

fn var_or(name: &str, default: &str) -> String {
    env::var(name).ok().filter(|v| !v.trim().is_empty()).unwrap_or_else(|| default.to_string())
}

fn flag(name: &str) -> bool {
    matches!(env::var(name).as_deref().map(str::to_ascii_lowercase).as_deref(), Ok("1" | "true" | "yes" | "on"))
}

impl AppConfig {
    pub fn from_env() -> Self {
        let storage_backend = match var_or("STORAGE_BACKEND", "fs").to_ascii_lowercase().as_str() {
            "s3" => StorageBackend::S3,
            "fs" => StorageBackend::Fs,
            other => {
                tracing::warn!("unknown STORAGE_BACKEND '{other}', using filesystem storage");
                StorageBackend::Fs
            }
        };
        let sidebar_ttl = env::var("SIDEBAR_CACHE_TTL_SECS")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_SIDEBAR_TTL_SECS);

        Self {
            bind_addr: var_or("BIND_ADDR", "0.0.0.0:8080"),
            database_url: env::var("DATABASE_URL").ok(),
            data_dir: PathBuf::from(var_or("QA_DATA_DIR", "data")),
            storage_backend,
            media_root: PathBuf::from(var_or("MEDIA_ROOT", "media")),
            media_url: var_or("MEDIA_URL", "/media/"),
            s3: S3Settings {
                bucket: var_or("S3_BUCKET", "qahub-files"),
                endpoint: env::var("S3_ENDPOINT").ok(),
                region: var_or("S3_REGION", "us-east-1"),
                access_key: env::var("S3_ACCESS_KEY").unwrap_or_default(),
                secret_key: env::var("S3_SECRET_KEY").unwrap_or_default(),
            },
            sidebar_ttl: Duration::from_secs(sidebar_ttl),
            frontend_url: env::var("FRONTEND_URL").ok(),
            enable_hsts: flag("ENABLE_HSTS"),
        }
    }
}

/// Checks the variables the server cannot start without. Returns one message
/// per problem.
pub fn validate_env_vars() -> Result<(), Vec<String>> {
    let mut problems = Vec::new();
    match env::var("JWT_SECRET") {
        Err(_) => problems.push("JWT_SECRET must be set".to_string()),
        Ok(secret) if secret.len() < 32 => {
            problems.push("JWT_SECRET must be at least 32 characters long".to_string())
        }
        Ok(_) => {}
    }
    if cfg!(feature = "postgres-store") && env::var("DATABASE_URL").is_err() {
        problems.push("DATABASE_URL must be set for the postgres backend".to_string());
    }
    if var_or("STORAGE_BACKEND", "fs").eq_ignore_ascii_case("s3") && env::var("S3_ENDPOINT").is_err() {
        problems.push("S3_ENDPOINT must be set when STORAGE_BACKEND=s3".to_string());
    }
    if problems.is_empty() { Ok(()) } else { Err(problems) }
}
