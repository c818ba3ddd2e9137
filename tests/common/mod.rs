#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use qahub::auth::{create_jwt, Role};
use qahub::models::Id;
use qahub::repo::inmem::InMemRepo;
use qahub::storage::{FileStore, FileStoreError};
use qahub::AppState;

pub const SECRET: &str = "test-secret-must-be-32-bytes-long!!";

// ---------------- In-memory recording FileStore (tests only) ----------------
#[derive(Default)]
pub struct RecordingStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    deleted: Mutex<Vec<String>>,
}

impl RecordingStore {
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.blobs.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.blobs.lock().unwrap().get(key).cloned()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl FileStore for RecordingStore {
    async fn save(&self, key: &str, bytes: &[u8]) -> Result<String, FileStoreError> {
        let mut map = self.blobs.lock().unwrap();
        let mut final_key = key.to_string();
        let mut n = 1;
        while map.contains_key(&final_key) {
            final_key = format!("{key}.{n}");
            n += 1;
        }
        map.insert(final_key.clone(), bytes.to_vec());
        Ok(final_key)
    }

    async fn delete(&self, key: &str) -> Result<(), FileStoreError> {
        self.deleted.lock().unwrap().push(key.to_string());
        match self.blobs.lock().unwrap().remove(key) {
            Some(_) => Ok(()),
            None => Err(FileStoreError::NotFound),
        }
    }

    fn url(&self, key: &str) -> String {
        format!("/media/{key}")
    }
}

/// One repository and one blob store shared by an app under test and the
/// assertions made against it.
pub struct Harness {
    pub repo: Arc<InMemRepo>,
    pub store: Arc<RecordingStore>,
}

impl Harness {
    pub fn new() -> Self {
        setup_env();
        Self { repo: Arc::new(InMemRepo::new()), store: Arc::new(RecordingStore::default()) }
    }

    pub fn state(&self) -> AppState {
        self.state_with_ttl(Duration::from_secs(900))
    }

    pub fn state_with_ttl(&self, ttl: Duration) -> AppState {
        AppState::new(self.repo.clone(), self.store.clone(), ttl)
    }
}

pub fn setup_env() {
    std::env::set_var("JWT_SECRET", SECRET);
}

pub fn staff_token() -> String {
    create_jwt(1, "staff", vec![Role::Staff]).unwrap()
}

pub fn user_token(id: Id, name: &str) -> String {
    create_jwt(id, name, vec![Role::User]).unwrap()
}

pub fn bearer(token: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer {token}"))
}

/// `multipart/form-data` body with text fields and `attachments` file parts.
pub fn multipart_body(fields: &[(&str, &str)], files: &[(&str, &[u8])]) -> (String, Vec<u8>) {
    let boundary = "----qahubtestboundary";
    let mut body: Vec<u8> = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!("--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n").as_bytes(),
        );
    }
    for (filename, bytes) in files {
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"attachments\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={boundary}"), body)
}

pub const LONG_CONTENT: &str = "<p>This question body is comfortably long enough.</p>";

macro_rules! test_app {
    ($state:expr) => {
        actix_web::test::init_service(
            actix_web::App::new()
                .wrap(qahub::SecurityHeaders::default())
                .app_data(actix_web::web::Data::new($state))
                .configure(qahub::config),
        )
    };
}

/// Send a `TestRequest` and return the status with the JSON body
/// (`Null` when the body is empty).
macro_rules! call_json {
    ($app:expr, $req:expr) => {{
        let resp = actix_web::test::call_service(&$app, $req.to_request()).await;
        let status = resp.status();
        let body = actix_web::test::read_body(resp).await;
        let json: serde_json::Value = if body.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, json)
    }};
}
