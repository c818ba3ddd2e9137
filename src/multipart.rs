//! Reading submissions that may arrive either as JSON or as
//! `multipart/form-data` with file attachments.

use std::collections::HashMap;

use actix_multipart::Multipart;
use actix_web::{web, HttpRequest};
use futures_util::{StreamExt as _, TryStreamExt as _};
use serde::de::DeserializeOwned;

use crate::error::ApiError;
use crate::validation::{MAX_ATTACHMENTS, MAX_ATTACHMENT_BYTES};

const MAX_JSON_BYTES: usize = 2 * 1024 * 1024;
const MAX_TEXT_FIELD_BYTES: usize = 1024 * 1024;
const MAX_TEXT_FIELDS: usize = 32;

/// A file read from a multipart field. Files over the size limit, and every
/// file past the count limit, keep their true `size` but their bytes are
/// discarded while streaming, so validation can still report them.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub size: usize,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct FormData {
    pub fields: HashMap<String, String>,
    pub files: Vec<UploadedFile>,
}

pub enum Submission {
    Json(web::Bytes),
    Form(FormData),
}

impl Submission {
    /// Deserialize a JSON body; malformed JSON is a client error, never a panic.
    pub fn parse_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ApiError> {
        serde_json::from_slice(bytes).map_err(|e| {
            tracing::debug!("rejecting malformed JSON body: {e}");
            ApiError::BadRequest("Malformed data: a JSON object is expected".into())
        })
    }
}

pub fn is_multipart(req: &HttpRequest) -> bool {
    req.headers()
        .get(actix_web::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.to_ascii_lowercase().starts_with("multipart/form-data"))
        .unwrap_or(false)
}

/// Route the payload by content type.
pub async fn read_submission(req: &HttpRequest, mut payload: web::Payload) -> Result<Submission, ApiError> {
    if is_multipart(req) {
        let form = read_form(Multipart::new(req.headers(), payload)).await?;
        return Ok(Submission::Form(form));
    }
    let mut body = web::BytesMut::new();
    while let Some(chunk) = payload.next().await {
        let chunk = chunk.map_err(|e| {
            tracing::warn!("payload read error: {e}");
            ApiError::BadRequest("Could not read request body".into())
        })?;
        if body.len() + chunk.len() > MAX_JSON_BYTES {
            return Err(ApiError::PayloadTooLarge);
        }
        body.extend_from_slice(&chunk);
    }
    Ok(Submission::Json(body.freeze()))
}

/// Collect text fields and files. Any field carrying a filename is a file.
/// At most `MAX_ATTACHMENTS` files are buffered.
pub async fn read_form(mut payload: Multipart) -> Result<FormData, ApiError> {
    let mut form = FormData::default();
    while let Some(mut field) = payload.try_next().await.map_err(|e| {
        tracing::warn!("multipart error: {e}");
        ApiError::BadRequest("Malformed multipart body".into())
    })? {
        let disposition = field.content_disposition();
        let name = disposition.get_name().unwrap_or_default().to_string();
        let filename = disposition.get_filename().map(str::to_string);
        let content_type = field.content_type().map(|m| m.to_string());

        match filename {
            Some(filename) => {
                let keep = form.files.len() < MAX_ATTACHMENTS;
                let mut bytes = Vec::new();
                let mut size = 0usize;
                while let Some(chunk) = field.try_next().await.map_err(|e| {
                    tracing::warn!("stream read error: {e}");
                    ApiError::BadRequest("Malformed multipart body".into())
                })? {
                    size += chunk.len();
                    if keep && size <= MAX_ATTACHMENT_BYTES {
                        bytes.extend_from_slice(&chunk);
                    } else if !bytes.is_empty() {
                        bytes = Vec::new();
                    }
                }
                // Browsers send an empty part when no file was picked.
                if filename.is_empty() && size == 0 {
                    continue;
                }
                form.files.push(UploadedFile { filename, content_type, size, bytes });
            }
            None => {
                if form.fields.len() >= MAX_TEXT_FIELDS && !form.fields.contains_key(&name) {
                    return Err(ApiError::PayloadTooLarge);
                }
                let mut value = Vec::new();
                while let Some(chunk) = field.try_next().await.map_err(|e| {
                    tracing::warn!("stream read error: {e}");
                    ApiError::BadRequest("Malformed multipart body".into())
                })? {
                    if value.len() + chunk.len() > MAX_TEXT_FIELD_BYTES {
                        return Err(ApiError::PayloadTooLarge);
                    }
                    value.extend_from_slice(&chunk);
                }
                let text = String::from_utf8(value)
                    .map_err(|_| ApiError::BadRequest(format!("Field '{name}' is not valid UTF-8")))?;
                form.fields.insert(name, text);
            }
        }
    }
    Ok(form)
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::error::PayloadError;
    use actix_web::http::header::{HeaderMap, HeaderValue, CONTENT_TYPE};

    fn multipart(parts: &[(&str, Option<&str>, &str)]) -> Multipart {
        let boundary = "qahub-test-boundary";
        let mut body = String::new();
        for (name, filename, value) in parts {
            let filename = filename.map(|f| format!("; filename=\"{f}\"")).unwrap_or_default();
            body.push_str(&format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"{filename}\r\n\r\n{value}\r\n"
            ));
        }
        body.push_str(&format!("--{boundary}--\r\n"));
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_str(&format!("multipart/form-data; boundary={boundary}")).unwrap(),
        );
        let stream = futures_util::stream::once(async move { Ok::<_, PayloadError>(web::Bytes::from(body)) });
        Multipart::new(&headers, stream)
    }

    #[actix_web::test]
    async fn surplus_files_are_counted_without_their_bytes() {
        let names: Vec<String> = (0..7).map(|n| format!("f{n}.txt")).collect();
        let mut parts: Vec<(&str, Option<&str>, &str)> =
            names.iter().map(|n| ("attachments", Some(n.as_str()), "file n")).collect();
        parts.push(("title", None, "Seven files"));

        let form = read_form(multipart(&parts)).await.unwrap();
        assert_eq!(form.fields["title"], "Seven files");
        assert_eq!(form.files.len(), 7);
        assert!(form.files[..MAX_ATTACHMENTS].iter().all(|f| f.bytes == b"file n"));
        assert!(form.files[MAX_ATTACHMENTS..].iter().all(|f| f.bytes.is_empty() && f.size == 6));
    }

    #[actix_web::test]
    async fn too_many_text_fields_are_refused() {
        let names: Vec<String> = (0..=MAX_TEXT_FIELDS).map(|n| format!("field{n}")).collect();
        let parts: Vec<(&str, Option<&str>, &str)> = names.iter().map(|n| (n.as_str(), None, "x")).collect();
        assert!(matches!(read_form(multipart(&parts)).await, Err(ApiError::PayloadTooLarge)));
    }
}
