//! Input forms and their validation rules.
//!
//! Every `clean` method normalises the raw input (plain-text titles, sanitized
//! rich text, normalised tags) and then validates the normalised values, so
//! what is checked is exactly what gets stored.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::html;
use crate::models::Id;
use crate::multipart::UploadedFile;

pub const MIN_CONTENT_CHARS: usize = 20;
pub const MIN_ANSWER_CHARS: usize = 10;
pub const MAX_TAG_CHARS: usize = 50;

pub const MAX_ATTACHMENTS: usize = 5;
pub const MAX_NOTE_ORDER: i32 = 1_000_000;
pub const MAX_ATTACHMENT_BYTES: usize = 10 * 1024 * 1024; // 10 MB
pub const MAX_FILENAME_CHARS: usize = 255;
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    "pdf", "doc", "docx", "txt", "jpg", "jpeg", "png", "gif", "zip", "rar", "xls", "xlsx", "ppt",
    "pptx",
];

/// Field name → messages. Serialized as a plain JSON object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut e = Self::new();
        e.add(field, message);
        e
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    pub fn merge(&mut self, other: FieldErrors) {
        for (field, messages) in other.0 {
            self.0.entry(field).or_default().extend(messages);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl From<ValidationErrors> for FieldErrors {
    fn from(errors: ValidationErrors) -> Self {
        let mut out = FieldErrors::new();
        for (field, errs) in errors.field_errors() {
            for err in errs.iter() {
                let message = err
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| err.code.to_string());
                out.add(&field.to_string(), message);
            }
        }
        out
    }
}

fn check(form: &impl Validate) -> Result<(), FieldErrors> {
    form.validate().map_err(FieldErrors::from)
}

/// Reported under the wire name `order`.
fn check_order(position: Option<i32>) -> Result<(), FieldErrors> {
    match position {
        Some(p) if p < 0 => Err(FieldErrors::single("order", "Order must not be negative.")),
        Some(p) if p > MAX_NOTE_ORDER => Err(FieldErrors::single(
            "order",
            format!("Order must be at most {MAX_NOTE_ORDER}."),
        )),
        _ => Ok(()),
    }
}

fn error(code: &'static str, message: &'static str) -> ValidationError {
    ValidationError::new(code).with_message(Cow::Borrowed(message))
}

fn content_min_length(value: &str) -> Result<(), ValidationError> {
    if html::visible_len(value) < MIN_CONTENT_CHARS {
        return Err(error("min_length", "Content must contain at least 20 characters of text."));
    }
    Ok(())
}

fn answer_min_length(value: &str) -> Result<(), ValidationError> {
    if html::visible_len(value) < MIN_ANSWER_CHARS {
        return Err(error("min_length", "Answer must contain at least 10 characters of text."));
    }
    Ok(())
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if !html::has_visible_text(value) {
        return Err(error("required", "This field cannot be empty."));
    }
    Ok(())
}

fn tag_lengths(tags: &[String]) -> Result<(), ValidationError> {
    if tags.iter().any(|t| t.chars().count() > MAX_TAG_CHARS) {
        return Err(error("tag_length", "Each tag must be at most 50 characters."));
    }
    Ok(())
}

static SLUG: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\w-]+$").expect("valid slug regex"));
static NON_SLUG_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s-]").expect("valid regex"));
static SLUG_SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-\s]+").expect("valid regex"));

fn valid_slug(value: &str) -> Result<(), ValidationError> {
    if !SLUG.is_match(value) {
        return Err(error("slug", "Enter a valid slug of letters, numbers, underscores or hyphens."));
    }
    Ok(())
}

/// Lowercase, drop punctuation, join words with hyphens. Unicode letters are
/// kept so non-Latin category names still get a usable slug.
pub fn slugify(value: &str) -> String {
    let lower = value.to_lowercase();
    let cleaned = NON_SLUG_CHARS.replace_all(&lower, "");
    let joined = SLUG_SEPARATORS.replace_all(cleaned.trim(), "-");
    joined.trim_matches(|c| c == '-' || c == '_').to_string()
}

/// Split a comma-separated tag string into normalised, de-duplicated names.
pub fn parse_tags(raw: &str) -> Vec<String> {
    normalize_tags(raw.split(',').map(str::to_string))
}

pub fn normalize_tags(tags: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let name = tag.trim().to_lowercase();
        if !name.is_empty() && !out.contains(&name) {
            out.push(name);
        }
    }
    out
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TagsInput {
    List(Vec<String>),
    Csv(String),
}

impl TagsInput {
    fn into_tags(self) -> Vec<String> {
        match self {
            TagsInput::List(v) => normalize_tags(v),
            TagsInput::Csv(s) => parse_tags(&s),
        }
    }
}

fn deserialize_tags<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<String>, D::Error> {
    Ok(Option::<TagsInput>::deserialize(de)?.map(TagsInput::into_tags).unwrap_or_default())
}

fn deserialize_tags_opt<'de, D: Deserializer<'de>>(de: D) -> Result<Option<Vec<String>>, D::Error> {
    Ok(Option::<TagsInput>::deserialize(de)?.map(TagsInput::into_tags))
}

/// Distinguishes an absent field (`None`) from an explicit `null`
/// (`Some(None)`).
fn double_option<'de, T, D>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

fn parse_id_field(fields: &HashMap<String, String>, name: &str, errors: &mut FieldErrors) -> Option<Id> {
    let raw = fields.get(name).map(|s| s.trim()).filter(|s| !s.is_empty())?;
    match raw.parse::<Id>() {
        Ok(id) => Some(id),
        Err(_) => {
            errors.add(name, "Select a valid choice.");
            None
        }
    }
}

// ---------------- Questions -------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct QuestionForm {
    #[validate(length(min = 5, max = 200, message = "Title must be between 5 and 200 characters."))]
    pub title: String,
    #[validate(custom(function = "content_min_length"))]
    pub content: String,
    #[serde(default)]
    pub category_id: Option<Id>,
    /// Comma-separated string or list of names.
    #[serde(default, deserialize_with = "deserialize_tags")]
    #[validate(custom(function = "tag_lengths"))]
    pub tags: Vec<String>,
}

impl QuestionForm {
    pub fn from_fields(fields: &HashMap<String, String>) -> Result<Self, FieldErrors> {
        let mut errors = FieldErrors::new();
        let category_id = parse_id_field(fields, "category_id", &mut errors)
            .or_else(|| parse_id_field(fields, "category", &mut errors));
        errors.into_result()?;
        Ok(Self {
            title: fields.get("title").cloned().unwrap_or_default(),
            content: fields.get("content").cloned().unwrap_or_default(),
            category_id,
            tags: fields.get("tags").map(|t| parse_tags(t)).unwrap_or_default(),
        })
    }

    pub fn clean(self) -> Result<Self, FieldErrors> {
        let cleaned = Self {
            title: html::plain_text(&self.title),
            content: html::sanitize_rich_text(&self.content),
            category_id: self.category_id,
            tags: normalize_tags(self.tags),
        };
        check(&cleaned)?;
        Ok(cleaned)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct QuestionPatch {
    #[serde(default)]
    #[validate(length(min = 5, max = 200, message = "Title must be between 5 and 200 characters."))]
    pub title: Option<String>,
    #[serde(default)]
    #[validate(custom(function = "content_min_length"))]
    pub content: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<i64>)]
    pub category_id: Option<Option<Id>>,
    #[serde(default, deserialize_with = "deserialize_tags_opt")]
    #[validate(custom(function = "tag_lengths"))]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub is_published: Option<bool>,
}

impl QuestionPatch {
    pub fn clean(self) -> Result<Self, FieldErrors> {
        let cleaned = Self {
            title: self.title.map(|t| html::plain_text(&t)),
            content: self.content.map(|c| html::sanitize_rich_text(&c)),
            category_id: self.category_id,
            tags: self.tags.map(normalize_tags),
            is_published: self.is_published,
        };
        check(&cleaned)?;
        Ok(cleaned)
    }
}

// ---------------- Answers ---------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct AnswerForm {
    #[serde(default)]
    pub answer: String,
    /// `delete_answer` clears the answer; anything else saves it.
    #[serde(default)]
    pub action: Option<String>,
}

impl AnswerForm {
    pub fn from_fields(fields: &HashMap<String, String>) -> Self {
        Self {
            answer: fields.get("answer").cloned().unwrap_or_default(),
            action: fields.get("action").cloned(),
        }
    }

    pub fn is_delete(&self) -> bool {
        self.action.as_deref() == Some("delete_answer")
    }
}

/// Sanitize an answer and enforce its minimum visible length.
pub fn clean_answer(raw: &str) -> Result<String, FieldErrors> {
    let sanitized = html::sanitize_rich_text(raw);
    answer_min_length(&sanitized).map_err(|e| {
        let mut errors = ValidationErrors::new();
        errors.add("answer", e);
        FieldErrors::from(errors)
    })?;
    Ok(sanitized)
}

// ---------------- Categories ------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct CategoryForm {
    #[validate(length(min = 1, max = 100, message = "Name must be between 1 and 100 characters."))]
    pub name: String,
    #[serde(default)]
    #[validate(length(max = 100), custom(function = "valid_slug"))]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: String,
}

impl CategoryForm {
    pub fn clean(self) -> Result<Self, FieldErrors> {
        let name = html::plain_text(&self.name);
        let slug = self
            .slug
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| slugify(&name));
        let cleaned = Self { name, slug: Some(slug), description: self.description.trim().to_string() };
        check(&cleaned)?;
        Ok(cleaned)
    }
}

// ---------------- Tasks & notes ---------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct TaskForm {
    #[validate(length(min = 1, max = 200, message = "Title must be between 1 and 200 characters."))]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub question_id: Option<Id>,
}

impl TaskForm {
    pub fn from_fields(fields: &HashMap<String, String>) -> Result<Self, FieldErrors> {
        let mut errors = FieldErrors::new();
        let question_id = parse_id_field(fields, "question_id", &mut errors)
            .or_else(|| parse_id_field(fields, "question", &mut errors));
        errors.into_result()?;
        Ok(Self {
            title: fields.get("title").cloned().unwrap_or_default(),
            description: fields.get("description").cloned().unwrap_or_default(),
            question_id,
        })
    }

    pub fn clean(self) -> Result<Self, FieldErrors> {
        let cleaned = Self {
            title: html::plain_text(&self.title),
            description: html::sanitize_rich_text(&self.description),
            question_id: self.question_id,
        };
        check(&cleaned)?;
        Ok(cleaned)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct TaskPatch {
    #[serde(default)]
    #[validate(length(min = 1, max = 200, message = "Title must be between 1 and 200 characters."))]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<i64>)]
    pub question_id: Option<Option<Id>>,
}

impl TaskPatch {
    pub fn clean(self) -> Result<Self, FieldErrors> {
        let cleaned = Self {
            title: self.title.map(|t| html::plain_text(&t)),
            description: self.description.map(|d| html::sanitize_rich_text(&d)),
            question_id: self.question_id,
        };
        check(&cleaned)?;
        Ok(cleaned)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct NoteForm {
    #[serde(default)]
    #[validate(length(max = 200, message = "Title must be at most 200 characters."))]
    pub title: String,
    #[validate(custom(function = "not_blank"))]
    pub content: String,
    #[serde(default, rename = "order")]
    pub position: Option<i32>,
}

impl NoteForm {
    pub fn from_fields(fields: &HashMap<String, String>) -> Result<Self, FieldErrors> {
        let position = match fields.get("order").map(|s| s.trim()).filter(|s| !s.is_empty()) {
            None => None,
            Some(raw) => Some(
                raw.parse::<i32>()
                    .map_err(|_| FieldErrors::single("order", "Enter a whole number."))?,
            ),
        };
        Ok(Self {
            title: fields.get("title").cloned().unwrap_or_default(),
            content: fields.get("content").cloned().unwrap_or_default(),
            position,
        })
    }

    pub fn clean(self) -> Result<Self, FieldErrors> {
        let cleaned = Self {
            title: html::plain_text(&self.title),
            content: html::sanitize_rich_text(&self.content),
            position: self.position,
        };
        check_order(cleaned.position)?;
        check(&cleaned)?;
        Ok(cleaned)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct NotePatch {
    #[serde(default)]
    #[validate(length(max = 200, message = "Title must be at most 200 characters."))]
    pub title: Option<String>,
    #[serde(default)]
    #[validate(custom(function = "not_blank"))]
    pub content: Option<String>,
    #[serde(default, rename = "order")]
    pub position: Option<i32>,
}

impl NotePatch {
    pub fn clean(self) -> Result<Self, FieldErrors> {
        let cleaned = Self {
            title: self.title.map(|t| html::plain_text(&t)),
            content: self.content.map(|c| html::sanitize_rich_text(&c)),
            position: self.position,
        };
        check_order(cleaned.position)?;
        check(&cleaned)?;
        Ok(cleaned)
    }
}

// ---------------- Search ----------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct SearchParams {
    #[serde(default)]
    #[validate(length(max = 100, message = "Search query must be at most 100 characters."))]
    pub query: Option<String>,
    #[serde(default)]
    pub search_in: Option<String>,
    #[serde(default)]
    pub page: Option<String>,
}

impl SearchParams {
    pub fn clean(self) -> Result<Self, FieldErrors> {
        let cleaned = Self {
            query: self.query.map(|q| q.trim().to_string()),
            search_in: self.search_in,
            page: self.page,
        };
        check(&cleaned)?;
        Ok(cleaned)
    }
}

// ---------------- Attachments -----------------------------------------------

pub fn extension_of(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Count, size and extension checks for one submission's files.
pub fn validate_uploads(files: &[UploadedFile]) -> Result<(), FieldErrors> {
    let mut errors = FieldErrors::new();
    if files.len() > MAX_ATTACHMENTS {
        errors.add(
            "attachments",
            format!("At most {MAX_ATTACHMENTS} files can be attached at once."),
        );
    }
    for file in files {
        if file.filename.trim().is_empty() {
            errors.add("attachments", "Uploaded file has no name.");
            continue;
        }
        if file.filename.chars().count() > MAX_FILENAME_CHARS {
            errors.add(
                "attachments",
                format!("File name is too long. Use at most {MAX_FILENAME_CHARS} characters."),
            );
            continue;
        }
        if file.size > MAX_ATTACHMENT_BYTES {
            errors.add(
                "attachments",
                format!("{}: file is too large. Maximum size is 10 MB.", file.filename),
            );
        }
        match extension_of(&file.filename) {
            Some(ext) if ALLOWED_EXTENSIONS.contains(&ext.as_str()) => {}
            Some(ext) => errors.add(
                "attachments",
                format!("{}: file type .{ext} is not supported.", file.filename),
            ),
            None => errors.add(
                "attachments",
                format!("{}: files without an extension are not supported.", file.filename),
            ),
        }
    }
    errors.into_result()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(name: &str, size: usize) -> UploadedFile {
        UploadedFile { filename: name.into(), content_type: None, size, bytes: Vec::new() }
    }

    #[test]
    fn question_title_and_content_lengths() {
        let short = QuestionForm { title: "Hey".into(), content: "<p>too short</p>".into(), ..Default::default() };
        let errors = short.clean().unwrap_err();
        assert!(errors.contains("title"));
        assert!(errors.contains("content"));

        let ok = QuestionForm {
            title: "  How do I deploy?  ".into(),
            content: "<p>I need a detailed deployment guide please.</p>".into(),
            tags: vec!["Rust".into(), " rust ".into(), "Deploy".into()],
            category_id: None,
        };
        let cleaned = ok.clean().unwrap();
        assert_eq!(cleaned.title, "How do I deploy?");
        assert_eq!(cleaned.tags, vec!["rust", "deploy"]);
    }

    #[test]
    fn content_length_ignores_markup() {
        let form = QuestionForm {
            title: "Valid title".into(),
            content: "<p><strong>short</strong></p><p>&nbsp;</p><p>&nbsp;</p>".into(),
            ..Default::default()
        };
        assert!(form.clean().unwrap_err().contains("content"));
    }

    #[test]
    fn answer_requires_ten_visible_chars() {
        assert!(clean_answer("<p>long enough</p>").is_ok());
        assert!(clean_answer("<p>tiny</p>").unwrap_err().contains("answer"));
        assert!(clean_answer("<b>         </b>").is_err());
        assert!(clean_answer("<p>A complete answer.</p><script>x()</script>")
            .unwrap()
            .contains("A complete answer."));
    }

    #[test]
    fn tags_from_csv_and_list() {
        assert_eq!(parse_tags("Django, python,, django ,Web"), vec!["django", "python", "web"]);
        let form: QuestionForm = serde_json::from_value(serde_json::json!({
            "title": "A title", "content": "x", "tags": ["A", "b"]
        }))
        .unwrap();
        assert_eq!(form.tags, vec!["a", "b"]);
        let form: QuestionForm = serde_json::from_value(serde_json::json!({
            "title": "A title", "content": "x", "tags": "a, c"
        }))
        .unwrap();
        assert_eq!(form.tags, vec!["a", "c"]);
    }

    #[test]
    fn long_tags_are_rejected() {
        let form = QuestionForm {
            title: "Valid title".into(),
            content: "Twenty or more characters here".into(),
            tags: vec!["x".repeat(51)],
            category_id: None,
        };
        assert!(form.clean().unwrap_err().contains("tags"));
    }

    #[test]
    fn uploads_limits() {
        assert!(validate_uploads(&[upload("a.pdf", 10), upload("b.PNG", MAX_ATTACHMENT_BYTES)]).is_ok());
        assert!(validate_uploads(&[upload("a.pdf", MAX_ATTACHMENT_BYTES + 1)]).is_err());
        assert!(validate_uploads(&[upload("run.exe", 10)]).is_err());
        assert!(validate_uploads(&[upload("README", 10)]).is_err());
        let long = format!("{}.pdf", "a".repeat(MAX_FILENAME_CHARS - 4));
        assert!(validate_uploads(&[upload(&long, 10)]).is_ok());
        let too_long = format!("{}.pdf", "a".repeat(MAX_FILENAME_CHARS));
        assert!(validate_uploads(&[upload(&too_long, 10)]).unwrap_err().contains("attachments"));
        let six: Vec<_> = (0..6).map(|i| upload(&format!("f{i}.txt"), 1)).collect();
        let errors = validate_uploads(&six).unwrap_err();
        assert!(errors.get("attachments").unwrap()[0].contains("At most 5"));
    }

    #[test]
    fn slugs() {
        assert_eq!(slugify("Web Development!"), "web-development");
        assert_eq!(slugify("  C++ & Rust  "), "c-rust");
        assert_eq!(slugify("Базы данных"), "базы-данных");
        let form = CategoryForm { name: "Web Dev".into(), slug: None, description: String::new() };
        assert_eq!(form.clean().unwrap().slug.as_deref(), Some("web-dev"));
        let bad = CategoryForm { name: "X".into(), slug: Some("no spaces!".into()), description: String::new() };
        assert!(bad.clean().unwrap_err().contains("slug"));
        let empty = CategoryForm { name: "!!!".into(), slug: None, description: String::new() };
        assert!(empty.clean().unwrap_err().contains("slug"));
    }

    #[test]
    fn patch_distinguishes_null_from_absent() {
        let p: QuestionPatch = serde_json::from_value(serde_json::json!({"category_id": null})).unwrap();
        assert_eq!(p.category_id, Some(None));
        let p: QuestionPatch = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(p.category_id, None);
    }

    #[test]
    fn multipart_fields_are_parsed() {
        let fields: HashMap<String, String> =
            [("title", "Deploy"), ("question", "12")].into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        assert_eq!(TaskForm::from_fields(&fields).unwrap().question_id, Some(12));

        let bad: HashMap<String, String> = [("content", "x"), ("order", "first")]
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        assert!(NoteForm::from_fields(&bad).unwrap_err().contains("order"));
    }

    #[test]
    fn note_order_must_be_in_range() {
        let form = NoteForm { title: String::new(), content: "step".into(), position: Some(-1) };
        assert!(form.clean().unwrap_err().contains("order"));
        let form = NoteForm { title: String::new(), content: "step".into(), position: Some(i32::MAX) };
        assert!(form.clean().unwrap_err().contains("order"));
        let patch = NotePatch { position: Some(MAX_NOTE_ORDER + 1), ..Default::default() };
        assert!(patch.clean().unwrap_err().contains("order"));
        let form = NoteForm { title: String::new(), content: "step".into(), position: Some(MAX_NOTE_ORDER) };
        assert_eq!(form.clean().unwrap().position, Some(MAX_NOTE_ORDER));
    }
}
