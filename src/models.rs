use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub type Id = i64;

/// Discriminator of the record an attachment belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Question,
    Task,
    #[serde(rename = "tasknote")]
    TaskNote,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Question => "question",
            ContentKind::Task => "task",
            ContentKind::TaskNote => "tasknote",
        }
    }

    /// Top-level storage folder for blobs owned by this kind of record.
    pub fn folder(&self) -> &'static str {
        match self {
            ContentKind::Question => "questions",
            ContentKind::Task => "tasks",
            ContentKind::TaskNote => "task_notes",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "question" | "questions" => Ok(ContentKind::Question),
            "task" | "tasks" => Ok(ContentKind::Task),
            "tasknote" | "note" | "notes" => Ok(ContentKind::TaskNote),
            other => Err(format!("unknown content kind '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct User {
    pub id: Id,
    pub username: String,
    pub is_staff: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Category {
    pub id: Id,
    pub name: String,
    pub slug: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewCategory {
    pub name: String,
    pub slug: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Tag {
    pub id: Id,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Question {
    pub id: Id,
    pub title: String,
    pub content: String,
    /// Rich-text answer; empty string while unanswered.
    pub answer: String,
    pub category_id: Option<Id>,
    pub author_id: Option<Id>,
    #[serde(default)]
    pub author_name: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub views: i64,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Question {
    /// True iff the answer still has visible text once markup is stripped.
    pub fn has_answer(&self) -> bool {
        crate::html::has_visible_text(&self.answer)
    }
}

#[derive(Debug, Clone)]
pub struct NewQuestion {
    pub title: String,
    pub content: String,
    pub category_id: Option<Id>,
    pub tags: Vec<String>,
    pub author_id: Option<Id>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateQuestion {
    pub title: Option<String>,
    pub content: Option<String>,
    pub category_id: Option<Option<Id>>,
    pub tags: Option<Vec<String>>,
    pub is_published: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Task {
    pub id: Id,
    pub title: String,
    pub description: String,
    pub author_id: Id,
    #[serde(default)]
    pub author_name: Option<String>,
    pub question_id: Option<Id>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub author_id: Id,
    pub question_id: Option<Id>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateTask {
    pub title: Option<String>,
    pub description: Option<String>,
    pub question_id: Option<Option<Id>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct TaskNote {
    pub id: Id,
    pub task_id: Id,
    pub title: String,
    pub content: String,
    #[serde(rename = "order")]
    pub position: i32,
    pub author_id: Id,
    #[serde(default)]
    pub author_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTaskNote {
    pub task_id: Id,
    pub title: String,
    pub content: String,
    /// `None` appends after the current last note.
    pub position: Option<i32>,
    pub author_id: Id,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateTaskNote {
    pub title: Option<String>,
    pub content: Option<String>,
    pub position: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AttachedFile {
    pub id: Id,
    pub content_kind: ContentKind,
    pub object_id: Id,
    /// Storage key of the blob, e.g. `questions/question_7/report.pdf`.
    pub file_key: String,
    pub name: String,
    pub size_bytes: i64,
    pub uploaded_by: Option<Id>,
    #[serde(default)]
    pub uploader_name: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAttachment {
    pub content_kind: ContentKind,
    pub object_id: Id,
    pub file_key: String,
    pub name: String,
    pub size_bytes: i64,
    pub uploaded_by: Option<Id>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct SearchQuery {
    pub id: Id,
    pub term: String,
    pub user_id: Option<Id>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSearchQuery {
    pub term: String,
    pub user_id: Option<Id>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct CategoryCount {
    pub id: Id,
    pub name: String,
    pub slug: String,
    pub question_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct TagCount {
    pub name: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct SearchCount {
    pub term: String,
    pub count: i64,
}
