use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::*;
use crate::pagination::{Page, PageRequest};
use crate::search::SearchIn;

#[cfg(feature = "inmem-store")]
pub mod inmem;
#[cfg(feature = "postgres-store")]
pub mod pg;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("conflict: {0}")] Conflict(String),
    #[error("internal: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

/// Ordering of question lists, selected with `?sort=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuestionSort {
    CreatedAsc,
    #[default]
    CreatedDesc,
    TitleAsc,
    TitleDesc,
    ViewsAsc,
    ViewsDesc,
}

impl QuestionSort {
    /// Unknown values keep the default newest-first ordering.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.unwrap_or_default() {
            "created_at" => QuestionSort::CreatedAsc,
            "title" => QuestionSort::TitleAsc,
            "-title" => QuestionSort::TitleDesc,
            "views" => QuestionSort::ViewsAsc,
            "-views" => QuestionSort::ViewsDesc,
            _ => QuestionSort::CreatedDesc,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionSort::CreatedAsc => "created_at",
            QuestionSort::CreatedDesc => "-created_at",
            QuestionSort::TitleAsc => "title",
            QuestionSort::TitleDesc => "-title",
            QuestionSort::ViewsAsc => "views",
            QuestionSort::ViewsDesc => "-views",
        }
    }
}

/// Filters for published-question listings.
#[derive(Debug, Clone, Default)]
pub struct QuestionFilter {
    pub category_id: Option<Id>,
    /// `Some(true)` answered only, `Some(false)` unanswered only.
    pub answered: Option<bool>,
    pub sort: QuestionSort,
}

#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Insert or refresh the identity row for an authenticated caller.
    async fn upsert_user(&self, id: Id, username: &str, is_staff: bool) -> RepoResult<User>;
    async fn get_user(&self, id: Id) -> RepoResult<User>;
}

#[async_trait]
pub trait CategoryRepo: Send + Sync {
    /// Every category (ordered by name) with its published-question count.
    async fn category_counts(&self) -> RepoResult<Vec<CategoryCount>>;
    async fn get_category(&self, id: Id) -> RepoResult<Category>;
    async fn get_category_by_slug(&self, slug: &str) -> RepoResult<Category>;
    async fn create_category(&self, new: NewCategory) -> RepoResult<Category>;
    /// Questions in the category keep existing with no category.
    async fn delete_category(&self, id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait QuestionRepo: Send + Sync {
    async fn list_questions(&self, filter: &QuestionFilter, page: PageRequest) -> RepoResult<Page<Question>>;
    async fn get_question(&self, id: Id) -> RepoResult<Question>;
    async fn create_question(&self, new: NewQuestion) -> RepoResult<Question>;
    async fn update_question(&self, id: Id, upd: UpdateQuestion) -> RepoResult<Question>;
    async fn set_answer(&self, id: Id, answer: &str) -> RepoResult<Question>;
    /// Bumps the view counter without touching `updated_at`.
    async fn increment_views(&self, id: Id) -> RepoResult<Question>;
    /// Removes the question together with its attachment rows and returns
    /// the removed rows so their blobs can be cleaned up.
    async fn delete_question(&self, id: Id) -> RepoResult<Vec<AttachedFile>>;
    /// Other published questions sharing the category (uncategorized ones
    /// match each other).
    /// Newest published questions from the same category; any category when
    /// `question` has none.
    async fn similar_questions(&self, question: &Question, limit: i64) -> RepoResult<Vec<Question>>;
    async fn most_viewed_answered(&self, limit: i64) -> RepoResult<Vec<Question>>;
    async fn list_tags(&self) -> RepoResult<Vec<Tag>>;
    /// `(published, answered)` question counts.
    async fn question_totals(&self) -> RepoResult<(i64, i64)>;
    /// Tag usage across published questions, unordered.
    async fn tag_frequencies(&self) -> RepoResult<Vec<TagCount>>;
}

#[async_trait]
pub trait SearchRepo: Send + Sync {
    async fn search_questions(&self, query: &str, fields: SearchIn, page: PageRequest) -> RepoResult<Page<Question>>;
    async fn log_search(&self, entry: NewSearchQuery) -> RepoResult<SearchQuery>;
    async fn popular_searches(&self, since: DateTime<Utc>, limit: i64) -> RepoResult<Vec<SearchCount>>;
}

#[async_trait]
pub trait TaskRepo: Send + Sync {
    async fn list_tasks(&self, page: PageRequest) -> RepoResult<Page<Task>>;
    async fn recent_tasks(&self, limit: i64) -> RepoResult<Vec<Task>>;
    async fn count_tasks(&self) -> RepoResult<i64>;
    async fn get_task(&self, id: Id) -> RepoResult<Task>;
    async fn create_task(&self, new: NewTask) -> RepoResult<Task>;
    async fn update_task(&self, id: Id, upd: UpdateTask) -> RepoResult<Task>;
    /// Cascades to notes and to the attachments of the task and its notes.
    async fn delete_task(&self, id: Id) -> RepoResult<Vec<AttachedFile>>;

    async fn list_notes(&self, task_id: Id) -> RepoResult<Vec<TaskNote>>;
    async fn get_note(&self, id: Id) -> RepoResult<TaskNote>;
    async fn create_note(&self, new: NewTaskNote) -> RepoResult<TaskNote>;
    async fn update_note(&self, id: Id, upd: UpdateTaskNote) -> RepoResult<TaskNote>;
    async fn delete_note(&self, id: Id) -> RepoResult<Vec<AttachedFile>>;
}

#[async_trait]
pub trait AttachmentRepo: Send + Sync {
    async fn create_attachment(&self, new: NewAttachment) -> RepoResult<AttachedFile>;
    async fn get_attachment(&self, id: Id) -> RepoResult<AttachedFile>;
    async fn list_attachments(&self, kind: ContentKind, object_id: Id) -> RepoResult<Vec<AttachedFile>>;
    async fn delete_attachment(&self, id: Id) -> RepoResult<AttachedFile>;
}

pub trait Repo: UserRepo + CategoryRepo + QuestionRepo + SearchRepo + TaskRepo + AttachmentRepo {}

impl<T> Repo for T where T: UserRepo + CategoryRepo + QuestionRepo + SearchRepo + TaskRepo + AttachmentRepo {}
