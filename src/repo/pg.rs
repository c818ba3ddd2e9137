//! Postgres repository. Queries are built at runtime with `query_as` so the
//! crate compiles without a live database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres, Transaction};

use super::*;
use crate::search::like_pattern;

impl From<sqlx::Error> for RepoError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => RepoError::NotFound,
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
                RepoError::Conflict(db.message().to_string())
            }
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23503") => {
                RepoError::Conflict(format!("referenced record does not exist: {}", db.message()))
            }
            other => RepoError::Internal(other.to_string()),
        }
    }
}

/// Visible-text test for `q.answer`: markup removed, `&nbsp;` treated as
/// blank, whitespace trimmed.
const ANSWERED: &str =
    "btrim(replace(regexp_replace(q.answer, '<[^>]*>', '', 'g'), '&nbsp;', ' '), E' \\t\\r\\n') <> ''";

const QUESTION_COLUMNS: &str = r#"
    q.id, q.title, q.content, q.answer, q.category_id, q.author_id, u.username AS author_name,
    ARRAY(
        SELECT t.name FROM question_tags qt JOIN tags t ON t.id = qt.tag_id
        WHERE qt.question_id = q.id ORDER BY t.name
    ) AS tags,
    q.views, q.is_published, q.created_at, q.updated_at
"#;

const TASK_SELECT: &str = r#"
    SELECT t.id, t.title, t.description, t.author_id, u.username AS author_name, t.question_id,
           t.created_at, t.updated_at
    FROM tasks t LEFT JOIN users u ON u.id = t.author_id
"#;

const NOTE_SELECT: &str = r#"
    SELECT n.id, n.task_id, n.title, n.content, n.position, n.author_id, u.username AS author_name,
           n.created_at, n.updated_at
    FROM task_notes n LEFT JOIN users u ON u.id = n.author_id
"#;

const FILE_SELECT: &str = r#"
    SELECT f.id, f.content_kind, f.object_id, f.file_key, f.name, f.size_bytes, f.uploaded_by,
           u.username AS uploader_name, f.uploaded_at
    FROM attached_files f LEFT JOIN users u ON u.id = f.uploaded_by
"#;

const FILE_RETURNING: &str =
    "RETURNING id, content_kind, object_id, file_key, name, size_bytes, uploaded_by, NULL::TEXT AS uploader_name, uploaded_at";

fn question_select(filter: &str) -> String {
    format!("SELECT {QUESTION_COLUMNS} FROM questions q LEFT JOIN users u ON u.id = q.author_id {filter}")
}

fn order_by(sort: QuestionSort) -> &'static str {
    match sort {
        QuestionSort::CreatedAsc => "ORDER BY q.created_at ASC, q.id ASC",
        QuestionSort::CreatedDesc => "ORDER BY q.created_at DESC, q.id DESC",
        QuestionSort::TitleAsc => "ORDER BY q.title ASC, q.id ASC",
        QuestionSort::TitleDesc => "ORDER BY q.title DESC, q.id DESC",
        QuestionSort::ViewsAsc => "ORDER BY q.views ASC, q.id ASC",
        QuestionSort::ViewsDesc => "ORDER BY q.views DESC, q.id DESC",
    }
}

/// Database shape of an attachment; the kind is stored as text.
#[derive(sqlx::FromRow)]
struct FileRow {
    id: Id,
    content_kind: String,
    object_id: Id,
    file_key: String,
    name: String,
    size_bytes: i64,
    uploaded_by: Option<Id>,
    uploader_name: Option<String>,
    uploaded_at: DateTime<Utc>,
}

impl TryFrom<FileRow> for AttachedFile {
    type Error = RepoError;

    fn try_from(r: FileRow) -> Result<Self, Self::Error> {
        let content_kind = r.content_kind.parse::<ContentKind>().map_err(RepoError::Internal)?;
        Ok(AttachedFile {
            id: r.id,
            content_kind,
            object_id: r.object_id,
            file_key: r.file_key,
            name: r.name,
            size_bytes: r.size_bytes,
            uploaded_by: r.uploaded_by,
            uploader_name: r.uploader_name,
            uploaded_at: r.uploaded_at,
        })
    }
}

fn into_files(rows: Vec<FileRow>) -> RepoResult<Vec<AttachedFile>> {
    rows.into_iter().map(AttachedFile::try_from).collect()
}

#[derive(Clone)]
pub struct PgRepo {
    pool: Pool<Postgres>,
}

impl PgRepo {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Lazily connecting pool; the first query opens the connection.
    pub fn connect_lazy(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new().max_connections(5).connect_lazy(database_url)?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    async fn replace_tags(tx: &mut Transaction<'_, Postgres>, question_id: Id, tags: &[String]) -> RepoResult<()> {
        sqlx::query("DELETE FROM question_tags WHERE question_id = $1")
            .bind(question_id)
            .execute(&mut **tx)
            .await?;
        for name in tags {
            let (tag_id,): (Id,) = sqlx::query_as(
                "INSERT INTO tags (name) VALUES ($1) ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name RETURNING id",
            )
            .bind(name)
            .fetch_one(&mut **tx)
            .await?;
            sqlx::query("INSERT INTO question_tags (question_id, tag_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
                .bind(question_id)
                .bind(tag_id)
                .execute(&mut **tx)
                .await?;
        }
        Ok(())
    }

    async fn take_files(tx: &mut Transaction<'_, Postgres>, kind: ContentKind, object_id: Id) -> RepoResult<Vec<AttachedFile>> {
        let rows = sqlx::query_as::<_, FileRow>(&format!(
            "DELETE FROM attached_files WHERE content_kind = $1 AND object_id = $2 {FILE_RETURNING}"
        ))
        .bind(kind.as_str())
        .bind(object_id)
        .fetch_all(&mut **tx)
        .await?;
        into_files(rows)
    }
}

#[async_trait]
impl UserRepo for PgRepo {
    async fn upsert_user(&self, id: Id, username: &str, is_staff: bool) -> RepoResult<User> {
        let user = sqlx::query_as::<_, User>(
            r#"INSERT INTO users (id, username, is_staff) VALUES ($1, $2, $3)
               ON CONFLICT (id) DO UPDATE SET username = EXCLUDED.username, is_staff = EXCLUDED.is_staff
               RETURNING id, username, is_staff, created_at"#,
        )
        .bind(id)
        .bind(username)
        .bind(is_staff)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    async fn get_user(&self, id: Id) -> RepoResult<User> {
        let user = sqlx::query_as::<_, User>("SELECT id, username, is_staff, created_at FROM users WHERE id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(user)
    }
}

#[async_trait]
impl CategoryRepo for PgRepo {
    async fn category_counts(&self) -> RepoResult<Vec<CategoryCount>> {
        let recs = sqlx::query_as::<_, CategoryCount>(
            r#"SELECT c.id, c.name, c.slug, COUNT(q.id) AS question_count
               FROM categories c
               LEFT JOIN questions q ON q.category_id = c.id AND q.is_published
               GROUP BY c.id, c.name, c.slug
               ORDER BY c.name, c.id"#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(recs)
    }

    async fn get_category(&self, id: Id) -> RepoResult<Category> {
        let rec = sqlx::query_as::<_, Category>("SELECT id, name, slug, description FROM categories WHERE id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(rec)
    }

    async fn get_category_by_slug(&self, slug: &str) -> RepoResult<Category> {
        let rec = sqlx::query_as::<_, Category>("SELECT id, name, slug, description FROM categories WHERE slug = $1")
            .bind(slug)
            .fetch_one(&self.pool)
            .await?;
        Ok(rec)
    }

    async fn create_category(&self, new: NewCategory) -> RepoResult<Category> {
        let rec = sqlx::query_as::<_, Category>(
            "INSERT INTO categories (name, slug, description) VALUES ($1, $2, $3) RETURNING id, name, slug, description",
        )
        .bind(&new.name)
        .bind(&new.slug)
        .bind(&new.description)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match RepoError::from(e) {
            RepoError::Conflict(_) => RepoError::Conflict(format!("category slug '{}' already exists", new.slug)),
            other => other,
        })?;
        Ok(rec)
    }

    async fn delete_category(&self, id: Id) -> RepoResult<()> {
        let done = sqlx::query("DELETE FROM categories WHERE id = $1").bind(id).execute(&self.pool).await?;
        if done.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl QuestionRepo for PgRepo {
    async fn list_questions(&self, filter: &QuestionFilter, page: PageRequest) -> RepoResult<Page<Question>> {
        let conditions = format!(
            "WHERE q.is_published AND ($1::BIGINT IS NULL OR q.category_id = $1) \
             AND ($2::BOOLEAN IS NULL OR ({ANSWERED}) = $2)"
        );
        let (total,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM questions q {conditions}"))
            .bind(filter.category_id)
            .bind(filter.answered)
            .fetch_one(&self.pool)
            .await?;
        let (page_no, offset) = page.resolve(total as u64);
        let sql = format!("{} {} LIMIT $3 OFFSET $4", question_select(&conditions), order_by(filter.sort));
        let items = sqlx::query_as::<_, Question>(&sql)
            .bind(filter.category_id)
            .bind(filter.answered)
            .bind(i64::from(page.per_page))
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await?;
        Ok(Page::new(items, page_no, page.per_page, total as u64))
    }

    async fn get_question(&self, id: Id) -> RepoResult<Question> {
        let rec = sqlx::query_as::<_, Question>(&question_select("WHERE q.id = $1"))
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(rec)
    }

    async fn create_question(&self, new: NewQuestion) -> RepoResult<Question> {
        let mut tx = self.pool.begin().await?;
        let (id,): (Id,) = sqlx::query_as(
            "INSERT INTO questions (title, content, category_id, author_id) VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(&new.title)
        .bind(&new.content)
        .bind(new.category_id)
        .bind(new.author_id)
        .fetch_one(&mut *tx)
        .await?;
        Self::replace_tags(&mut tx, id, &new.tags).await?;
        tx.commit().await?;
        self.get_question(id).await
    }

    async fn update_question(&self, id: Id, upd: UpdateQuestion) -> RepoResult<Question> {
        let mut tx = self.pool.begin().await?;
        let updated: Option<(Id,)> = sqlx::query_as(
            r#"UPDATE questions SET
                   title = COALESCE($2, title),
                   content = COALESCE($3, content),
                   category_id = CASE WHEN $4 THEN $5 ELSE category_id END,
                   is_published = COALESCE($6, is_published),
                   updated_at = now()
               WHERE id = $1 RETURNING id"#,
        )
        .bind(id)
        .bind(upd.title.as_ref())
        .bind(upd.content.as_ref())
        .bind(upd.category_id.is_some())
        .bind(upd.category_id.flatten())
        .bind(upd.is_published)
        .fetch_optional(&mut *tx)
        .await?;
        if updated.is_none() {
            return Err(RepoError::NotFound);
        }
        if let Some(tags) = upd.tags.as_deref() {
            Self::replace_tags(&mut tx, id, tags).await?;
        }
        tx.commit().await?;
        self.get_question(id).await
    }

    async fn set_answer(&self, id: Id, answer: &str) -> RepoResult<Question> {
        let done = sqlx::query("UPDATE questions SET answer = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(answer)
            .execute(&self.pool)
            .await?;
        if done.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        self.get_question(id).await
    }

    async fn increment_views(&self, id: Id) -> RepoResult<Question> {
        let done = sqlx::query("UPDATE questions SET views = views + 1 WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if done.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        self.get_question(id).await
    }

    async fn delete_question(&self, id: Id) -> RepoResult<Vec<AttachedFile>> {
        let mut tx = self.pool.begin().await?;
        let deleted: Option<(Id,)> = sqlx::query_as("DELETE FROM questions WHERE id = $1 RETURNING id")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if deleted.is_none() {
            return Err(RepoError::NotFound);
        }
        let removed = Self::take_files(&mut tx, ContentKind::Question, id).await?;
        tx.commit().await?;
        Ok(removed)
    }

    async fn similar_questions(&self, question: &Question, limit: i64) -> RepoResult<Vec<Question>> {
        let sql = question_select(
            "WHERE q.is_published AND q.id <> $1 AND ($2::BIGINT IS NULL OR q.category_id = $2) \
             ORDER BY q.created_at DESC, q.id DESC LIMIT $3",
        );
        let recs = sqlx::query_as::<_, Question>(&sql)
            .bind(question.id)
            .bind(question.category_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(recs)
    }

    async fn most_viewed_answered(&self, limit: i64) -> RepoResult<Vec<Question>> {
        let sql = question_select(&format!(
            "WHERE q.is_published AND {ANSWERED} ORDER BY q.views DESC, q.id DESC LIMIT $1"
        ));
        let recs = sqlx::query_as::<_, Question>(&sql).bind(limit).fetch_all(&self.pool).await?;
        Ok(recs)
    }

    async fn list_tags(&self) -> RepoResult<Vec<Tag>> {
        let recs = sqlx::query_as::<_, Tag>("SELECT id, name FROM tags ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(recs)
    }

    async fn question_totals(&self) -> RepoResult<(i64, i64)> {
        let totals: (i64, i64) = sqlx::query_as(&format!(
            "SELECT COUNT(*), COUNT(*) FILTER (WHERE {ANSWERED}) FROM questions q WHERE q.is_published"
        ))
        .fetch_one(&self.pool)
        .await?;
        Ok(totals)
    }

    async fn tag_frequencies(&self) -> RepoResult<Vec<TagCount>> {
        let recs = sqlx::query_as::<_, TagCount>(
            r#"SELECT t.name, COUNT(*) AS count
               FROM question_tags qt
               JOIN tags t ON t.id = qt.tag_id
               JOIN questions q ON q.id = qt.question_id
               WHERE q.is_published
               GROUP BY t.name"#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(recs)
    }
}

#[async_trait]
impl SearchRepo for PgRepo {
    async fn search_questions(&self, query: &str, fields: SearchIn, page: PageRequest) -> RepoResult<Page<Question>> {
        let conditions = r#"WHERE q.is_published AND ($1 = '%%' OR
               ($2 AND q.title ILIKE $1)
            OR ($3 AND q.content ILIKE $1)
            OR ($4 AND q.answer ILIKE $1)
            OR ($5 AND EXISTS (
                   SELECT 1 FROM question_tags qt JOIN tags t ON t.id = qt.tag_id
                   WHERE qt.question_id = q.id AND t.name ILIKE $1))
            OR ($6 AND EXISTS (
                   SELECT 1 FROM attached_files f
                   WHERE f.content_kind = 'question' AND f.object_id = q.id AND f.name ILIKE $1)))"#;
        let pattern = like_pattern(query);
        let flags = [
            fields.includes(SearchIn::Title),
            fields.includes(SearchIn::Content),
            fields.includes(SearchIn::Answer),
            fields.includes(SearchIn::Tags),
            fields.includes(SearchIn::Files),
        ];

        let count_sql = format!("SELECT COUNT(*) FROM questions q {conditions}");
        let mut count = sqlx::query_as::<_, (i64,)>(&count_sql).bind(&pattern);
        for flag in flags {
            count = count.bind(flag);
        }
        let (total,) = count.fetch_one(&self.pool).await?;
        let (page_no, offset) = page.resolve(total as u64);

        let sql = format!("{} ORDER BY q.created_at DESC, q.id DESC LIMIT $7 OFFSET $8", question_select(conditions));
        let mut select = sqlx::query_as::<_, Question>(&sql).bind(&pattern);
        for flag in flags {
            select = select.bind(flag);
        }
        let items = select
            .bind(i64::from(page.per_page))
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await?;
        Ok(Page::new(items, page_no, page.per_page, total as u64))
    }

    async fn log_search(&self, entry: NewSearchQuery) -> RepoResult<SearchQuery> {
        let rec = sqlx::query_as::<_, SearchQuery>(
            r#"INSERT INTO search_queries (term, user_id, ip_address, user_agent) VALUES ($1, $2, $3, $4)
               RETURNING id, term, user_id, ip_address, user_agent, created_at"#,
        )
        .bind(&entry.term)
        .bind(entry.user_id)
        .bind(entry.ip_address.as_ref())
        .bind(entry.user_agent.as_ref())
        .fetch_one(&self.pool)
        .await?;
        Ok(rec)
    }

    async fn popular_searches(&self, since: DateTime<Utc>, limit: i64) -> RepoResult<Vec<SearchCount>> {
        let recs = sqlx::query_as::<_, SearchCount>(
            r#"SELECT term, COUNT(*) AS count FROM search_queries
               WHERE created_at >= $1
               GROUP BY term
               ORDER BY count DESC, term ASC
               LIMIT $2"#,
        )
        .bind(since)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(recs)
    }
}

#[async_trait]
impl TaskRepo for PgRepo {
    async fn list_tasks(&self, page: PageRequest) -> RepoResult<Page<Task>> {
        let total = self.count_tasks().await?;
        let (page_no, offset) = page.resolve(total as u64);
        let items = sqlx::query_as::<_, Task>(&format!(
            "{TASK_SELECT} ORDER BY t.created_at DESC, t.id DESC LIMIT $1 OFFSET $2"
        ))
        .bind(i64::from(page.per_page))
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(Page::new(items, page_no, page.per_page, total as u64))
    }

    async fn recent_tasks(&self, limit: i64) -> RepoResult<Vec<Task>> {
        let recs = sqlx::query_as::<_, Task>(&format!("{TASK_SELECT} ORDER BY t.created_at DESC, t.id DESC LIMIT $1"))
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(recs)
    }

    async fn count_tasks(&self) -> RepoResult<i64> {
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tasks").fetch_one(&self.pool).await?;
        Ok(n)
    }

    async fn get_task(&self, id: Id) -> RepoResult<Task> {
        let rec = sqlx::query_as::<_, Task>(&format!("{TASK_SELECT} WHERE t.id = $1"))
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(rec)
    }

    async fn create_task(&self, new: NewTask) -> RepoResult<Task> {
        let (id,): (Id,) = sqlx::query_as(
            "INSERT INTO tasks (title, description, author_id, question_id) VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(&new.title)
        .bind(&new.description)
        .bind(new.author_id)
        .bind(new.question_id)
        .fetch_one(&self.pool)
        .await?;
        self.get_task(id).await
    }

    async fn update_task(&self, id: Id, upd: UpdateTask) -> RepoResult<Task> {
        let updated: Option<(Id,)> = sqlx::query_as(
            r#"UPDATE tasks SET
                   title = COALESCE($2, title),
                   description = COALESCE($3, description),
                   question_id = CASE WHEN $4 THEN $5 ELSE question_id END,
                   updated_at = now()
               WHERE id = $1 RETURNING id"#,
        )
        .bind(id)
        .bind(upd.title.as_ref())
        .bind(upd.description.as_ref())
        .bind(upd.question_id.is_some())
        .bind(upd.question_id.flatten())
        .fetch_optional(&self.pool)
        .await?;
        if updated.is_none() {
            return Err(RepoError::NotFound);
        }
        self.get_task(id).await
    }

    async fn delete_task(&self, id: Id) -> RepoResult<Vec<AttachedFile>> {
        let mut tx = self.pool.begin().await?;
        let note_ids: Vec<(Id,)> = sqlx::query_as("SELECT id FROM task_notes WHERE task_id = $1")
            .bind(id)
            .fetch_all(&mut *tx)
            .await?;
        let deleted: Option<(Id,)> = sqlx::query_as("DELETE FROM tasks WHERE id = $1 RETURNING id")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if deleted.is_none() {
            return Err(RepoError::NotFound);
        }
        let mut removed = Self::take_files(&mut tx, ContentKind::Task, id).await?;
        for (note_id,) in note_ids {
            removed.extend(Self::take_files(&mut tx, ContentKind::TaskNote, note_id).await?);
        }
        tx.commit().await?;
        Ok(removed)
    }

    async fn list_notes(&self, task_id: Id) -> RepoResult<Vec<TaskNote>> {
        let recs = sqlx::query_as::<_, TaskNote>(&format!(
            "{NOTE_SELECT} WHERE n.task_id = $1 ORDER BY n.position, n.created_at, n.id"
        ))
        .bind(task_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(recs)
    }

    async fn get_note(&self, id: Id) -> RepoResult<TaskNote> {
        let rec = sqlx::query_as::<_, TaskNote>(&format!("{NOTE_SELECT} WHERE n.id = $1"))
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(rec)
    }

    async fn create_note(&self, new: NewTaskNote) -> RepoResult<TaskNote> {
        let mut tx = self.pool.begin().await?;
        // lock the parent so concurrent appends get distinct positions
        let task: Option<(Id,)> = sqlx::query_as("SELECT id FROM tasks WHERE id = $1 FOR UPDATE")
            .bind(new.task_id)
            .fetch_optional(&mut *tx)
            .await?;
        if task.is_none() {
            return Err(RepoError::NotFound);
        }
        let (id,): (Id,) = sqlx::query_as(
            r#"INSERT INTO task_notes (task_id, title, content, position, author_id)
               VALUES ($1, $2, $3,
                       COALESCE($4, (SELECT COALESCE(LEAST(MAX(position)::BIGINT + 1, 2147483647)::INTEGER, 0) FROM task_notes WHERE task_id = $1)),
                       $5)
               RETURNING id"#,
        )
        .bind(new.task_id)
        .bind(&new.title)
        .bind(&new.content)
        .bind(new.position)
        .bind(new.author_id)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        self.get_note(id).await
    }

    async fn update_note(&self, id: Id, upd: UpdateTaskNote) -> RepoResult<TaskNote> {
        let updated: Option<(Id,)> = sqlx::query_as(
            r#"UPDATE task_notes SET
                   title = COALESCE($2, title),
                   content = COALESCE($3, content),
                   position = COALESCE($4, position),
                   updated_at = now()
               WHERE id = $1 RETURNING id"#,
        )
        .bind(id)
        .bind(upd.title.as_ref())
        .bind(upd.content.as_ref())
        .bind(upd.position)
        .fetch_optional(&self.pool)
        .await?;
        if updated.is_none() {
            return Err(RepoError::NotFound);
        }
        self.get_note(id).await
    }

    async fn delete_note(&self, id: Id) -> RepoResult<Vec<AttachedFile>> {
        let mut tx = self.pool.begin().await?;
        let deleted: Option<(Id,)> = sqlx::query_as("DELETE FROM task_notes WHERE id = $1 RETURNING id")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if deleted.is_none() {
            return Err(RepoError::NotFound);
        }
        let removed = Self::take_files(&mut tx, ContentKind::TaskNote, id).await?;
        tx.commit().await?;
        Ok(removed)
    }
}

#[async_trait]
impl AttachmentRepo for PgRepo {
    async fn create_attachment(&self, new: NewAttachment) -> RepoResult<AttachedFile> {
        let (id,): (Id,) = sqlx::query_as(
            r#"INSERT INTO attached_files (content_kind, object_id, file_key, name, size_bytes, uploaded_by)
               VALUES ($1, $2, $3, $4, $5, $6) RETURNING id"#,
        )
        .bind(new.content_kind.as_str())
        .bind(new.object_id)
        .bind(&new.file_key)
        .bind(&new.name)
        .bind(new.size_bytes)
        .bind(new.uploaded_by)
        .fetch_one(&self.pool)
        .await?;
        self.get_attachment(id).await
    }

    async fn get_attachment(&self, id: Id) -> RepoResult<AttachedFile> {
        let row = sqlx::query_as::<_, FileRow>(&format!("{FILE_SELECT} WHERE f.id = $1"))
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        AttachedFile::try_from(row)
    }

    async fn list_attachments(&self, kind: ContentKind, object_id: Id) -> RepoResult<Vec<AttachedFile>> {
        let rows = sqlx::query_as::<_, FileRow>(&format!(
            "{FILE_SELECT} WHERE f.content_kind = $1 AND f.object_id = $2 ORDER BY f.uploaded_at DESC, f.id DESC"
        ))
        .bind(kind.as_str())
        .bind(object_id)
        .fetch_all(&self.pool)
        .await?;
        into_files(rows)
    }

    async fn delete_attachment(&self, id: Id) -> RepoResult<AttachedFile> {
        let file = self.get_attachment(id).await?;
        let done = sqlx::query("DELETE FROM attached_files WHERE id = $1").bind(id).execute(&self.pool).await?;
        if done.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(file)
    }
}
