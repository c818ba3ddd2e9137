//! Process-local repository. State lives behind one `RwLock`; when opened with
//! a snapshot path every write is mirrored to a JSON file so a restart keeps
//! the data.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::*;
use crate::search::question_matches;

pub const SNAPSHOT_FILE: &str = "state.json";

#[derive(Default, Serialize, Deserialize)]
struct State {
    users: HashMap<Id, User>,
    categories: HashMap<Id, Category>,
    tags: HashMap<Id, Tag>,
    questions: HashMap<Id, Question>,
    tasks: HashMap<Id, Task>,
    notes: HashMap<Id, TaskNote>,
    files: HashMap<Id, AttachedFile>,
    searches: Vec<SearchQuery>,
    next_id: Id,
}

impl State {
    fn next_id(&mut self) -> Id {
        self.next_id += 1;
        self.next_id
    }

    fn username(&self, id: Option<Id>) -> Option<String> {
        id.and_then(|id| self.users.get(&id)).map(|u| u.username.clone())
    }

    fn question(&self, q: &Question) -> Question {
        Question { author_name: self.username(q.author_id), ..q.clone() }
    }

    fn task(&self, t: &Task) -> Task {
        Task { author_name: self.username(Some(t.author_id)), ..t.clone() }
    }

    fn note(&self, n: &TaskNote) -> TaskNote {
        TaskNote { author_name: self.username(Some(n.author_id)), ..n.clone() }
    }

    fn file(&self, f: &AttachedFile) -> AttachedFile {
        AttachedFile { uploader_name: self.username(f.uploaded_by), ..f.clone() }
    }

    fn published(&self) -> impl Iterator<Item = &Question> {
        self.questions.values().filter(|q| q.is_published)
    }

    /// Register any tag names not seen before.
    fn ensure_tags(&mut self, names: &[String]) {
        for name in names {
            if !self.tags.values().any(|t| &t.name == name) {
                let id = self.next_id();
                self.tags.insert(id, Tag { id, name: name.clone() });
            }
        }
    }

    fn take_files(&mut self, kind: ContentKind, object_id: Id) -> Vec<AttachedFile> {
        let ids: Vec<Id> = self
            .files
            .values()
            .filter(|f| f.content_kind == kind && f.object_id == object_id)
            .map(|f| f.id)
            .collect();
        ids.into_iter().filter_map(|id| self.files.remove(&id)).collect()
    }
}

/// Tag lists are kept in name order, as the SQL backend returns them.
fn sorted(mut tags: Vec<String>) -> Vec<String> {
    tags.sort();
    tags
}

fn sort_questions(items: &mut [Question], sort: QuestionSort) {
    items.sort_by(|a, b| match sort {
        QuestionSort::CreatedAsc => a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)),
        QuestionSort::CreatedDesc => b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)),
        QuestionSort::TitleAsc => a.title.cmp(&b.title).then(a.id.cmp(&b.id)),
        QuestionSort::TitleDesc => b.title.cmp(&a.title).then(b.id.cmp(&a.id)),
        QuestionSort::ViewsAsc => a.views.cmp(&b.views).then(a.id.cmp(&b.id)),
        QuestionSort::ViewsDesc => b.views.cmp(&a.views).then(b.id.cmp(&a.id)),
    });
}

fn newest_first<T>(items: &mut [T], key: impl Fn(&T) -> (DateTime<Utc>, Id)) {
    items.sort_by(|a, b| key(b).cmp(&key(a)));
}

#[derive(Clone)]
pub struct InMemRepo {
    state: Arc<RwLock<State>>,
    snapshot_path: Option<Arc<PathBuf>>,
}

impl InMemRepo {
    /// Ephemeral store, nothing is written to disk.
    pub fn new() -> Self {
        Self { state: Arc::new(RwLock::new(State::default())), snapshot_path: None }
    }

    /// Store backed by the snapshot at `path`, loaded now if it exists.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = Self::load_state_from(&path);
        Self { state: Arc::new(RwLock::new(state)), snapshot_path: Some(Arc::new(path)) }
    }

    /// `<dir>/state.json`.
    pub fn open_dir(dir: impl AsRef<Path>) -> Self {
        Self::open(dir.as_ref().join(SNAPSHOT_FILE))
    }

    fn load_state_from(path: &Path) -> State {
        match std::fs::read(path) {
            Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                Ok(s) => {
                    log::info!("loaded snapshot '{}'", path.display());
                    s
                }
                Err(e) => {
                    log::warn!("failed to parse snapshot '{}': {e}; starting empty", path.display());
                    State::default()
                }
            },
            Err(e) => {
                log::info!("no snapshot at '{}' ({e}); starting empty", path.display());
                State::default()
            }
        }
    }

    fn read(&self) -> RepoResult<RwLockReadGuard<'_, State>> {
        self.state.read().map_err(|_| RepoError::Internal("state lock poisoned".into()))
    }

    fn write(&self) -> RepoResult<RwLockWriteGuard<'_, State>> {
        self.state.write().map_err(|_| RepoError::Internal("state lock poisoned".into()))
    }

    /// Mirror the state to disk. Must not be called while holding the lock.
    fn persist(&self) {
        let Some(path) = self.snapshot_path.as_deref() else { return };
        let bytes = match self.read().map(|s| serde_json::to_vec_pretty(&*s)) {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                log::error!("failed to serialize snapshot: {e}");
                return;
            }
            Err(e) => {
                log::error!("failed to read state for snapshot: {e}");
                return;
            }
        };
        if let Some(dir) = path.parent() {
            let _ = std::fs::create_dir_all(dir);
        }
        if let Err(e) = std::fs::write(path, bytes) {
            log::error!("failed to write snapshot '{}': {e}", path.display());
        }
    }
}

impl Default for InMemRepo {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserRepo for InMemRepo {
    async fn upsert_user(&self, id: Id, username: &str, is_staff: bool) -> RepoResult<User> {
        let (user, changed) = {
            let mut s = self.write()?;
            let existing = s.users.get(&id).cloned();
            let user = User {
                id,
                username: username.to_string(),
                is_staff,
                created_at: existing.as_ref().map(|u| u.created_at).unwrap_or_else(Utc::now),
            };
            let changed = existing.map_or(true, |u| u.username != user.username || u.is_staff != is_staff);
            s.users.insert(id, user.clone());
            // keep the next id ahead of externally assigned user ids
            s.next_id = s.next_id.max(id);
            (user, changed)
        };
        if changed {
            self.persist();
        }
        Ok(user)
    }

    async fn get_user(&self, id: Id) -> RepoResult<User> {
        self.read()?.users.get(&id).cloned().ok_or(RepoError::NotFound)
    }
}

#[async_trait]
impl CategoryRepo for InMemRepo {
    async fn category_counts(&self) -> RepoResult<Vec<CategoryCount>> {
        let s = self.read()?;
        let mut out: Vec<CategoryCount> = s
            .categories
            .values()
            .map(|c| CategoryCount {
                id: c.id,
                name: c.name.clone(),
                slug: c.slug.clone(),
                question_count: s.published().filter(|q| q.category_id == Some(c.id)).count() as i64,
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(out)
    }

    async fn get_category(&self, id: Id) -> RepoResult<Category> {
        self.read()?.categories.get(&id).cloned().ok_or(RepoError::NotFound)
    }

    async fn get_category_by_slug(&self, slug: &str) -> RepoResult<Category> {
        self.read()?
            .categories
            .values()
            .find(|c| c.slug == slug)
            .cloned()
            .ok_or(RepoError::NotFound)
    }

    async fn create_category(&self, new: NewCategory) -> RepoResult<Category> {
        let category = {
            let mut s = self.write()?;
            if s.categories.values().any(|c| c.slug == new.slug) {
                return Err(RepoError::Conflict(format!("category slug '{}' already exists", new.slug)));
            }
            let id = s.next_id();
            let category = Category { id, name: new.name, slug: new.slug, description: new.description };
            s.categories.insert(id, category.clone());
            category
        };
        self.persist();
        Ok(category)
    }

    async fn delete_category(&self, id: Id) -> RepoResult<()> {
        {
            let mut s = self.write()?;
            s.categories.remove(&id).ok_or(RepoError::NotFound)?;
            for q in s.questions.values_mut().filter(|q| q.category_id == Some(id)) {
                q.category_id = None;
            }
        }
        self.persist();
        Ok(())
    }
}

#[async_trait]
impl QuestionRepo for InMemRepo {
    async fn list_questions(&self, filter: &QuestionFilter, page: PageRequest) -> RepoResult<Page<Question>> {
        let s = self.read()?;
        let mut items: Vec<Question> = s
            .published()
            .filter(|q| filter.category_id.map_or(true, |c| q.category_id == Some(c)))
            .filter(|q| filter.answered.map_or(true, |a| q.has_answer() == a))
            .map(|q| s.question(q))
            .collect();
        sort_questions(&mut items, filter.sort);
        Ok(Page::from_vec(items, page))
    }

    async fn get_question(&self, id: Id) -> RepoResult<Question> {
        let s = self.read()?;
        s.questions.get(&id).map(|q| s.question(q)).ok_or(RepoError::NotFound)
    }

    async fn create_question(&self, new: NewQuestion) -> RepoResult<Question> {
        let question = {
            let mut s = self.write()?;
            s.ensure_tags(&new.tags);
            let id = s.next_id();
            let now = Utc::now();
            let question = Question {
                id,
                title: new.title,
                content: new.content,
                answer: String::new(),
                category_id: new.category_id,
                author_id: new.author_id,
                author_name: None,
                tags: sorted(new.tags),
                views: 0,
                is_published: true,
                created_at: now,
                updated_at: now,
            };
            s.questions.insert(id, question.clone());
            s.question(&question)
        };
        self.persist();
        Ok(question)
    }

    async fn update_question(&self, id: Id, upd: UpdateQuestion) -> RepoResult<Question> {
        let question = {
            let mut s = self.write()?;
            if let Some(tags) = upd.tags.as_deref() {
                s.ensure_tags(tags);
            }
            let q = s.questions.get_mut(&id).ok_or(RepoError::NotFound)?;
            if let Some(title) = upd.title {
                q.title = title;
            }
            if let Some(content) = upd.content {
                q.content = content;
            }
            if let Some(category_id) = upd.category_id {
                q.category_id = category_id;
            }
            if let Some(tags) = upd.tags {
                q.tags = sorted(tags);
            }
            if let Some(published) = upd.is_published {
                q.is_published = published;
            }
            q.updated_at = Utc::now();
            let q = q.clone();
            s.question(&q)
        };
        self.persist();
        Ok(question)
    }

    async fn set_answer(&self, id: Id, answer: &str) -> RepoResult<Question> {
        let question = {
            let mut s = self.write()?;
            let q = s.questions.get_mut(&id).ok_or(RepoError::NotFound)?;
            q.answer = answer.to_string();
            q.updated_at = Utc::now();
            let q = q.clone();
            s.question(&q)
        };
        self.persist();
        Ok(question)
    }

    async fn increment_views(&self, id: Id) -> RepoResult<Question> {
        let question = {
            let mut s = self.write()?;
            let q = s.questions.get_mut(&id).ok_or(RepoError::NotFound)?;
            q.views += 1;
            let q = q.clone();
            s.question(&q)
        };
        self.persist();
        Ok(question)
    }

    async fn delete_question(&self, id: Id) -> RepoResult<Vec<AttachedFile>> {
        let removed = {
            let mut s = self.write()?;
            s.questions.remove(&id).ok_or(RepoError::NotFound)?;
            for t in s.tasks.values_mut().filter(|t| t.question_id == Some(id)) {
                t.question_id = None;
            }
            s.take_files(ContentKind::Question, id)
        };
        self.persist();
        Ok(removed)
    }

    async fn similar_questions(&self, question: &Question, limit: i64) -> RepoResult<Vec<Question>> {
        let s = self.read()?;
        let mut items: Vec<Question> = s
            .published()
            .filter(|q| q.id != question.id)
            .filter(|q| question.category_id.is_none() || q.category_id == question.category_id)
            .map(|q| s.question(q))
            .collect();
        sort_questions(&mut items, QuestionSort::CreatedDesc);
        items.truncate(limit.max(0) as usize);
        Ok(items)
    }

    async fn most_viewed_answered(&self, limit: i64) -> RepoResult<Vec<Question>> {
        let s = self.read()?;
        let mut items: Vec<Question> = s.published().filter(|q| q.has_answer()).map(|q| s.question(q)).collect();
        sort_questions(&mut items, QuestionSort::ViewsDesc);
        items.truncate(limit.max(0) as usize);
        Ok(items)
    }

    async fn list_tags(&self) -> RepoResult<Vec<Tag>> {
        let s = self.read()?;
        let mut out: Vec<Tag> = s.tags.values().cloned().collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    async fn question_totals(&self) -> RepoResult<(i64, i64)> {
        let s = self.read()?;
        let published = s.published().count() as i64;
        let answered = s.published().filter(|q| q.has_answer()).count() as i64;
        Ok((published, answered))
    }

    async fn tag_frequencies(&self) -> RepoResult<Vec<TagCount>> {
        let s = self.read()?;
        let mut counts: HashMap<&str, i64> = HashMap::new();
        for tag in s.published().flat_map(|q| q.tags.iter()) {
            *counts.entry(tag.as_str()).or_default() += 1;
        }
        Ok(counts.into_iter().map(|(name, count)| TagCount { name: name.to_string(), count }).collect())
    }
}

#[async_trait]
impl SearchRepo for InMemRepo {
    async fn search_questions(&self, query: &str, fields: SearchIn, page: PageRequest) -> RepoResult<Page<Question>> {
        let s = self.read()?;
        let mut items: Vec<Question> = s
            .published()
            .filter(|q| {
                if query.is_empty() {
                    return true;
                }
                let names: Vec<&str> = s
                    .files
                    .values()
                    .filter(|f| f.content_kind == ContentKind::Question && f.object_id == q.id)
                    .map(|f| f.name.as_str())
                    .collect();
                question_matches(q, &names, query, fields)
            })
            .map(|q| s.question(q))
            .collect();
        sort_questions(&mut items, QuestionSort::CreatedDesc);
        Ok(Page::from_vec(items, page))
    }

    async fn log_search(&self, entry: NewSearchQuery) -> RepoResult<SearchQuery> {
        let logged = {
            let mut s = self.write()?;
            let id = s.next_id();
            let logged = SearchQuery {
                id,
                term: entry.term,
                user_id: entry.user_id,
                ip_address: entry.ip_address,
                user_agent: entry.user_agent,
                created_at: Utc::now(),
            };
            s.searches.push(logged.clone());
            logged
        };
        self.persist();
        Ok(logged)
    }

    async fn popular_searches(&self, since: DateTime<Utc>, limit: i64) -> RepoResult<Vec<SearchCount>> {
        let s = self.read()?;
        let mut counts: HashMap<&str, i64> = HashMap::new();
        for q in s.searches.iter().filter(|q| q.created_at >= since) {
            *counts.entry(q.term.as_str()).or_default() += 1;
        }
        let mut out: Vec<SearchCount> =
            counts.into_iter().map(|(term, count)| SearchCount { term: term.to_string(), count }).collect();
        out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.term.cmp(&b.term)));
        out.truncate(limit.max(0) as usize);
        Ok(out)
    }
}

#[async_trait]
impl TaskRepo for InMemRepo {
    async fn list_tasks(&self, page: PageRequest) -> RepoResult<Page<Task>> {
        let s = self.read()?;
        let mut items: Vec<Task> = s.tasks.values().map(|t| s.task(t)).collect();
        newest_first(&mut items, |t| (t.created_at, t.id));
        Ok(Page::from_vec(items, page))
    }

    async fn recent_tasks(&self, limit: i64) -> RepoResult<Vec<Task>> {
        let s = self.read()?;
        let mut items: Vec<Task> = s.tasks.values().map(|t| s.task(t)).collect();
        newest_first(&mut items, |t| (t.created_at, t.id));
        items.truncate(limit.max(0) as usize);
        Ok(items)
    }

    async fn count_tasks(&self) -> RepoResult<i64> {
        Ok(self.read()?.tasks.len() as i64)
    }

    async fn get_task(&self, id: Id) -> RepoResult<Task> {
        let s = self.read()?;
        s.tasks.get(&id).map(|t| s.task(t)).ok_or(RepoError::NotFound)
    }

    async fn create_task(&self, new: NewTask) -> RepoResult<Task> {
        let task = {
            let mut s = self.write()?;
            let id = s.next_id();
            let now = Utc::now();
            let task = Task {
                id,
                title: new.title,
                description: new.description,
                author_id: new.author_id,
                author_name: None,
                question_id: new.question_id,
                created_at: now,
                updated_at: now,
            };
            s.tasks.insert(id, task.clone());
            s.task(&task)
        };
        self.persist();
        Ok(task)
    }

    async fn update_task(&self, id: Id, upd: UpdateTask) -> RepoResult<Task> {
        let task = {
            let mut s = self.write()?;
            let t = s.tasks.get_mut(&id).ok_or(RepoError::NotFound)?;
            if let Some(title) = upd.title {
                t.title = title;
            }
            if let Some(description) = upd.description {
                t.description = description;
            }
            if let Some(question_id) = upd.question_id {
                t.question_id = question_id;
            }
            t.updated_at = Utc::now();
            let t = t.clone();
            s.task(&t)
        };
        self.persist();
        Ok(task)
    }

    async fn delete_task(&self, id: Id) -> RepoResult<Vec<AttachedFile>> {
        let removed = {
            let mut s = self.write()?;
            s.tasks.remove(&id).ok_or(RepoError::NotFound)?;
            let note_ids: Vec<Id> = s.notes.values().filter(|n| n.task_id == id).map(|n| n.id).collect();
            let mut removed = s.take_files(ContentKind::Task, id);
            for note_id in note_ids {
                s.notes.remove(&note_id);
                removed.extend(s.take_files(ContentKind::TaskNote, note_id));
            }
            removed
        };
        self.persist();
        Ok(removed)
    }

    async fn list_notes(&self, task_id: Id) -> RepoResult<Vec<TaskNote>> {
        let s = self.read()?;
        let mut items: Vec<TaskNote> = s.notes.values().filter(|n| n.task_id == task_id).map(|n| s.note(n)).collect();
        items.sort_by(|a, b| (a.position, a.created_at, a.id).cmp(&(b.position, b.created_at, b.id)));
        Ok(items)
    }

    async fn get_note(&self, id: Id) -> RepoResult<TaskNote> {
        let s = self.read()?;
        s.notes.get(&id).map(|n| s.note(n)).ok_or(RepoError::NotFound)
    }

    async fn create_note(&self, new: NewTaskNote) -> RepoResult<TaskNote> {
        let note = {
            let mut s = self.write()?;
            if !s.tasks.contains_key(&new.task_id) {
                return Err(RepoError::NotFound);
            }
            let position = new.position.unwrap_or_else(|| {
                s.notes
                    .values()
                    .filter(|n| n.task_id == new.task_id)
                    .map(|n| n.position.saturating_add(1))
                    .max()
                    .unwrap_or(0)
            });
            let id = s.next_id();
            let now = Utc::now();
            let note = TaskNote {
                id,
                task_id: new.task_id,
                title: new.title,
                content: new.content,
                position,
                author_id: new.author_id,
                author_name: None,
                created_at: now,
                updated_at: now,
            };
            s.notes.insert(id, note.clone());
            s.note(&note)
        };
        self.persist();
        Ok(note)
    }

    async fn update_note(&self, id: Id, upd: UpdateTaskNote) -> RepoResult<TaskNote> {
        let note = {
            let mut s = self.write()?;
            let n = s.notes.get_mut(&id).ok_or(RepoError::NotFound)?;
            if let Some(title) = upd.title {
                n.title = title;
            }
            if let Some(content) = upd.content {
                n.content = content;
            }
            if let Some(position) = upd.position {
                n.position = position;
            }
            n.updated_at = Utc::now();
            let n = n.clone();
            s.note(&n)
        };
        self.persist();
        Ok(note)
    }

    async fn delete_note(&self, id: Id) -> RepoResult<Vec<AttachedFile>> {
        let removed = {
            let mut s = self.write()?;
            s.notes.remove(&id).ok_or(RepoError::NotFound)?;
            s.take_files(ContentKind::TaskNote, id)
        };
        self.persist();
        Ok(removed)
    }
}

#[async_trait]
impl AttachmentRepo for InMemRepo {
    async fn create_attachment(&self, new: NewAttachment) -> RepoResult<AttachedFile> {
        let file = {
            let mut s = self.write()?;
            let id = s.next_id();
            let file = AttachedFile {
                id,
                content_kind: new.content_kind,
                object_id: new.object_id,
                file_key: new.file_key,
                name: new.name,
                size_bytes: new.size_bytes,
                uploaded_by: new.uploaded_by,
                uploader_name: None,
                uploaded_at: Utc::now(),
            };
            s.files.insert(id, file.clone());
            s.file(&file)
        };
        self.persist();
        Ok(file)
    }

    async fn get_attachment(&self, id: Id) -> RepoResult<AttachedFile> {
        let s = self.read()?;
        s.files.get(&id).map(|f| s.file(f)).ok_or(RepoError::NotFound)
    }

    async fn list_attachments(&self, kind: ContentKind, object_id: Id) -> RepoResult<Vec<AttachedFile>> {
        let s = self.read()?;
        let mut items: Vec<AttachedFile> = s
            .files
            .values()
            .filter(|f| f.content_kind == kind && f.object_id == object_id)
            .map(|f| s.file(f))
            .collect();
        newest_first(&mut items, |f| (f.uploaded_at, f.id));
        Ok(items)
    }

    async fn delete_attachment(&self, id: Id) -> RepoResult<AttachedFile> {
        let file = {
            let mut s = self.write()?;
            let file = s.files.remove(&id).ok_or(RepoError::NotFound)?;
            s.file(&file)
        };
        self.persist();
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_question(title: &str, tags: &[&str]) -> NewQuestion {
        NewQuestion {
            title: title.into(),
            content: "Some question body long enough".into(),
            category_id: None,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            author_id: None,
        }
    }

    fn attachment(kind: ContentKind, object_id: Id, name: &str) -> NewAttachment {
        NewAttachment {
            content_kind: kind,
            object_id,
            file_key: format!("{}/{}_{object_id}/{name}", kind.folder(), kind),
            name: name.into(),
            size_bytes: 3,
            uploaded_by: None,
        }
    }

    #[tokio::test]
    async fn views_do_not_touch_updated_at() {
        let repo = InMemRepo::new();
        let q = repo.create_question(new_question("First question", &[])).await.unwrap();
        let viewed = repo.increment_views(q.id).await.unwrap();
        assert_eq!(viewed.views, 1);
        assert_eq!(viewed.updated_at, q.updated_at);
    }

    #[tokio::test]
    async fn deleting_a_task_returns_note_and_task_files() {
        let repo = InMemRepo::new();
        let task = repo
            .create_task(NewTask { title: "T".into(), description: String::new(), author_id: 1, question_id: None })
            .await
            .unwrap();
        let note = repo
            .create_note(NewTaskNote { task_id: task.id, title: String::new(), content: "c".into(), position: None, author_id: 1 })
            .await
            .unwrap();
        repo.create_attachment(attachment(ContentKind::Task, task.id, "a.txt")).await.unwrap();
        repo.create_attachment(attachment(ContentKind::TaskNote, note.id, "b.txt")).await.unwrap();

        let removed = repo.delete_task(task.id).await.unwrap();
        assert_eq!(removed.len(), 2);
        assert!(matches!(repo.get_note(note.id).await, Err(RepoError::NotFound)));
    }

    #[tokio::test]
    async fn notes_append_in_order() {
        let repo = InMemRepo::new();
        let task = repo
            .create_task(NewTask { title: "T".into(), description: String::new(), author_id: 1, question_id: None })
            .await
            .unwrap();
        for content in ["one", "two"] {
            repo.create_note(NewTaskNote { task_id: task.id, title: String::new(), content: content.into(), position: None, author_id: 1 })
                .await
                .unwrap();
        }
        let notes = repo.list_notes(task.id).await.unwrap();
        assert_eq!(notes.iter().map(|n| n.position).collect::<Vec<_>>(), vec![0, 1]);
    }

    #[tokio::test]
    async fn appending_after_the_largest_order_saturates() {
        let repo = InMemRepo::new();
        let task = repo
            .create_task(NewTask { title: "T".into(), description: String::new(), author_id: 1, question_id: None })
            .await
            .unwrap();
        repo.create_note(NewTaskNote { task_id: task.id, title: String::new(), content: "last".into(), position: Some(i32::MAX), author_id: 1 })
            .await
            .unwrap();
        let next = repo
            .create_note(NewTaskNote { task_id: task.id, title: String::new(), content: "next".into(), position: None, author_id: 1 })
            .await
            .unwrap();
        assert_eq!(next.position, i32::MAX);
        assert_eq!(repo.list_notes(task.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn snapshot_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let repo = InMemRepo::open_dir(dir.path());
        let q = repo.create_question(new_question("Persisted question", &["rust"])).await.unwrap();

        let reopened = InMemRepo::open_dir(dir.path());
        let loaded = reopened.get_question(q.id).await.unwrap();
        assert_eq!(loaded.title, "Persisted question");
        assert_eq!(reopened.list_tags().await.unwrap()[0].name, "rust");
    }
}
