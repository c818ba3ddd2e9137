use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{check_question, done, sync_user, AppState};
use crate::attachments::{purge_blobs, store_uploads, FileInfo};
use crate::auth::{can_modify, ensure_can_modify, Auth};
use crate::error::ApiError;
use crate::models::{ContentKind, Id, NewTask, NewTaskNote, Question, Task, TaskNote, UpdateTask, UpdateTaskNote};
use crate::multipart::{read_submission, Submission};
use crate::pagination::{PageRequest, TASKS_PER_PAGE};
use crate::repo::RepoError;
use crate::validation::{validate_uploads, NoteForm, NotePatch, TaskForm, TaskPatch};

#[derive(Debug, Default, Deserialize)]
pub struct TaskListParams {
    pub page: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct NoteView {
    #[serde(flatten)]
    pub note: TaskNote,
    pub files: Vec<FileInfo>,
    pub can_edit: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TaskDetail {
    pub task: Task,
    pub question: Option<Question>,
    pub files: Vec<FileInfo>,
    pub notes: Vec<NoteView>,
    pub can_edit: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TaskCreated {
    pub task: Task,
    pub files: Vec<FileInfo>,
}

#[utoipa::path(
    get,
    path = "/api/v1/tasks",
    params(("page" = Option<String>, Query, description = "1-based page, 20 per page")),
    responses(
        (status = 200, description = "Paginated tasks, newest first"),
        (status = 401, description = "Authentication required")
    )
)]
pub async fn list_tasks(
    _auth: Auth,
    data: web::Data<AppState>,
    query: web::Query<TaskListParams>,
) -> Result<HttpResponse, ApiError> {
    let page = PageRequest::parse(query.page.as_deref(), TASKS_PER_PAGE);
    Ok(HttpResponse::Ok().json(data.repo.list_tasks(page).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/tasks",
    request_body = TaskForm,
    responses(
        (status = 201, description = "Task created", body = TaskCreated),
        (status = 401, description = "Authentication required"),
        (status = 422, description = "Invalid input")
    )
)]
pub async fn create_task(
    auth: Auth,
    data: web::Data<AppState>,
    req: HttpRequest,
    payload: web::Payload,
) -> Result<HttpResponse, ApiError> {
    let (form, uploads) = match read_submission(&req, payload).await? {
        Submission::Json(body) => (Submission::parse_json::<TaskForm>(&body)?, Vec::new()),
        Submission::Form(form) => (TaskForm::from_fields(&form.fields)?, form.files),
    };
    let form = form.clean()?;
    validate_uploads(&uploads)?;
    check_question(data.repo.as_ref(), form.question_id, "question_id").await?;

    sync_user(data.repo.as_ref(), &auth).await?;
    let task = data
        .repo
        .create_task(NewTask {
            title: form.title,
            description: form.description,
            author_id: auth.user_id(),
            question_id: form.question_id,
        })
        .await?;
    let stored = store_uploads(
        data.repo.as_ref(),
        data.file_store.as_ref(),
        ContentKind::Task,
        task.id,
        Some(auth.user_id()),
        uploads,
    )
    .await?;
    tracing::info!(id = task.id, files = stored.len(), "task created");

    Ok(HttpResponse::Created().json(TaskCreated { task, files: FileInfo::list(&stored, data.file_store.as_ref()) }))
}

#[utoipa::path(
    get,
    path = "/api/v1/tasks/{id}",
    params(("id" = Id, Path, description = "Task id")),
    responses(
        (status = 200, description = "Task with notes and files", body = TaskDetail),
        (status = 401, description = "Authentication required"),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_task(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let store = data.file_store.as_ref();
    let task = data.repo.get_task(id).await?;
    let question = match task.question_id {
        Some(qid) => match data.repo.get_question(qid).await {
            Ok(q) => Some(q),
            Err(RepoError::NotFound) => None,
            Err(e) => return Err(e.into()),
        },
        None => None,
    };
    let files = data.repo.list_attachments(ContentKind::Task, id).await?;

    let mut notes = Vec::new();
    for note in data.repo.list_notes(id).await? {
        let note_files = data.repo.list_attachments(ContentKind::TaskNote, note.id).await?;
        notes.push(NoteView {
            can_edit: can_modify(&auth, Some(note.author_id)),
            files: FileInfo::list(&note_files, store),
            note,
        });
    }

    Ok(HttpResponse::Ok().json(TaskDetail {
        can_edit: can_modify(&auth, Some(task.author_id)),
        task,
        question,
        files: FileInfo::list(&files, store),
        notes,
    }))
}

#[utoipa::path(
    patch,
    path = "/api/v1/tasks/{id}",
    params(("id" = Id, Path, description = "Task id")),
    request_body = TaskPatch,
    responses(
        (status = 200, description = "Updated task", body = Task),
        (status = 403, description = "Only the author or staff"),
        (status = 404, description = "Not found"),
        (status = 422, description = "Invalid input")
    )
)]
pub async fn update_task(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let existing = data.repo.get_task(id).await?;
    ensure_can_modify(&auth, Some(existing.author_id), "task")?;

    let patch = Submission::parse_json::<TaskPatch>(&body)?.clean()?;
    if let Some(question_id) = patch.question_id {
        check_question(data.repo.as_ref(), question_id, "question_id").await?;
    }
    let task = data
        .repo
        .update_task(id, UpdateTask { title: patch.title, description: patch.description, question_id: patch.question_id })
        .await?;
    Ok(HttpResponse::Ok().json(task))
}

#[utoipa::path(
    delete,
    path = "/api/v1/tasks/{id}",
    params(("id" = Id, Path, description = "Task id")),
    responses(
        (status = 200, description = "Deleted with its notes and attachments"),
        (status = 403, description = "Only the author or staff"),
        (status = 404, description = "Not found")
    )
)]
pub async fn delete_task(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let existing = data.repo.get_task(id).await?;
    ensure_can_modify(&auth, Some(existing.author_id), "task")?;

    let removed = data.repo.delete_task(id).await?;
    purge_blobs(data.file_store.as_ref(), &removed).await;
    tracing::info!(id, files = removed.len(), "task deleted");
    Ok(done("Task deleted"))
}

#[utoipa::path(
    post,
    path = "/api/v1/tasks/{id}/notes",
    params(("id" = Id, Path, description = "Task id")),
    request_body = NoteForm,
    responses(
        (status = 201, description = "Note added", body = NoteView),
        (status = 403, description = "Only the task author or staff"),
        (status = 404, description = "Task not found"),
        (status = 422, description = "Invalid input")
    )
)]
pub async fn create_note(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    req: HttpRequest,
    payload: web::Payload,
) -> Result<HttpResponse, ApiError> {
    let task_id = path.into_inner();
    let task = data.repo.get_task(task_id).await?;
    ensure_can_modify(&auth, Some(task.author_id), "task")?;

    let (form, uploads) = match read_submission(&req, payload).await? {
        Submission::Json(body) => (Submission::parse_json::<NoteForm>(&body)?, Vec::new()),
        Submission::Form(form) => (NoteForm::from_fields(&form.fields)?, form.files),
    };
    let form = form.clean()?;
    validate_uploads(&uploads)?;

    sync_user(data.repo.as_ref(), &auth).await?;
    let note = data
        .repo
        .create_note(NewTaskNote {
            task_id,
            title: form.title,
            content: form.content,
            position: form.position,
            author_id: auth.user_id(),
        })
        .await?;
    let stored = store_uploads(
        data.repo.as_ref(),
        data.file_store.as_ref(),
        ContentKind::TaskNote,
        note.id,
        Some(auth.user_id()),
        uploads,
    )
    .await?;

    Ok(HttpResponse::Created().json(NoteView {
        note,
        files: FileInfo::list(&stored, data.file_store.as_ref()),
        can_edit: true,
    }))
}

#[utoipa::path(
    patch,
    path = "/api/v1/notes/{id}",
    params(("id" = Id, Path, description = "Note id")),
    request_body = NotePatch,
    responses(
        (status = 200, description = "Updated note", body = TaskNote),
        (status = 403, description = "Only the note author or staff"),
        (status = 404, description = "Not found"),
        (status = 422, description = "Invalid input")
    )
)]
pub async fn update_note(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let existing = data.repo.get_note(id).await?;
    ensure_can_modify(&auth, Some(existing.author_id), "note")?;

    let patch = Submission::parse_json::<NotePatch>(&body)?.clean()?;
    let note = data
        .repo
        .update_note(id, UpdateTaskNote { title: patch.title, content: patch.content, position: patch.position })
        .await?;
    Ok(HttpResponse::Ok().json(note))
}

#[utoipa::path(
    delete,
    path = "/api/v1/notes/{id}",
    params(("id" = Id, Path, description = "Note id")),
    responses(
        (status = 200, description = "Deleted with its attachments"),
        (status = 403, description = "Only the note author or staff"),
        (status = 404, description = "Not found")
    )
)]
pub async fn delete_note(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let existing = data.repo.get_note(id).await?;
    ensure_can_modify(&auth, Some(existing.author_id), "note")?;

    let removed = data.repo.delete_note(id).await?;
    purge_blobs(data.file_store.as_ref(), &removed).await;
    Ok(done("Note deleted"))
}
