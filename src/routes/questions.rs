use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{check_category, done, sync_user, AppState};
use crate::attachments::{purge_blobs, store_uploads, FileInfo};
use crate::auth::{can_modify, ensure_can_modify, Auth};
use crate::error::ApiError;
use crate::models::{Category, ContentKind, Id, NewQuestion, Question, UpdateQuestion};
use crate::multipart::{read_submission, Submission};
use crate::pagination::{Page, PageRequest, QUESTIONS_PER_PAGE};
use crate::repo::{QuestionFilter, QuestionSort, RepoError};
use crate::validation::{validate_uploads, QuestionForm, QuestionPatch};

const SIMILAR_QUESTIONS: i64 = 5;

/// A question plus its derived answered flag.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QuestionView {
    #[serde(flatten)]
    pub question: Question,
    pub has_answer: bool,
}

impl From<Question> for QuestionView {
    fn from(question: Question) -> Self {
        let has_answer = question.has_answer();
        Self { question, has_answer }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub category: Option<String>,
    pub answered: Option<String>,
    pub sort: Option<String>,
    pub page: Option<String>,
}

impl ListParams {
    fn answered(&self) -> Option<bool> {
        match self.answered.as_deref() {
            Some("yes") => Some(true),
            Some("no") => Some(false),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct QuestionList {
    pub category: Option<Category>,
    pub answered: Option<String>,
    pub sort: &'static str,
    #[serde(flatten)]
    pub page: Page<QuestionView>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct QuestionDetail {
    pub question: QuestionView,
    pub category: Option<Category>,
    pub files: Vec<FileInfo>,
    pub similar_questions: Vec<QuestionView>,
    pub can_edit: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct QuestionCreated {
    pub question: QuestionView,
    pub files: Vec<FileInfo>,
}

async fn list_in(data: &AppState, category: Option<Category>, params: ListParams) -> Result<HttpResponse, ApiError> {
    let filter = QuestionFilter {
        category_id: category.as_ref().map(|c| c.id),
        answered: params.answered(),
        sort: QuestionSort::parse(params.sort.as_deref()),
    };
    let page = data
        .repo
        .list_questions(&filter, PageRequest::parse(params.page.as_deref(), QUESTIONS_PER_PAGE))
        .await?;
    Ok(HttpResponse::Ok().json(QuestionList {
        category,
        answered: params.answered().map(|a| if a { "yes" } else { "no" }.to_string()),
        sort: filter.sort.as_str(),
        page: page.map(QuestionView::from),
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/questions",
    params(
        ("category" = Option<String>, Query, description = "Category slug; unknown slugs are ignored"),
        ("answered" = Option<String>, Query, description = "`yes` or `no`"),
        ("sort" = Option<String>, Query, description = "created_at, -created_at, title, -title, views, -views"),
        ("page" = Option<String>, Query, description = "1-based page, 12 per page")
    ),
    responses((status = 200, description = "Paginated published questions"))
)]
pub async fn list_questions(data: web::Data<AppState>, query: web::Query<ListParams>) -> Result<HttpResponse, ApiError> {
    let params = query.into_inner();
    let category = match params.category.as_deref().filter(|s| !s.is_empty()) {
        Some(slug) => match data.repo.get_category_by_slug(slug).await {
            Ok(c) => Some(c),
            Err(RepoError::NotFound) => None,
            Err(e) => return Err(e.into()),
        },
        None => None,
    };
    list_in(&data, category, params).await
}

#[utoipa::path(
    get,
    path = "/api/v1/categories/{slug}/questions",
    params(("slug" = String, Path, description = "Category slug")),
    responses(
        (status = 200, description = "Paginated published questions in the category"),
        (status = 404, description = "Unknown category")
    )
)]
pub async fn category_questions(
    data: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<ListParams>,
) -> Result<HttpResponse, ApiError> {
    let category = data.repo.get_category_by_slug(&path).await?;
    list_in(&data, Some(category), query.into_inner()).await
}

#[utoipa::path(
    post,
    path = "/api/v1/questions",
    request_body = QuestionForm,
    responses(
        (status = 201, description = "Question created", body = QuestionCreated),
        (status = 401, description = "Authentication required"),
        (status = 422, description = "Invalid input")
    )
)]
pub async fn create_question(
    auth: Auth,
    data: web::Data<AppState>,
    req: HttpRequest,
    payload: web::Payload,
) -> Result<HttpResponse, ApiError> {
    let (form, uploads) = match read_submission(&req, payload).await? {
        Submission::Json(body) => (Submission::parse_json::<QuestionForm>(&body)?, Vec::new()),
        Submission::Form(form) => (QuestionForm::from_fields(&form.fields)?, form.files),
    };
    let form = form.clean()?;
    validate_uploads(&uploads)?;
    check_category(data.repo.as_ref(), form.category_id, "category_id").await?;

    sync_user(data.repo.as_ref(), &auth).await?;
    let question = data
        .repo
        .create_question(NewQuestion {
            title: form.title,
            content: form.content,
            category_id: form.category_id,
            tags: form.tags,
            author_id: Some(auth.user_id()),
        })
        .await?;
    let stored = store_uploads(
        data.repo.as_ref(),
        data.file_store.as_ref(),
        ContentKind::Question,
        question.id,
        Some(auth.user_id()),
        uploads,
    )
    .await?;
    tracing::info!(id = question.id, files = stored.len(), "question created");

    Ok(HttpResponse::Created().json(QuestionCreated {
        question: question.into(),
        files: FileInfo::list(&stored, data.file_store.as_ref()),
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/questions/{id}",
    params(("id" = Id, Path, description = "Question id")),
    responses(
        (status = 200, description = "Question with files and similar questions", body = QuestionDetail),
        (status = 404, description = "Not found or unpublished")
    )
)]
pub async fn get_question(
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let existing = data.repo.get_question(id).await?;
    let can_edit = auth.as_ref().map_or(false, |a| can_modify(a, existing.author_id));
    // unpublished questions are only visible to those who may edit them
    if !existing.is_published && !can_edit {
        return Err(ApiError::NotFound);
    }

    let question = data.repo.increment_views(id).await?;
    let category = match question.category_id {
        Some(cid) => match data.repo.get_category(cid).await {
            Ok(c) => Some(c),
            Err(RepoError::NotFound) => None,
            Err(e) => return Err(e.into()),
        },
        None => None,
    };
    let files = data.repo.list_attachments(ContentKind::Question, id).await?;
    let similar = data.repo.similar_questions(&question, SIMILAR_QUESTIONS).await?;

    Ok(HttpResponse::Ok().json(QuestionDetail {
        question: question.into(),
        category,
        files: FileInfo::list(&files, data.file_store.as_ref()),
        similar_questions: similar.into_iter().map(QuestionView::from).collect(),
        can_edit,
    }))
}

#[utoipa::path(
    patch,
    path = "/api/v1/questions/{id}",
    params(("id" = Id, Path, description = "Question id")),
    request_body = QuestionPatch,
    responses(
        (status = 200, description = "Updated question", body = QuestionView),
        (status = 403, description = "Only the author or staff"),
        (status = 404, description = "Not found"),
        (status = 422, description = "Invalid input")
    )
)]
pub async fn update_question(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let existing = data.repo.get_question(id).await?;
    ensure_can_modify(&auth, existing.author_id, "question")?;

    let patch = Submission::parse_json::<QuestionPatch>(&body)?.clean()?;
    if let Some(category_id) = patch.category_id {
        check_category(data.repo.as_ref(), category_id, "category_id").await?;
    }
    let question = data
        .repo
        .update_question(
            id,
            UpdateQuestion {
                title: patch.title,
                content: patch.content,
                category_id: patch.category_id,
                tags: patch.tags,
                is_published: patch.is_published,
            },
        )
        .await?;
    Ok(HttpResponse::Ok().json(QuestionView::from(question)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/questions/{id}",
    params(("id" = Id, Path, description = "Question id")),
    responses(
        (status = 200, description = "Deleted together with its attachments"),
        (status = 403, description = "Only the author or staff"),
        (status = 404, description = "Not found")
    )
)]
pub async fn delete_question(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let existing = data.repo.get_question(id).await?;
    ensure_can_modify(&auth, existing.author_id, "question")?;

    let removed = data.repo.delete_question(id).await?;
    purge_blobs(data.file_store.as_ref(), &removed).await;
    tracing::info!(id, files = removed.len(), "question deleted");
    Ok(done("Question deleted"))
}
