//! Staff-only answer management. Accepts JSON or multipart, so an answer can
//! be saved together with attachments in one request.

use actix_web::{web, HttpRequest, HttpResponse};
use serde::Serialize;
use utoipa::ToSchema;

use super::{sync_user, AppState};
use crate::attachments::{store_uploads, FileInfo};
use crate::auth::{Auth, Role};
use crate::error::ApiError;
use crate::models::{ContentKind, Id, Question};
use crate::multipart::{read_submission, Submission};
use crate::validation::{clean_answer, validate_uploads, AnswerForm};

const STAFF_ONLY: &str = "Only staff can manage answers";

#[derive(Debug, Serialize, ToSchema)]
pub struct AnswerResponse {
    pub success: bool,
    pub message: String,
    pub answer: String,
    pub has_answer: bool,
    /// `dd.mm.YYYY HH:MM`
    pub updated_at: String,
    pub files: Vec<FileInfo>,
}

impl AnswerResponse {
    fn new(message: &str, question: &Question, files: Vec<FileInfo>) -> Self {
        Self {
            success: true,
            message: message.to_string(),
            answer: question.answer.clone(),
            has_answer: question.has_answer(),
            updated_at: question.updated_at.format("%d.%m.%Y %H:%M").to_string(),
            files,
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/questions/{id}/answer",
    params(("id" = Id, Path, description = "Question id")),
    request_body = AnswerForm,
    responses(
        (status = 200, description = "Answer saved or deleted", body = AnswerResponse),
        (status = 403, description = "Staff only"),
        (status = 404, description = "Not found"),
        (status = 422, description = "Answer too short or invalid attachments")
    )
)]
pub async fn submit_answer(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    req: HttpRequest,
    payload: web::Payload,
) -> Result<HttpResponse, ApiError> {
    crate::require_role!(auth, Role::Staff, STAFF_ONLY);
    let id = path.into_inner();
    data.repo.get_question(id).await?;

    let (form, uploads) = match read_submission(&req, payload).await? {
        Submission::Json(body) => (Submission::parse_json::<AnswerForm>(&body)?, Vec::new()),
        Submission::Form(form) => (AnswerForm::from_fields(&form.fields), form.files),
    };
    if form.is_delete() {
        let question = data.repo.set_answer(id, "").await?;
        tracing::info!(id, "answer deleted");
        return Ok(HttpResponse::Ok().json(AnswerResponse::new("Answer deleted", &question, Vec::new())));
    }

    let answer = clean_answer(&form.answer)?;
    validate_uploads(&uploads)?;
    sync_user(data.repo.as_ref(), &auth).await?;
    let question = data.repo.set_answer(id, &answer).await?;
    let stored = store_uploads(
        data.repo.as_ref(),
        data.file_store.as_ref(),
        ContentKind::Question,
        id,
        Some(auth.user_id()),
        uploads,
    )
    .await?;
    tracing::info!(id, files = stored.len(), "answer saved");

    let files = FileInfo::list(&stored, data.file_store.as_ref());
    Ok(HttpResponse::Ok().json(AnswerResponse::new("Answer saved", &question, files)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/questions/{id}/answer",
    params(("id" = Id, Path, description = "Question id")),
    responses(
        (status = 200, description = "Answer cleared", body = AnswerResponse),
        (status = 403, description = "Staff only"),
        (status = 404, description = "Not found")
    )
)]
pub async fn delete_answer(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    crate::require_role!(auth, Role::Staff, STAFF_ONLY);
    let question = data.repo.set_answer(path.into_inner(), "").await?;
    Ok(HttpResponse::Ok().json(AnswerResponse::new("Answer deleted", &question, Vec::new())))
}
