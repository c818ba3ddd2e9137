use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};

use super::{done, sync_user, AppState};
use crate::attachments::{owner_author, purge_blobs, store_uploads, FileInfo};
use crate::auth::{can_delete_file, ensure_can_modify, Auth};
use crate::error::ApiError;
use crate::models::{ContentKind, Id};
use crate::multipart::read_form;
use crate::validation::{validate_uploads, FieldErrors};

fn parse_kind(raw: &str) -> Result<ContentKind, ApiError> {
    raw.parse::<ContentKind>().map_err(ApiError::BadRequest)
}

#[utoipa::path(
    get,
    path = "/api/v1/files/{kind}/{object_id}",
    params(
        ("kind" = String, Path, description = "question, task or tasknote"),
        ("object_id" = Id, Path, description = "Owning record id")
    ),
    responses(
        (status = 200, description = "Attachments, newest first", body = [FileInfo]),
        (status = 401, description = "Task attachments require authentication"),
        (status = 404, description = "Owner not found")
    )
)]
pub async fn list_files(
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<(String, Id)>,
) -> Result<HttpResponse, ApiError> {
    let (kind, object_id) = path.into_inner();
    let kind = parse_kind(&kind)?;
    // the task tracker is for signed-in users only
    if kind != ContentKind::Question && auth.is_none() {
        return Err(ApiError::Unauthorized);
    }
    owner_author(data.repo.as_ref(), kind, object_id).await?;
    let files = data.repo.list_attachments(kind, object_id).await?;
    Ok(HttpResponse::Ok().json(FileInfo::list(&files, data.file_store.as_ref())))
}

#[utoipa::path(
    post,
    path = "/api/v1/files/{kind}/{object_id}",
    params(
        ("kind" = String, Path, description = "question, task or tasknote"),
        ("object_id" = Id, Path, description = "Owning record id")
    ),
    request_body(content = Vec<u8>, content_type = "multipart/form-data", description = "One or more `attachments` file parts"),
    responses(
        (status = 201, description = "Stored attachments", body = [FileInfo]),
        (status = 403, description = "Only the owner's author or staff"),
        (status = 404, description = "Owner not found"),
        (status = 422, description = "Too many, too large or unsupported files")
    )
)]
pub async fn upload_files(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<(String, Id)>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let (kind, object_id) = path.into_inner();
    let kind = parse_kind(&kind)?;
    let owner = owner_author(data.repo.as_ref(), kind, object_id).await?;
    ensure_can_modify(&auth, owner, kind.as_str())?;

    let form = read_form(payload).await?;
    if form.files.is_empty() {
        return Err(FieldErrors::single("attachments", "No files were submitted.").into());
    }
    validate_uploads(&form.files)?;

    sync_user(data.repo.as_ref(), &auth).await?;
    let stored = store_uploads(
        data.repo.as_ref(),
        data.file_store.as_ref(),
        kind,
        object_id,
        Some(auth.user_id()),
        form.files,
    )
    .await?;
    Ok(HttpResponse::Created().json(FileInfo::list(&stored, data.file_store.as_ref())))
}

#[utoipa::path(
    delete,
    path = "/api/v1/files/{id}",
    params(("id" = Id, Path, description = "Attachment id")),
    responses(
        (status = 200, description = "Deleted; the stored blob is removed best-effort"),
        (status = 403, description = "Only the uploader, the owner's author or staff"),
        (status = 404, description = "Not found")
    )
)]
pub async fn delete_file(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let file = data.repo.get_attachment(path.into_inner()).await?;
    let owner = match owner_author(data.repo.as_ref(), file.content_kind, file.object_id).await {
        Ok(owner) => owner,
        // orphaned row; only staff or the uploader may clear it
        Err(ApiError::NotFound) => None,
        Err(e) => return Err(e),
    };
    if !can_delete_file(&auth, &file, owner) {
        return Err(ApiError::forbidden("You do not have permission to delete this file"));
    }

    let removed = data.repo.delete_attachment(file.id).await?;
    purge_blobs(data.file_store.as_ref(), std::slice::from_ref(&removed)).await;
    tracing::info!(id = removed.id, key = %removed.file_key, "attachment deleted");
    Ok(done("File deleted"))
}
