use std::sync::Arc;
use std::time::Duration;

use actix_web::{web, HttpResponse};
use serde::Serialize;

use crate::auth::Auth;
use crate::error::ApiError;
use crate::models::Id;
use crate::repo::{Repo, RepoError};
use crate::sidebar::SidebarCache;
use crate::storage::FileStore;
use crate::validation::FieldErrors;

pub mod answers;
pub mod catalog;
pub mod files;
pub mod questions;
pub mod search;
pub mod tasks;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(web::resource("/home").route(web::get().to(catalog::home)))
            .service(web::resource("/sidebar").route(web::get().to(catalog::sidebar)))
            .service(
                web::resource("/categories")
                    .route(web::get().to(catalog::list_categories))
                    .route(web::post().to(catalog::create_category)),
            )
            .service(web::resource("/categories/{id}").route(web::delete().to(catalog::delete_category)))
            .service(
                web::resource("/categories/{slug}/questions").route(web::get().to(questions::category_questions)),
            )
            .service(web::resource("/tags").route(web::get().to(catalog::list_tags)))
            .service(
                web::resource("/questions")
                    .route(web::get().to(questions::list_questions))
                    .route(web::post().to(questions::create_question)),
            )
            .service(
                web::resource("/questions/{id}")
                    .route(web::get().to(questions::get_question))
                    .route(web::patch().to(questions::update_question))
                    .route(web::delete().to(questions::delete_question)),
            )
            .service(
                web::resource("/questions/{id}/answer")
                    .route(web::post().to(answers::submit_answer))
                    .route(web::delete().to(answers::delete_answer)),
            )
            .service(web::resource("/search").route(web::get().to(search::search)))
            .service(
                web::resource("/tasks")
                    .route(web::get().to(tasks::list_tasks))
                    .route(web::post().to(tasks::create_task)),
            )
            .service(
                web::resource("/tasks/{id}")
                    .route(web::get().to(tasks::get_task))
                    .route(web::patch().to(tasks::update_task))
                    .route(web::delete().to(tasks::delete_task)),
            )
            .service(web::resource("/tasks/{id}/notes").route(web::post().to(tasks::create_note)))
            .service(
                web::resource("/notes/{id}")
                    .route(web::patch().to(tasks::update_note))
                    .route(web::delete().to(tasks::delete_note)),
            )
            .service(
                web::resource("/files/{kind}/{object_id}")
                    .route(web::get().to(files::list_files))
                    .route(web::post().to(files::upload_files)),
            )
            .service(web::resource("/files/{id}").route(web::delete().to(files::delete_file))),
    );
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub file_store: Arc<dyn FileStore>,
    pub sidebar: SidebarCache,
}

impl AppState {
    pub fn new(repo: Arc<dyn Repo>, file_store: Arc<dyn FileStore>, sidebar_ttl: Duration) -> Self {
        Self { repo, file_store, sidebar: SidebarCache::new(sidebar_ttl) }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct Done {
    pub success: bool,
    pub message: String,
}

pub(crate) fn done(message: &str) -> HttpResponse {
    HttpResponse::Ok().json(Done { success: true, message: message.to_string() })
}

/// Mirror the caller's identity into the users table so rows they create can
/// reference it.
pub(crate) async fn sync_user(repo: &dyn Repo, auth: &Auth) -> Result<(), ApiError> {
    repo.upsert_user(auth.user_id(), auth.username(), auth.is_staff()).await?;
    Ok(())
}

/// A referenced category must exist; reported against `field`.
pub(crate) async fn check_category(repo: &dyn Repo, id: Option<Id>, field: &str) -> Result<(), ApiError> {
    let Some(id) = id else { return Ok(()) };
    match repo.get_category(id).await {
        Ok(_) => Ok(()),
        Err(RepoError::NotFound) => Err(FieldErrors::single(field, "Select a valid choice. That category does not exist.").into()),
        Err(e) => Err(e.into()),
    }
}

pub(crate) async fn check_question(repo: &dyn Repo, id: Option<Id>, field: &str) -> Result<(), ApiError> {
    let Some(id) = id else { return Ok(()) };
    match repo.get_question(id).await {
        Ok(_) => Ok(()),
        Err(RepoError::NotFound) => Err(FieldErrors::single(field, "Select a valid choice. That question does not exist.").into()),
        Err(e) => Err(e.into()),
    }
}
