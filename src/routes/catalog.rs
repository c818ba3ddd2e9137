use actix_web::{web, HttpResponse};
use serde::Serialize;
use utoipa::ToSchema;

use super::{done, AppState};
use crate::auth::{Auth, Role};
use crate::error::ApiError;
use crate::models::{Category, CategoryCount, Id, NewCategory, Tag, TagCount};
use crate::multipart::Submission;
use crate::pagination::PageRequest;
use crate::repo::QuestionFilter;
use crate::routes::questions::QuestionView;
use crate::sidebar::SidebarStats;
use crate::validation::CategoryForm;

const HOME_RECENT: u32 = 6;
const HOME_POPULAR: i64 = 6;

#[derive(Debug, Serialize, ToSchema)]
pub struct HomePage {
    pub recent_questions: Vec<QuestionView>,
    pub popular_questions: Vec<QuestionView>,
    pub categories: Vec<CategoryCount>,
    pub total_questions: i64,
    pub answered_questions: i64,
    pub popular_tags: Vec<TagCount>,
}

#[utoipa::path(
    get,
    path = "/api/v1/home",
    responses((status = 200, description = "Landing page data", body = HomePage))
)]
pub async fn home(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let repo = data.repo.as_ref();
    let recent = repo.list_questions(&QuestionFilter::default(), PageRequest::new(1, HOME_RECENT)).await?;
    let popular = repo.most_viewed_answered(HOME_POPULAR).await?;
    let (total_questions, answered_questions) = repo.question_totals().await?;
    let stats = data.sidebar.get_or_compute(repo).await?;

    Ok(HttpResponse::Ok().json(HomePage {
        recent_questions: recent.items.into_iter().map(QuestionView::from).collect(),
        popular_questions: popular.into_iter().map(QuestionView::from).collect(),
        categories: repo.category_counts().await?,
        total_questions,
        answered_questions,
        popular_tags: stats.popular_tags.clone(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/sidebar",
    responses((status = 200, description = "Cached site statistics", body = SidebarStats))
)]
pub async fn sidebar(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let stats = data.sidebar.get_or_compute(data.repo.as_ref()).await?;
    let stats: &SidebarStats = &stats;
    Ok(HttpResponse::Ok().json(stats))
}

#[utoipa::path(
    get,
    path = "/api/v1/categories",
    responses((status = 200, description = "Categories with published question counts", body = [CategoryCount]))
)]
pub async fn list_categories(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(data.repo.category_counts().await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/categories",
    request_body = CategoryForm,
    responses(
        (status = 201, description = "Category created", body = Category),
        (status = 403, description = "Staff only"),
        (status = 409, description = "Slug already taken"),
        (status = 422, description = "Invalid input")
    )
)]
pub async fn create_category(auth: Auth, data: web::Data<AppState>, body: web::Bytes) -> Result<HttpResponse, ApiError> {
    crate::require_role!(auth, Role::Staff, "Only staff can manage categories");
    let form = Submission::parse_json::<CategoryForm>(&body)?.clean()?;
    let new = NewCategory { name: form.name, slug: form.slug.unwrap_or_default(), description: form.description };
    let category: Category = data.repo.create_category(new).await?;
    tracing::info!(id = category.id, slug = %category.slug, "category created");
    Ok(HttpResponse::Created().json(category))
}

#[utoipa::path(
    delete,
    path = "/api/v1/categories/{id}",
    params(("id" = Id, Path, description = "Category id")),
    responses(
        (status = 200, description = "Deleted; its questions become uncategorized"),
        (status = 403, description = "Staff only"),
        (status = 404, description = "Not found")
    )
)]
pub async fn delete_category(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    crate::require_role!(auth, Role::Staff, "Only staff can manage categories");
    data.repo.delete_category(path.into_inner()).await?;
    Ok(done("Category deleted"))
}

#[utoipa::path(
    get,
    path = "/api/v1/tags",
    responses((status = 200, description = "All tags by name", body = [Tag]))
)]
pub async fn list_tags(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let tags: Vec<Tag> = data.repo.list_tags().await?;
    Ok(HttpResponse::Ok().json(tags))
}
