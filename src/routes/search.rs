use actix_web::{http::header, web, HttpRequest, HttpResponse};
use serde::Serialize;

use super::{sync_user, AppState};
use crate::auth::Auth;
use crate::error::ApiError;
use crate::html::highlight;
use crate::models::NewSearchQuery;
use crate::pagination::{Page, PageRequest, SEARCH_RESULTS_PER_PAGE};
use crate::routes::questions::QuestionView;
use crate::search::SearchIn;
use crate::validation::SearchParams;

#[derive(Debug, Serialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub question: QuestionView,
    /// HTML-escaped title with matches wrapped in `<mark>`.
    pub highlighted_title: String,
}

#[derive(Debug, Serialize)]
pub struct SearchResults {
    pub query: String,
    pub search_in: SearchIn,
    #[serde(flatten)]
    pub page: Page<SearchHit>,
}

/// Append to the search log; failures never reach the caller.
async fn record_search(data: &AppState, req: &HttpRequest, auth: Option<&Auth>, term: &str) {
    if let Some(auth) = auth {
        if let Err(e) = sync_user(data.repo.as_ref(), auth).await {
            tracing::warn!("could not sync searching user: {e}");
        }
    }
    let entry = NewSearchQuery {
        term: term.to_string(),
        user_id: auth.map(Auth::user_id),
        ip_address: req.connection_info().realip_remote_addr().map(str::to_string),
        user_agent: req
            .headers()
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    };
    if let Err(e) = data.repo.log_search(entry).await {
        tracing::warn!("failed to log search '{term}': {e}");
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/search",
    params(
        ("query" = Option<String>, Query, description = "Free text, at most 100 characters"),
        ("search_in" = Option<String>, Query, description = "all, title, content, answer, tags or files"),
        ("page" = Option<String>, Query, description = "1-based page, 10 per page")
    ),
    responses(
        (status = 200, description = "Matching published questions, newest first"),
        (status = 422, description = "Query too long or unknown field")
    )
)]
pub async fn search(
    auth: Option<Auth>,
    data: web::Data<AppState>,
    req: HttpRequest,
    params: web::Query<SearchParams>,
) -> Result<HttpResponse, ApiError> {
    let params = params.into_inner().clean()?;
    let fields = SearchIn::parse(params.search_in.as_deref())?;
    let query = params.query.unwrap_or_default();
    let page = PageRequest::parse(params.page.as_deref(), SEARCH_RESULTS_PER_PAGE);

    if !query.is_empty() {
        record_search(&data, &req, auth.as_ref(), &query).await;
    }

    let results = data.repo.search_questions(&query, fields, page).await?;
    let hits = results.map(|q| SearchHit {
        highlighted_title: highlight(&q.title, &query),
        question: QuestionView::from(q),
    });
    Ok(HttpResponse::Ok().json(SearchResults { query, search_in: fields, page: hits }))
}
