//! Query execution endpoints.

use std::collections::HashMap;

use axum::{
    extract::{FromRequest, Query, Request, State},
    http::header,
    Form, Json,
};

use super::{success, ApiResult};
use crate::errors::AppError;
use crate::models::{Page, SearchResult};
use crate::search::{execute_search, RawSearchParams, SearchRequest};
use crate::AppState;

/// POST /explore/oaipmh/rest/execute-query - Run a query sent as a JSON or
/// form-encoded body.
pub async fn execute_query_post(
    State(state): State<AppState>,
    request: Request,
) -> ApiResult<Page<SearchResult>> {
    let raw = if is_form(&request) {
        let Form(params) = Form::<HashMap<String, String>>::from_request(request, &state)
            .await
            .map_err(|e| AppError::InvalidRequest(format!("Malformed form body: {}", e)))?;
        RawSearchParams::from_query_string(params)
    } else {
        let Json(raw) = Json::<RawSearchParams>::from_request(request, &state)
            .await
            .map_err(|e| AppError::InvalidRequest(format!("Malformed request body: {}", e)))?;
        raw
    };
    run(&state, raw).await
}

/// GET /explore/oaipmh/rest/execute-query - Run a query sent as query-string parameters.
pub async fn execute_query_get(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Page<SearchResult>> {
    run(&state, RawSearchParams::from_query_string(params)).await
}

fn is_form(request: &Request) -> bool {
    request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/x-www-form-urlencoded"))
}

async fn run(state: &AppState, raw: RawSearchParams) -> ApiResult<Page<SearchResult>> {
    let request = SearchRequest::from_raw(raw, &state.config)?;
    let page = execute_search(&state.repo, &state.config, &request).await?;
    success(page)
}
