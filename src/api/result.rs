//! Single result endpoint.

use std::collections::HashMap;

use axum::extract::{Query, State};

use super::{required_id, success, ApiResult};
use crate::auth::Caller;
use crate::errors::AppError;
use crate::models::SearchResult;
use crate::search::{format_record, template_infos, ContentChannel, ResultUrls};
use crate::AppState;

/// GET /explore/oaipmh/rest/result?id= - One record in the shared result shape.
pub async fn get_result(
    State(state): State<AppState>,
    caller: Caller,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<SearchResult> {
    let id = required_id(&params, "id")?;
    let channel = match params.get("format").map(String::as_str) {
        None | Some("xml") => ContentChannel::Xml,
        Some("json") => ContentChannel::Json,
        Some(other) => {
            return Err(AppError::InvalidRequest(format!(
                "Unknown result format '{}'",
                other
            )))
        }
    };

    caller.check_record_access(&state.config)?;

    let record = state
        .repo
        .get_record(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Record {} not found", id)))?;

    let infos = template_infos(&state.repo, std::slice::from_ref(&record)).await?;
    let urls = ResultUrls::from_config(&state.config);
    success(format_record(&record, &infos, &urls, channel))
}
