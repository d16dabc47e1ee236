//! Record detail page.

use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    response::Response,
};

use super::{render, required_id};
use crate::auth::Caller;
use crate::errors::AppError;
use crate::AppState;

/// GET /explore/oaipmh/data?id= - HTML detail page of one record.
pub async fn data_detail(
    State(state): State<AppState>,
    caller: Caller,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let page = async {
        let id = required_id(&params, "id")?;
        caller.check_record_access(&state.config)?;

        let record = state
            .repo
            .get_record(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Record {} not found", id)))?;
        let format = state
            .repo
            .get_metadata_format(record.metadata_format_id)
            .await?;

        Ok::<_, AppError>(render::record_detail(&record, format.as_ref()))
    }
    .await;

    match page {
        Ok(html) => render::ok_html(html),
        Err(e) => render::error_page(&e),
    }
}
