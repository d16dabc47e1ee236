//! Data-source selection endpoints used by the saved-query editor.

use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use super::{render, required_id};
use crate::auth::Caller;
use crate::errors::AppError;
use crate::sources;
use crate::AppState;

/// GET /explore/oaipmh/get_data_sources?id_query= - Registry checkboxes for a query.
pub async fn get_data_sources(
    State(state): State<AppState>,
    caller: Caller,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, AppError> {
    let items = async {
        let query_id = required_id(&params, "id_query")?;
        let query = sources::load_query(&state.repo, query_id, &caller).await?;
        let registries = state.repo.list_registries(true).await?;
        Ok::<_, AppError>(sources::list_instances(&query, &registries))
    }
    .await
    .map_err(|e| e.into_bad_request("Error during loading data sources from oaipmh search"))?;

    Ok(render::ok_html(render::instance_list(&items)))
}

/// GET /explore/oaipmh/update_data_sources?id_query=&id_instance=&to_be_added=
///
/// Attach or detach one registry. Answers with an empty 200 either way.
pub async fn update_data_sources(
    State(state): State<AppState>,
    caller: Caller,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, AppError> {
    async {
        let query_id = required_id(&params, "id_query")?;
        let registry_id = required_id(&params, "id_instance")?;
        let to_be_added = match params.get("to_be_added").map(|v| v.trim()) {
            None => false,
            Some(raw) => serde_json::from_str::<bool>(raw).map_err(|_| {
                AppError::InvalidRequest(format!("Invalid to_be_added: {}", raw))
            })?,
        };

        if to_be_added {
            sources::add_registry(&state.repo, &state.config, &caller, query_id, registry_id)
                .await?;
        } else {
            sources::remove_registry(&state.repo, &caller, query_id, registry_id).await?;
        }
        Ok::<_, AppError>(())
    }
    .await
    .map_err(|e| e.into_bad_request("Error during data source selection"))?;

    Ok(StatusCode::OK.into_response())
}
