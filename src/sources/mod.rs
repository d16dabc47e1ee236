//! Data-source reconciliation for saved queries.
//!
//! A saved query lists the sources it federates over. Each OAI-PMH registry
//! appears at most once, identified by `query_options.instance_id`.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::auth::Caller;
use crate::config::Config;
use crate::db::Repository;
use crate::errors::AppError;
use crate::models::{Authentication, DataSource, Registry, SavedQuery, INSTANCE_ID_OPTION};
use crate::search::OrderField;

/// A registry as offered for selection on a saved query.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct InstanceItem {
    pub instance_id: i64,
    pub instance_name: String,
    pub is_checked: bool,
}

/// Data source pointing this service at `registry`.
pub fn build_data_source(registry: &Registry, config: &Config) -> DataSource {
    let mut query_options = Map::new();
    query_options.insert(
        INSTANCE_ID_OPTION.to_string(),
        Value::String(registry.id.to_string()),
    );

    let mut capabilities = Map::new();
    if config.linked_records_enabled {
        capabilities.insert("url_pid".to_string(), Value::String(config.pid_query_url()));
    }

    DataSource {
        name: registry.name.clone(),
        url_query: config.execute_query_url(),
        authentication: Authentication::session(),
        order_by_field: config
            .sorting_fields
            .iter()
            .map(OrderField::to_token)
            .collect::<Vec<_>>()
            .join(","),
        query_options,
        capabilities,
    }
}

fn has_instance(query: &SavedQuery, instance_id: &str) -> bool {
    query
        .data_sources
        .iter()
        .any(|source| source.instance_id().as_deref() == Some(instance_id))
}

/// Append `candidate` unless its instance is already present. Returns whether
/// the query changed.
pub fn add_data_source(query: &mut SavedQuery, candidate: DataSource) -> bool {
    let Some(instance_id) = candidate.instance_id() else {
        return false;
    };
    if has_instance(query, &instance_id) {
        return false;
    }
    query.data_sources.push(candidate);
    true
}

/// Drop every data source for `instance_id`. Returns whether the query changed.
pub fn remove_data_source(query: &mut SavedQuery, instance_id: &str) -> bool {
    let before = query.data_sources.len();
    query
        .data_sources
        .retain(|source| source.instance_id().as_deref() != Some(instance_id));
    query.data_sources.len() != before
}

/// Registries offered on `query`, checked when already attached.
pub fn list_instances(query: &SavedQuery, registries: &[Registry]) -> Vec<InstanceItem> {
    registries
        .iter()
        .map(|registry| InstanceItem {
            instance_id: registry.id,
            instance_name: registry.name.clone(),
            is_checked: has_instance(query, &registry.id.to_string()),
        })
        .collect()
}

/// Fail unless `caller` may see and change `query`.
pub fn check_query_access(query: &SavedQuery, caller: &Caller) -> Result<(), AppError> {
    if caller.owns_or_administers(&query.user_id) {
        Ok(())
    } else {
        Err(AppError::AccessControl(format!(
            "Access to query {} is not allowed",
            query.id
        )))
    }
}

/// Load a saved query the caller is allowed to work on.
pub async fn load_query(
    repo: &Repository,
    query_id: i64,
    caller: &Caller,
) -> Result<SavedQuery, AppError> {
    let query = repo
        .get_query(query_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Query {} not found", query_id)))?;
    check_query_access(&query, caller)?;
    Ok(query)
}

/// Attach a registry to a saved query. Nothing is written when it is already attached.
pub async fn add_registry(
    repo: &Repository,
    config: &Config,
    caller: &Caller,
    query_id: i64,
    registry_id: i64,
) -> Result<bool, AppError> {
    let mut query = load_query(repo, query_id, caller).await?;
    let registry = repo
        .get_registry(registry_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Registry {} not found", registry_id)))?;

    let changed = add_data_source(&mut query, build_data_source(&registry, config));
    if changed {
        repo.update_query_data_sources(query.id, &query.data_sources)
            .await?;
        tracing::info!("Added registry {} to query {}", registry_id, query_id);
    } else {
        tracing::debug!("Registry {} already on query {}", registry_id, query_id);
    }
    Ok(changed)
}

/// Detach a registry from a saved query. Nothing is written when it is absent.
pub async fn remove_registry(
    repo: &Repository,
    caller: &Caller,
    query_id: i64,
    registry_id: i64,
) -> Result<bool, AppError> {
    let mut query = load_query(repo, query_id, caller).await?;

    let changed = remove_data_source(&mut query, &registry_id.to_string());
    if changed {
        repo.update_query_data_sources(query.id, &query.data_sources)
            .await?;
        tracing::info!("Removed registry {} from query {}", registry_id, query_id);
    }
    Ok(changed)
}
