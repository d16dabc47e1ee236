//! Search over harvested records.
//!
//! A request flows through three steps: the predicate is built from the
//! caller's filter and the registries currently in scope, the selected
//! pagination backend cuts one page out of the store, and the page is
//! projected into the shared result shape.

mod format;
mod ordering;
mod paginate;
mod predicate;
mod request;

pub use format::*;
pub use ordering::*;
pub use paginate::*;
pub use predicate::*;
pub use request::*;

use crate::config::Config;
use crate::db::Repository;
use crate::errors::AppError;
use crate::models::{Page, SearchResult};

/// Look up the registry and template state a request needs and build its predicate.
pub async fn resolve_predicate(
    repo: &Repository,
    request: &SearchRequest,
) -> Result<Predicate, AppError> {
    let activated: Vec<i64> = repo
        .list_registries(true)
        .await?
        .into_iter()
        .map(|registry| registry.id)
        .collect();
    let scope = effective_scope(&activated, &request.instance_ids);

    let formats = if request.template_ids.is_empty() {
        Vec::new()
    } else {
        repo.list_metadata_formats_by_registries(&scope).await?
    };

    let predicate = build_predicate(
        request.filter.clone(),
        &request.template_ids,
        &scope,
        &formats,
    );

    match predicate.metadata_format_scope() {
        Some(format_ids) => tracing::debug!(
            "Search restricted to {} metadata formats of {} templates",
            format_ids.len(),
            request.template_ids.len()
        ),
        None => tracing::debug!(
            "Search restricted to {} registries",
            predicate.registry_scope().map_or(0, <[i64]>::len)
        ),
    }

    Ok(predicate)
}

/// Run a validated search request end to end.
pub async fn execute_search(
    repo: &Repository,
    config: &Config,
    request: &SearchRequest,
) -> Result<Page<SearchResult>, AppError> {
    let predicate = resolve_predicate(repo, request).await?;

    let page = config
        .pagination
        .paginate(
            repo,
            &predicate,
            &request.ordering,
            request.page,
            request.page_size,
        )
        .await?;

    tracing::debug!(
        "Search matched {} records, returning page {} of {}",
        page.count,
        page.page,
        page.num_pages
    );

    format_page(repo, &ResultUrls::from_config(config), page, request.channel).await
}
