//! Pagination backends.

use crate::db::Repository;
use crate::errors::AppError;
use crate::models::{Page, Record};

use super::{OrderField, Predicate};

/// Where the page window is cut.
///
/// Both backends return the same page for the same inputs; they differ only in
/// how much of the result set is pulled out of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationBackend {
    /// Materialize the whole filtered, sorted set and slice it
    InMemory,
    /// Count in the store and fetch only the window with `LIMIT/OFFSET`
    StoreNative,
}

impl PaginationBackend {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "memory" | "in-memory" | "in_memory" => Some(Self::InMemory),
            "store" | "native" | "store-native" => Some(Self::StoreNative),
            _ => None,
        }
    }

    /// Fetch page `page` (1-based) of `page_size` records.
    pub async fn paginate(
        &self,
        repo: &Repository,
        predicate: &Predicate,
        ordering: &[OrderField],
        page: u32,
        page_size: u32,
    ) -> Result<Page<Record>, AppError> {
        let page = page.max(1);
        let page_size = page_size.max(1);

        match self {
            Self::InMemory => {
                let records = repo.execute_query(predicate, ordering).await?;
                Ok(paginate_slice(records, page, page_size))
            }
            Self::StoreNative => {
                let count = repo.count_records(predicate).await?;
                let offset = u64::from(page - 1) * u64::from(page_size);
                let records = if offset >= count {
                    Vec::new()
                } else {
                    repo.execute_query_window(predicate, ordering, page_size, offset)
                        .await?
                };
                Ok(Page::new(records, count, page, page_size))
            }
        }
    }
}

/// Cut one page out of a materialized list.
pub fn paginate_slice<T>(items: Vec<T>, page: u32, page_size: u32) -> Page<T> {
    let count = items.len() as u64;
    let offset = (page.max(1) as usize - 1).saturating_mul(page_size as usize);
    let results = items
        .into_iter()
        .skip(offset)
        .take(page_size as usize)
        .collect();
    Page::new(results, count, page.max(1), page_size)
}
