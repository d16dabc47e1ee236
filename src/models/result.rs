//! Search result shape shared with the federated explore front end.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// Template provenance of a result.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TemplateInfo {
    pub id: Option<i64>,
    pub name: String,
    pub hash: String,
}

/// A record projected into the uniform result shape.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub title: String,
    pub content: Value,
    pub template_info: TemplateInfo,
    pub detail_url: String,
    pub access_data_url: String,
    pub last_modification_date: Option<DateTime<Utc>>,
}

/// One page of results with its position in the full result set.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub results: Vec<T>,
    pub count: u64,
    pub page: u32,
    pub page_size: u32,
    pub num_pages: u32,
    pub has_next: bool,
    pub has_previous: bool,
}

impl<T> Page<T> {
    /// Build page metadata for `results` taken from a set of `count` items.
    pub fn new(results: Vec<T>, count: u64, page: u32, page_size: u32) -> Self {
        let num_pages = count.div_ceil(u64::from(page_size)).max(1);
        let num_pages = u32::try_from(num_pages).unwrap_or(u32::MAX);
        Self {
            results,
            count,
            page,
            page_size,
            num_pages,
            has_next: page < num_pages,
            has_previous: page > 1,
        }
    }

    /// Transform the items while keeping the page metadata.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            results: self.results.into_iter().map(f).collect(),
            count: self.count,
            page: self.page,
            page_size: self.page_size,
            num_pages: self.num_pages,
            has_next: self.has_next,
            has_previous: self.has_previous,
        }
    }
}
