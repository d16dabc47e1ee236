//! Projection of harvested records into the shared result shape.

use std::collections::HashMap;

use serde_json::Value;

use super::ContentChannel;
use crate::config::Config;
use crate::db::Repository;
use crate::errors::AppError;
use crate::models::{MetadataFormat, Page, Record, SearchResult, TemplateInfo};

/// The two URL templates a result links to.
#[derive(Debug, Clone)]
pub struct ResultUrls {
    detail: String,
    access_data: String,
}

impl ResultUrls {
    pub fn from_config(config: &Config) -> Self {
        Self {
            detail: config.data_detail_url(),
            access_data: config.access_data_url(),
        }
    }

    pub fn detail_url(&self, record_id: i64) -> String {
        format!("{}?id={}", self.detail, record_id)
    }

    pub fn access_data_url(&self, record_id: i64) -> String {
        format!("{}?id={}", self.access_data, record_id)
    }
}

/// Template provenance of records stored in `format`.
pub fn template_info(format: &MetadataFormat) -> TemplateInfo {
    TemplateInfo {
        id: format.template_id,
        name: format.display_name(),
        hash: format.hash.clone(),
    }
}

/// Template info for every distinct metadata format used by `records`.
///
/// One lookup per format, however many records share it; the map lives only
/// as long as the formatting pass that asked for it.
pub async fn template_infos(
    repo: &Repository,
    records: &[Record],
) -> Result<HashMap<i64, TemplateInfo>, AppError> {
    let mut format_ids: Vec<i64> = records.iter().map(|r| r.metadata_format_id).collect();
    format_ids.sort_unstable();
    format_ids.dedup();

    let formats = repo.list_metadata_formats_by_ids(&format_ids).await?;
    Ok(formats
        .iter()
        .map(|format| (format.id, template_info(format)))
        .collect())
}

/// Project one record. Never touches the record itself.
pub fn format_record(
    record: &Record,
    infos: &HashMap<i64, TemplateInfo>,
    urls: &ResultUrls,
    channel: ContentChannel,
) -> SearchResult {
    let template_info = infos
        .get(&record.metadata_format_id)
        .cloned()
        .unwrap_or_else(|| {
            tracing::warn!(
                "Record {} references unknown metadata format {}",
                record.id,
                record.metadata_format_id
            );
            TemplateInfo {
                id: None,
                name: String::new(),
                hash: String::new(),
            }
        });

    let content = match channel {
        ContentChannel::Xml => Value::String(record.xml_content.clone()),
        ContentChannel::Json => record.dict_content.clone(),
    };

    SearchResult {
        title: record.identifier.clone(),
        content,
        template_info,
        detail_url: urls.detail_url(record.id),
        access_data_url: urls.access_data_url(record.id),
        last_modification_date: record.last_modified_utc(),
    }
}

/// Format a page of records, keeping its metadata.
pub async fn format_page(
    repo: &Repository,
    urls: &ResultUrls,
    page: Page<Record>,
    channel: ContentChannel,
) -> Result<Page<SearchResult>, AppError> {
    let infos = template_infos(repo, &page.results).await?;
    Ok(page.map(|record| format_record(&record, &infos, urls, channel)))
}
