//! Harvested record model.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// A harvested metadata record. Immutable from this service's point of view.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: i64,
    pub identifier: String,
    pub metadata_format_id: i64,
    pub xml_content: String,
    pub dict_content: Value,
    pub deleted: bool,
    /// Raw timestamp as stored by the harvester, any UTC offset
    pub last_modification_date: Option<String>,
}

impl Record {
    /// Last modification date normalized to UTC.
    ///
    /// Unparseable timestamps are reported as absent rather than failing the page.
    pub fn last_modified_utc(&self) -> Option<DateTime<Utc>> {
        let raw = self.last_modification_date.as_deref()?;
        match DateTime::parse_from_rfc3339(raw) {
            Ok(dt) => Some(dt.with_timezone(&Utc)),
            Err(e) => {
                tracing::warn!("Record {} has invalid modification date {:?}: {}", self.id, raw, e);
                None
            }
        }
    }
}
