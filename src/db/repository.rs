//! Database repository for harvested records and saved queries.
//!
//! Record searches compile a [`Predicate`] into a single parameterized statement.

use chrono::Utc;
use sqlx::{Row, SqlitePool};

use super::sql::{bind_params, order_clause, placeholders, where_clause};
use crate::errors::AppError;
use crate::models::{DataSource, MetadataFormat, Record, Registry, SavedQuery};
use crate::search::{OrderField, Predicate};

const RECORD_COLUMNS: &str = "id, identifier, metadata_format_id, xml_content, dict_content, deleted, last_modification_date";

const FORMAT_COLUMNS: &str = "f.id, f.registry_id, r.name AS registry_name, f.metadata_prefix, f.hash, f.template_id";

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ==================== REGISTRY OPERATIONS ====================

    /// List registries ordered by name.
    pub async fn list_registries(&self, activated_only: bool) -> Result<Vec<Registry>, AppError> {
        let sql = if activated_only {
            "SELECT id, name, is_activated FROM registries WHERE is_activated = 1 ORDER BY name, id"
        } else {
            "SELECT id, name, is_activated FROM registries ORDER BY name, id"
        };
        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;

        Ok(rows.iter().map(registry_from_row).collect())
    }

    /// Get a registry by ID.
    pub async fn get_registry(&self, id: i64) -> Result<Option<Registry>, AppError> {
        let row = sqlx::query("SELECT id, name, is_activated FROM registries WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(registry_from_row))
    }

    // ==================== METADATA FORMAT OPERATIONS ====================

    /// Metadata formats offered by any of the given registries.
    pub async fn list_metadata_formats_by_registries(
        &self,
        registry_ids: &[i64],
    ) -> Result<Vec<MetadataFormat>, AppError> {
        if registry_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {} FROM metadata_formats f JOIN registries r ON r.id = f.registry_id WHERE f.registry_id IN ({}) ORDER BY f.id",
            FORMAT_COLUMNS,
            placeholders(registry_ids.len())
        );
        let mut query = sqlx::query(&sql);
        for id in registry_ids {
            query = query.bind(*id);
        }
        let rows = query.fetch_all(&self.pool).await?;

        Ok(rows.iter().map(metadata_format_from_row).collect())
    }

    /// Metadata formats by ID. Unknown ids are skipped.
    pub async fn list_metadata_formats_by_ids(
        &self,
        ids: &[i64],
    ) -> Result<Vec<MetadataFormat>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {} FROM metadata_formats f JOIN registries r ON r.id = f.registry_id WHERE f.id IN ({}) ORDER BY f.id",
            FORMAT_COLUMNS,
            placeholders(ids.len())
        );
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(*id);
        }
        let rows = query.fetch_all(&self.pool).await?;

        Ok(rows.iter().map(metadata_format_from_row).collect())
    }

    /// Get a metadata format by ID.
    pub async fn get_metadata_format(&self, id: i64) -> Result<Option<MetadataFormat>, AppError> {
        let sql = format!(
            "SELECT {} FROM metadata_formats f JOIN registries r ON r.id = f.registry_id WHERE f.id = ?",
            FORMAT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(metadata_format_from_row))
    }

    // ==================== RECORD OPERATIONS ====================

    /// Number of records matching a predicate.
    pub async fn count_records(&self, predicate: &Predicate) -> Result<u64, AppError> {
        let filter = where_clause(predicate);
        let sql = format!("SELECT COUNT(*) AS total FROM records WHERE {}", filter.sql);
        let row = bind_params(sqlx::query(&sql), &filter.params)
            .fetch_one(&self.pool)
            .await?;

        let total: i64 = row.get("total");
        Ok(u64::try_from(total).unwrap_or(0))
    }

    /// Every record matching a predicate, sorted.
    pub async fn execute_query(
        &self,
        predicate: &Predicate,
        ordering: &[OrderField],
    ) -> Result<Vec<Record>, AppError> {
        let filter = where_clause(predicate);
        let order = order_clause(ordering);
        let sql = format!(
            "SELECT {} FROM records WHERE {} ORDER BY {}",
            RECORD_COLUMNS, filter.sql, order.sql
        );
        let query = bind_params(sqlx::query(&sql), &filter.params);
        let rows = bind_params(query, &order.params)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(record_from_row).collect()
    }

    /// One window of the sorted records matching a predicate.
    pub async fn execute_query_window(
        &self,
        predicate: &Predicate,
        ordering: &[OrderField],
        limit: u32,
        offset: u64,
    ) -> Result<Vec<Record>, AppError> {
        let offset = i64::try_from(offset)
            .map_err(|_| AppError::InvalidRequest("Page offset out of range".to_string()))?;
        let filter = where_clause(predicate);
        let order = order_clause(ordering);
        let sql = format!(
            "SELECT {} FROM records WHERE {} ORDER BY {} LIMIT ? OFFSET ?",
            RECORD_COLUMNS, filter.sql, order.sql
        );
        let query = bind_params(sqlx::query(&sql), &filter.params);
        let rows = bind_params(query, &order.params)
            .bind(i64::from(limit))
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(record_from_row).collect()
    }

    /// Get a record by ID, deleted or not.
    pub async fn get_record(&self, id: i64) -> Result<Option<Record>, AppError> {
        let sql = format!("SELECT {} FROM records WHERE id = ?", RECORD_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    // ==================== SAVED QUERY OPERATIONS ====================

    /// Get a saved query by ID.
    pub async fn get_query(&self, id: i64) -> Result<Option<SavedQuery>, AppError> {
        let row = sqlx::query("SELECT id, user_id, data_sources FROM queries WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(query_from_row).transpose()
    }

    /// Replace the data-source list of a saved query.
    pub async fn update_query_data_sources(
        &self,
        id: i64,
        data_sources: &[DataSource],
    ) -> Result<(), AppError> {
        let now = Utc::now().to_rfc3339();
        let data_sources_json = serde_json::to_string(data_sources)
            .map_err(|e| AppError::Internal(format!("Failed to encode data sources: {}", e)))?;

        let result = sqlx::query("UPDATE queries SET data_sources = ?, updated_at = ? WHERE id = ?")
            .bind(&data_sources_json)
            .bind(&now)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Query {} not found", id)));
        }
        Ok(())
    }
}

/// Fixtures standing in for the harvester and the explore platform.
#[cfg(test)]
impl Repository {
    pub async fn insert_registry(&self, name: &str, is_activated: bool) -> i64 {
        sqlx::query("INSERT INTO registries (name, is_activated) VALUES (?, ?)")
            .bind(name)
            .bind(is_activated as i32)
            .execute(&self.pool)
            .await
            .unwrap()
            .last_insert_rowid()
    }

    pub async fn insert_template(&self, title: &str, hash: &str) -> i64 {
        sqlx::query("INSERT INTO templates (title, hash) VALUES (?, ?)")
            .bind(title)
            .bind(hash)
            .execute(&self.pool)
            .await
            .unwrap()
            .last_insert_rowid()
    }

    pub async fn insert_metadata_format(
        &self,
        registry_id: i64,
        metadata_prefix: &str,
        template_id: Option<i64>,
    ) -> i64 {
        sqlx::query(
            "INSERT INTO metadata_formats (registry_id, metadata_prefix, hash, template_id) VALUES (?, ?, ?, ?)",
        )
        .bind(registry_id)
        .bind(metadata_prefix)
        .bind(format!("hash-{}", metadata_prefix))
        .bind(template_id)
        .execute(&self.pool)
        .await
        .unwrap()
        .last_insert_rowid()
    }

    pub async fn insert_record(
        &self,
        metadata_format_id: i64,
        identifier: &str,
        dict_content: serde_json::Value,
        deleted: bool,
        last_modification_date: Option<&str>,
    ) -> i64 {
        sqlx::query(
            "INSERT INTO records (identifier, metadata_format_id, xml_content, dict_content, deleted, last_modification_date) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(identifier)
        .bind(metadata_format_id)
        .bind(format!("<record><identifier>{}</identifier></record>", identifier))
        .bind(dict_content.to_string())
        .bind(deleted as i32)
        .bind(last_modification_date)
        .execute(&self.pool)
        .await
        .unwrap()
        .last_insert_rowid()
    }

    pub async fn insert_query(&self, user_id: &str, data_sources: &[DataSource]) -> i64 {
        sqlx::query("INSERT INTO queries (user_id, data_sources) VALUES (?, ?)")
            .bind(user_id)
            .bind(serde_json::to_string(data_sources).unwrap())
            .execute(&self.pool)
            .await
            .unwrap()
            .last_insert_rowid()
    }
}

// Helper functions for row conversion

fn registry_from_row(row: &sqlx::sqlite::SqliteRow) -> Registry {
    let is_activated: i32 = row.get("is_activated");
    Registry {
        id: row.get("id"),
        name: row.get("name"),
        is_activated: is_activated != 0,
    }
}

fn metadata_format_from_row(row: &sqlx::sqlite::SqliteRow) -> MetadataFormat {
    MetadataFormat {
        id: row.get("id"),
        registry_id: row.get("registry_id"),
        registry_name: row.get("registry_name"),
        metadata_prefix: row.get("metadata_prefix"),
        hash: row.get("hash"),
        template_id: row.get("template_id"),
    }
}

fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Record, AppError> {
    let id: i64 = row.get("id");
    let deleted: i32 = row.get("deleted");
    let dict_content_str: String = row.get("dict_content");
    let dict_content = serde_json::from_str(&dict_content_str).map_err(|e| {
        AppError::Internal(format!("Record {} has malformed content: {}", id, e))
    })?;

    Ok(Record {
        id,
        identifier: row.get("identifier"),
        metadata_format_id: row.get("metadata_format_id"),
        xml_content: row.get("xml_content"),
        dict_content,
        deleted: deleted != 0,
        last_modification_date: row.get("last_modification_date"),
    })
}

fn query_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<SavedQuery, AppError> {
    let id: i64 = row.get("id");
    let data_sources_str: String = row.get("data_sources");
    let data_sources = serde_json::from_str(&data_sources_str).map_err(|e| {
        AppError::Internal(format!("Query {} has malformed data sources: {}", id, e))
    })?;

    Ok(SavedQuery {
        id,
        user_id: row.get("user_id"),
        data_sources,
    })
}
