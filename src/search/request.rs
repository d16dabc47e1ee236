//! Normalization of inbound search parameters.
//!
//! Callers send parameters either as a JSON body or a query string, and the
//! structured ones (`query`, `options`, `templates`) may arrive as already
//! parsed JSON or as JSON encoded in a string. Everything is folded into one
//! typed [`SearchRequest`] here so core logic never sees the loose form.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use super::{ContentFilter, OrderField};
use crate::config::Config;
use crate::errors::AppError;
use crate::models::INSTANCE_ID_OPTION;

/// Maximum number of results per page a caller may ask for.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Which representation of the record content a caller expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentChannel {
    #[default]
    Xml,
    Json,
}

/// Search parameters as received on the wire.
#[derive(Debug, Default, Deserialize)]
pub struct RawSearchParams {
    #[serde(default)]
    pub query: Option<Value>,
    #[serde(default)]
    pub options: Option<Value>,
    #[serde(default)]
    pub templates: Option<Value>,
    #[serde(default)]
    pub order_by_field: Option<Value>,
    #[serde(default)]
    pub page: Option<Value>,
    #[serde(default)]
    pub page_size: Option<Value>,
    #[serde(default)]
    pub format: Option<Value>,
}

impl RawSearchParams {
    /// Collect parameters from a decoded query string.
    pub fn from_query_string(mut params: HashMap<String, String>) -> Self {
        let mut take = |key: &str| params.remove(key).map(Value::String);
        Self {
            query: take("query"),
            options: take("options"),
            templates: take("templates"),
            order_by_field: take("order_by_field"),
            page: take("page"),
            page_size: take("page_size"),
            format: take("format"),
        }
    }
}

/// A fully validated search request.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub filter: ContentFilter,
    pub template_ids: Vec<i64>,
    pub instance_ids: Vec<i64>,
    pub ordering: Vec<OrderField>,
    pub page: u32,
    pub page_size: u32,
    pub channel: ContentChannel,
}

impl SearchRequest {
    /// Validate raw parameters, filling gaps from configuration.
    ///
    /// A missing `query` is rejected before anything else is looked at.
    pub fn from_raw(raw: RawSearchParams, config: &Config) -> Result<Self, AppError> {
        let query = raw
            .query
            .filter(|v| !v.is_null())
            .ok_or_else(|| AppError::InvalidRequest("Query should be passed in parameter".to_string()))?;
        let filter = ContentFilter::parse(&decode_json(query, "query")?)?;

        let instance_ids = match raw.options {
            Some(options) => instance_ids_from_options(decode_json(options, "options")?)?,
            None => Vec::new(),
        };

        let template_ids = match raw.templates {
            Some(templates) => template_ids_from_value(decode_json(templates, "templates")?)?,
            None => Vec::new(),
        };

        let mut ordering = match raw.order_by_field {
            Some(value) => OrderField::from_value(&value)?,
            None => Vec::new(),
        };
        if ordering.is_empty() {
            ordering = config.sorting_fields.clone();
        }

        let page = match raw.page {
            Some(value) => parse_u32(&value, "page")?.max(1),
            None => 1,
        };

        let page_size = match raw.page_size {
            Some(value) => match parse_u32(&value, "page_size")? {
                0 => config.results_per_page,
                n => n.min(MAX_PAGE_SIZE),
            },
            None => config.results_per_page,
        };

        let channel = match raw.format.as_ref().and_then(Value::as_str) {
            None | Some("xml") => ContentChannel::Xml,
            Some("json") => ContentChannel::Json,
            Some(other) => {
                return Err(AppError::InvalidRequest(format!(
                    "Unknown result format '{}'",
                    other
                )))
            }
        };

        Ok(Self {
            filter,
            template_ids,
            instance_ids,
            ordering,
            page,
            page_size,
            channel,
        })
    }
}

/// Decode a value that may be JSON text wrapped in a string.
fn decode_json(value: Value, name: &str) -> Result<Value, AppError> {
    match value {
        Value::String(s) => serde_json::from_str(&s)
            .map_err(|e| AppError::InvalidRequest(format!("Malformed {} parameter: {}", name, e))),
        other => Ok(other),
    }
}

/// Parse an id given as a JSON number or a numeric string.
pub fn parse_id(value: &Value, name: &str) -> Result<i64, AppError> {
    let parsed = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| AppError::InvalidRequest(format!("Invalid {}: {}", name, value)))
}

fn parse_u32(value: &Value, name: &str) -> Result<u32, AppError> {
    let parsed = match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| AppError::InvalidRequest(format!("Invalid {}: {}", name, value)))
}

fn instance_ids_from_options(options: Value) -> Result<Vec<i64>, AppError> {
    let obj = match options {
        Value::Object(obj) => obj,
        Value::Null => return Ok(Vec::new()),
        _ => {
            return Err(AppError::InvalidRequest(
                "options must be a JSON object".to_string(),
            ))
        }
    };
    match obj.get(INSTANCE_ID_OPTION) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| parse_id(item, INSTANCE_ID_OPTION))
            .collect(),
        Some(single) => Ok(vec![parse_id(single, INSTANCE_ID_OPTION)?]),
    }
}

fn template_ids_from_value(templates: Value) -> Result<Vec<i64>, AppError> {
    let items = match templates {
        Value::Array(items) => items,
        Value::Null => return Ok(Vec::new()),
        _ => {
            return Err(AppError::InvalidRequest(
                "templates must be a JSON list".to_string(),
            ))
        }
    };
    items
        .iter()
        .map(|item| match item.get("id") {
            Some(id) => parse_id(id, "template id"),
            None => parse_id(item, "template id"),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{Comparison, FieldPath, PaginationBackend, Scalar};
    use serde_json::json;

    fn config() -> Config {
        Config {
            api_psk: None,
            db_path: "unused.sqlite".into(),
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "warn".to_string(),
            log_json: false,
            server_uri: "http://example.com".to_string(),
            results_per_page: 10,
            pagination: PaginationBackend::InMemory,
            sorting_fields: vec![OrderField::asc("title")],
            linked_records_enabled: false,
            anonymous_record_access: true,
        }
    }

    #[test]
    fn test_missing_query_is_invalid() {
        let err = SearchRequest::from_raw(RawSearchParams::default(), &config()).unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));
    }

    #[test]
    fn test_string_encoded_parameters() {
        let raw = RawSearchParams::from_query_string(HashMap::from([
            ("query".to_string(), r#"{"field.subfield":"Test 1"}"#.to_string()),
            ("templates".to_string(), r#"[{"id": 1}, {"id": "2"}]"#.to_string()),
            ("options".to_string(), r#"{"visibility": "public", "instance_id": "1"}"#.to_string()),
            ("order_by_field".to_string(), "-title,+identifier".to_string()),
            ("page".to_string(), "3".to_string()),
            ("format".to_string(), "json".to_string()),
        ]));
        let request = SearchRequest::from_raw(raw, &config()).unwrap();

        assert_eq!(
            request.filter,
            ContentFilter::Field {
                path: FieldPath::parse("field.subfield").unwrap(),
                cmp: Comparison::Eq(Scalar::Text("Test 1".to_string())),
            }
        );
        assert_eq!(request.template_ids, vec![1, 2]);
        assert_eq!(request.instance_ids, vec![1]);
        assert_eq!(
            request.ordering,
            vec![OrderField::desc("title"), OrderField::asc("identifier")]
        );
        assert_eq!(request.page, 3);
        assert_eq!(request.page_size, 10);
        assert_eq!(request.channel, ContentChannel::Json);
    }

    #[test]
    fn test_parsed_parameters_and_defaults() {
        let raw = RawSearchParams {
            query: Some(json!({})),
            options: Some(json!({"instance_id": [2, "3"]})),
            order_by_field: Some(json!("[]")),
            page: Some(json!(0)),
            page_size: Some(json!(1000)),
            ..Default::default()
        };
        let request = SearchRequest::from_raw(raw, &config()).unwrap();

        assert_eq!(request.filter, ContentFilter::All);
        assert_eq!(request.instance_ids, vec![2, 3]);
        assert!(request.template_ids.is_empty());
        assert_eq!(request.ordering, vec![OrderField::asc("title")]);
        assert_eq!(request.page, 1);
        assert_eq!(request.page_size, MAX_PAGE_SIZE);
        assert_eq!(request.channel, ContentChannel::Xml);
    }

    #[test]
    fn test_malformed_payloads_are_rejected() {
        let cases = [
            RawSearchParams {
                query: Some(json!("{not json")),
                ..Default::default()
            },
            RawSearchParams {
                query: Some(json!({})),
                options: Some(json!("[1]")),
                ..Default::default()
            },
            RawSearchParams {
                query: Some(json!({})),
                options: Some(json!({"instance_id": "abc"})),
                ..Default::default()
            },
            RawSearchParams {
                query: Some(json!({})),
                templates: Some(json!({"id": 1})),
                ..Default::default()
            },
            RawSearchParams {
                query: Some(json!({})),
                page: Some(json!("two")),
                ..Default::default()
            },
            RawSearchParams {
                query: Some(json!({})),
                format: Some(json!("yaml")),
                ..Default::default()
            },
        ];
        for raw in cases {
            let err = SearchRequest::from_raw(raw, &config()).unwrap_err();
            assert!(matches!(err, AppError::InvalidRequest(_)), "{}", err);
        }
    }
}
