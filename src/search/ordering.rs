//! Sort keys such as `+title,-last_modification_date`.

use serde_json::Value;

use super::FieldPath;
use crate::errors::AppError;

/// One sort key. A leading `-` means descending, `+` or nothing ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderField {
    pub field: String,
    pub descending: bool,
}

impl OrderField {
    pub fn asc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            descending: false,
        }
    }

    pub fn desc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            descending: true,
        }
    }

    /// Parse a single token; blank tokens yield `None`.
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim();
        let (field, descending) = match token.strip_prefix('-') {
            Some(rest) => (rest, true),
            None => (token.strip_prefix('+').unwrap_or(token), false),
        };
        let field = field.trim();
        if field.is_empty() {
            return None;
        }
        Some(Self {
            field: field.to_string(),
            descending,
        })
    }

    /// Parse a comma-separated list, skipping blanks.
    pub fn parse_list(raw: &str) -> Vec<Self> {
        raw.split(',').filter_map(Self::parse).collect()
    }

    /// Parse a request value: a comma-separated string, a JSON list encoded
    /// as a string, or an already decoded list of strings. Every field must be
    /// a valid field path.
    pub fn from_value(value: &Value) -> Result<Vec<Self>, AppError> {
        let fields = match value {
            Value::Null => Vec::new(),
            Value::String(s) if s.trim_start().starts_with('[') => {
                let decoded: Value = serde_json::from_str(s)?;
                return Self::from_value(&decoded);
            }
            Value::String(s) => Self::parse_list(s),
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_str().ok_or_else(|| {
                        AppError::InvalidRequest("order_by_field items must be strings".to_string())
                    })
                })
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .filter_map(Self::parse)
                .collect(),
            _ => {
                return Err(AppError::InvalidRequest(
                    "order_by_field must be a string or a list".to_string(),
                ))
            }
        };

        for field in &fields {
            FieldPath::parse(&field.field)?;
        }
        Ok(fields)
    }

    /// Token form, as stored on data sources.
    pub fn to_token(&self) -> String {
        format!("{}{}", if self.descending { "-" } else { "+" }, self.field)
    }
}
