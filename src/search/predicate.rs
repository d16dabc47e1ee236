//! Record predicates: the caller's content filter plus registry scoping.
//!
//! The content filter grammar is a small MongoDB-like subset. Keys are dotted
//! paths into a record's JSON content (numeric segments index arrays) or
//! `$and` / `$or` with a list of sub-filters. A scalar value means equality,
//! an object of `$`-prefixed keys is a set of comparison operators.

use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::errors::AppError;
use crate::models::MetadataFormat;

const MAX_FILTER_DEPTH: usize = 8;
const MAX_IN_LIST_ITEMS: usize = 256;
const MAX_PATH_SEGMENTS: usize = 16;

/// A scalar operand of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    fn from_value(value: &Value, path: &str) -> Result<Self, AppError> {
        match value {
            Value::Null => Ok(Scalar::Null),
            Value::Bool(b) => Ok(Scalar::Bool(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(Scalar::Int(i)),
                None => n.as_f64().map(Scalar::Float).ok_or_else(|| {
                    AppError::InvalidRequest(format!("{}: number out of range", path))
                }),
            },
            Value::String(s) => Ok(Scalar::Text(s.clone())),
            Value::Array(_) | Value::Object(_) => Err(AppError::InvalidRequest(format!(
                "{}: only scalar values can be compared",
                path
            ))),
        }
    }
}

/// A comparison applied to one content field.
#[derive(Debug, Clone, PartialEq)]
pub enum Comparison {
    Eq(Scalar),
    Ne(Scalar),
    Gt(Scalar),
    Gte(Scalar),
    Lt(Scalar),
    Lte(Scalar),
    In(Vec<Scalar>),
    Nin(Vec<Scalar>),
    Exists(bool),
}

/// A dotted path into a record's JSON content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let segments: Vec<String> = raw.split('.').map(str::to_string).collect();
        if segments.len() > MAX_PATH_SEGMENTS
            || segments.iter().any(|s| s.is_empty() || s.contains('"'))
        {
            return Err(AppError::InvalidRequest(format!(
                "Invalid field path '{}'",
                raw
            )));
        }
        Ok(Self(segments))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// SQLite JSON path, e.g. `$."field"."list"[0]`.
    pub fn json_path(&self) -> String {
        let mut path = String::from("$");
        for segment in &self.0 {
            if let Some(index) = array_index(segment) {
                path.push('[');
                path.push_str(&index.to_string());
                path.push(']');
            } else {
                path.push_str(".\"");
                path.push_str(segment);
                path.push('"');
            }
        }
        path
    }
}

/// Array index named by a numeric path segment.
pub fn array_index(segment: &str) -> Option<i64> {
    if segment.bytes().all(|b| b.is_ascii_digit()) {
        segment.parse().ok()
    } else {
        None
    }
}

/// Parsed content filter.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentFilter {
    /// `{}`: matches every record
    All,
    And(Vec<ContentFilter>),
    Or(Vec<ContentFilter>),
    Field { path: FieldPath, cmp: Comparison },
}

impl ContentFilter {
    /// Parse a raw filter document.
    pub fn parse(raw: &Value) -> Result<Self, AppError> {
        let obj = raw
            .as_object()
            .ok_or_else(|| AppError::InvalidRequest("Query must be a JSON object".to_string()))?;
        parse_document(obj, 1)
    }
}

fn parse_document(obj: &Map<String, Value>, depth: usize) -> Result<ContentFilter, AppError> {
    if depth > MAX_FILTER_DEPTH {
        return Err(AppError::InvalidRequest(format!(
            "Query nesting exceeds {} levels",
            MAX_FILTER_DEPTH
        )));
    }

    let mut parts = Vec::with_capacity(obj.len());
    for (key, value) in obj {
        match key.as_str() {
            "$and" | "$or" => {
                let items = value.as_array().ok_or_else(|| {
                    AppError::InvalidRequest(format!("{} expects a list of filters", key))
                })?;
                let mut children = Vec::with_capacity(items.len());
                for item in items {
                    let child = item.as_object().ok_or_else(|| {
                        AppError::InvalidRequest(format!("{} items must be objects", key))
                    })?;
                    children.push(parse_document(child, depth + 1)?);
                }
                parts.push(if key == "$and" {
                    ContentFilter::And(children)
                } else {
                    ContentFilter::Or(children)
                });
            }
            op if op.starts_with('$') => {
                return Err(AppError::InvalidRequest(format!(
                    "Unsupported query operator '{}'",
                    op
                )));
            }
            field => parts.extend(parse_field(field, value)?),
        }
    }

    Ok(match parts.len() {
        0 => ContentFilter::All,
        1 => parts.remove(0),
        _ => ContentFilter::And(parts),
    })
}

fn parse_field(field: &str, value: &Value) -> Result<Vec<ContentFilter>, AppError> {
    let path = FieldPath::parse(field)?;

    let operators = match value {
        Value::Object(ops) if !ops.is_empty() && ops.keys().all(|k| k.starts_with('$')) => ops,
        Value::Object(_) => {
            return Err(AppError::InvalidRequest(format!(
                "{}: embedded document equality is not supported",
                field
            )))
        }
        scalar => {
            return Ok(vec![ContentFilter::Field {
                path,
                cmp: Comparison::Eq(Scalar::from_value(scalar, field)?),
            }])
        }
    };

    let mut filters = Vec::with_capacity(operators.len());
    for (op, operand) in operators {
        let cmp = match op.as_str() {
            "$eq" => Comparison::Eq(Scalar::from_value(operand, field)?),
            "$ne" => Comparison::Ne(Scalar::from_value(operand, field)?),
            "$gt" => Comparison::Gt(Scalar::from_value(operand, field)?),
            "$gte" => Comparison::Gte(Scalar::from_value(operand, field)?),
            "$lt" => Comparison::Lt(Scalar::from_value(operand, field)?),
            "$lte" => Comparison::Lte(Scalar::from_value(operand, field)?),
            "$in" => Comparison::In(scalar_list(operand, field, op)?),
            "$nin" => Comparison::Nin(scalar_list(operand, field, op)?),
            "$exists" => Comparison::Exists(operand.as_bool().ok_or_else(|| {
                AppError::InvalidRequest(format!("{}: $exists expects a boolean", field))
            })?),
            other => {
                return Err(AppError::InvalidRequest(format!(
                    "Unsupported query operator '{}'",
                    other
                )))
            }
        };
        filters.push(ContentFilter::Field {
            path: path.clone(),
            cmp,
        });
    }
    Ok(filters)
}

fn scalar_list(operand: &Value, field: &str, op: &str) -> Result<Vec<Scalar>, AppError> {
    let items = operand
        .as_array()
        .ok_or_else(|| AppError::InvalidRequest(format!("{}: {} expects a list", field, op)))?;
    if items.len() > MAX_IN_LIST_ITEMS {
        return Err(AppError::InvalidRequest(format!(
            "{}: {} accepts at most {} values",
            field, op, MAX_IN_LIST_ITEMS
        )));
    }
    items.iter().map(|v| Scalar::from_value(v, field)).collect()
}

/// One conjunct of a record predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    Content(ContentFilter),
    MetadataFormatIn(Vec<i64>),
    RegistryIn(Vec<i64>),
    NotDeleted,
}

/// Conjunction of clauses executed against the record store.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    clauses: Vec<Clause>,
}

impl Predicate {
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// Registry ids listed explicitly by this predicate, if any.
    pub fn registry_scope(&self) -> Option<&[i64]> {
        self.clauses.iter().find_map(|c| match c {
            Clause::RegistryIn(ids) => Some(ids.as_slice()),
            _ => None,
        })
    }

    /// Metadata format ids this predicate is restricted to, if any.
    pub fn metadata_format_scope(&self) -> Option<&[i64]> {
        self.clauses.iter().find_map(|c| match c {
            Clause::MetadataFormatIn(ids) => Some(ids.as_slice()),
            _ => None,
        })
    }
}

/// Registries a search may touch: the activated ones, narrowed to the
/// requested ids when the caller named any.
pub fn effective_scope(activated: &[i64], requested: &[i64]) -> Vec<i64> {
    if requested.is_empty() {
        return activated.to_vec();
    }
    let requested: HashSet<i64> = requested.iter().copied().collect();
    activated
        .iter()
        .copied()
        .filter(|id| requested.contains(id))
        .collect()
}

/// Combine a content filter with registry and template scoping.
///
/// `formats` are the metadata formats of the registries in `scope`; they are
/// only consulted when `template_ids` is non-empty, in which case the format
/// clause alone carries the registry restriction.
pub fn build_predicate(
    content: ContentFilter,
    template_ids: &[i64],
    scope: &[i64],
    formats: &[MetadataFormat],
) -> Predicate {
    let mut clauses = vec![Clause::Content(content)];

    if template_ids.is_empty() {
        clauses.push(Clause::RegistryIn(scope.to_vec()));
    } else {
        let scope: HashSet<i64> = scope.iter().copied().collect();
        let templates: HashSet<i64> = template_ids.iter().copied().collect();
        let format_ids = formats
            .iter()
            .filter(|f| scope.contains(&f.registry_id))
            .filter(|f| f.template_id.is_some_and(|t| templates.contains(&t)))
            .map(|f| f.id)
            .collect();
        clauses.push(Clause::MetadataFormatIn(format_ids));
    }

    clauses.push(Clause::NotDeleted);
    Predicate { clauses }
}
