//! Saved query and data source models shared with the explore platform.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key under `query_options` holding the registry id of an OAI-PMH data source.
pub const INSTANCE_ID_OPTION: &str = "instance_id";

/// A user's persisted search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SavedQuery {
    pub id: i64,
    pub user_id: String,
    #[serde(default)]
    pub data_sources: Vec<DataSource>,
}

/// How the explore platform authenticates against a data source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Authentication {
    pub auth_type: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl Authentication {
    /// Reuse the caller's session.
    pub fn session() -> Self {
        Self {
            auth_type: "session".to_string(),
            params: Map::new(),
        }
    }
}

/// One source scope attached to a saved query.
///
/// Field names follow the platform's stored document layout, so they are not
/// camel-cased like the rest of the API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataSource {
    pub name: String,
    pub url_query: String,
    pub authentication: Authentication,
    #[serde(default)]
    pub order_by_field: String,
    #[serde(default)]
    pub query_options: Map<String, Value>,
    #[serde(default)]
    pub capabilities: Map<String, Value>,
}

impl DataSource {
    /// Registry id this data source points at, if it is an OAI-PMH one.
    ///
    /// Other writers may have stored the id as a number; both forms compare equal.
    pub fn instance_id(&self) -> Option<String> {
        match self.query_options.get(INSTANCE_ID_OPTION)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}
