//! Registry and metadata format models.

use serde::{Deserialize, Serialize};

/// A configured OAI-PMH source known to the harvester.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Registry {
    pub id: i64,
    pub name: String,
    pub is_activated: bool,
}

/// A metadata schema variant offered by one registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MetadataFormat {
    pub id: i64,
    pub registry_id: i64,
    /// Name of the owning registry, joined in for display purposes
    pub registry_name: String,
    pub metadata_prefix: String,
    pub hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_id: Option<i64>,
}

impl MetadataFormat {
    /// Human label for the format: the prefix qualified by its registry.
    pub fn display_name(&self) -> String {
        format!("{} ({})", self.metadata_prefix, self.registry_name)
    }
}
