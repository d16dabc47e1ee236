//! Configuration module for the OAI-PMH explore service.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::errors::AppError;
use crate::search::{OrderField, PaginationBackend};

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Pre-shared key for service authentication
    pub api_psk: Option<String>,
    /// Path to the SQLite database shared with the harvester
    pub db_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Emit logs as JSON lines
    pub log_json: bool,
    /// Public base URI used to build absolute URLs
    pub server_uri: String,
    /// Default number of results per page
    pub results_per_page: u32,
    /// Which pagination backend executes searches
    pub pagination: PaginationBackend,
    /// Default ordering when a request supplies none
    pub sorting_fields: Vec<OrderField>,
    /// Advertise the persistent-identifier capability on new data sources
    pub linked_records_enabled: bool,
    /// Let anonymous callers read single records
    pub anonymous_record_access: bool,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let api_psk = env::var("EXPLORE_OAIPMH_API_PSK").ok();

        let db_path = env::var("EXPLORE_OAIPMH_DB_PATH")
            .unwrap_or_else(|_| "./data/oaipmh.sqlite".to_string())
            .into();

        let bind_addr = env::var("EXPLORE_OAIPMH_BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()
            .map_err(|_| invalid("EXPLORE_OAIPMH_BIND_ADDR"))?;

        let log_level = env::var("EXPLORE_OAIPMH_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let log_json = bool_var("EXPLORE_OAIPMH_LOG_JSON", false)?;

        let server_uri = env::var("EXPLORE_OAIPMH_SERVER_URI")
            .unwrap_or_else(|_| "http://127.0.0.1:8080".to_string())
            .trim_end_matches('/')
            .to_string();

        let results_per_page = match env::var("EXPLORE_OAIPMH_RESULTS_PER_PAGE") {
            Ok(raw) => raw
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| invalid("EXPLORE_OAIPMH_RESULTS_PER_PAGE"))?,
            Err(_) => 10,
        };

        let pagination = match env::var("EXPLORE_OAIPMH_PAGINATION") {
            Ok(raw) => PaginationBackend::parse(&raw)
                .ok_or_else(|| invalid("EXPLORE_OAIPMH_PAGINATION"))?,
            Err(_) => PaginationBackend::StoreNative,
        };

        let sorting_fields = OrderField::parse_list(
            &env::var("EXPLORE_OAIPMH_SORTING_FIELDS").unwrap_or_else(|_| "+title".to_string()),
        );

        let linked_records_enabled = bool_var("EXPLORE_OAIPMH_LINKED_RECORDS", false)?;
        let anonymous_record_access = bool_var("EXPLORE_OAIPMH_ANONYMOUS_RECORD_ACCESS", true)?;

        Ok(Self {
            api_psk,
            db_path,
            bind_addr,
            log_level,
            log_json,
            server_uri,
            results_per_page,
            pagination,
            sorting_fields,
            linked_records_enabled,
            anonymous_record_access,
        })
    }

    /// Absolute URL of the execute-query endpoint, stored on data sources.
    pub fn execute_query_url(&self) -> String {
        format!("{}{}/rest/execute-query", self.server_uri, crate::ROUTE_PREFIX)
    }

    /// Absolute URL of the persistent-identifier query endpoint.
    pub fn pid_query_url(&self) -> String {
        format!("{}/pid/rest/oaipmh/query", self.server_uri)
    }

    /// Base URL of the record detail page.
    pub fn data_detail_url(&self) -> String {
        format!("{}{}/data", self.server_uri, crate::ROUTE_PREFIX)
    }

    /// Base URL of the single-result REST endpoint.
    pub fn access_data_url(&self) -> String {
        format!("{}{}/rest/result", self.server_uri, crate::ROUTE_PREFIX)
    }
}

fn invalid(name: &str) -> AppError {
    AppError::Internal(format!("Invalid {} value", name))
}

fn bool_var(name: &str, default: bool) -> Result<bool, AppError> {
    match env::var(name) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(invalid(name)),
        },
        Err(_) => Ok(default),
    }
}
