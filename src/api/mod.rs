//! REST API module.
//!
//! JSON endpoints answer with the `{success, data}` envelope; the data-source
//! and detail endpoints render HTML for the explore front end.

mod data;
mod data_sources;
mod query;
mod render;
mod result;

pub use data::*;
pub use data_sources::*;
pub use query::*;
pub use result::*;

use std::collections::HashMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;

use crate::errors::AppError;
use crate::search::parse_id;

/// Success response envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Response type that can be either success or error.
pub type ApiResult<T> = Result<ApiResponse<T>, AppError>;

/// Create a successful API response.
pub fn success<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(ApiResponse::new(data))
}

/// Required integer id from a decoded query string.
fn required_id(params: &HashMap<String, String>, name: &str) -> Result<i64, AppError> {
    let raw = params
        .get(name)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AppError::InvalidRequest(format!("Missing {} parameter", name)))?;
    parse_id(&Value::String(raw.clone()), name)
}
