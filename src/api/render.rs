//! HTML rendering for the explore front end.
//!
//! Every interpolated value goes through [`escape_html`].

use std::fmt::Write;

use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};

use crate::errors::{escape_html, AppError};
use crate::models::{MetadataFormat, Record};
use crate::sources::InstanceItem;

/// Checkbox list of registries, one per instance.
pub fn instance_list(items: &[InstanceItem]) -> String {
    if items.is_empty() {
        return "<p class=\"no-instances\">No OAI-PMH registry available.</p>\n".to_string();
    }

    let mut html = String::from("<ul class=\"list-data-sources-oaipmh\">\n");
    for item in items {
        let _ = writeln!(
            html,
            "  <li><input type=\"checkbox\" class=\"checkbox-oaipmh\" id=\"oaipmh-instance-{id}\" value=\"{id}\"{checked}> <label for=\"oaipmh-instance-{id}\">{name}</label></li>",
            id = item.instance_id,
            checked = if item.is_checked { " checked" } else { "" },
            name = escape_html(&item.instance_name),
        );
    }
    html.push_str("</ul>\n");
    html
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n</head>\n<body>\n{}</body>\n</html>\n",
        escape_html(title),
        body
    )
}

/// Detail page of a single record.
pub fn record_detail(record: &Record, format: Option<&MetadataFormat>) -> String {
    let mut body = String::new();
    let _ = writeln!(body, "<h1>{}</h1>", escape_html(&record.identifier));
    let _ = writeln!(
        body,
        "<dl class=\"record\" data-record-id=\"{}\">",
        record.id
    );

    if let Some(format) = format {
        let template_id = format
            .template_id
            .map(|id| id.to_string())
            .unwrap_or_default();
        let _ = writeln!(
            body,
            "  <dt>Template</dt><dd data-template-id=\"{}\" data-template-hash=\"{}\">{}</dd>",
            escape_html(&template_id),
            escape_html(&format.hash),
            escape_html(&format.display_name()),
        );
    }
    if let Some(date) = record.last_modified_utc() {
        let _ = writeln!(
            body,
            "  <dt>Last modification</dt><dd>{}</dd>",
            escape_html(&date.to_rfc3339())
        );
    }
    body.push_str("</dl>\n");
    let _ = writeln!(
        body,
        "<pre class=\"xml-content\">{}</pre>",
        escape_html(&record.xml_content)
    );

    page(&record.identifier, &body)
}

/// HTML error page carrying the error's status.
pub fn error_page(error: &AppError) -> Response {
    let status = error.status_code();
    if status.is_server_error() {
        tracing::error!("{}", error);
    } else {
        tracing::debug!("{}", error);
    }

    let message = match error {
        AppError::AccessControl(_) => "Access Forbidden".to_string(),
        other => format!("An error occurred: {}", other.message()),
    };
    let body = format!(
        "<div class=\"alert alert-error\" data-status=\"{}\">{}</div>\n",
        status.as_u16(),
        escape_html(&message)
    );
    (status, Html(page("Error", &body))).into_response()
}

/// HTML response with a 200 status.
pub fn ok_html(html: String) -> Response {
    (StatusCode::OK, Html(html)).into_response()
}
