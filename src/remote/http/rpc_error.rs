use reqwest::StatusCode;
use serde::Deserialize;

use crate::error::{not_found, transport_error, OrmError};

#[derive(Debug, Deserialize)]
struct GoogleErrorBody {
    error: Option<GoogleError>,
}

#[derive(Debug, Deserialize)]
struct GoogleError {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

/// Maps a failed REST response to an [`OrmError`].
///
/// `404` and a `NOT_FOUND` payload status become `orm/not-found`; everything else is
/// `orm/transport` carrying the service message, the HTTP status and the payload
/// status as the provider code.
pub fn map_http_error(status: StatusCode, body: &str) -> OrmError {
    let payload = extract_error_payload(body);
    let message = payload
        .as_ref()
        .and_then(|payload| payload.message.clone())
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("HTTP error").to_string());
    let payload_status = payload.and_then(|payload| payload.status);

    let error = if status == StatusCode::NOT_FOUND || payload_status.as_deref() == Some("NOT_FOUND") {
        not_found(message)
    } else {
        transport_error(message)
    };
    let error = error.with_status(status.as_u16());
    match payload_status {
        Some(code) => error.with_provider_code(code),
        None => error,
    }
}

/// Extracts the `error.message` field from a Google error payload.
pub fn extract_message(body: &str) -> Option<String> {
    extract_error_payload(body)
        .and_then(|payload| payload.message)
        .filter(|message| !message.is_empty())
}

fn extract_error_payload(body: &str) -> Option<GoogleError> {
    serde_json::from_str::<GoogleErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.error)
}
