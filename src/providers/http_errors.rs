use reqwest::StatusCode;
use serde::Deserialize;
use std::error::Error as StdError;
use std::io::ErrorKind;

use crate::error::RequestError;

const MAX_ERROR_BODY_CHARS: usize = 300;

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    pub(crate) message: String,
}

fn error_chain_has_io_kind(
    err: &(dyn StdError + 'static),
    kind: ErrorKind,
    needle: &str,
) -> bool {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(source) = current {
        if let Some(io_err) = source.downcast_ref::<std::io::Error>()
            && io_err.kind() == kind
        {
            return true;
        }

        if source.to_string().to_ascii_lowercase().contains(needle) {
            return true;
        }

        current = source.source();
    }

    false
}

fn error_chain_has_connection_refused(err: &(dyn StdError + 'static)) -> bool {
    error_chain_has_io_kind(err, ErrorKind::ConnectionRefused, "connection refused")
}

fn error_chain_has_timeout(err: &(dyn StdError + 'static)) -> bool {
    error_chain_has_io_kind(err, ErrorKind::TimedOut, "timed out")
}

pub(crate) fn model_api_request_error(
    err: reqwest::Error,
    api_url: &str,
    timeout_secs: u64,
) -> RequestError {
    let url = api_url.to_string();

    if err.is_timeout() || error_chain_has_timeout(&err) {
        return RequestError::Timeout { url, timeout_secs };
    }

    if err.is_connect() {
        if error_chain_has_connection_refused(&err) {
            return RequestError::ConnectionRefused { url };
        }
        return RequestError::Connect { url };
    }

    RequestError::Network {
        url,
        message: err.to_string(),
    }
}

/// Pulls `error.message` out of an OpenAI-style error body, falling back
/// to a shortened copy of the raw body.
pub(crate) fn api_error_message(body: &str) -> String {
    if let Ok(envelope) = serde_json::from_str::<ApiErrorEnvelope>(body) {
        return envelope.error.message;
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty response body>".to_string();
    }
    if trimmed.chars().count() > MAX_ERROR_BODY_CHARS {
        let head: String = trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect();
        return format!("{head}...");
    }
    trimmed.to_string()
}

pub(crate) fn model_api_status_error(status: StatusCode, body: &str) -> RequestError {
    let message = api_error_message(body);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RequestError::Unauthorized {
            status: status.as_u16(),
            message,
        },
        StatusCode::TOO_MANY_REQUESTS => RequestError::RateLimited { message },
        _ => RequestError::Status {
            status: status.as_u16(),
            message,
        },
    }
}
