use std::time::Duration;
use thiserror::Error;

/// Message used when no better description of a failure is available.
pub const FALLBACK_MESSAGE: &str = "Upload failed";

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("HTTP Request error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Invalid response body: {0}")]
    InvalidBody(#[from] serde_json::Error),

    #[error("Server error: status code {status_code}")]
    ServerError {
        status_code: u16,
        message: Option<String>,
    },

    /// The upload target provider refused to issue a target.
    #[error("{0}")]
    Rejected(String),

    #[error("Upload timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("Upload manager shut down")]
    ManagerShutdown,

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl UploadError {
    pub fn server_error(status_code: u16, message: Option<String>) -> Self {
        Self::ServerError {
            status_code,
            message,
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError(message.into())
    }

    /// Human readable cause surfaced on the `error` progress event.
    ///
    /// A message carried by the response body wins, then the error's own
    /// description, then [`FALLBACK_MESSAGE`]. Never returns an empty string.
    pub fn describe(&self) -> String {
        let message = match self {
            Self::ServerError { message: Some(message), .. } => message.trim().to_string(),
            Self::ServerError { status_code, message: None } => {
                format!("{FALLBACK_MESSAGE} with status {status_code}")
            }
            Self::Rejected(message) => message.trim().to_string(),
            other => other.to_string(),
        };

        if message.is_empty() {
            FALLBACK_MESSAGE.to_string()
        } else {
            message
        }
    }
}

/// Pull a `message` out of an error response body.
///
/// Understands the JSON `{"message": ...}` shape returned by the issuance and
/// listing endpoints and the XML `<Message>` element object stores answer with.
pub fn message_from_body(body: &str) -> Option<String> {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(message) = value.get("message").and_then(|m| m.as_str()) {
            if !message.trim().is_empty() {
                return Some(message.to_string());
            }
        }
    }

    let start = body.find("<Message>")? + "<Message>".len();
    let end = body[start..].find("</Message>")? + start;
    let message = body[start..end].trim();
    (!message.is_empty()).then(|| message.to_string())
}

/// Error alias
pub type Result<T, E = UploadError> = std::result::Result<T, E>;
