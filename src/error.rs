use std::{fmt, io};

use http::status::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Error as JsonError;
use serde_yaml::Error as YamlError;
use thiserror::Error;
use url::ParseError as UrlParseError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum OpenRefError {
    #[error("Document error: {0}")]
    Document(String),
    #[error("File System error: {0}")]
    Io(String),
    #[error("Item Not Found: {0}")]
    NotFound(String),
    #[error("You do not have permission to access this resource")]
    PermissionDenied,
    #[error("Invalid reference pointer '{pointer}': {reason}")]
    Pointer { pointer: String, reason: String },
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Query '{id}' timed out after {millis}ms")]
    Timeout { id: String, millis: u64 },
    #[error("Remote endpoint returned status {status}: {body}")]
    RemoteStatus { status: u16, body: String },
}

impl OpenRefError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            OpenRefError::Document(_) => StatusCode::BAD_REQUEST,
            OpenRefError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            OpenRefError::NotFound(_) => StatusCode::NOT_FOUND,
            OpenRefError::PermissionDenied => StatusCode::FORBIDDEN,
            OpenRefError::Pointer { .. } => StatusCode::BAD_REQUEST,
            OpenRefError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            OpenRefError::Transport(_) => StatusCode::BAD_GATEWAY,
            OpenRefError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            OpenRefError::RemoteStatus { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
        }
    }
}

impl From<JsonError> for OpenRefError {
    fn from(src: JsonError) -> OpenRefError {
        OpenRefError::Serialization(format!("JSON (de)serialization error: {src}"))
    }
}

impl From<YamlError> for OpenRefError {
    fn from(src: YamlError) -> OpenRefError {
        OpenRefError::Serialization(format!("YAML (de)serialization error: {src}"))
    }
}

impl From<toml::de::Error> for OpenRefError {
    fn from(src: toml::de::Error) -> OpenRefError {
        OpenRefError::Serialization(format!("Toml deserialization error: {src}"))
    }
}

impl From<toml::ser::Error> for OpenRefError {
    fn from(src: toml::ser::Error) -> OpenRefError {
        OpenRefError::Serialization(format!("Toml serialization error: {src}"))
    }
}

impl From<UrlParseError> for OpenRefError {
    fn from(src: UrlParseError) -> OpenRefError {
        OpenRefError::Serialization(format!("Invalid URL: {src}"))
    }
}

impl From<io::Error> for OpenRefError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => OpenRefError::NotFound(format!("{x}")),
            io::ErrorKind::PermissionDenied => OpenRefError::PermissionDenied,
            _ => OpenRefError::Io(format!("IOError: {}", x.kind())),
        }
    }
}

impl From<fmt::Error> for OpenRefError {
    fn from(x: fmt::Error) -> Self {
        OpenRefError::Serialization(format!("{x}"))
    }
}

impl From<reqwest::Error> for OpenRefError {
    fn from(x: reqwest::Error) -> Self {
        if let Some(status) = x.status() {
            OpenRefError::RemoteStatus {
                status: status.as_u16(),
                body: format!("{x}"),
            }
        } else {
            OpenRefError::Transport(format!("HTTP request failed: {x}"))
        }
    }
}

impl From<regex::Error> for OpenRefError {
    fn from(x: regex::Error) -> Self {
        OpenRefError::Serialization(format!("Regex parse failed: {x}"))
    }
}
