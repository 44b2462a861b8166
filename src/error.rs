// Gateway error types: structured error bodies for callers, typed errors for
// programmer/config failures.
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::repository::RepositoryError;

/// The `type` field of an [`ErrorBody`], mapped to an HTTP-equivalent status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    #[serde(rename = "Bad Request")]
    BadRequest,
    #[serde(rename = "Forbidden")]
    Forbidden,
    #[serde(rename = "error")]
    Error,
}

impl ErrorKind {
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::BadRequest => 400,
            ErrorKind::Forbidden => 403,
            // Validation/synchronization error collections also map to 400
            ErrorKind::Error => 400,
        }
    }
}

/// Structured error result returned to callers instead of a rendered object.
///
/// Shape: `{message, type, path, data}` where `path` names the entity or
/// attribute the error relates to and `data` carries error details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    pub path: String,
    pub data: Value,
}

impl ErrorBody {
    pub fn bad_request(message: impl Into<String>, path: impl Into<String>, data: Value) -> Self {
        Self { message: message.into(), kind: ErrorKind::BadRequest, path: path.into(), data }
    }

    pub fn forbidden(message: impl Into<String>, path: impl Into<String>, data: Value) -> Self {
        Self { message: message.into(), kind: ErrorKind::Forbidden, path: path.into(), data }
    }

    pub fn validation(message: impl Into<String>, path: impl Into<String>, data: Value) -> Self {
        Self { message: message.into(), kind: ErrorKind::Error, path: path.into(), data }
    }

    pub fn status_code(&self) -> u16 {
        self.kind.status_code()
    }

    pub fn to_json(&self) -> Value {
        json!({
            "message": self.message,
            "type": self.kind,
            "path": self.path,
            "data": self.data,
        })
    }
}

impl std::fmt::Display for ErrorBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Programmer and configuration errors. These are fatal for the current
/// request and propagate with `?`; malformed *data* never takes this path,
/// it is collected on the object graph instead.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("unknown entity '{0}'")]
    UnknownEntity(String),

    #[error("attribute '{attribute}' has no target entity configured")]
    MissingTargetEntity { attribute: String },

    #[error("unknown target entity '{target}' for attribute '{attribute}'")]
    UnknownTargetEntity { attribute: String, target: String },

    #[error("entity '{entity}' has no external source configured")]
    MissingSource { entity: String },

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("invalid schema definition: {0}")]
    InvalidSchema(String),
}

impl GatewayError {
    /// Convert a programmer/config error into a caller-facing error body.
    /// Never a partial silent success: every such failure surfaces as 4xx.
    pub fn to_error_body(&self, path: &str) -> ErrorBody {
        match self {
            GatewayError::Repository(err) => {
                tracing::error!("repository error on {}: {}", path, err);
                ErrorBody::bad_request(
                    "An error occurred while processing your request".to_string(),
                    path,
                    json!({}),
                )
            }
            other => ErrorBody::bad_request(other.to_string(), path, json!({})),
        }
    }
}
