use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum ContentError {
    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    #[error("Stored file not found: {path}")]
    BlobNotFound { path: String },

    #[error("{message}")]
    Conflict { message: String },

    #[error("Validation failed: {message}")]
    Validation { message: String },

    #[error("Storage error: {message}")]
    StorageError { message: String },

    #[error("Database error: {message}")]
    DatabaseError { message: String },

    #[error("IO error: {message}")]
    IoError { message: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Internal server error: {message}")]
    InternalError { message: String },
}

impl ContentError {
    pub fn validation(message: impl Into<String>) -> Self {
        ContentError::Validation {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ContentError::InternalError {
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ContentError::NotFound { .. } | ContentError::BlobNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            // Duplicate names surface as 400 on the public API.
            ContentError::Conflict { .. } | ContentError::Validation { .. } => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ContentError::NotFound { .. } | ContentError::BlobNotFound { .. } => "not_found",
            ContentError::Conflict { .. } => "conflict",
            ContentError::Validation { .. } => "validation_failed",
            _ => "internal_error",
        }
    }
}

impl From<std::io::Error> for ContentError {
    fn from(err: std::io::Error) -> Self {
        ContentError::IoError {
            message: err.to_string(),
        }
    }
}

impl From<diesel::result::Error> for ContentError {
    fn from(err: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error as DieselError};

        match err {
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                ContentError::Conflict {
                    message: format!("Unique constraint violated: {}", info.message()),
                }
            }
            DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, info) => {
                ContentError::NotFound {
                    resource: "Parent resource",
                    id: info.details().unwrap_or(info.message()).to_string(),
                }
            }
            other => ContentError::DatabaseError {
                message: other.to_string(),
            },
        }
    }
}

impl From<object_store::Error> for ContentError {
    fn from(err: object_store::Error) -> Self {
        match err {
            object_store::Error::NotFound { path, .. } => ContentError::BlobNotFound { path },
            other => ContentError::StorageError {
                message: other.to_string(),
            },
        }
    }
}

impl From<tokio::task::JoinError> for ContentError {
    fn from(err: tokio::task::JoinError) -> Self {
        ContentError::InternalError {
            message: format!("Background task failed: {}", err),
        }
    }
}

impl From<axum::extract::multipart::MultipartError> for ContentError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        ContentError::Validation {
            message: format!("Malformed multipart body: {}", err.body_text()),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for ContentError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }

        let body = ErrorBody {
            error: self.code(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping_follows_error_taxonomy() {
        let not_found = ContentError::NotFound {
            resource: "Workspace",
            id: "42".to_string(),
        };
        assert_eq!(not_found.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(not_found.to_string(), "Workspace not found: 42");

        let conflict = ContentError::Conflict {
            message: "Workspace with this name already exists.".to_string(),
        };
        assert_eq!(conflict.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(conflict.code(), "conflict");

        assert_eq!(
            ContentError::validation("not a csv").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ContentError::internal("boom").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_missing_object_maps_to_blob_not_found() {
        let err: ContentError = object_store::Error::NotFound {
            path: "a/b.txt".to_string(),
            source: "gone".into(),
        }
        .into();

        assert!(matches!(err, ContentError::BlobNotFound { ref path } if path == "a/b.txt"));
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }
}
