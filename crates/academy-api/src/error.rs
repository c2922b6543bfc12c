use academy_core::ValidationError;
use academy_storage::StorageError;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("{0}")]
    MalformedBody(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::MalformedBody(_) => StatusCode::BAD_REQUEST,
            ApiError::Storage(StorageError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Storage(StorageError::BadRequest(_)) => StatusCode::BAD_REQUEST,
            ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn body(&self) -> ErrorBody {
        match self {
            ApiError::Validation(err) => ErrorBody {
                message: err.message.clone(),
                errors: Some(err.errors.clone()),
            },
            ApiError::MalformedBody(message) => ErrorBody {
                message: message.clone(),
                errors: None,
            },
            ApiError::Storage(StorageError::NotFound(message))
            | ApiError::Storage(StorageError::BadRequest(message)) => ErrorBody {
                message: message.clone(),
                errors: None,
            },
            ApiError::Storage(_) => ErrorBody {
                message: INTERNAL_ERROR_MESSAGE.to_string(),
                errors: None,
            },
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::MalformedBody(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::MalformedBody(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(event = "request_failed", status = status.as_u16(), error = %self);
        } else {
            warn!(event = "request_rejected", status = status.as_u16(), error = %self);
        }
        (status, Json(self.body())).into_response()
    }
}
