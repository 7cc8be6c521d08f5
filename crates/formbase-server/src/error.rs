use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use formbase_core::FieldError;
use formbase_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Validation failed")]
    Validation(Vec<String>),

    #[error("Too many fields: {count} (maximum {max})")]
    TooManyFields { count: usize, max: usize },

    #[error("Not found")]
    NotFound,

    #[error("{0}")]
    Conflict(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::Validation(messages) => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({
                    "error": "Validation failed",
                    "errors": messages,
                }),
            ),
            ApiError::TooManyFields { .. } => (
                StatusCode::PAYLOAD_TOO_LARGE,
                serde_json::json!({ "error": self.to_string() }),
            ),
            ApiError::NotFound => (
                StatusCode::NOT_FOUND,
                serde_json::json!({ "error": "Not found" }),
            ),
            ApiError::Conflict(_) => (
                StatusCode::CONFLICT,
                serde_json::json!({ "error": self.to_string() }),
            ),
            ApiError::BadRequest(_) => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({ "error": self.to_string() }),
            ),
            ApiError::Internal(detail) => {
                // Full detail goes to diagnostics, never to the client.
                tracing::error!(detail = %detail, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    serde_json::json!({ "error": "Internal server error" }),
                )
            }
        };

        (status, axum::Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ApiError::NotFound,
            StoreError::TitleTaken
            | StoreError::TemplateNameTaken
            | StoreError::CategoryNameTaken
            | StoreError::DuplicateFieldName
            | StoreError::CategoryInUse => ApiError::Conflict(err.to_string()),
            StoreError::InvalidFields(field_err) => field_err.into(),
            StoreError::InvalidSubmission(messages) => ApiError::Validation(messages),
            StoreError::InvalidColor(_) => ApiError::BadRequest(err.to_string()),
            // Transaction failures and id exhaustion are unexpected;
            // surface a generic failure.
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<FieldError> for ApiError {
    fn from(err: FieldError) -> Self {
        match err {
            FieldError::TooManyFields { count, max } => ApiError::TooManyFields { count, max },
            FieldError::Invalid(errors) => ApiError::Validation(errors.messages),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflicts_map_to_409() {
        let err: ApiError = StoreError::TitleTaken.into();
        assert!(matches!(err, ApiError::Conflict(_)));
        let err: ApiError = StoreError::DuplicateFieldName.into();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[test]
    fn field_count_maps_to_413_variant() {
        let err: ApiError = StoreError::InvalidFields(FieldError::TooManyFields {
            count: 120,
            max: 100,
        })
        .into();
        assert!(matches!(err, ApiError::TooManyFields { count: 120, max: 100 }));
    }

    #[test]
    fn unexpected_store_errors_are_internal() {
        let err: ApiError = StoreError::IdExhausted(5).into();
        assert!(matches!(err, ApiError::Internal(_)));
    }
}
