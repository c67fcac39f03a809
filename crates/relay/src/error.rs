use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Error type for HTTP handlers.
///
/// Responses carry a short plain-text body; clients match on the status.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Unsupported Media Type")]
    UnsupportedMediaType,

    #[error("Upgrade Required")]
    UpgradeRequired,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("Not Found")]
    NotFound,

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::UpgradeRequired => StatusCode::UPGRADE_REQUIRED,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                return (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response();
            }
        };

        (status, self.to_string()).into_response()
    }
}
