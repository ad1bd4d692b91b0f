use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use inkpin_shared::record::RecordDecodeError;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("picture {0} not found")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("unsupported image: {0}")]
    BadImage(String),
    #[error("corrupt picture record {id}: {source}")]
    Corrupt {
        id: String,
        source: RecordDecodeError,
    },
    #[error("storage failure: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn status(&self) -> StatusCode {
        match self {
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::BadRequest(_) | StoreError::BadImage(_) => StatusCode::BAD_REQUEST,
            StoreError::Corrupt { .. } | StoreError::Backend(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(error: std::io::Error) -> Self {
        StoreError::Backend(error.to_string())
    }
}

impl From<image::ImageError> for StoreError {
    fn from(error: image::ImageError) -> Self {
        StoreError::BadImage(error.to_string())
    }
}

impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{self}");
        } else {
            tracing::debug!("{self}");
        }
        (status, self.to_string()).into_response()
    }
}
