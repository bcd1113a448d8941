use actix_web::HttpResponse;
use actix_web::http::StatusCode;
use serde_json::json;
use thiserror::Error;

/// Error taxonomy for one relay request. `Validation` is surfaced with a 400
/// before anything is streamed; the rest become the terminal `error` event
/// once a stream is open. `Storage` never reaches the client at all, it is
/// logged and swallowed at the call site.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("{0}")]
    Validation(String),

    #[error("{message}")]
    Upstream { status: u16, message: String },

    #[error("{0}")]
    Stream(String),

    #[error("image generation timed out")]
    Timeout,

    #[error("blob store: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, RelayError>;

impl actix_web::ResponseError for RelayError {
    fn status_code(&self) -> StatusCode {
        match self {
            RelayError::Validation(_) => StatusCode::BAD_REQUEST,
            RelayError::Upstream { .. } | RelayError::Stream(_) => StatusCode::BAD_GATEWAY,
            RelayError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            RelayError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "error": self.to_string() }))
    }
}
