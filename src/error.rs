use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

pub const RATE_LIMITED_MESSAGE: &str = "Too many requests. Please try again later.";
pub const MESSAGE_REQUIRED: &str = "Message is required.";
pub const INVALID_URL: &str = "Invalid URL provided.";
pub const INVALID_BODY: &str = "Invalid request body.";
pub const CRAWL_FAILED_MESSAGE: &str = "Failed to crawl the provided URL. Please try again.";
pub const UNEXPECTED_MESSAGE: &str = "An unexpected error occurred. Please try again later.";

/// Every way the relay endpoint can refuse a request.
///
/// The `String` payloads carry internal detail for the log; callers only ever
/// see the fixed text produced by [`RelayError::public_message`].
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("rate limit exceeded")]
    RateLimited,
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("enrichment failed: {0}")]
    EnrichmentFailed(String),
    #[error("completion upstream failed: {0}")]
    UpstreamFailed(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            RelayError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            RelayError::EnrichmentFailed(_)
            | RelayError::UpstreamFailed(_)
            | RelayError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn public_message(&self) -> &str {
        match self {
            RelayError::RateLimited => RATE_LIMITED_MESSAGE,
            RelayError::InvalidInput(msg) => msg.as_str(),
            RelayError::EnrichmentFailed(_) => CRAWL_FAILED_MESSAGE,
            RelayError::UpstreamFailed(_) | RelayError::Unexpected(_) => UNEXPECTED_MESSAGE,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.public_message(),
        });
        (self.status(), body).into_response()
    }
}
