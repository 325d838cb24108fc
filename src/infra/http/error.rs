use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use portfolio_api_types::ErrorBody;

use crate::application::error::{AppError, ErrorReport};

/// JSON error response: `{"error": "<public message>"}` plus a diagnostic
/// report for the logging middleware.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    report: ErrorReport,
}

impl ApiError {
    pub fn new(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            status,
            message: message.into(),
            report: ErrorReport::from_message(source, status, detail),
        }
    }

    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self::new(
            "infra::http::auth",
            StatusCode::UNAUTHORIZED,
            "Unauthorized",
            detail,
        )
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(
            "infra::http::request",
            StatusCode::BAD_REQUEST,
            message.clone(),
            message,
        )
    }

    pub fn internal(source: &'static str, detail: impl Into<String>) -> Self {
        Self::new(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error",
            detail,
        )
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn rate_limited(retry_after: u64) -> Response {
        let mut response = Self::new(
            "infra::http::rate_limit",
            StatusCode::TOO_MANY_REQUESTS,
            "Too many requests, please try again later",
            format!("rate_limited: retry_after={retry_after}"),
        )
        .into_response();
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
        response
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        let status = err.status_code();
        Self {
            status,
            message: err.public_message(),
            report: ErrorReport::from_error("application::error::AppError", status, &err),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let status = rejection.status();
        Self {
            status,
            message: "Invalid request body".to_string(),
            report: ErrorReport::from_error("infra::http::json", status, &rejection),
        }
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        let status = match rejection.status() {
            StatusCode::INTERNAL_SERVER_ERROR => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        };
        Self {
            status,
            message: "Invalid path parameter".to_string(),
            report: ErrorReport::from_error("infra::http::path", status, &rejection),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message,
        };
        let mut response = (self.status, Json(body)).into_response();
        self.report.attach(&mut response);
        response
    }
}
