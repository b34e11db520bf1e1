use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use gingga_core::errors::{ApplicationError, InterfaceError};

/// Handler error; renders as `{"error": {code, message, correlationId}}`.
#[derive(Debug)]
pub struct ApiError(pub InterfaceError);

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: ErrorDetail<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorDetail<'a> {
    code: &'static str,
    message: String,
    correlation_id: &'a str,
}

impl ApiError {
    pub fn new(error: impl Into<ApplicationError>, correlation_id: &str) -> Self {
        Self(error.into().into_interface(correlation_id))
    }

    pub fn bad_request(message: impl Into<String>, correlation_id: &str) -> Self {
        Self(InterfaceError::BadRequest {
            message: message.into(),
            correlation_id: correlation_id.to_string(),
        })
    }

    pub fn status(&self) -> StatusCode {
        match &self.0 {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            InterfaceError::Forbidden { .. } => StatusCode::FORBIDDEN,
            InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
            InterfaceError::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            InterfaceError::ServiceUnavailable { .. } | InterfaceError::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn code(&self) -> &'static str {
        match &self.0 {
            InterfaceError::BadRequest { .. } => "bad_request",
            InterfaceError::Unauthorized { .. } => "unauthorized",
            InterfaceError::Forbidden { .. } => "forbidden",
            InterfaceError::NotFound { .. } => "not_found",
            InterfaceError::TooManyRequests { .. } => "rate_limited",
            InterfaceError::ServiceUnavailable { .. } | InterfaceError::Internal { .. } => {
                "internal"
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.0.is_server_error() {
            tracing::error!(
                event_name = "server.request.failed",
                correlation_id = %self.0.correlation_id(),
                error = %self.0,
                "request failed"
            );
        }

        let status = self.status();
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code(),
                message: self.0.user_message(),
                correlation_id: self.0.correlation_id(),
            },
        };
        let mut response = (status, Json(body)).into_response();
        if let InterfaceError::TooManyRequests { retry_after_secs, .. } = &self.0 {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

/// Attaches the request's correlation id while converting an error.
pub trait Correlate<T> {
    fn correlate(self, correlation_id: &str) -> Result<T, ApiError>;
}

impl<T, E> Correlate<T> for Result<T, E>
where
    E: Into<ApplicationError>,
{
    fn correlate(self, correlation_id: &str) -> Result<T, ApiError> {
        self.map_err(|error| ApiError::new(error, correlation_id))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{header, StatusCode};
    use axum::response::IntoResponse;

    use gingga_core::errors::{ApplicationError, DomainError};

    use super::ApiError;

    #[tokio::test]
    async fn rate_limit_sets_retry_after() {
        let response = ApiError::new(DomainError::RateLimited { retry_after_secs: 42 }, "req-1")
            .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).map(|v| v.as_bytes()), Some(&b"42"[..]));
    }

    #[tokio::test]
    async fn persistence_failure_is_a_generic_500() {
        let response = ApiError::new(ApplicationError::Persistence("disk I/O error".to_string()), "req-2")
            .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let body: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(body["error"]["code"], "internal");
        assert_eq!(body["error"]["correlationId"], "req-2");
        assert!(!body["error"]["message"].as_str().unwrap_or_default().contains("disk"));
    }
}
