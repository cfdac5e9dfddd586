//! Re-ranking error types.
//!
//! Each variant carries a stable code included in the Display output and
//! accessible via [`RerankError::code()`]. The code is what gets written
//! into an experiment record, so codes never change.

use crate::retry::Retryable;

/// Stable error codes for re-ranking failures.
pub mod error_codes {
    /// Credentials rejected (401/403).
    pub const AUTH_FAILED: &str = "AUTH_FAILED";
    /// Request rejected as malformed (400/422).
    pub const BAD_REQUEST: &str = "BAD_REQUEST";
    /// Rate limit hit (429).
    pub const RATE_LIMITED: &str = "RATE_LIMITED";
    /// Call exceeded its timeout.
    pub const TIMEOUT_ERROR: &str = "TIMEOUT_ERROR";
    /// Endpoint returned a 5xx status (including "model loading").
    pub const SERVER_ERROR: &str = "SERVER_ERROR";
    /// Connection could not be established or was reset.
    pub const CONNECTION_FAILED: &str = "CONNECTION_FAILED";
    /// Response body did not have the expected shape.
    pub const MALFORMED_RESPONSE: &str = "MALFORMED_RESPONSE";
    /// Any other HTTP status.
    pub const PROVIDER_ERROR: &str = "PROVIDER_ERROR";
}

/// Errors produced by a text generator call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RerankError {
    #[error("[{}] {}", error_codes::AUTH_FAILED, .0)]
    Auth(String),

    #[error("[{}] {}", error_codes::BAD_REQUEST, .0)]
    BadRequest(String),

    #[error("[{}] {}", error_codes::RATE_LIMITED, .0)]
    RateLimited(String),

    #[error("[{}] {}", error_codes::TIMEOUT_ERROR, .0)]
    Timeout(String),

    #[error("[{}] {}", error_codes::SERVER_ERROR, .0)]
    Server(String),

    #[error("[{}] {}", error_codes::CONNECTION_FAILED, .0)]
    Connection(String),

    #[error("[{}] {}", error_codes::MALFORMED_RESPONSE, .0)]
    MalformedResponse(String),

    #[error("[{}] {}", error_codes::PROVIDER_ERROR, .0)]
    Provider(String),
}

impl RerankError {
    /// Returns the stable error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Auth(_) => error_codes::AUTH_FAILED,
            Self::BadRequest(_) => error_codes::BAD_REQUEST,
            Self::RateLimited(_) => error_codes::RATE_LIMITED,
            Self::Timeout(_) => error_codes::TIMEOUT_ERROR,
            Self::Server(_) => error_codes::SERVER_ERROR,
            Self::Connection(_) => error_codes::CONNECTION_FAILED,
            Self::MalformedResponse(_) => error_codes::MALFORMED_RESPONSE,
            Self::Provider(_) => error_codes::PROVIDER_ERROR,
        }
    }

    /// Returns the inner message without the code prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Auth(m)
            | Self::BadRequest(m)
            | Self::RateLimited(m)
            | Self::Timeout(m)
            | Self::Server(m)
            | Self::Connection(m)
            | Self::MalformedResponse(m)
            | Self::Provider(m) => m,
        }
    }

    /// Returns true for transient failures: rate limits, timeouts, 5xx and
    /// connection errors. Auth and request-shape failures are final.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited(_) | Self::Timeout(_) | Self::Server(_) | Self::Connection(_)
        )
    }
}

impl Retryable for RerankError {
    fn is_retryable(&self) -> bool {
        RerankError::is_retryable(self)
    }
}

/// Map a non-success HTTP status to a [`RerankError`].
pub fn map_http_error(status: reqwest::StatusCode, body: &str) -> RerankError {
    let detail = extract_error_message(body);
    match status.as_u16() {
        401 | 403 => RerankError::Auth(detail),
        400 | 422 => RerankError::BadRequest(detail),
        429 => RerankError::RateLimited(detail),
        s if s >= 500 => RerankError::Server(format!("HTTP {s}: {detail}")),
        s => RerankError::Provider(format!("HTTP {s}: {detail}")),
    }
}

/// Map a transport-level failure to a [`RerankError`].
pub fn map_transport_error(err: &reqwest::Error) -> RerankError {
    if err.is_timeout() {
        RerankError::Timeout(err.to_string())
    } else if err.is_connect() || err.is_request() {
        RerankError::Connection(err.to_string())
    } else if err.is_decode() {
        RerankError::MalformedResponse(err.to_string())
    } else {
        RerankError::Provider(err.to_string())
    }
}

/// Pull a readable message out of an inference error body.
///
/// Inference endpoints answer `{"error": "..."}` or
/// `{"error": {"message": "..."}}`; anything else is truncated verbatim.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            let error = v.get("error")?;
            error
                .as_str()
                .or_else(|| error.get("message").and_then(|m| m.as_str()))
                .map(String::from)
        })
        .unwrap_or_else(|| {
            if body.is_empty() {
                "no response body".to_string()
            } else {
                body.chars().take(500).collect()
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn display_includes_code() {
        let err = RerankError::Auth("invalid token".into());
        assert_eq!(err.to_string(), "[AUTH_FAILED] invalid token");
        assert_eq!(err.message(), "invalid token");
    }

    #[test]
    fn transient_errors_are_retryable() {
        assert!(RerankError::RateLimited("x".into()).is_retryable());
        assert!(RerankError::Timeout("x".into()).is_retryable());
        assert!(RerankError::Server("x".into()).is_retryable());
        assert!(RerankError::Connection("x".into()).is_retryable());
    }

    #[test]
    fn fatal_errors_are_not_retryable() {
        assert!(!RerankError::Auth("x".into()).is_retryable());
        assert!(!RerankError::BadRequest("x".into()).is_retryable());
        assert!(!RerankError::MalformedResponse("x".into()).is_retryable());
        assert!(!RerankError::Provider("x".into()).is_retryable());
    }

    #[test]
    fn status_mapping() {
        assert_eq!(map_http_error(StatusCode::UNAUTHORIZED, "").code(), "AUTH_FAILED");
        assert_eq!(map_http_error(StatusCode::FORBIDDEN, "").code(), "AUTH_FAILED");
        assert_eq!(map_http_error(StatusCode::BAD_REQUEST, "").code(), "BAD_REQUEST");
        assert_eq!(
            map_http_error(StatusCode::UNPROCESSABLE_ENTITY, "").code(),
            "BAD_REQUEST"
        );
        assert_eq!(
            map_http_error(StatusCode::TOO_MANY_REQUESTS, "").code(),
            "RATE_LIMITED"
        );
        assert_eq!(
            map_http_error(StatusCode::SERVICE_UNAVAILABLE, "").code(),
            "SERVER_ERROR"
        );
        assert_eq!(map_http_error(StatusCode::NOT_FOUND, "").code(), "PROVIDER_ERROR");
    }

    #[test]
    fn error_message_extracted_from_json_body() {
        let err = map_http_error(
            StatusCode::SERVICE_UNAVAILABLE,
            r#"{"error":"Model is currently loading","estimated_time":20.0}"#,
        );
        assert!(err.message().contains("Model is currently loading"));

        let err = map_http_error(
            StatusCode::BAD_REQUEST,
            r#"{"error":{"message":"inputs too long"}}"#,
        );
        assert_eq!(err.message(), "inputs too long");
    }

    #[test]
    fn empty_body_message() {
        let err = map_http_error(StatusCode::UNAUTHORIZED, "");
        assert_eq!(err.message(), "no response body");
    }
}
