//! Error normalization and the failure adapter: turning any upstream
//! failure into a transmittable response.

use egress_http::{Headers, head::reason_phrase};
use thiserror::Error;

use crate::descriptor::ResponseDescriptor;

/// The normalized error shape: an HTTP status, a JSON payload body, and a
/// header set. Everything the engine cannot transmit as intended is adapted
/// into one of these.
#[derive(Debug, Error)]
#[error("http error {status}: {message}")]
pub struct HttpError {
    status: u16,
    message: String,
    headers: Headers,
}

impl HttpError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            headers: Headers::new(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(500, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(404, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(400, message)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// The JSON body transmitted for this error.
    pub fn payload(&self) -> serde_json::Value {
        serde_json::json!({
            "statusCode": self.status,
            "error": reason_phrase(self.status),
            "message": self.message,
        })
    }

    /// Wrap an arbitrary failure into the normalized shape. An error that
    /// already is an [`HttpError`] passes through untouched; anything else
    /// becomes a 500.
    pub fn normalize(err: anyhow::Error) -> Self {
        match err.downcast::<HttpError>() {
            Ok(http) => http,
            Err(other) => Self::internal(other.to_string()),
        }
    }
}

/// Build the synthesized plain response for a normalized error: the error's
/// status, its JSON payload as the raw value, and its headers merged in.
pub(crate) fn to_response(error: &HttpError) -> ResponseDescriptor {
    let mut response = ResponseDescriptor::plain(error.payload()).code(error.status());
    for (name, values) in error.headers().iter() {
        response.headers_mut().set_all(name, values.to_vec());
    }
    response
}

#[cfg(test)]
mod tests {
    use super::{HttpError, to_response};

    #[test]
    fn payload_carries_status_reason_and_message() {
        let err = HttpError::new(404, "no such thing");
        assert_eq!(
            err.payload(),
            serde_json::json!({
                "statusCode": 404,
                "error": "Not Found",
                "message": "no such thing",
            })
        );
    }

    #[test]
    fn normalize_passes_http_errors_through() {
        let err = anyhow::Error::new(HttpError::new(429, "slow down"));
        let normalized = HttpError::normalize(err);
        assert_eq!(normalized.status(), 429);
        assert_eq!(normalized.message(), "slow down");
    }

    #[test]
    fn normalize_wraps_foreign_errors_as_500() {
        let err = anyhow::anyhow!("disk exploded");
        let normalized = HttpError::normalize(err);
        assert_eq!(normalized.status(), 500);
        assert_eq!(normalized.message(), "disk exploded");
    }

    #[test]
    fn to_response_merges_error_headers() {
        let err = HttpError::new(429, "slow down").with_header("retry-after", "30");
        let response = to_response(&err);
        assert_eq!(response.status(), 429);
        assert_eq!(response.headers().get("retry-after"), Some("30"));
        assert_eq!(response.raw(), Some(&err.payload()));
    }
}
