//! LLM error types with failure classification.
//!
//! Every failure of an upstream call lands in one of these kinds so the task
//! executor can record a precise error descriptor. Nothing here retries.

use std::time::Duration;

/// Error from LLM API calls.
#[derive(Debug, Clone)]
pub struct LlmError {
    /// The kind of error
    pub kind: LlmErrorKind,
    /// HTTP status code, if applicable
    pub status_code: Option<u16>,
    /// Error message
    pub message: String,
}

impl LlmError {
    /// Create a missing/invalid credential error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self {
            kind: LlmErrorKind::Configuration,
            status_code: None,
            message: message.into(),
        }
    }

    /// Create a timeout error for a request bounded by `timeout`.
    pub fn timeout(timeout: Duration, detail: impl std::fmt::Display) -> Self {
        Self {
            kind: LlmErrorKind::Timeout,
            status_code: None,
            message: format!("no response within {}s: {}", timeout.as_secs(), detail),
        }
    }

    /// Create a timeout error for a call abandoned by the caller's own
    /// deadline rather than the transport timeout.
    pub fn deadline_exceeded(deadline: Duration) -> Self {
        Self {
            kind: LlmErrorKind::Timeout,
            status_code: None,
            message: format!(
                "extraction abandoned after the {}ms task deadline",
                deadline.as_millis()
            ),
        }
    }

    /// Create a rate limit error.
    pub fn rate_limited(message: String) -> Self {
        Self {
            kind: LlmErrorKind::RateLimited,
            status_code: Some(429),
            message,
        }
    }

    /// Create a server error.
    pub fn server_error(status_code: u16, message: String) -> Self {
        Self {
            kind: LlmErrorKind::ServerError,
            status_code: Some(status_code),
            message,
        }
    }

    /// Create a client error (bad request, auth, etc.).
    pub fn client_error(status_code: u16, message: String) -> Self {
        Self {
            kind: LlmErrorKind::ClientError,
            status_code: Some(status_code),
            message,
        }
    }

    /// Create a network error.
    pub fn network_error(message: String) -> Self {
        Self {
            kind: LlmErrorKind::NetworkError,
            status_code: None,
            message,
        }
    }

    /// Create an error for a response body that is not a usable completion.
    pub fn invalid_response(message: String) -> Self {
        Self {
            kind: LlmErrorKind::InvalidResponse,
            status_code: None,
            message,
        }
    }

    /// Build an error from a non-success HTTP status and its body.
    pub fn from_status(status_code: u16, body: &str) -> Self {
        match classify_http_status(status_code) {
            LlmErrorKind::RateLimited => Self::rate_limited(body.to_string()),
            LlmErrorKind::ClientError => Self::client_error(status_code, body.to_string()),
            _ => Self::server_error(status_code, body.to_string()),
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == LlmErrorKind::Timeout
    }
}

impl std::fmt::Display for LlmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status_code {
            Some(code) => write!(f, "{} (HTTP {}): {}", self.kind, code, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for LlmError {}

/// Classification of LLM errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmErrorKind {
    /// No usable API credential
    Configuration,
    /// The bounded request timeout elapsed
    Timeout,
    /// Rate limited (429)
    RateLimited,
    /// Server error (5xx)
    ServerError,
    /// Client error (400, 401, 403, 404)
    ClientError,
    /// Connection failed or the request could not be sent
    NetworkError,
    /// The upstream answered but the envelope carried no text
    InvalidResponse,
}

impl LlmErrorKind {
    /// Taxonomy category used in task error descriptors.
    pub fn category(&self) -> &'static str {
        match self {
            LlmErrorKind::Configuration => "ConfigurationError",
            _ => "UpstreamError",
        }
    }
}

impl std::fmt::Display for LlmErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmErrorKind::Configuration => write!(f, "Configuration error"),
            LlmErrorKind::Timeout => write!(f, "Timeout"),
            LlmErrorKind::RateLimited => write!(f, "Rate limited"),
            LlmErrorKind::ServerError => write!(f, "Server error"),
            LlmErrorKind::ClientError => write!(f, "Client error"),
            LlmErrorKind::NetworkError => write!(f, "Network error"),
            LlmErrorKind::InvalidResponse => write!(f, "Invalid response"),
        }
    }
}

/// Parse HTTP status code into error kind.
pub fn classify_http_status(status: u16) -> LlmErrorKind {
    match status {
        429 => LlmErrorKind::RateLimited,
        400..=499 => LlmErrorKind::ClientError,
        _ => LlmErrorKind::ServerError,
    }
}
