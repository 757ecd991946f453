use std::time::Duration;

/// Failures of a single model call, classified so callers can decide
/// between retrying, surfacing, or giving up.
#[derive(Clone, Debug, thiserror::Error)]
pub enum GatewayError {
    // Fatal
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("unsupported model: {0}")]
    UnsupportedModel(String),
    #[error("missing credential: {0} is not set")]
    MissingCredential(&'static str),
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    // Retryable
    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },
    #[error("server error {status}: {body}")]
    ServerError { status: u16, body: String },
    #[error("network error: {0}")]
    NetworkError(String),
    #[error("stream interrupted: {0}")]
    StreamInterrupted(String),

    // Operational
    #[error("timeout after {0:?}")]
    Timeout(Duration),
    #[error("cancelled")]
    Cancelled,
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::ServerError { .. } | Self::NetworkError(_) | Self::StreamInterrupted(_)
        )
    }

    pub fn suggested_delay(&self) -> Option<Duration> {
        if let Self::RateLimited { retry_after } = self {
            *retry_after
        } else {
            None
        }
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed(_) => "authentication_failed",
            Self::InvalidRequest(_) => "invalid_request",
            Self::UnsupportedModel(_) => "unsupported_model",
            Self::MissingCredential(_) => "missing_credential",
            Self::MalformedResponse(_) => "malformed_response",
            Self::RateLimited { .. } => "rate_limited",
            Self::ServerError { .. } => "server_error",
            Self::NetworkError(_) => "network_error",
            Self::StreamInterrupted(_) => "stream_interrupted",
            Self::Timeout(_) => "timeout",
            Self::Cancelled => "cancelled",
        }
    }

    /// Classify an HTTP status code into the appropriate error variant.
    ///
    /// `retry_after` is the server's `Retry-After` hint and only matters for 429.
    pub fn from_status(status: u16, retry_after: Option<Duration>, body: String) -> Self {
        match status {
            401 | 403 => Self::AuthenticationFailed(body),
            400 | 404 | 422 => Self::InvalidRequest(body),
            429 => Self::RateLimited { retry_after },
            500..=599 => Self::ServerError { status, body },
            _ => Self::InvalidRequest(format!("unexpected status {status}: {body}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(GatewayError::RateLimited { retry_after: None }.is_retryable());
        assert!(GatewayError::ServerError { status: 503, body: "down".into() }.is_retryable());
        assert!(GatewayError::NetworkError("reset".into()).is_retryable());
        assert!(GatewayError::StreamInterrupted("eof".into()).is_retryable());
        assert!(!GatewayError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(!GatewayError::Cancelled.is_retryable());
    }

    #[test]
    fn model_resolution_errors_are_not_retried() {
        assert!(!GatewayError::UnsupportedModel("claude-3".into()).is_retryable());
        assert!(!GatewayError::MissingCredential("GLM_API_KEY").is_retryable());
        assert_eq!(GatewayError::UnsupportedModel("x".into()).error_kind(), "unsupported_model");
    }

    #[test]
    fn from_status_mapping() {
        assert!(matches!(
            GatewayError::from_status(401, None, "unauthorized".into()),
            GatewayError::AuthenticationFailed(_)
        ));
        assert!(matches!(
            GatewayError::from_status(404, None, "no such model".into()),
            GatewayError::InvalidRequest(_)
        ));
        assert!(GatewayError::from_status(429, None, "slow down".into()).is_retryable());
        assert!(GatewayError::from_status(502, None, "bad gateway".into()).is_retryable());
        assert!(matches!(
            GatewayError::from_status(418, None, "teapot".into()),
            GatewayError::InvalidRequest(msg) if msg.contains("418")
        ));
    }

    #[test]
    fn rate_limit_carries_retry_after() {
        let err = GatewayError::from_status(429, Some(Duration::from_secs(3)), "slow down".into());
        assert_eq!(err.suggested_delay(), Some(Duration::from_secs(3)));
        let err = GatewayError::from_status(503, Some(Duration::from_secs(3)), "busy".into());
        assert_eq!(err.suggested_delay(), None);
    }

    #[test]
    fn suggested_delay_only_for_rate_limit() {
        let rl = GatewayError::RateLimited { retry_after: Some(Duration::from_secs(2)) };
        assert_eq!(rl.suggested_delay(), Some(Duration::from_secs(2)));
        assert_eq!(GatewayError::NetworkError("x".into()).suggested_delay(), None);
    }

    #[test]
    fn missing_credential_message_names_variable() {
        let err = GatewayError::MissingCredential("GLM_API_KEY");
        assert_eq!(err.to_string(), "missing credential: GLM_API_KEY is not set");
        assert_eq!(err.error_kind(), "missing_credential");
    }
}
