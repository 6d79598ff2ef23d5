use thiserror::Error;

const AUTH_MARKERS: [&str; 4] = ["auth", "unauthorized", "jwt", "token"];

#[derive(Debug, Clone, Error)]
pub enum ConnectionError {
    #[error("invalid socket url: {0}")]
    InvalidUrl(String),

    #[error("DNS resolution failed: {0}")]
    DnsResolutionFailed(String),

    #[error("TLS handshake failed: {0}")]
    TlsHandshakeFailed(String),

    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("connection timeout")]
    Timeout,

    #[error("connection closed")]
    Closed,

    #[error("transport error: {0}")]
    TransportError(String),
}

impl ConnectionError {
    /// Whether this error means the credentials were rejected. Retrying with
    /// the same token cannot succeed.
    pub fn is_auth_failure(&self) -> bool {
        match self {
            ConnectionError::AuthenticationFailed(_) => true,
            ConnectionError::TransportError(message) => {
                let lower = message.to_ascii_lowercase();
                AUTH_MARKERS.iter().any(|marker| lower.contains(marker))
            }
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum WireError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("invalid `{event}` payload: {message}")]
    InvalidPayload { event: String, message: String },
}
