use thiserror::Error;

/// Top-level error type for the `quotamon-api` crate.
///
/// Covers every failure mode of the two HTTP surfaces (local peer and
/// remote endpoint). Discovery failures have their own type,
/// [`DiscoveryError`](crate::locator::DiscoveryError), because they are
/// expected whenever the peer is not running.
/// `quotamon-core` maps both into its own taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, reset, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS setup or HTTP client construction failed.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Protocol ────────────────────────────────────────────────────
    /// The endpoint answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    HttpStatus { status: u16, message: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Map a `reqwest` send error, turning timeouts into [`Error::Timeout`].
    pub(crate) fn from_send(err: reqwest::Error, timeout: std::time::Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                timeout_secs: timeout.as_secs(),
            }
        } else {
            Self::Transport(err)
        }
    }

    /// Build a [`Error::Deserialization`] with a short body preview in the message.
    pub(crate) fn deserialization(err: &serde_json::Error, body: &str) -> Self {
        let preview: String = body.chars().take(200).collect();
        Self::Deserialization {
            message: format!("{err} (body preview: {preview:?})"),
            body: body.to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_status_and_timeout() {
        let err = Error::Timeout { timeout_secs: 3 };
        assert_eq!(err.to_string(), "Request timed out after 3s");

        let err = Error::HttpStatus {
            status: 401,
            message: "unauthorized".into(),
        };
        assert_eq!(err.to_string(), "HTTP 401: unauthorized");
    }

    #[test]
    fn deserialization_preview_is_truncated() {
        let body = "x".repeat(500);
        let json_err = serde_json::from_str::<serde_json::Value>(&body).unwrap_err();
        let err = Error::deserialization(&json_err, &body);
        match err {
            Error::Deserialization { message, body: raw } => {
                assert!(message.len() < 400);
                assert_eq!(raw.len(), 500);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
