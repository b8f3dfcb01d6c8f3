// ── Core error types ──
//
// Outcomes of one fetch attempt. These never escape the orchestrator as
// faults: every cycle ends in a `FetchResult`, and these only shape its
// error string. The `From<quotamon_api::Error>` impl sorts transport-layer
// failures into the four kinds consumers care about.

use thiserror::Error;

use quotamon_api::DiscoveryError;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Discovery ───────────────────────────────────────────────────
    /// The peer could not be located. Expected whenever it is not running.
    #[error("{0}")]
    Discovery(#[from] DiscoveryError),

    // ── Protocol ────────────────────────────────────────────────────
    /// Transport failure, timeout, or error status from a source.
    #[error("Request failed: {message}")]
    Protocol { message: String },

    // ── Configuration ───────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    // ── Data ────────────────────────────────────────────────────────
    /// Malformed peer or remote payload.
    #[error("Unreadable response: {message}")]
    Parse { message: String },
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<quotamon_api::Error> for CoreError {
    fn from(err: quotamon_api::Error) -> Self {
        match err {
            quotamon_api::Error::Deserialization { message, body: _ } => {
                CoreError::Parse { message }
            }
            quotamon_api::Error::InvalidUrl(e) => CoreError::Configuration {
                message: format!("Invalid URL: {e}"),
            },
            quotamon_api::Error::Tls(message) => CoreError::Configuration { message },
            quotamon_api::Error::Timeout { timeout_secs } => CoreError::Protocol {
                message: format!("timed out after {timeout_secs}s"),
            },
            other @ (quotamon_api::Error::Transport(_)
            | quotamon_api::Error::HttpStatus { .. }) => CoreError::Protocol {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_errors_map_to_core_kinds() {
        let timeout: CoreError = quotamon_api::Error::Timeout { timeout_secs: 10 }.into();
        assert!(matches!(timeout, CoreError::Protocol { .. }));
        assert!(timeout.to_string().contains("10s"));

        let status: CoreError = quotamon_api::Error::HttpStatus {
            status: 502,
            message: "bad gateway".into(),
        }
        .into();
        assert!(matches!(status, CoreError::Protocol { .. }));

        let parse: CoreError = quotamon_api::Error::Deserialization {
            message: "expected value".into(),
            body: "<html>".into(),
        }
        .into();
        assert!(matches!(parse, CoreError::Parse { .. }));
    }

    #[test]
    fn discovery_errors_keep_their_message() {
        let err: CoreError = DiscoveryError::NoListeningPorts { pid: 7 }.into();
        assert!(matches!(err, CoreError::Discovery(_)));
        assert_eq!(err.to_string(), "language server process 7 has no listening ports");
    }
}
