//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use quotamon_config::ConfigError;
use quotamon_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const CONFIG: i32 = 3;
    pub const UNAVAILABLE: i32 = 4;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Peer / data ──────────────────────────────────────────────────
    #[error("Language server not reachable: {message}")]
    #[diagnostic(
        code(quotamon::peer_not_found),
        help(
            "Make sure Antigravity is running and signed in.\n\
             Run with -vv to see which processes and ports were tried."
        )
    )]
    PeerNotFound { message: String },

    #[error("No quota data available: {message}")]
    #[diagnostic(
        code(quotamon::no_data),
        help(
            "Start Antigravity, or configure a fallback endpoint:\n\
             quotamon --remote-url https://... status"
        )
    )]
    NoQuotaData { message: String },

    #[error("{message}")]
    #[diagnostic(code(quotamon::request_failed))]
    Request { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(quotamon::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration file already exists at {path}")]
    #[diagnostic(
        code(quotamon::config_exists),
        help("Use `quotamon config init --force` to overwrite it.")
    )]
    ConfigExists { path: String },

    #[error(transparent)]
    #[diagnostic(
        code(quotamon::config),
        help("Check the file shown by `quotamon config path` and any QUOTAMON_* variables.")
    )]
    Config(#[from] ConfigError),

    // ── IO / Serialization ────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render output: {0}")]
    #[diagnostic(code(quotamon::render))]
    Render(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::PeerNotFound { .. } | Self::NoQuotaData { .. } | Self::Request { .. } => {
                exit_code::UNAVAILABLE
            }
            Self::Validation { .. } | Self::Config(ConfigError::Validation { .. }) => {
                exit_code::USAGE
            }
            Self::Config(_) | Self::ConfigExists { .. } => exit_code::CONFIG,
            Self::Io(_) | Self::Render(_) => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Discovery(e) => CliError::PeerNotFound {
                message: e.to_string(),
            },
            CoreError::Configuration { message } => CliError::Validation {
                field: "configuration".into(),
                reason: message,
            },
            CoreError::Protocol { .. } | CoreError::Parse { .. } => CliError::Request {
                message: err.to_string(),
            },
        }
    }
}
