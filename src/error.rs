//! Error types for the observable agent
//!
//! Every fault that reaches a log record or a health response goes through
//! [`sanitize_error_message`] first, so secrets never leave the process.

use patterns::redaction_patterns;
use thiserror::Error;

/// Main error type for agent operations
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    ConfigError(#[from] crate::config::ConfigError),

    #[error("Tool error: {0}")]
    ToolError(#[from] crate::tools::ToolError),

    #[error("Metrics error: {0}")]
    MetricsError(#[from] crate::observability::metrics::MetricsError),

    #[error("Server error: {message}")]
    ServerError { message: String },

    #[error("Internal error: {message}")]
    InternalError { message: String },
}

impl AgentError {
    /// Create server error
    pub fn server_error<S: Into<String>>(message: S) -> Self {
        Self::ServerError {
            message: message.into(),
        }
    }

    /// Create internal error
    pub fn internal_error<S: Into<String>>(message: S) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }

    /// Description safe to put in a log record or HTTP response
    pub fn sanitized(&self) -> String {
        sanitize_error_message(&self.to_string())
    }
}

/// Maximum length of a fault description after sanitization
const MAX_MESSAGE_LEN: usize = 500;

/// Sanitize error messages to prevent sensitive data leakage
pub fn sanitize_error_message(message: &str) -> String {
    let (secrets, paths) = redaction_patterns();

    let mut sanitized = secrets.replace_all(message, "${1}=***").to_string();
    sanitized = paths
        .replace_all(&sanitized, "/***REDACTED***/")
        .to_string();

    if sanitized.len() > MAX_MESSAGE_LEN {
        let truncate_suffix = "...[truncated]";
        let mut cut = MAX_MESSAGE_LEN - truncate_suffix.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized = format!("{}{}", &sanitized[..cut], truncate_suffix);
    }

    sanitized
}

mod patterns {
    use regex::Regex;
    use std::sync::OnceLock;

    static SECRETS: OnceLock<Regex> = OnceLock::new();
    static PATHS: OnceLock<Regex> = OnceLock::new();

    pub(super) fn redaction_patterns() -> (&'static Regex, &'static Regex) {
        let secrets = SECRETS.get_or_init(|| {
            Regex::new(r"(?i)(password|token|key|secret)[=:]\s*\S+").expect("valid regex")
        });
        let paths = PATHS.get_or_init(|| {
            Regex::new(r"/[a-zA-Z0-9._/-]+/(secrets?|\.ssh|\.aws|\.config)/[a-zA-Z0-9._/-]+")
                .expect("valid regex")
        });
        (secrets, paths)
    }
}

/// Result type for agent operations
pub type AgentResult<T> = Result<T, AgentError>;
