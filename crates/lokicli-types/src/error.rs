use thiserror::Error;

/// Errors raised anywhere between the CLI and the query service
#[derive(Debug, Error)]
pub enum LokiError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Validation(String),

    #[error("Error fetching logs: {status}. Response: {body}")]
    Fetch { status: u16, body: String },

    #[error(
        "Error fetching logs: {status}. Please ensure the regex query is according to the Google RE2 syntax. {body}"
    )]
    QuerySyntax { status: u16, body: String },

    #[error("Interrupted by user")]
    Cancelled,

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error(
        "No logs found for {app} in {project} project for the specified time range. Please check the app name, project and time range."
    )]
    AppNotFound { app: String, project: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LokiError {
    /// Classify a non-200 response from the query service.
    ///
    /// The service only reports a rejected regex through the body text, so
    /// this is a substring check.
    pub fn from_response(status: u16, body: String) -> Self {
        if body.contains("parse error") {
            Self::QuerySyntax { status, body }
        } else {
            Self::Fetch { status, body }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, LokiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_is_query_syntax() {
        let err = LokiError::from_response(400, "parse error at line 1, col 30".to_string());
        assert!(matches!(err, LokiError::QuerySyntax { status: 400, .. }));
        assert!(err.to_string().contains("RE2"));
    }

    #[test]
    fn test_other_failures_are_fetch_errors() {
        let err = LokiError::from_response(502, "bad gateway".to_string());
        assert!(matches!(err, LokiError::Fetch { status: 502, .. }));
        assert!(!err.is_cancelled());
    }
}
