use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum DlsError {
    #[error("invalid acquisition id: {0}")]
    InvalidAcquisitionId(String),

    #[error("invalid ARIA visit id: {0}")]
    InvalidVisitId(String),

    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("action {action} requires --{argument}")]
    MissingArgument {
        action: &'static str,
        argument: &'static str,
    },

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("SmartEM request failed: {0}")]
    SmartemHttp(String),

    #[error("SmartEM returned status {status}: {message}")]
    SmartemStatus { status: u16, message: String },

    #[error("SmartEM returned an unexpected payload: {0}")]
    SmartemPayload(String),

    #[error("ARIA client not available: {0}")]
    #[diagnostic(help("set aria.client_id and aria.client_secret (or ARIA_CLIENT_ID / ARIA_CLIENT_SECRET)"))]
    AriaUnavailable(String),

    #[error("ARIA login failed: {0}")]
    AriaAuth(String),

    #[error("ARIA request failed: {0}")]
    AriaHttp(String),

    #[error("ARIA returned status {status}: {message}")]
    AriaStatus { status: u16, message: String },

    #[error("No metadata found for project {0}. Run generate-metadata first.")]
    MissingMetadata(String),

    #[error("Failed to parse stored metadata: {0}")]
    MetadataParse(String),

    #[error("database error: {0}")]
    Store(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl DlsError {
    /// Process exit code: 2 for bad input or missing local state, 3 for a remote
    /// service failure, 1 otherwise.
    pub fn exit_code(&self) -> u8 {
        match self {
            DlsError::InvalidAcquisitionId(_)
            | DlsError::InvalidVisitId(_)
            | DlsError::UnknownAction(_)
            | DlsError::MissingArgument { .. }
            | DlsError::MissingMetadata(_)
            | DlsError::ConfigRead(_)
            | DlsError::ConfigParse(_) => 2,
            DlsError::SmartemHttp(_)
            | DlsError::SmartemStatus { .. }
            | DlsError::SmartemPayload(_)
            | DlsError::AriaHttp(_)
            | DlsError::AriaStatus { .. }
            | DlsError::AriaAuth(_) => 3,
            _ => 1,
        }
    }
}

impl From<rusqlite::Error> for DlsError {
    fn from(err: rusqlite::Error) -> Self {
        DlsError::Store(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_failure_class() {
        assert_eq!(DlsError::InvalidVisitId("x".to_string()).exit_code(), 2);
        assert_eq!(DlsError::MissingMetadata("p".to_string()).exit_code(), 2);
        assert_eq!(
            DlsError::SmartemStatus {
                status: 503,
                message: "busy".to_string()
            }
            .exit_code(),
            3
        );
        assert_eq!(DlsError::AriaAuth("denied".to_string()).exit_code(), 3);
        assert_eq!(DlsError::Store("locked".to_string()).exit_code(), 1);
    }
}
