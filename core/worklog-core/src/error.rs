//! Error types for worklog-core operations.
//! Estimator failures never appear here: they degrade to a zero delta.

use std::path::PathBuf;

/// All errors that can occur in worklog-core operations.
#[derive(Debug, thiserror::Error)]
pub enum WorklogError {
    // ─────────────────────────────────────────────────────────────────────
    // Startup / Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Repository path not found: {0}")]
    RepoNotFound(PathBuf),

    #[error("Home directory not found")]
    HomeNotFound,

    #[error("Configuration file malformed: {path}: {details}")]
    Config { path: PathBuf, details: String },

    // ─────────────────────────────────────────────────────────────────────
    // Session Lifecycle Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("No active session")]
    NoActiveSession,

    #[error("Session {session_id} is already finalized")]
    SessionAlreadyFinalized { session_id: String },

    #[error("Session {session_id} has not been finalized")]
    SessionNotFinalized { session_id: String },

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    // ─────────────────────────────────────────────────────────────────────
    // Store Integrity Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Session {session_id} is already recorded")]
    AlreadyRecorded { session_id: String },

    #[error("Changelog entry already exists: {0}")]
    DuplicateEntry(String),

    #[error("Database error: {context}: {source}")]
    Database {
        context: String,
        #[source]
        source: rusqlite::Error,
    },

    // ─────────────────────────────────────────────────────────────────────
    // I/O Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl WorklogError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        WorklogError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        WorklogError::Json {
            context: context.into(),
            source,
        }
    }

    pub fn database(context: impl Into<String>, source: rusqlite::Error) -> Self {
        WorklogError::Database {
            context: context.into(),
            source,
        }
    }

    /// The row already exists; retrying the same write cannot succeed.
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            WorklogError::AlreadyRecorded { .. } | WorklogError::DuplicateEntry(_)
        )
    }
}

/// Convenience type alias for Results using WorklogError.
pub type Result<T> = std::result::Result<T, WorklogError>;

impl From<WorklogError> for String {
    fn from(err: WorklogError) -> String {
        err.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_duplicates_are_integrity_failures() {
        assert!(WorklogError::AlreadyRecorded {
            session_id: "s1".to_string()
        }
        .is_integrity());
        assert!(WorklogError::DuplicateEntry("2026-03-01 aoem-core".to_string()).is_integrity());
        assert!(!WorklogError::InvalidInput("bad date".to_string()).is_integrity());
        assert!(!WorklogError::io("read", std::io::Error::other("disk")).is_integrity());
    }
}
