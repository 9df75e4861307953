//! Error types for ridguard.
//!
//! Most of the alert and audit path is deliberately infallible: malformed
//! options fall back to defaults and audit I/O failures are swallowed. The
//! errors here cover the places that do report failure to a caller, such as
//! opening the preference database, loading configuration, and driving
//! detection sources.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for ridguard operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Preference Store Errors ===
    /// Failed to open or create the preference database.
    #[error("failed to open preference store at {path}: {source}")]
    PreferenceOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A preference query failed.
    #[error("preference query failed: {0}")]
    PreferenceQuery(#[from] rusqlite::Error),

    /// Failed to run preference schema migrations.
    #[error("preference migration failed: {message}")]
    PreferenceMigration {
        /// Description of what went wrong.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    /// A settings key is not part of the recognized namespace.
    #[error("unknown setting '{key}'")]
    UnknownSetting {
        /// The rejected key.
        key: String,
    },

    // === Source Errors ===
    /// A detection source or position feed failed.
    #[error(transparent)]
    Source(#[from] crate::source::SourceError),

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized Result type for ridguard operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create an unknown setting error.
    #[must_use]
    pub fn unknown_setting(key: impl Into<String>) -> Self {
        Self::UnknownSetting { key: key.into() }
    }

    /// Check if this error came from a detection source or position feed.
    #[must_use]
    pub fn is_source_error(&self) -> bool {
        matches!(self, Self::Source(_))
    }
}
