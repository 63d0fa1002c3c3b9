//! Error types for schema loading and form processing.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FormError {
    #[error("Invalid JSON syntax: {0}")]
    SchemaSyntax(#[from] serde_json::Error),

    #[error("Schema error at {path}: {message}")]
    SchemaShape { path: String, message: String },

    #[error("Auto-fill error for {config_key}: {message}")]
    AutoFill { config_key: String, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl FormError {
    /// Shorthand for a path-qualified structural schema error.
    pub fn shape(path: impl Into<String>, message: impl Into<String>) -> Self {
        FormError::SchemaShape {
            path: path.into(),
            message: message.into(),
        }
    }
}
