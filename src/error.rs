use thiserror::Error;

/// Errors that can occur in vektra.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// CSV report error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    /// Entity identifier not found in the dictionary.
    #[error("Entity not found: {0}")]
    EntityNotFound(String),
    /// Relation identifier not found in the dictionary.
    #[error("Relation not found: {0}")]
    RelationNotFound(String),
    /// Checkpoint or table shape does not match the model.
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),
    /// Invalid input or configuration.
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Result type alias for vektra.
pub type Result<T> = std::result::Result<T, Error>;
