use thiserror::Error;

/// Main error type for triplegraph
#[derive(Error, Debug)]
pub enum TriplegraphError {
    /// Embedded store (SQLite) errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Neo4j driver errors
    #[error("Graph database error: {0}")]
    GraphDb(#[from] neo4rs::Error),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// LLM API errors
    #[error("LLM API error: {0}")]
    Llm(String),

    /// Dependency parser service errors
    #[error("Parser error: {0}")]
    Parser(String),

    /// Parse errors (CoNLL-U, stored rows, JSON payloads)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Entity not found in the graph
    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Convenient Result type using TriplegraphError
pub type Result<T> = std::result::Result<T, TriplegraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TriplegraphError::Config("Test error".to_string());
        assert!(err.to_string().contains("Configuration error"));
        assert!(err.to_string().contains("Test error"));
    }

    #[test]
    fn test_error_from_rusqlite() {
        let rusqlite_err = rusqlite::Error::InvalidQuery;
        let err: TriplegraphError = rusqlite_err.into();
        assert!(matches!(err, TriplegraphError::Database(_)));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: TriplegraphError = io_err.into();
        assert!(matches!(err, TriplegraphError::Io(_)));
    }

    #[test]
    fn test_llm_error_display() {
        let err = TriplegraphError::Llm("429 Too Many Requests".to_string());
        assert_eq!(err.to_string(), "LLM API error: 429 Too Many Requests");
    }
}
