//! Tests for error types.

#[cfg(test)]
mod tests {
    use super::super::*;

    #[test]
    fn test_error_display() {
        let err = Error::config("invalid port");
        assert_eq!(err.to_string(), "configuration error: invalid port");
    }

    #[test]
    fn test_already_in_progress_display() {
        let err: Error = IndexingError::AlreadyInProgress.into();
        assert_eq!(err.to_string(), "indexing error: indexing already in progress");
        assert!(err.is_already_in_progress());
    }

    #[test]
    fn test_count_mismatch_display() {
        let err = IndexingError::EmbeddingCountMismatch {
            expected: 10,
            actual: 7,
        };
        assert_eq!(
            err.to_string(),
            "embedding count mismatch: submitted 10, received 7"
        );
    }

    #[test]
    fn test_empty_filter_display() {
        let err: Error = VectorStoreError::EmptyFilter.into();
        assert_eq!(
            err.to_string(),
            "vector store error: refusing to delete with an empty metadata filter"
        );
    }

    #[test]
    fn test_database_helper() {
        let err = VectorStoreError::database("failed to upsert", "disk I/O error");
        assert_eq!(err.to_string(), "database error: failed to upsert: disk I/O error");
    }

    #[test]
    fn test_parse_error_keeps_source() {
        use std::error::Error as _;

        let err = ParseError::Read {
            path: "src/A.java".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        assert!(err.to_string().starts_with("failed to read 'src/A.java'"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_embedding_error_conversion() {
        let emb_err = EmbeddingError::Status {
            status: 503,
            body: "busy".to_string(),
        };
        let err: Error = emb_err.into();
        assert!(matches!(err, Error::Embedding(_)));
        assert!(!err.is_already_in_progress());
    }

    #[test]
    fn test_watcher_error_conversion() {
        let watch_err = WatcherError::WatchFailed {
            path: "/tmp/test".to_string(),
            reason: "permission denied".to_string(),
        };
        let err: Error = watch_err.into();
        assert!(matches!(err, Error::Watcher(_)));
    }

    #[test]
    fn test_server_error_conversion() {
        let server_err = ServerError::BindFailed {
            address: "127.0.0.1:8765".to_string(),
            reason: "address in use".to_string(),
        };
        let err: Error = server_err.into();
        assert!(matches!(err, Error::Server(_)));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
