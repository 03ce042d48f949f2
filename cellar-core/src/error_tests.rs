/*!
Tests for error handling and error types.
*/

#[cfg(test)]
mod tests {
    use crate::error::CellarError;
    use std::io;
    use std::path::PathBuf;

    #[test]
    fn test_cellar_error_display() {
        let error = CellarError::validation("test validation error");
        assert_eq!(error.to_string(), "Validation error: test validation error");

        let error = CellarError::database("no such table: users");
        assert_eq!(error.to_string(), "Database error: no such table: users");

        let error = CellarError::archive_creation("tar exited with status 2");
        assert_eq!(
            error.to_string(),
            "Archive creation failed: tar exited with status 2"
        );
    }

    #[test]
    fn test_path_errors_name_the_path() {
        let error = CellarError::not_found("/app/uploads");
        assert_eq!(error.to_string(), "Not found: /app/uploads");

        let error = CellarError::PathNotContained {
            path: PathBuf::from("/etc/passwd"),
            root: PathBuf::from("/app"),
        };
        let message = error.to_string();
        assert!(message.contains("/etc/passwd"));
        assert!(message.contains("/app"));
    }

    #[test]
    fn test_restore_batch_error_names_table_and_row() {
        let error = CellarError::RestoreBatchFailed {
            table: "posts".to_string(),
            row: 3,
            reason: "UNIQUE constraint failed".to_string(),
        };
        let message = error.to_string();
        assert!(message.contains("'posts'"));
        assert!(message.contains("row 3"));
        assert!(message.contains("rolled back"));
    }

    #[test]
    fn test_cellar_error_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::PermissionDenied, "read-only");
        let cellar_error = CellarError::from(io_error);

        match cellar_error {
            CellarError::Io(_) => {}
            _ => panic!("Expected Io error variant"),
        }
    }

    #[test]
    fn test_cellar_error_from_json_error() {
        let json_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let cellar_error = CellarError::from(json_error);

        assert!(matches!(cellar_error, CellarError::Json(_)));
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(CellarError::not_found("x").kind(), "NotFound");
        assert_eq!(
            CellarError::serialization("users", "bad date").kind(),
            "SerializationFailed"
        );
        assert_eq!(
            CellarError::archive_extraction("corrupt").kind(),
            "ArchiveExtractionFailed"
        );
        assert_eq!(CellarError::database("gone").kind(), "DatabaseFailed");
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<CellarError>();
        assert_sync::<CellarError>();
    }
}
