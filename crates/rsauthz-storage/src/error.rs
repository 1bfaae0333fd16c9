//! Storage error types.

use thiserror::Error;

/// Storage-specific errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No schema stored for the tenant (or not with this version).
    #[error("schema not found for tenant {tenant_id}{}", version_suffix(.version))]
    SchemaNotFound {
        tenant_id: String,
        version: Option<String>,
    },

    /// Schema versions are immutable; writing an existing version is rejected.
    #[error("schema version already exists for tenant {tenant_id}: {version}")]
    SchemaVersionExists { tenant_id: String, version: String },

    /// Invalid filter error.
    #[error("invalid filter: {message}")]
    InvalidFilter { message: String },

    /// Invalid input error.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
}

fn version_suffix(version: &Option<String>) -> String {
    version
        .as_ref()
        .map(|v| format!(" (version {v})"))
        .unwrap_or_default()
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_not_found_message_includes_version() {
        let err = StorageError::SchemaNotFound {
            tenant_id: "t1".to_string(),
            version: Some("01H".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "schema not found for tenant t1 (version 01H)"
        );

        let err = StorageError::SchemaNotFound {
            tenant_id: "t1".to_string(),
            version: None,
        };
        assert_eq!(err.to_string(), "schema not found for tenant t1");
    }
}
