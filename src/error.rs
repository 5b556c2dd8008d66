//! Errors surfaced by persisters and storage backends

use thiserror::Error;

/// A boxed, thread-safe error as produced by transformers and backends
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias used throughout the crate
pub type Result<T, E = PersistError> = std::result::Result<T, E>;

/// Errors that can occur when persisting or retrieving a value
#[derive(Debug, Error)]
pub enum PersistError {
    /// A value is present in storage but does not have the expected shape
    #[error("unexpected value type: expected `{expected}`, found {value}")]
    UnexpectedValueType {
        /// Debug rendering of the value that was found
        value: String,
        /// Name of the type that was expected
        expected: &'static str,
    },
    /// A transformer failed in either direction
    #[error("transformer failed: {0}")]
    Transform(#[source] BoxError),
    /// The storage backend failed
    #[error("storage failed: {0}")]
    Storage(#[source] BoxError),
}

impl PersistError {
    /// Create an [`PersistError::UnexpectedValueType`] for a value that could
    /// not be read as `T`
    pub fn unexpected_value_type<T: ?Sized>(value: impl std::fmt::Debug) -> Self {
        Self::UnexpectedValueType {
            value: format!("{value:?}"),
            expected: std::any::type_name::<T>(),
        }
    }

    /// Wrap a transformer error
    ///
    /// A boxed `PersistError` is unwrapped rather than nested, so errors that
    /// already belong to this crate keep their variant.
    pub fn transform(error: impl Into<BoxError>) -> Self {
        match error.into().downcast::<PersistError>() {
            Ok(error) => *error,
            Err(error) => Self::Transform(error),
        }
    }

    /// Wrap a backend error
    ///
    /// A boxed `PersistError` is unwrapped rather than nested.
    pub fn storage(error: impl Into<BoxError>) -> Self {
        match error.into().downcast::<PersistError>() {
            Ok(error) => *error,
            Err(error) => Self::Storage(error),
        }
    }

    /// Returns `true` if this is an [`PersistError::UnexpectedValueType`]
    pub fn is_unexpected_value_type(&self) -> bool {
        matches!(self, Self::UnexpectedValueType { .. })
    }

    /// The transformer's own error, if this error came from a transformer
    pub fn transform_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            Self::Transform(error) => Some(error.as_ref()),
            _ => None,
        }
    }

    /// The backend's own error, if this error came from storage
    pub fn storage_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            Self::Storage(error) => Some(error.as_ref()),
            _ => None,
        }
    }
}
