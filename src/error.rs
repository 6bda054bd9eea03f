//! Error type shared by the store, the registry and the storage handle

use std::fmt;

use crate::value::PrefKind;

/// Alias for a `Result` with the error type [`PrefError`].
pub type Result<T> = std::result::Result<T, PrefError>;

#[derive(Debug)]
pub enum PrefError {
    /// An operation ran before [`PrefStore::initialize`](crate::PrefStore::initialize).
    NotInitialized,

    /// `initialize` was called on a store that already holds a storage handle.
    AlreadyInitialized,

    /// Keys must be non-empty.
    InvalidKey,

    /// The key is bound to (or stored as) a different kind than the one requested.
    TypeMismatch {
        key: String,
        expected: PrefKind,
        found: PrefKind,
    },

    /// Stored object text could not be decoded into the requested type.
    Deserialization { key: String, source: anyhow::Error },

    /// An object could not be encoded for storage.
    Serialization { key: String, source: anyhow::Error },

    /// The underlying storage mechanism failed. Passed through untouched.
    Storage(anyhow::Error),
}

impl PrefError {
    pub fn is_type_mismatch(&self) -> bool {
        matches!(self, PrefError::TypeMismatch { .. })
    }
}

impl fmt::Display for PrefError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrefError::NotInitialized => write!(
                f,
                "preference store is not initialized; call initialize() once at startup"
            ),
            PrefError::AlreadyInitialized => {
                write!(f, "preference store is already initialized")
            }
            PrefError::InvalidKey => write!(f, "preference key must not be empty"),
            PrefError::TypeMismatch {
                key,
                expected,
                found,
            } => write!(
                f,
                "type mismatch for key '{}': bound to {}, got {}; use different keys for different types",
                key, expected, found
            ),
            PrefError::Deserialization { key, source } => {
                write!(f, "failed to deserialize value of '{}': {}", key, source)
            }
            PrefError::Serialization { key, source } => {
                write!(f, "failed to serialize value of '{}': {}", key, source)
            }
            PrefError::Storage(e) => write!(f, "storage error: {:#}", e),
        }
    }
}

impl std::error::Error for PrefError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PrefError::Deserialization { source, .. } | PrefError::Serialization { source, .. } => {
                Some(&**source)
            }
            PrefError::Storage(e) => Some(&**e),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for PrefError {
    fn from(e: anyhow::Error) -> Self {
        PrefError::Storage(e)
    }
}
