use std::borrow::Cow;

use thiserror::Error;

use crate::datastore::Key;

/// Top-level error type returned by dexom clients and datastores.
#[derive(Debug, Error)]
pub enum RepoError {
    /// An indexing condition failed while a save was resolving exclusion flags.
    /// The save is aborted and nothing is written for the entity.
    #[error("indexing condition failed on {kind}.{field}: {message}")]
    IndexingPredicate {
        kind: String,
        field: String,
        message: String,
    },

    /// Two or more index markers of equal precedence disagree about a field.
    #[error("ambiguous index directives on {kind}.{field}: {markers:?}")]
    AmbiguousDirective {
        kind: String,
        field: String,
        markers: Vec<String>,
    },

    /// The registry has no schema for the entity type.
    #[error("entity type {type_name} is not registered")]
    NotRegistered { type_name: &'static str },

    /// The declaration could not be turned into a schema.
    #[error("invalid schema: {message}")]
    InvalidSchema { message: String },

    /// No entity is stored under the key.
    #[error("entity not found: {key}")]
    NotFound { key: Key },

    /// Invalid input supplied to a client or query operation.
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    /// Entity (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Underlying Redis command failed.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("{message}")]
    Other { message: Cow<'static, str> },
}

/// Failure reported by an indexing condition.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ConditionError {
    pub message: String,
}

impl ConditionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<&str> for ConditionError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for ConditionError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}
