use std::fmt::Display;

use thiserror::Error;

/// Malformed query intent. These are programmer errors: callers get no
/// partial statement back.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CompileError {
    #[error(transparent)]
    Model(#[from] query_core::Error),

    #[error("duplicate placeholder: {0}")]
    DuplicatePlaceholder(String),

    #[error("unknown property: {0}")]
    UnknownProperty(String),

    #[error("null reference while navigating: {0}")]
    NullReference(String),

    #[error("type mismatch on {field}: expected {expected}, got {got}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        got: &'static str,
    },

    #[error("unsupported: {0}")]
    Unsupported(&'static str),

    #[error("update statement has no assignments")]
    EmptyAssignments,
}

pub type CompileResult<T> = Result<T, CompileError>;

/// Errors surfaced by [`crate::Repository`] implementations.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("validation failed for {entity}: {message}")]
    Validation {
        entity: &'static str,
        message: String,
    },

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("{entity} already exists: {key}")]
    Conflict { entity: &'static str, key: String },

    #[error("expected a single {entity}, found {count}")]
    NonUnique { entity: &'static str, count: usize },

    #[error("counter '{field}' cannot be changed: {reason}")]
    InvalidCounter { field: String, reason: &'static str },

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Page(#[from] query_core::Error),

    #[error("backend error: {0}")]
    Backend(String),
}

impl RepoError {
    pub fn validation(entity: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            entity,
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, key: impl Display) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub fn conflict(entity: &'static str, key: impl Display) -> Self {
        Self::Conflict {
            entity,
            key: key.to_string(),
        }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    /// Expected failures the caller is meant to handle, as opposed to
    /// malformed queries.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. }
                | Self::NotFound { .. }
                | Self::Conflict { .. }
                | Self::NonUnique { .. }
                | Self::Backend(_)
        )
    }
}

pub type RepoResult<T> = Result<T, RepoError>;
