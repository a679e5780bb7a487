use thiserror::Error;

use crate::params::Operator;

/// Errors raised by the parameter model and the paginator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("index {index} is out of range for {total} items")]
    OutOfRange { index: i64, total: u64 },

    #[error("page size must be greater than zero")]
    InvalidPageSize,

    #[error("{op} expects {expected} value(s), got {got}")]
    InvalidArity {
        op: Operator,
        expected: &'static str,
        got: usize,
    },

    #[error("{op} requires a non-empty value list or a sub-select")]
    EmptyInList { op: Operator },
}

pub type Result<T> = std::result::Result<T, Error>;
