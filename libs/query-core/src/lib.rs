//! Backend-neutral query intent: values, parameter sets and pagination.
//!
//! Nothing here talks to storage. `query-db` compiles a [`ParameterSet`] into
//! statement text or evaluates it against in-memory records.

pub mod error;
pub mod page;
pub mod params;
pub mod value;

pub use error::{Error, Result};
pub use page::{Page, PageInfo, Paginator};
pub use params::{
    like_escape, BoolOp, Clause, Condition, Operator, OrderKey, ParameterSet, SortDir, SubSelect,
};
pub use value::Value;
