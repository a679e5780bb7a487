//! Query execution over the backend-neutral intent from `query-core`.
//!
//! - [`compile`]: parameter sets → statement text with named placeholders
//! - [`contract`]: the [`Repository`] operation set
//! - [`memory`]: a reference executor that evaluates the same parameter sets
//!   against records in process memory
//! - [`cache`]: a read-through caching decorator for any repository
//!
//! # Example
//! ```rust
//! use query_db::compile::{Query, Target};
//! use query_core::ParameterSet;
//!
//! let stmt = Query::select(Target::new("T", "p"))
//!     .filter(ParameterSet::with("name", "123"))
//!     .compile()
//!     .unwrap();
//! assert_eq!(stmt.sql, "select p from T p where p.name like :name");
//! ```

pub mod cache;
pub mod compile;
pub mod config;
pub mod contract;
pub mod entity;
pub mod errors;
pub mod memory;

pub use cache::{CachedOp, CachingRepository, QueryCache};
pub use compile::{Aggregate, Assignment, Bindings, Projection, Query, Statement, Target};
pub use config::{CacheConfig, EngineConfig, PagingConfig};
pub use contract::Repository;
pub use entity::{resolve_path, set_path, Entity, EntityId, Property, PropertyAccess, Resolved};
pub use errors::{CompileError, CompileResult, RepoError, RepoResult};
pub use memory::{InMemoryRepository, ListenerRegistry, Validator};
