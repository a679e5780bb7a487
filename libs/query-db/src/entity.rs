//! Record access by property path.
//!
//! Backends never see concrete record types; they navigate through
//! [`PropertyAccess`] so that a dotted path like `other.name` can be
//! resolved, compared and written without reflection.

use std::fmt;

use query_core::Value;
use uuid::Uuid;

use crate::errors::{CompileError, CompileResult};

/// One hop of a property path.
pub enum Property<'a> {
    /// The property exists and is currently null.
    Null,
    Value(Value),
    /// A nested record that further path segments descend into.
    Object(&'a dyn PropertyAccess),
}

impl fmt::Debug for Property<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Property::Null => f.write_str("Null"),
            Property::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Property::Object(o) => f.debug_tuple("Object").field(&o.identity()).finish(),
        }
    }
}

pub trait PropertyAccess {
    /// `None` when the record has no property with that name.
    fn property(&self, name: &str) -> Option<Property<'_>>;

    /// Overwrite a scalar property.
    fn set_property(&mut self, name: &str, value: Value) -> CompileResult<()>;

    /// Mutable handle on a nested record, used for dotted writes.
    fn object_mut(&mut self, _name: &str) -> Option<&mut dyn PropertyAccess> {
        None
    }

    /// Value a nested record compares as when a path ends on it.
    fn identity(&self) -> Option<Value> {
        None
    }
}

/// Outcome of walking a dotted path.
#[derive(Clone, Debug, PartialEq)]
pub enum Resolved {
    /// Reached the last segment; the value may be [`Value::Null`].
    Value(Value),
    /// An intermediate hop was null, so nothing is there to compare.
    Missing,
}

pub fn resolve_path(record: &dyn PropertyAccess, path: &str) -> CompileResult<Resolved> {
    let unknown = || CompileError::UnknownProperty(path.to_owned());
    let mut current = record;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        let last = segments.peek().is_none();
        match current.property(segment).ok_or_else(unknown)? {
            Property::Null if last => return Ok(Resolved::Value(Value::Null)),
            Property::Null => return Ok(Resolved::Missing),
            Property::Value(v) if last => return Ok(Resolved::Value(v)),
            Property::Value(_) => return Err(unknown()),
            Property::Object(o) if last => {
                return Ok(Resolved::Value(o.identity().unwrap_or(Value::Null)))
            }
            Property::Object(o) => current = o,
        }
    }
    Err(unknown())
}

/// Write `value` at a dotted path. Intermediate hops must be non-null.
pub fn set_path(record: &mut dyn PropertyAccess, path: &str, value: Value) -> CompileResult<()> {
    set_path_from(record, path, path, value)
}

fn set_path_from(
    record: &mut dyn PropertyAccess,
    rest: &str,
    full: &str,
    value: Value,
) -> CompileResult<()> {
    match rest.split_once('.') {
        None => record.set_property(rest, value),
        Some((head, tail)) => {
            let is_null = matches!(record.property(head), Some(Property::Null));
            match record.object_mut(head) {
                Some(inner) => set_path_from(inner, tail, full, value),
                None if is_null => Err(CompileError::NullReference(full.to_owned())),
                None => Err(CompileError::UnknownProperty(full.to_owned())),
            }
        }
    }
}

/// Identifier type of an [`Entity`].
pub trait EntityId:
    Clone + PartialEq + fmt::Debug + fmt::Display + Into<Value> + Send + Sync + 'static
{
    /// Identifier for the `seq`-th record created by an in-process store.
    fn generate(seq: u64) -> Self;
}

impl EntityId for i64 {
    fn generate(seq: u64) -> Self {
        i64::try_from(seq).unwrap_or(i64::MAX)
    }
}

impl EntityId for i32 {
    fn generate(seq: u64) -> Self {
        i32::try_from(seq).unwrap_or(i32::MAX)
    }
}

impl EntityId for Uuid {
    fn generate(_seq: u64) -> Self {
        Uuid::new_v4()
    }
}

impl EntityId for String {
    fn generate(seq: u64) -> Self {
        seq.to_string()
    }
}

pub trait Entity: PropertyAccess + Clone + Send + Sync + 'static {
    type Id: EntityId;

    /// Property holding the identifier assigned by an external system.
    const REMOTE_ID_FIELD: &'static str = "remote_id";

    /// Name the entity is queried by, e.g. `Account`.
    fn type_name() -> &'static str;

    /// `None` until the record has been persisted.
    fn id(&self) -> Option<Self::Id>;

    fn set_id(&mut self, id: Self::Id);
}

/// Helper for `set_property` implementations: reject a value of the wrong kind.
pub fn mismatch(field: &str, expected: &'static str, got: &Value) -> CompileError {
    CompileError::TypeMismatch {
        field: field.to_owned(),
        expected,
        got: got.kind(),
    }
}
