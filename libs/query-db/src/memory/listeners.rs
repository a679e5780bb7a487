use std::sync::Arc;

use query_core::Value;

use crate::entity::{resolve_path, Entity, PropertyAccess, Resolved};
use crate::errors::{RepoError, RepoResult};

/// Lifecycle callbacks around mutating operations.
///
/// `before_*` hooks may modify the record; the change is visible to
/// validation and to what gets stored.
pub trait EntityListener<T>: Send + Sync {
    fn before_create(&self, _entity: &mut T) {}
    fn after_create(&self, _entity: &T) {}
    fn before_update(&self, _entity: &mut T) {}
    fn after_update(&self, _entity: &T) {}
    fn before_delete(&self, _entity: &T) {}
    fn after_delete(&self, _entity: &T) {}
}

/// Listeners invoked synchronously in registration order.
pub struct ListenerRegistry<T> {
    listeners: Vec<Arc<dyn EntityListener<T>>>,
}

impl<T> Default for ListenerRegistry<T> {
    fn default() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }
}

impl<T> ListenerRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, listener: Arc<dyn EntityListener<T>>) -> &mut Self {
        self.listeners.push(listener);
        self
    }

    pub fn with(mut self, listener: Arc<dyn EntityListener<T>>) -> Self {
        self.register(listener);
        self
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub(crate) fn before_create(&self, entity: &mut T) {
        self.listeners.iter().for_each(|l| l.before_create(entity));
    }

    pub(crate) fn after_create(&self, entity: &T) {
        self.listeners.iter().for_each(|l| l.after_create(entity));
    }

    pub(crate) fn before_update(&self, entity: &mut T) {
        self.listeners.iter().for_each(|l| l.before_update(entity));
    }

    pub(crate) fn after_update(&self, entity: &T) {
        self.listeners.iter().for_each(|l| l.after_update(entity));
    }

    pub(crate) fn before_delete(&self, entity: &T) {
        self.listeners.iter().for_each(|l| l.before_delete(entity));
    }

    pub(crate) fn after_delete(&self, entity: &T) {
        self.listeners.iter().for_each(|l| l.after_delete(entity));
    }
}

/// A rule a record must satisfy before it is stored.
pub trait Constraint<T>: Send + Sync {
    /// Human-readable violation message on failure.
    fn check(&self, entity: &T) -> Result<(), String>;
}

impl<T, F> Constraint<T> for F
where
    F: Fn(&T) -> Result<(), String> + Send + Sync,
{
    fn check(&self, entity: &T) -> Result<(), String> {
        self(entity)
    }
}

/// Field must be present, non-null and, for strings, non-blank.
#[derive(Clone, Debug)]
pub struct Required {
    field: String,
}

impl Required {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }
}

impl<T: PropertyAccess> Constraint<T> for Required {
    fn check(&self, entity: &T) -> Result<(), String> {
        match resolve_path(entity, &self.field) {
            Ok(Resolved::Value(Value::String(s))) if !s.trim().is_empty() => Ok(()),
            Ok(Resolved::Value(Value::String(_))) => Err(format!("{} must not be blank", self.field)),
            Ok(Resolved::Value(Value::Null)) | Ok(Resolved::Missing) => {
                Err(format!("{} is required", self.field))
            }
            Ok(Resolved::Value(_)) => Ok(()),
            Err(e) => Err(e.to_string()),
        }
    }
}

/// Constraints checked in order; the first violation fails the write.
pub struct Validator<T> {
    constraints: Vec<Arc<dyn Constraint<T>>>,
}

impl<T> Default for Validator<T> {
    fn default() -> Self {
        Self {
            constraints: Vec::new(),
        }
    }
}

impl<T: Entity> Validator<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, constraint: impl Constraint<T> + 'static) -> Self {
        self.constraints.push(Arc::new(constraint));
        self
    }

    pub fn required(self, field: impl Into<String>) -> Self {
        self.with(Required::new(field))
    }

    pub fn validate(&self, entity: &T) -> RepoResult<()> {
        for constraint in &self.constraints {
            if let Err(message) = constraint.check(entity) {
                tracing::debug!(entity = T::type_name(), %message, "validation failed");
                return Err(RepoError::validation(T::type_name(), message));
            }
        }
        Ok(())
    }
}
