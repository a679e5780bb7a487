//! The persistence contract every backend implements.

use std::collections::BTreeMap;

use query_core::{like_escape, Condition, OrderKey, Page, Paginator, ParameterSet, Value};

use crate::entity::Entity;
use crate::errors::{RepoError, RepoResult};

/// Blocking CRUD and query operations over one entity type.
///
/// Implementors provide the primitive operations; derived ones (`save`,
/// `load`, `find_first`, ...) have defaults built on top of them.
pub trait Repository<T: Entity>: Send + Sync {
    /// Persist a new record, assigning an id when it has none.
    fn create(&self, entity: T) -> RepoResult<T>;

    /// Replace a stored record. Fails with `NotFound` if the id is unknown.
    fn update(&self, entity: T) -> RepoResult<T>;

    fn delete_by_id(&self, id: &T::Id) -> RepoResult<()>;

    /// Remove every record. Lifecycle listeners are not invoked.
    fn delete_all(&self) -> RepoResult<u64>;

    /// Remove every match. Lifecycle listeners are not invoked.
    fn delete_where(&self, params: &ParameterSet) -> RepoResult<u64>;

    fn find(&self, id: &T::Id) -> RepoResult<Option<T>>;

    /// All matches, sorted by the set's order directives.
    fn find_by(&self, params: &ParameterSet) -> RepoResult<Vec<T>>;

    fn find_all(&self, order: &[OrderKey]) -> RepoResult<Vec<T>>;

    fn count(&self) -> RepoResult<u64>;

    fn count_by(&self, params: &ParameterSet) -> RepoResult<u64>;

    /// Distinct values of `field` across matches, in result order.
    fn property_values(&self, field: &str, params: &ParameterSet) -> RepoResult<Vec<Value>>;

    /// Set several fields on every match; returns the number of records touched.
    fn batch_update_fields(
        &self,
        fields: &BTreeMap<String, Value>,
        params: &ParameterSet,
    ) -> RepoResult<u64>;

    /// Add `delta` to a numeric field and return the new value.
    fn add_to_counter(&self, id: &T::Id, field: &str, delta: i64) -> RepoResult<Value>;

    /// Single field of the record with `id`; `Value::Null` when the path is empty.
    fn field_value(&self, id: &T::Id, field: &str) -> RepoResult<Value>;

    fn save(&self, entity: T) -> RepoResult<T> {
        if entity.id().is_some() {
            self.update(entity)
        } else {
            self.create(entity)
        }
    }

    fn delete(&self, entity: &T) -> RepoResult<()> {
        let id = entity
            .id()
            .ok_or_else(|| RepoError::not_found(T::type_name(), "<unsaved>"))?;
        self.delete_by_id(&id)
    }

    fn find_by_property(&self, name: &str, value: Value) -> RepoResult<Vec<T>> {
        self.find_by(&ParameterSet::with(name, value))
    }

    /// At most one match; more than one is `NonUnique`.
    fn find_single(&self, params: &ParameterSet) -> RepoResult<Option<T>> {
        let mut rows = self.find_by(params)?;
        match rows.len() {
            0 | 1 => Ok(rows.pop()),
            count => Err(RepoError::NonUnique {
                entity: T::type_name(),
                count,
            }),
        }
    }

    fn find_first(&self, params: &ParameterSet) -> RepoResult<Option<T>> {
        Ok(self.find_by(params)?.into_iter().next())
    }

    /// One page of matches; the paginator's total is refreshed from the result.
    fn find_page(&self, params: &ParameterSet, paginator: &mut Paginator) -> RepoResult<Page<T>> {
        let rows = self.find_by(params)?;
        paginator.set_total_items(rows.len() as u64);
        Ok(Page::new(paginator.slice(&rows).to_vec(), paginator.page_info()))
    }

    fn load(&self, id: &T::Id) -> RepoResult<T> {
        self.find(id)?
            .ok_or_else(|| RepoError::not_found(T::type_name(), id))
    }

    fn get_id(&self, params: &ParameterSet) -> RepoResult<Option<T::Id>> {
        Ok(self.find_first(params)?.and_then(|e| e.id()))
    }

    /// Lookup by [`Entity::REMOTE_ID_FIELD`]. String ids match literally.
    fn find_by_remote_id(&self, remote_id: Value) -> RepoResult<Option<T>> {
        let condition = match remote_id {
            Value::String(s) => Condition::like(like_escape(&s)),
            other => Condition::eq(other),
        };
        self.find_first(&ParameterSet::with(T::REMOTE_ID_FIELD, condition))
    }

    fn batch_update(&self, field: &str, value: Value, params: &ParameterSet) -> RepoResult<u64> {
        let mut fields = BTreeMap::new();
        fields.insert(field.to_owned(), value);
        self.batch_update_fields(&fields, params)
    }

    fn increase_counter(&self, id: &T::Id, field: &str) -> RepoResult<Value> {
        self.add_to_counter(id, field, 1)
    }

    fn decrease_counter(&self, id: &T::Id, field: &str) -> RepoResult<Value> {
        self.add_to_counter(id, field, -1)
    }

    /// Fresh copy of a persisted record.
    fn reload(&self, entity: &T) -> RepoResult<T> {
        let id = entity
            .id()
            .ok_or_else(|| RepoError::not_found(T::type_name(), "<unsaved>"))?;
        self.load(&id)
    }

    /// Scope several operations together. Backends without transactions run
    /// `f` directly.
    fn in_transaction<R, F>(&self, f: F) -> RepoResult<R>
    where
        F: FnOnce(&Self) -> RepoResult<R>,
        Self: Sized,
    {
        f(self)
    }
}
