//! Reference executor: evaluates parameter sets directly over records held
//! in process memory.

mod eval;
mod listeners;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use query_core::{OrderKey, ParameterSet, Value};

use crate::compile::{Query, Target};
use crate::contract::Repository;
use crate::entity::{resolve_path, set_path, Entity, EntityId as _, Resolved};
use crate::errors::{RepoError, RepoResult};

pub use eval::{like_match, matches, sort_records};
pub use listeners::{Constraint, EntityListener, ListenerRegistry, Required, Validator};

/// `Repository` over a `Vec` guarded by a read/write lock.
///
/// Listener hooks run outside the lock, so a listener may call back into the
/// repository. Bulk operations (`delete_all`, `delete_where`,
/// `batch_update*`) bypass listeners and validation.
pub struct InMemoryRepository<T: Entity> {
    rows: RwLock<Vec<T>>,
    seq: AtomicU64,
    listeners: ListenerRegistry<T>,
    validator: Validator<T>,
}

impl<T: Entity> Default for InMemoryRepository<T> {
    fn default() -> Self {
        Self::new(ListenerRegistry::default(), Validator::default())
    }
}

impl<T: Entity> InMemoryRepository<T> {
    pub fn new(listeners: ListenerRegistry<T>, validator: Validator<T>) -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
            seq: AtomicU64::new(0),
            listeners,
            validator,
        }
    }

    /// Repository pre-populated with `rows`, bypassing listeners and validation.
    pub fn with_rows(rows: Vec<T>) -> RepoResult<Self> {
        let repo = Self::default();
        for row in rows {
            repo.insert(row)?;
        }
        Ok(repo)
    }

    fn next_id(&self) -> T::Id {
        T::Id::generate(self.seq.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn insert(&self, mut entity: T) -> RepoResult<T> {
        let id = match entity.id() {
            Some(id) => id,
            None => {
                let id = self.next_id();
                entity.set_id(id.clone());
                id
            }
        };
        let mut rows = self.rows.write();
        if rows.iter().any(|r| r.id().as_ref() == Some(&id)) {
            return Err(RepoError::conflict(T::type_name(), &id));
        }
        rows.push(entity.clone());
        Ok(entity)
    }

    fn log_statement(&self, query: Query) {
        if tracing::enabled!(tracing::Level::DEBUG) {
            match query.compile() {
                Ok(stmt) => tracing::debug!(entity = T::type_name(), statement = %stmt, "in-memory query"),
                Err(e) => tracing::debug!(entity = T::type_name(), error = %e, "in-memory query"),
            }
        }
    }

    /// Matching records, cloned, sorted by the set's order.
    fn select(&self, params: &ParameterSet) -> RepoResult<Vec<T>> {
        self.log_statement(Query::select(Target::of::<T>()).filter(params.clone()));
        let mut out = Vec::new();
        {
            let rows = self.rows.read();
            for row in rows.iter() {
                if matches(row, params)? {
                    out.push(row.clone());
                }
            }
        }
        sort_records(&mut out, params.order())?;
        Ok(out)
    }

    fn position(rows: &[T], id: &T::Id) -> Option<usize> {
        rows.iter().position(|r| r.id().as_ref() == Some(id))
    }
}

impl<T: Entity> Repository<T> for InMemoryRepository<T> {
    fn create(&self, mut entity: T) -> RepoResult<T> {
        self.listeners.before_create(&mut entity);
        self.validator.validate(&entity)?;
        let entity = self.insert(entity)?;
        self.listeners.after_create(&entity);
        tracing::debug!(entity = T::type_name(), id = ?entity.id(), "created");
        Ok(entity)
    }

    fn update(&self, mut entity: T) -> RepoResult<T> {
        let id = entity
            .id()
            .ok_or_else(|| RepoError::not_found(T::type_name(), "<unsaved>"))?;
        self.listeners.before_update(&mut entity);
        self.validator.validate(&entity)?;
        {
            let mut rows = self.rows.write();
            let pos = Self::position(&rows, &id)
                .ok_or_else(|| RepoError::not_found(T::type_name(), &id))?;
            rows[pos] = entity.clone();
        }
        self.listeners.after_update(&entity);
        tracing::debug!(entity = T::type_name(), %id, "updated");
        Ok(entity)
    }

    fn delete_by_id(&self, id: &T::Id) -> RepoResult<()> {
        let current = self
            .find(id)?
            .ok_or_else(|| RepoError::not_found(T::type_name(), id))?;
        self.listeners.before_delete(&current);
        let removed = {
            let mut rows = self.rows.write();
            let pos = Self::position(&rows, id)
                .ok_or_else(|| RepoError::not_found(T::type_name(), id))?;
            rows.remove(pos)
        };
        self.listeners.after_delete(&removed);
        tracing::debug!(entity = T::type_name(), %id, "deleted");
        Ok(())
    }

    fn delete_all(&self) -> RepoResult<u64> {
        let mut rows = self.rows.write();
        let n = rows.len() as u64;
        rows.clear();
        Ok(n)
    }

    fn delete_where(&self, params: &ParameterSet) -> RepoResult<u64> {
        self.log_statement(Query::delete(Target::of::<T>()).filter(params.clone()));
        let mut rows = self.rows.write();
        let mut keep = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            keep.push(!matches(row, params)?);
        }
        let before = rows.len();
        let mut flags = keep.into_iter();
        rows.retain(|_| flags.next().unwrap_or(true));
        Ok((before - rows.len()) as u64)
    }

    fn find(&self, id: &T::Id) -> RepoResult<Option<T>> {
        let rows = self.rows.read();
        Ok(rows.iter().find(|r| r.id().as_ref() == Some(id)).cloned())
    }

    fn find_by(&self, params: &ParameterSet) -> RepoResult<Vec<T>> {
        self.select(params)
    }

    fn find_all(&self, order: &[OrderKey]) -> RepoResult<Vec<T>> {
        let mut out = self.rows.read().clone();
        sort_records(&mut out, order)?;
        Ok(out)
    }

    fn count(&self) -> RepoResult<u64> {
        Ok(self.rows.read().len() as u64)
    }

    fn count_by(&self, params: &ParameterSet) -> RepoResult<u64> {
        let rows = self.rows.read();
        let mut n = 0u64;
        for row in rows.iter() {
            if matches(row, params)? {
                n += 1;
            }
        }
        Ok(n)
    }

    fn property_values(&self, field: &str, params: &ParameterSet) -> RepoResult<Vec<Value>> {
        let mut out: Vec<Value> = Vec::new();
        for row in self.select(params)? {
            if let Resolved::Value(v) = resolve_path(&row, field)? {
                if !out.iter().any(|seen| seen.same_as(&v) || (seen.is_null() && v.is_null())) {
                    out.push(v);
                }
            }
        }
        Ok(out)
    }

    fn batch_update_fields(
        &self,
        fields: &BTreeMap<String, Value>,
        params: &ParameterSet,
    ) -> RepoResult<u64> {
        let mut rows = self.rows.write();
        let mut staged = Vec::new();
        for (pos, row) in rows.iter().enumerate() {
            if matches(row, params)? {
                let mut copy = row.clone();
                for (field, value) in fields {
                    set_path(&mut copy, field, value.clone())?;
                }
                staged.push((pos, copy));
            }
        }
        let n = staged.len() as u64;
        for (pos, row) in staged {
            rows[pos] = row;
        }
        tracing::debug!(entity = T::type_name(), updated = n, "batch update");
        Ok(n)
    }

    fn add_to_counter(&self, id: &T::Id, field: &str, delta: i64) -> RepoResult<Value> {
        let mut rows = self.rows.write();
        let pos =
            Self::position(&rows, id).ok_or_else(|| RepoError::not_found(T::type_name(), id))?;
        let current = match resolve_path(&rows[pos], field)? {
            Resolved::Value(v) => v,
            Resolved::Missing => Value::Null,
        };
        let next = bump(&current, delta).map_err(|reason| RepoError::InvalidCounter {
            field: field.to_owned(),
            reason,
        })?;
        set_path(&mut rows[pos], field, next.clone())?;
        Ok(next)
    }

    fn field_value(&self, id: &T::Id, field: &str) -> RepoResult<Value> {
        let rows = self.rows.read();
        let pos =
            Self::position(&rows, id).ok_or_else(|| RepoError::not_found(T::type_name(), id))?;
        Ok(match resolve_path(&rows[pos], field)? {
            Resolved::Value(v) => v,
            Resolved::Missing => Value::Null,
        })
    }
}

/// Type-preserving `value + delta`.
fn bump(value: &Value, delta: i64) -> Result<Value, &'static str> {
    match value {
        Value::Int(i) => i32::try_from(delta)
            .ok()
            .and_then(|d| i.checked_add(d))
            .map(Value::Int)
            .ok_or("overflow"),
        Value::Long(l) => l.checked_add(delta).map(Value::Long).ok_or("overflow"),
        Value::Double(d) => Ok(Value::Double(d + delta as f64)),
        Value::Null => Err("value is null"),
        _ => Err("not a numeric field"),
    }
}
