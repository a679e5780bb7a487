//! Read-through caching decorator over any [`Repository`].
//!
//! Configured read operations are answered from a [`QueryCache`] keyed by
//! `<op>-<Type>-<args>-`. Writes go straight to the inner repository and do
//! not invalidate anything; callers evict with [`CachingRepository::invalidate`]
//! or [`CachingRepository::clear_cache`].

mod key;
mod store;

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;

use query_core::{OrderKey, ParameterSet, Value};
use serde::{Deserialize, Serialize};

use crate::config::CacheConfig;
use crate::contract::Repository;
use crate::entity::Entity;
use crate::errors::{RepoError, RepoResult};

pub use key::{short_type_name, CacheArg, CacheKey, ToCacheArg, NULL_TOKEN};
pub use store::{CacheStats, QueryCache};

/// Read operations that may be served from cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachedOp {
    Find,
    FindAll,
    GetId,
    Load,
    FindByRemoteId,
}

impl CachedOp {
    pub const ALL: [CachedOp; 5] = [
        CachedOp::Find,
        CachedOp::FindAll,
        CachedOp::GetId,
        CachedOp::Load,
        CachedOp::FindByRemoteId,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            CachedOp::Find => "find",
            CachedOp::FindAll => "find_all",
            CachedOp::GetId => "get_id",
            CachedOp::Load => "load",
            CachedOp::FindByRemoteId => "find_by_remote_id",
        }
    }
}

fn id_arg<T: Entity>(id: &T::Id) -> CacheArg {
    let value: Value = id.clone().into();
    value.to_cache_arg()
}

/// Shapes a cached read can return.
#[derive(Clone, Debug)]
pub enum Cached<T: Entity> {
    One(Option<T>),
    Many(Vec<T>),
    Loaded(T),
    Id(Option<T::Id>),
}

pub struct CachingRepository<T: Entity, R: Repository<T>> {
    inner: R,
    cache: Arc<QueryCache<Cached<T>>>,
    config: CacheConfig,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity, R: Repository<T>> CachingRepository<T, R> {
    pub fn new(inner: R, config: CacheConfig) -> Self {
        Self::with_cache(inner, config, Arc::new(QueryCache::new()))
    }

    /// Share one cache between several decorators of the same entity type.
    pub fn with_cache(inner: R, config: CacheConfig, cache: Arc<QueryCache<Cached<T>>>) -> Self {
        Self {
            inner,
            cache,
            config,
            _entity: PhantomData,
        }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    pub fn cache(&self) -> &Arc<QueryCache<Cached<T>>> {
        &self.cache
    }

    /// Key for `op` over this entity type; the type name always leads the arguments.
    pub fn key(op: CachedOp, args: &[CacheArg]) -> CacheKey {
        let mut all = Vec::with_capacity(args.len() + 1);
        all.push(CacheArg::Type(T::type_name()));
        all.extend_from_slice(args);
        CacheKey::build(op.tag(), &all)
    }

    /// Key for a lookup scoped by another record, rendered as `<Type>-<id>`
    /// right after this entity's type (`find-Account-Owner-7-...`).
    pub fn record_key<O: Entity>(op: CachedOp, record: &O, args: &[CacheArg]) -> CacheKey {
        let mut all = Vec::with_capacity(args.len() + 1);
        all.push(CacheArg::record(record));
        all.extend_from_slice(args);
        Self::key(op, &all)
    }

    pub fn find_key(id: &T::Id) -> CacheKey {
        Self::key(CachedOp::Find, &[id_arg::<T>(id)])
    }

    pub fn load_key(id: &T::Id) -> CacheKey {
        Self::key(CachedOp::Load, &[id_arg::<T>(id)])
    }

    pub fn invalidate(&self, key: &CacheKey) -> bool {
        self.cache.invalidate(key)
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    fn cached<V>(
        &self,
        op: CachedOp,
        args: &[CacheArg],
        compute: impl FnOnce() -> RepoResult<Cached<T>>,
        extract: impl FnOnce(Cached<T>) -> Option<V>,
    ) -> RepoResult<V> {
        let key = Self::key(op, args);
        let hit = self.cache.get_or_try_insert_with(&key, compute)?;
        extract(hit).ok_or_else(|| {
            tracing::warn!(%key, "cache entry has an unexpected shape");
            RepoError::backend(format!("cache entry '{key}' has an unexpected shape"))
        })
    }

    fn enabled(&self, op: CachedOp) -> bool {
        self.config.caches(op)
    }
}

impl<T: Entity, R: Repository<T>> Repository<T> for CachingRepository<T, R> {
    fn create(&self, entity: T) -> RepoResult<T> {
        self.inner.create(entity)
    }

    fn update(&self, entity: T) -> RepoResult<T> {
        self.inner.update(entity)
    }

    fn save(&self, entity: T) -> RepoResult<T> {
        self.inner.save(entity)
    }

    fn delete_by_id(&self, id: &T::Id) -> RepoResult<()> {
        self.inner.delete_by_id(id)
    }

    fn delete_all(&self) -> RepoResult<u64> {
        self.inner.delete_all()
    }

    fn delete_where(&self, params: &ParameterSet) -> RepoResult<u64> {
        self.inner.delete_where(params)
    }

    fn find(&self, id: &T::Id) -> RepoResult<Option<T>> {
        if !self.enabled(CachedOp::Find) {
            return self.inner.find(id);
        }
        self.cached(
            CachedOp::Find,
            &[id_arg::<T>(id)],
            || self.inner.find(id).map(Cached::One),
            |c| match c {
                Cached::One(v) => Some(v),
                _ => None,
            },
        )
    }

    fn find_by(&self, params: &ParameterSet) -> RepoResult<Vec<T>> {
        if !self.enabled(CachedOp::Find) {
            return self.inner.find_by(params);
        }
        self.cached(
            CachedOp::Find,
            &[params.to_cache_arg()],
            || self.inner.find_by(params).map(Cached::Many),
            |c| match c {
                Cached::Many(v) => Some(v),
                _ => None,
            },
        )
    }

    fn find_by_property(&self, name: &str, value: Value) -> RepoResult<Vec<T>> {
        if !self.enabled(CachedOp::Find) {
            return self.inner.find_by_property(name, value);
        }
        let args = [name.to_cache_arg(), value.to_cache_arg()];
        self.cached(
            CachedOp::Find,
            &args,
            || self.inner.find_by_property(name, value).map(Cached::Many),
            |c| match c {
                Cached::Many(v) => Some(v),
                _ => None,
            },
        )
    }

    fn find_all(&self, order: &[OrderKey]) -> RepoResult<Vec<T>> {
        if !self.enabled(CachedOp::FindAll) {
            return self.inner.find_all(order);
        }
        self.cached(
            CachedOp::FindAll,
            &[order.to_cache_arg()],
            || self.inner.find_all(order).map(Cached::Many),
            |c| match c {
                Cached::Many(v) => Some(v),
                _ => None,
            },
        )
    }

    fn load(&self, id: &T::Id) -> RepoResult<T> {
        if !self.enabled(CachedOp::Load) {
            return self.inner.load(id);
        }
        self.cached(
            CachedOp::Load,
            &[id_arg::<T>(id)],
            || self.inner.load(id).map(Cached::Loaded),
            |c| match c {
                Cached::Loaded(v) => Some(v),
                _ => None,
            },
        )
    }

    fn get_id(&self, params: &ParameterSet) -> RepoResult<Option<T::Id>> {
        if !self.enabled(CachedOp::GetId) {
            return self.inner.get_id(params);
        }
        self.cached(
            CachedOp::GetId,
            &[params.to_cache_arg()],
            || self.inner.get_id(params).map(Cached::Id),
            |c| match c {
                Cached::Id(v) => Some(v),
                _ => None,
            },
        )
    }

    fn find_by_remote_id(&self, remote_id: Value) -> RepoResult<Option<T>> {
        if !self.enabled(CachedOp::FindByRemoteId) {
            return self.inner.find_by_remote_id(remote_id);
        }
        let args = [remote_id.to_cache_arg()];
        self.cached(
            CachedOp::FindByRemoteId,
            &args,
            || self.inner.find_by_remote_id(remote_id).map(Cached::One),
            |c| match c {
                Cached::One(v) => Some(v),
                _ => None,
            },
        )
    }

    fn count(&self) -> RepoResult<u64> {
        self.inner.count()
    }

    fn count_by(&self, params: &ParameterSet) -> RepoResult<u64> {
        self.inner.count_by(params)
    }

    fn property_values(&self, field: &str, params: &ParameterSet) -> RepoResult<Vec<Value>> {
        self.inner.property_values(field, params)
    }

    fn batch_update_fields(
        &self,
        fields: &BTreeMap<String, Value>,
        params: &ParameterSet,
    ) -> RepoResult<u64> {
        self.inner.batch_update_fields(fields, params)
    }

    fn add_to_counter(&self, id: &T::Id, field: &str, delta: i64) -> RepoResult<Value> {
        self.inner.add_to_counter(id, field, delta)
    }

    fn field_value(&self, id: &T::Id, field: &str) -> RepoResult<Value> {
        self.inner.field_value(id, field)
    }
}
