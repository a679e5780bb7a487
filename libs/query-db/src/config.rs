//! Engine configuration.
//!
//! Deserialized from the `engine` section of the application's Figment:
//!
//! ```yaml
//! engine:
//!   cache:
//!     enabled: true
//!     operations: [find, load]
//!   paging:
//!     default_page_size: 25
//!     max_page_size: 500
//! ```

use std::collections::BTreeSet;

use figment::Figment;
use query_core::Paginator;
use serde::{Deserialize, Serialize};

use crate::cache::CachedOp;

pub const ENGINE_SECTION: &str = "engine";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub paging: PagingConfig,
}

impl EngineConfig {
    /// Extract the `engine` section; a missing section yields defaults.
    pub fn from_figment(figment: &Figment) -> Result<Self, figment::Error> {
        if figment.contains(ENGINE_SECTION) {
            figment.extract_inner(ENGINE_SECTION)
        } else {
            Ok(Self::default())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Read operations served from cache.
    #[serde(default = "default_operations")]
    pub operations: BTreeSet<CachedOp>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            operations: default_operations(),
        }
    }
}

impl CacheConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            operations: BTreeSet::new(),
        }
    }

    pub fn only(ops: impl IntoIterator<Item = CachedOp>) -> Self {
        Self {
            enabled: true,
            operations: ops.into_iter().collect(),
        }
    }

    pub fn caches(&self, op: CachedOp) -> bool {
        self.enabled && self.operations.contains(&op)
    }
}

fn default_true() -> bool {
    true
}

fn default_operations() -> BTreeSet<CachedOp> {
    CachedOp::ALL.into_iter().collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PagingConfig {
    #[serde(default = "default_page_size")]
    pub default_page_size: u64,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u64,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

fn default_page_size() -> u64 {
    25
}

fn default_max_page_size() -> u64 {
    1000
}

impl PagingConfig {
    /// Requested size, or the default, clamped to `[1, max_page_size]`.
    pub fn effective_page_size(&self, requested: Option<u64>) -> u64 {
        requested
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size.max(1))
    }

    pub fn paginator(
        &self,
        total_items: u64,
        requested: Option<u64>,
        page: u64,
    ) -> query_core::Result<Paginator> {
        Paginator::new(total_items, self.effective_page_size(requested), page)
    }
}

#[cfg(test)]
mod tests {
    use figment::providers::{Format, Serialized, Yaml};

    use super::*;

    #[test]
    fn test_missing_section_uses_defaults() {
        let cfg = EngineConfig::from_figment(&Figment::new()).unwrap();
        assert_eq!(cfg, EngineConfig::default());
        assert!(cfg.cache.caches(CachedOp::FindByRemoteId));
        assert_eq!(cfg.paging.default_page_size, 25);
    }

    #[test]
    fn test_yaml_section() {
        let figment = Figment::new().merge(Yaml::string(
            r#"
engine:
  cache:
    operations: [find, load]
  paging:
    max_page_size: 50
"#,
        ));
        let cfg = EngineConfig::from_figment(&figment).unwrap();
        assert!(cfg.cache.caches(CachedOp::Find));
        assert!(cfg.cache.caches(CachedOp::Load));
        assert!(!cfg.cache.caches(CachedOp::FindAll));
        assert_eq!(cfg.paging.effective_page_size(Some(500)), 50);
        assert_eq!(cfg.paging.effective_page_size(Some(0)), 1);
        assert_eq!(cfg.paging.effective_page_size(None), 25);
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let figment = Figment::new().merge(Serialized::defaults(serde_json::json!({
            "engine": { "cache": { "enabled": true, "ttl": 5 } }
        })));
        assert!(EngineConfig::from_figment(&figment).is_err());
    }

    #[test]
    fn test_disabled_cache_caches_nothing() {
        let cfg = CacheConfig::disabled();
        assert!(CachedOp::ALL.iter().all(|op| !cfg.caches(*op)));
        let only = CacheConfig::only([CachedOp::GetId]);
        assert!(only.caches(CachedOp::GetId));
        assert!(!only.caches(CachedOp::Find));
    }
}
