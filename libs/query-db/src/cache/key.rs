//! Canonical cache keys: `<tag>-<arg>-<arg>-...-`.
//!
//! Argument rendering: null → `#`; strings trimmed with spaces turned into
//! `_`; types by short name; records as `Type-id`; maps as concatenated
//! `key:value`; lists as `value:` per element; anything else by `Display`.

use std::fmt;

use query_core::{BoolOp, Clause, Operator, OrderKey, ParameterSet, SortDir, Value};

use crate::entity::Entity;

pub const NULL_TOKEN: &str = "#";

#[derive(Clone, Debug, PartialEq)]
pub enum CacheArg {
    Null,
    Str(String),
    /// Full type path; rendered by its last segment.
    Type(&'static str),
    /// An identified record; an unsaved one renders its id as `#`.
    Record { type_name: &'static str, id: String },
    Map(Vec<(String, CacheArg)>),
    List(Vec<CacheArg>),
    Other(String),
}

/// `a::b::Account` → `Account`
pub fn short_type_name(full: &str) -> &str {
    let head = full.split('<').next().unwrap_or(full);
    head.rsplit("::").next().unwrap_or(head)
}

impl CacheArg {
    pub fn record<T: Entity>(entity: &T) -> Self {
        CacheArg::Record {
            type_name: T::type_name(),
            id: entity
                .id()
                .map(|id| id.to_string())
                .unwrap_or_else(|| NULL_TOKEN.to_owned()),
        }
    }

    pub fn of_type<T>() -> Self {
        CacheArg::Type(std::any::type_name::<T>())
    }

    fn render(&self, out: &mut String) {
        match self {
            CacheArg::Null => out.push_str(NULL_TOKEN),
            CacheArg::Str(s) => out.push_str(&s.trim().replace(' ', "_")),
            CacheArg::Type(name) => out.push_str(short_type_name(name)),
            CacheArg::Record { type_name, id } => {
                out.push_str(short_type_name(type_name));
                out.push('-');
                out.push_str(id);
            }
            CacheArg::Map(entries) => {
                for (k, v) in entries {
                    out.push_str(k);
                    out.push(':');
                    v.render(out);
                }
            }
            CacheArg::List(items) => {
                for item in items {
                    item.render(out);
                    out.push(':');
                }
            }
            CacheArg::Other(s) => out.push_str(s),
        }
    }
}

pub trait ToCacheArg {
    fn to_cache_arg(&self) -> CacheArg;
}

impl ToCacheArg for Value {
    fn to_cache_arg(&self) -> CacheArg {
        match self {
            Value::Null => CacheArg::Null,
            Value::String(s) => CacheArg::Str(s.clone()),
            Value::List(items) => CacheArg::List(items.iter().map(ToCacheArg::to_cache_arg).collect()),
            other => CacheArg::Other(other.to_string()),
        }
    }
}

impl ToCacheArg for str {
    fn to_cache_arg(&self) -> CacheArg {
        CacheArg::Str(self.to_owned())
    }
}

impl ToCacheArg for String {
    fn to_cache_arg(&self) -> CacheArg {
        CacheArg::Str(self.clone())
    }
}

impl<A: ToCacheArg> ToCacheArg for Option<A> {
    fn to_cache_arg(&self) -> CacheArg {
        match self {
            Some(a) => a.to_cache_arg(),
            None => CacheArg::Null,
        }
    }
}

impl ToCacheArg for [OrderKey] {
    fn to_cache_arg(&self) -> CacheArg {
        CacheArg::List(
            self.iter()
                .map(|k| {
                    let sign = match k.dir {
                        SortDir::Asc => '+',
                        SortDir::Desc => '-',
                    };
                    CacheArg::Other(format!("{sign}{}", k.field))
                })
                .collect(),
        )
    }
}

/// Structurally equal sets produce the same argument. A plain AND-joined
/// equality renders as its bare value, so `{accountId: 1}` is `accountId:1`.
impl ToCacheArg for ParameterSet {
    fn to_cache_arg(&self) -> CacheArg {
        let mut entries = Vec::with_capacity(self.len() + 1);
        for clause in self.clauses() {
            match clause {
                Clause::Param { name, condition } => {
                    let plain = condition.op() == Operator::Eq
                        && condition.join() == BoolOp::And
                        && condition.values().len() == 1;
                    let arg = match condition.values().first() {
                        Some(v) if plain => v.to_cache_arg(),
                        _ => {
                            let prefix = match condition.join() {
                                BoolOp::And => "",
                                BoolOp::Or => "or ",
                            };
                            CacheArg::Other(format!("{prefix}{condition}"))
                        }
                    };
                    entries.push((name.clone(), arg));
                }
                Clause::Group { params, join } => {
                    entries.push((format!("({})", join.as_sql()), params.to_cache_arg()));
                }
            }
        }
        if !self.order().is_empty() {
            entries.push(("order".to_owned(), self.order().to_cache_arg()));
        }
        CacheArg::Map(entries)
    }
}

/// Rendered key; equal keys mean equal (tag, arguments).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn build(tag: &str, args: &[CacheArg]) -> Self {
        let mut out = String::with_capacity(tag.len() + 16 * args.len());
        out.push_str(tag);
        out.push('-');
        for arg in args {
            arg.render(&mut out);
            out.push('-');
        }
        CacheKey(out)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn starts_with(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
