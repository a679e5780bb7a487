#![allow(dead_code)]

use query_core::Value;
use query_db::entity::mismatch;
use query_db::{CompileError, CompileResult, Entity, InMemoryRepository, Property, PropertyAccess};

#[derive(Clone, Debug, PartialEq)]
pub struct Other {
    pub id: i64,
    pub name: String,
    pub rank: Option<i32>,
}

impl PropertyAccess for Other {
    fn property(&self, name: &str) -> Option<Property<'_>> {
        Some(match name {
            "id" => Property::Value(Value::Long(self.id)),
            "name" => Property::Value(Value::String(self.name.clone())),
            "rank" => match self.rank {
                Some(r) => Property::Value(Value::Int(r)),
                None => Property::Null,
            },
            _ => return None,
        })
    }

    fn set_property(&mut self, name: &str, value: Value) -> CompileResult<()> {
        match (name, value) {
            ("name", Value::String(s)) => self.name = s,
            ("rank", Value::Int(r)) => self.rank = Some(r),
            ("rank", Value::Null) => self.rank = None,
            (name, v) if self.property(name).is_some() => {
                return Err(mismatch(name, "matching kind", &v))
            }
            (name, _) => return Err(CompileError::UnknownProperty(name.to_owned())),
        }
        Ok(())
    }

    fn identity(&self) -> Option<Value> {
        Some(Value::Long(self.id))
    }
}

/// Test record: `hits` is an `i32` counter, `views` an `i64` one and
/// `likes` a nullable `i64`.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Account {
    pub id: Option<i64>,
    pub name: String,
    pub account_id: i32,
    pub active: bool,
    pub score: Option<f64>,
    pub hits: i32,
    pub views: i64,
    pub likes: Option<i64>,
    pub remote_id: Option<String>,
    pub other: Option<Other>,
}

fn opt(v: Option<Value>) -> Property<'static> {
    v.map(Property::Value).unwrap_or(Property::Null)
}

impl PropertyAccess for Account {
    fn property(&self, name: &str) -> Option<Property<'_>> {
        Some(match name {
            "id" => opt(self.id.map(Value::Long)),
            "name" => Property::Value(Value::String(self.name.clone())),
            "account_id" => Property::Value(Value::Int(self.account_id)),
            "active" => Property::Value(Value::Bool(self.active)),
            "score" => opt(self.score.map(Value::Double)),
            "hits" => Property::Value(Value::Int(self.hits)),
            "views" => Property::Value(Value::Long(self.views)),
            "likes" => opt(self.likes.map(Value::Long)),
            "remote_id" => opt(self.remote_id.clone().map(Value::String)),
            "other" => match &self.other {
                Some(o) => Property::Object(o),
                None => Property::Null,
            },
            _ => return None,
        })
    }

    fn set_property(&mut self, name: &str, value: Value) -> CompileResult<()> {
        match (name, value) {
            ("name", Value::String(s)) => self.name = s,
            ("account_id", Value::Int(i)) => self.account_id = i,
            ("active", Value::Bool(b)) => self.active = b,
            ("score", Value::Double(d)) => self.score = Some(d),
            ("score", Value::Null) => self.score = None,
            ("hits", Value::Int(i)) => self.hits = i,
            ("views", Value::Long(l)) => self.views = l,
            ("likes", Value::Long(l)) => self.likes = Some(l),
            ("likes", Value::Null) => self.likes = None,
            ("remote_id", Value::String(s)) => self.remote_id = Some(s),
            (name, v) if self.property(name).is_some() => {
                return Err(mismatch(name, "matching kind", &v))
            }
            (name, _) => return Err(CompileError::UnknownProperty(name.to_owned())),
        }
        Ok(())
    }

    fn object_mut(&mut self, name: &str) -> Option<&mut dyn PropertyAccess> {
        match name {
            "other" => self.other.as_mut().map(|o| o as &mut dyn PropertyAccess),
            _ => None,
        }
    }
}

impl Entity for Account {
    type Id = i64;

    fn type_name() -> &'static str {
        "Account"
    }

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }
}

pub fn account(n: i64) -> Account {
    Account {
        id: None,
        name: format!("Account {n}"),
        account_id: if n <= 5 { 1 } else { 2 },
        active: n % 2 == 0,
        score: if n == 4 { None } else { Some(n as f64 / 2.0) },
        hits: n as i32,
        views: n * 10,
        likes: if n % 2 == 0 { Some(n) } else { None },
        remote_id: Some(format!("R-{n}")),
        other: if n % 3 == 0 {
            None
        } else {
            Some(Other {
                id: 100 + n,
                name: format!("other-{}", n % 2),
                rank: if n == 1 { None } else { Some(n as i32) },
            })
        },
    }
}

/// Ten accounts with ids 1..=10.
///
/// - `account_id` is 1 for 1..=5, 2 for 6..=10
/// - even ids are `active` and have `likes`
/// - ids 3, 6, 9 have no `other`
pub fn seeded() -> InMemoryRepository<Account> {
    let repo = InMemoryRepository::default();
    for n in 1..=10 {
        query_db::Repository::create(&repo, account(n)).unwrap();
    }
    repo
}

pub fn ids(rows: &[Account]) -> Vec<i64> {
    rows.iter().filter_map(|a| a.id).collect()
}
