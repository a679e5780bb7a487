//! Filter / sort intent as data.
//!
//! A [`ParameterSet`] is an ordered list of named [`Condition`]s and nested
//! groups plus sort directives. Backends either compile it into a statement
//! or evaluate it directly; both read the clauses in insertion order and join
//! them with the operator carried by each clause.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::value::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    Eq,
    NotEq,
    Like,
    Gt,
    Geq,
    Lt,
    Leq,
    Between,
    In,
    NotIn,
    IsNull,
    IsNotNull,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "EQ",
            Operator::NotEq => "NOT_EQ",
            Operator::Like => "LIKE",
            Operator::Gt => "GT",
            Operator::Geq => "GEQ",
            Operator::Lt => "LT",
            Operator::Leq => "LEQ",
            Operator::Between => "BETWEEN",
            Operator::In => "IN",
            Operator::NotIn => "NOT_IN",
            Operator::IsNull => "IS_NULL",
            Operator::IsNotNull => "IS_NOT_NULL",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Boolean combinator between a clause and the clauses before it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BoolOp {
    #[default]
    And,
    Or,
}

impl BoolOp {
    pub fn as_sql(&self) -> &'static str {
        match self {
            BoolOp::And => "and",
            BoolOp::Or => "or",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderKey {
    pub field: String,
    pub dir: SortDir,
}

impl OrderKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            dir: SortDir::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            dir: SortDir::Desc,
        }
    }
}

/// Right-hand side of an `IN` / `NOT_IN` that is itself a query.
#[derive(Clone, Debug, PartialEq)]
pub enum SubSelect {
    /// Statement text emitted verbatim; carries no bindings.
    Raw(String),
    /// Structured sub-select; its parameters are bound next to the outer ones.
    Select {
        type_name: String,
        alias: String,
        field: String,
        params: Box<ParameterSet>,
    },
}

/// One comparison attached to a named field.
#[derive(Clone, Debug, PartialEq)]
pub struct Condition {
    op: Operator,
    values: Vec<Value>,
    subselect: Option<SubSelect>,
    join: BoolOp,
}

impl Condition {
    /// Generic constructor; arity is checked by [`Condition::check`] when the
    /// condition is compiled or evaluated.
    pub fn new(op: Operator, values: Vec<Value>) -> Self {
        Self {
            op,
            values,
            subselect: None,
            join: BoolOp::And,
        }
    }

    fn single(op: Operator, value: impl Into<Value>) -> Self {
        Self::new(op, vec![value.into()])
    }

    pub fn eq(value: impl Into<Value>) -> Self {
        Self::single(Operator::Eq, value)
    }

    pub fn not_eq(value: impl Into<Value>) -> Self {
        Self::single(Operator::NotEq, value)
    }

    /// Raw LIKE pattern (`%` / `_` wildcards, `\` escape).
    pub fn like(pattern: impl Into<String>) -> Self {
        Self::single(Operator::Like, pattern.into())
    }

    pub fn contains(s: &str) -> Self {
        Self::like(format!("%{}%", like_escape(s)))
    }

    pub fn starts_with(s: &str) -> Self {
        Self::like(format!("{}%", like_escape(s)))
    }

    pub fn ends_with(s: &str) -> Self {
        Self::like(format!("%{}", like_escape(s)))
    }

    pub fn gt(value: impl Into<Value>) -> Self {
        Self::single(Operator::Gt, value)
    }

    pub fn geq(value: impl Into<Value>) -> Self {
        Self::single(Operator::Geq, value)
    }

    pub fn lt(value: impl Into<Value>) -> Self {
        Self::single(Operator::Lt, value)
    }

    pub fn leq(value: impl Into<Value>) -> Self {
        Self::single(Operator::Leq, value)
    }

    /// Inclusive on both ends.
    pub fn between(low: impl Into<Value>, high: impl Into<Value>) -> Self {
        Self::new(Operator::Between, vec![low.into(), high.into()])
    }

    pub fn is_in<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::new(Operator::In, values.into_iter().map(Into::into).collect())
    }

    pub fn not_in<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::new(Operator::NotIn, values.into_iter().map(Into::into).collect())
    }

    /// `IN (<raw statement>)`
    pub fn in_subquery(sql: impl Into<String>) -> Self {
        Self::with_subselect(Operator::In, SubSelect::Raw(sql.into()))
    }

    /// `NOT IN (<raw statement>)`
    pub fn not_in_subquery(sql: impl Into<String>) -> Self {
        Self::with_subselect(Operator::NotIn, SubSelect::Raw(sql.into()))
    }

    /// `IN (select <alias>.<field> from <type_name> <alias> where ...)`
    pub fn in_select(
        type_name: impl Into<String>,
        alias: impl Into<String>,
        field: impl Into<String>,
        params: ParameterSet,
    ) -> Self {
        Self::with_subselect(
            Operator::In,
            SubSelect::Select {
                type_name: type_name.into(),
                alias: alias.into(),
                field: field.into(),
                params: Box::new(params),
            },
        )
    }

    pub fn with_subselect(op: Operator, subselect: SubSelect) -> Self {
        Self {
            op,
            values: Vec::new(),
            subselect: Some(subselect),
            join: BoolOp::And,
        }
    }

    pub fn is_null() -> Self {
        Self::new(Operator::IsNull, Vec::new())
    }

    pub fn is_not_null() -> Self {
        Self::new(Operator::IsNotNull, Vec::new())
    }

    /// Join this condition to the previous clause with OR.
    pub fn or(mut self) -> Self {
        self.join = BoolOp::Or;
        self
    }

    /// Join this condition to the previous clause with AND (the default).
    pub fn and(mut self) -> Self {
        self.join = BoolOp::And;
        self
    }

    pub fn joined_by(mut self, join: BoolOp) -> Self {
        self.join = join;
        self
    }

    pub fn op(&self) -> Operator {
        self.op
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn subselect(&self) -> Option<&SubSelect> {
        self.subselect.as_ref()
    }

    pub fn join(&self) -> BoolOp {
        self.join
    }

    /// Verify the operand count matches the operator.
    pub fn check(&self) -> Result<()> {
        let got = self.values.len();
        let arity = |expected: &'static str, ok: bool| {
            if ok {
                Ok(())
            } else {
                Err(Error::InvalidArity {
                    op: self.op,
                    expected,
                    got,
                })
            }
        };
        match self.op {
            Operator::IsNull | Operator::IsNotNull => {
                arity("0", got == 0 && self.subselect.is_none())
            }
            Operator::Between => arity("2", got == 2 && self.subselect.is_none()),
            Operator::In | Operator::NotIn => match &self.subselect {
                Some(_) => arity("0 (sub-select given)", got == 0),
                None if got == 0 => Err(Error::EmptyInList { op: self.op }),
                None => Ok(()),
            },
            _ => arity("1", got == 1 && self.subselect.is_none()),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.op)?;
        for (i, v) in self.values.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{v}")?;
        }
        match &self.subselect {
            Some(SubSelect::Raw(sql)) => write!(f, "{sql}")?,
            Some(SubSelect::Select {
                type_name, field, ..
            }) => write!(f, "{type_name}.{field}")?,
            None => {}
        }
        f.write_str(")")
    }
}

macro_rules! condition_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Condition {
                fn from(v: $ty) -> Self {
                    Condition::eq(v)
                }
            }
        )*
    };
}

condition_from!(Value, bool, i32, i64, u32, f64, Uuid, DateTime<Utc>, NaiveDate, String, &str);

/// Escape LIKE metacharacters so `s` matches literally.
pub fn like_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '%' | '_' | '\\' => {
                out.push('\\');
                out.push(ch);
            }
            c => out.push(c),
        }
    }
    out
}

#[derive(Clone, Debug, PartialEq)]
pub enum Clause {
    Param { name: String, condition: Condition },
    Group { params: ParameterSet, join: BoolOp },
}

impl Clause {
    pub fn join(&self) -> BoolOp {
        match self {
            Clause::Param { condition, .. } => condition.join(),
            Clause::Group { join, .. } => *join,
        }
    }
}

/// Ordered filter and sort specification.
///
/// Adding a name that is already present replaces its condition in place:
/// the last write wins and the clause keeps its original position.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParameterSet {
    clauses: Vec<Clause>,
    order: Vec<OrderKey>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a set from one name/value pair.
    pub fn with(name: impl Into<String>, condition: impl Into<Condition>) -> Self {
        let mut set = Self::new();
        set.add(name, condition);
        set
    }

    pub fn add(&mut self, name: impl Into<String>, condition: impl Into<Condition>) -> &mut Self {
        let name = name.into();
        let condition = condition.into();
        let existing = self
            .clauses
            .iter()
            .position(|c| matches!(c, Clause::Param { name: n, .. } if *n == name));
        match existing {
            Some(pos) => self.clauses[pos] = Clause::Param { name, condition },
            None => self.clauses.push(Clause::Param { name, condition }),
        }
        self
    }

    pub fn add_group(&mut self, params: ParameterSet, join: BoolOp) -> &mut Self {
        self.clauses.push(Clause::Group { params, join });
        self
    }

    pub fn order_by(&mut self, field: impl Into<String>, ascending: bool) -> &mut Self {
        self.order.push(OrderKey {
            field: field.into(),
            dir: if ascending {
                SortDir::Asc
            } else {
                SortDir::Desc
            },
        });
        self
    }

    /// Consuming form of [`ParameterSet::add`].
    pub fn param(mut self, name: impl Into<String>, condition: impl Into<Condition>) -> Self {
        self.add(name, condition);
        self
    }

    /// Consuming form of [`ParameterSet::add_group`].
    pub fn group(mut self, params: ParameterSet, join: BoolOp) -> Self {
        self.add_group(params, join);
        self
    }

    pub fn asc(mut self, field: impl Into<String>) -> Self {
        self.order_by(field, true);
        self
    }

    pub fn desc(mut self, field: impl Into<String>) -> Self {
        self.order_by(field, false);
        self
    }

    /// Condition registered under `name` at this level (groups are not searched).
    pub fn get(&self, name: &str) -> Option<&Condition> {
        self.clauses.iter().find_map(|c| match c {
            Clause::Param { name: n, condition } if n == name => Some(condition),
            _ => None,
        })
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn order(&self) -> &[OrderKey] {
        &self.order
    }

    /// Replace the sort directives wholesale.
    pub fn set_order(&mut self, order: Vec<OrderKey>) -> &mut Self {
        self.order = order;
        self
    }

    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    /// True when there is nothing to filter on (empty groups count as nothing).
    pub fn is_empty(&self) -> bool {
        self.clauses.iter().all(|c| match c {
            Clause::Param { .. } => false,
            Clause::Group { params, .. } => params.is_empty(),
        })
    }

    /// Check every condition, recursing into groups and structured sub-selects.
    pub fn check(&self) -> Result<()> {
        for clause in &self.clauses {
            match clause {
                Clause::Param { condition, .. } => {
                    condition.check()?;
                    if let Some(SubSelect::Select { params, .. }) = condition.subselect() {
                        params.check()?;
                    }
                }
                Clause::Group { params, .. } => params.check()?,
            }
        }
        Ok(())
    }
}
