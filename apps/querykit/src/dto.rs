//! YAML query documents.
//!
//! ```yaml
//! type: Param
//! alias: p
//! kind: update
//! where:
//!   - { field: name, op: LIKE, values: ["%a%"] }
//!   - group:
//!       - { field: value, value: 123 }
//!       - { field: id, op: IN, values: [[1, 2]], join: OR }
//! order: [{ field: name, dir: desc }]
//! set:
//!   label: { literal: El Param }
//!   id: { expr: p.id+1 }
//! ```

use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use query_core::{BoolOp, Condition, Operator, OrderKey, ParameterSet, SubSelect, Value};
use query_db::{Aggregate, Assignment, Projection, Query, Target};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KindDoc {
    #[default]
    Select,
    Count,
    Distinct,
    Aggregate,
    Update,
    Delete,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryDoc {
    #[serde(rename = "type")]
    pub type_name: String,
    /// Defaults to the lowercased first letter of `type`.
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub kind: KindDoc,
    /// Selected paths for `select`; the projected field for `distinct` and `aggregate`.
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub aggregate: Option<Aggregate>,
    #[serde(default)]
    pub joins: Vec<String>,
    #[serde(default, rename = "where")]
    pub clauses: Vec<ClauseDoc>,
    #[serde(default)]
    pub where_raw: Option<String>,
    #[serde(default)]
    pub order: Vec<OrderKey>,
    #[serde(default)]
    pub set: BTreeMap<String, AssignmentDoc>,
}

/// Either a named condition (`field`) or a nested `group`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClauseDoc {
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default = "default_op")]
    pub op: Operator,
    /// Shorthand for a single operand.
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub values: Vec<Value>,
    /// Raw statement text on the right of `IN` / `NOT_IN`.
    #[serde(default)]
    pub subquery: Option<String>,
    #[serde(default)]
    pub join: BoolOp,
    #[serde(default)]
    pub group: Option<Vec<ClauseDoc>>,
}

fn default_op() -> Operator {
    Operator::Eq
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssignmentDoc {
    #[serde(default)]
    pub literal: Option<String>,
    #[serde(default)]
    pub expr: Option<String>,
    #[serde(default)]
    pub param: Option<Value>,
}

impl AssignmentDoc {
    fn into_assignment(self, field: &str) -> Result<Assignment> {
        match (self.literal, self.expr, self.param) {
            (Some(text), None, None) => Ok(Assignment::literal(text)),
            (None, Some(text), None) => Ok(Assignment::expr(text)),
            (None, None, Some(value)) => Ok(Assignment::param(value)),
            _ => bail!("assignment for '{field}' needs exactly one of literal, expr, param"),
        }
    }
}

impl ClauseDoc {
    fn condition(self, field: &str) -> Result<Condition> {
        let condition = match self.subquery {
            Some(_) if self.value.is_some() || !self.values.is_empty() => {
                bail!("clause '{field}' cannot combine subquery with value/values")
            }
            Some(sql) => Condition::with_subselect(self.op, SubSelect::Raw(sql)),
            None => {
                let mut values = self.values;
                if let Some(v) = self.value {
                    values.insert(0, v);
                }
                Condition::new(self.op, values)
            }
        };
        Ok(condition.joined_by(self.join))
    }
}

pub fn parameter_set(clauses: Vec<ClauseDoc>, order: Vec<OrderKey>) -> Result<ParameterSet> {
    let mut set = ParameterSet::new();
    for (i, mut clause) in clauses.into_iter().enumerate() {
        match (clause.group.take(), clause.field.take()) {
            (Some(group), None) => {
                let nested = parameter_set(group, Vec::new())
                    .with_context(|| format!("in group at position {i}"))?;
                set.add_group(nested, clause.join);
            }
            (None, Some(field)) => {
                let condition = clause.condition(&field)?;
                set.add(field, condition);
            }
            (Some(_), Some(field)) => bail!("clause '{field}' cannot also be a group"),
            (None, None) => bail!("clause at position {i} needs a field or a group"),
        }
    }
    set.set_order(order);
    Ok(set)
}

impl QueryDoc {
    pub fn parse(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("Failed to parse query document")
    }

    pub fn into_query(self) -> Result<Query> {
        let target = match self.alias {
            Some(alias) => Target::new(&self.type_name, alias),
            None => default_target(&self.type_name)?,
        };

        let single_field = |kind: &str| -> Result<String> {
            match self.fields.as_slice() {
                [field] => Ok(field.clone()),
                _ => bail!("'{kind}' needs exactly one entry in fields"),
            }
        };

        let mut query = match self.kind {
            KindDoc::Select => Query::select_fields(target, self.fields.iter().cloned()),
            KindDoc::Count => Query::projection(target, Projection::CountRows),
            KindDoc::Distinct => {
                Query::projection(target, Projection::Distinct(single_field("distinct")?))
            }
            KindDoc::Aggregate => {
                let aggregate = self
                    .aggregate
                    .context("'aggregate' kind needs an aggregate function")?;
                Query::projection(
                    target,
                    Projection::Aggregate(aggregate, single_field("aggregate")?),
                )
            }
            KindDoc::Update => {
                let mut assignments = BTreeMap::new();
                for (field, doc) in self.set {
                    let assignment = doc.into_assignment(&field)?;
                    assignments.insert(field, assignment);
                }
                Query::update(target, assignments)
            }
            KindDoc::Delete => Query::delete(target),
        };

        for join in self.joins {
            query = query.join(join);
        }
        query = query.filter(parameter_set(self.clauses, self.order)?);
        if let Some(raw) = self.where_raw {
            query = query.where_raw(raw);
        }
        Ok(query)
    }
}

fn default_target(type_name: &str) -> Result<Target> {
    let first = type_name
        .chars()
        .next()
        .context("query document needs a non-empty type")?;
    Ok(Target::new(type_name, first.to_lowercase().to_string()))
}
