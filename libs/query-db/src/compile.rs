//! ParameterSet → statement text compiler.
//!
//! Output is a portable select/update/delete dialect with named `:placeholders`
//! (JPQL-like). Bindings travel next to the text in [`Statement::params`];
//! nothing is ever interpolated except update literals and raw fragments,
//! which the caller supplies as text on purpose.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use query_core::{Clause, Condition, Operator, OrderKey, ParameterSet, SortDir, SubSelect, Value};
use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::errors::{CompileError, CompileResult};

/// Entity name plus the alias every path is rooted at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Target {
    pub type_name: String,
    pub alias: String,
}

impl Target {
    pub fn new(type_name: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            alias: alias.into(),
        }
    }

    /// `Account` → `Account a`
    pub fn of<T: Entity>() -> Self {
        let name = T::type_name();
        let alias = name
            .chars()
            .next()
            .map(|c| c.to_lowercase().collect::<String>())
            .unwrap_or_else(|| "e".to_owned());
        Self::new(name, alias)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregate {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl Aggregate {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Aggregate::Count => "count",
            Aggregate::Sum => "sum",
            Aggregate::Avg => "avg",
            Aggregate::Min => "min",
            Aggregate::Max => "max",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Projection {
    /// `select <fn>(p.field)`
    Aggregate(Aggregate, String),
    /// `select distinct p.field`
    Distinct(String),
    /// `select count(p)`
    CountRows,
}

/// Right-hand side of an update assignment.
#[derive(Clone, Debug, PartialEq)]
pub enum Assignment {
    /// Quoted string literal.
    Literal(String),
    /// Expression emitted verbatim, e.g. `p.id+1`.
    Expr(String),
    /// Bound through a placeholder.
    Param(Value),
}

impl Assignment {
    pub fn literal(text: impl Into<String>) -> Self {
        Assignment::Literal(text.into())
    }

    pub fn expr(text: impl Into<String>) -> Self {
        Assignment::Expr(text.into())
    }

    pub fn param(value: impl Into<Value>) -> Self {
        Assignment::Param(value.into())
    }
}

impl From<Value> for Assignment {
    fn from(v: Value) -> Self {
        Assignment::Param(v)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum StatementKind {
    /// `select p` when empty, otherwise the listed paths.
    Select(Vec<String>),
    Projection(Projection),
    Update(BTreeMap<String, Assignment>),
    Delete,
}

/// Query intent before compilation.
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    target: Target,
    kind: StatementKind,
    joins: Vec<String>,
    params: ParameterSet,
    raw_where: Option<String>,
}

impl Query {
    fn new(target: Target, kind: StatementKind) -> Self {
        Self {
            target,
            kind,
            joins: Vec::new(),
            params: ParameterSet::new(),
            raw_where: None,
        }
    }

    pub fn select(target: Target) -> Self {
        Self::new(target, StatementKind::Select(Vec::new()))
    }

    pub fn select_fields<I, S>(target: Target, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            target,
            StatementKind::Select(fields.into_iter().map(Into::into).collect()),
        )
    }

    pub fn projection(target: Target, projection: Projection) -> Self {
        Self::new(target, StatementKind::Projection(projection))
    }

    pub fn update(target: Target, assignments: BTreeMap<String, Assignment>) -> Self {
        Self::new(target, StatementKind::Update(assignments))
    }

    pub fn delete(target: Target) -> Self {
        Self::new(target, StatementKind::Delete)
    }

    /// Append a join fragment as-is, e.g. `join p.other o`.
    pub fn join(mut self, fragment: impl Into<String>) -> Self {
        self.joins.push(fragment.into());
        self
    }

    pub fn filter(mut self, params: ParameterSet) -> Self {
        self.params = params;
        self
    }

    /// Extra condition text ANDed after the compiled filter.
    pub fn where_raw(mut self, condition: impl Into<String>) -> Self {
        self.raw_where = Some(condition.into());
        self
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn kind(&self) -> &StatementKind {
        &self.kind
    }

    pub fn params(&self) -> &ParameterSet {
        &self.params
    }

    pub fn compile(&self) -> CompileResult<Statement> {
        let mut c = Compiler::default();
        let sql = c.statement(self)?;
        tracing::trace!(sql = %sql, bindings = c.bindings.len(), "compiled statement");
        Ok(Statement {
            sql,
            params: c.bindings,
        })
    }
}

/// Placeholder name → bound value, in allocation order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Bindings(Vec<(String, Value)>);

impl Bindings {
    fn insert(&mut self, name: String, value: Value) -> CompileResult<()> {
        if self.get(&name).is_some() {
            return Err(CompileError::DuplicatePlaceholder(name));
        }
        self.0.push((name, value));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Compiled statement text plus its bindings.
#[derive(Clone, Debug, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Bindings,
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)?;
        if !self.params.is_empty() {
            f.write_str(" [")?;
            for (i, (name, value)) in self.params.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{name}={value}")?;
            }
            f.write_str("]")?;
        }
        Ok(())
    }
}

/// Operand rules shared by the compiler and the in-memory evaluator, so a
/// condition is either valid for both or rejected by both.
pub(crate) fn validate_condition(field: &str, condition: &Condition) -> CompileResult<()> {
    condition.check()?;
    let mismatch = |expected, got: &Value| CompileError::TypeMismatch {
        field: field.to_owned(),
        expected,
        got: got.kind(),
    };
    match condition.op() {
        Operator::Gt | Operator::Geq | Operator::Lt | Operator::Leq | Operator::Between => {
            for v in condition.values() {
                if matches!(v, Value::Null | Value::List(_)) {
                    return Err(mismatch("comparable scalar", v));
                }
            }
        }
        Operator::Like => {
            for v in condition.values() {
                if v.as_str().is_none() {
                    return Err(mismatch("string pattern", v));
                }
            }
        }
        _ => {}
    }
    Ok(())
}

/// `IN` operands with nested lists spread out.
pub(crate) fn flatten_in(values: &[Value]) -> Vec<Value> {
    let mut out = Vec::with_capacity(values.len());
    for v in values {
        match v {
            Value::List(items) => out.extend(flatten_in(items)),
            other => out.push(other.clone()),
        }
    }
    out
}

fn operand(condition: &Condition, i: usize) -> CompileResult<Value> {
    condition.values().get(i).cloned().ok_or_else(|| {
        CompileError::Model(query_core::Error::InvalidArity {
            op: condition.op(),
            expected: "an operand",
            got: condition.values().len(),
        })
    })
}

fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

#[derive(Default)]
struct Compiler {
    bindings: Bindings,
    used: HashSet<String>,
}

impl Compiler {
    /// Dots become underscores; a clash gets `_1`, `_2`, ... appended.
    fn allocate(&mut self, base: &str) -> String {
        let base = base.replace('.', "_");
        if self.used.insert(base.clone()) {
            return base;
        }
        let mut n = 1u32;
        loop {
            let candidate = format!("{base}_{n}");
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }

    fn bind(&mut self, base: &str, value: Value) -> CompileResult<String> {
        let name = self.allocate(base);
        self.bindings.insert(name.clone(), value)?;
        Ok(name)
    }

    fn statement(&mut self, q: &Query) -> CompileResult<String> {
        let Target { type_name, alias } = &q.target;
        let mut sql = match &q.kind {
            StatementKind::Select(fields) if fields.is_empty() => {
                format!("select {alias} from {type_name} {alias}")
            }
            StatementKind::Select(fields) => {
                let cols: Vec<String> = fields.iter().map(|f| format!("{alias}.{f}")).collect();
                format!("select {} from {type_name} {alias}", cols.join(", "))
            }
            StatementKind::Projection(Projection::Aggregate(agg, field)) => {
                format!("select {}({alias}.{field}) from {type_name} {alias}", agg.as_sql())
            }
            StatementKind::Projection(Projection::Distinct(field)) => {
                format!("select distinct {alias}.{field} from {type_name} {alias}")
            }
            StatementKind::Projection(Projection::CountRows) => {
                format!("select count({alias}) from {type_name} {alias}")
            }
            StatementKind::Update(assignments) => {
                if assignments.is_empty() {
                    return Err(CompileError::EmptyAssignments);
                }
                let mut sets = Vec::with_capacity(assignments.len());
                for (field, assignment) in assignments {
                    let lhs = if field.contains('.') {
                        field.clone()
                    } else {
                        format!("{alias}.{field}")
                    };
                    let rhs = match assignment {
                        Assignment::Literal(text) => quote_literal(text),
                        Assignment::Expr(expr) => expr.clone(),
                        Assignment::Param(value) => {
                            let base = field.rsplit('.').next().unwrap_or(field);
                            format!(":{}", self.bind(base, value.clone())?)
                        }
                    };
                    sets.push(format!("{lhs} = {rhs}"));
                }
                format!("update {type_name} {alias} set {}", sets.join(", "))
            }
            StatementKind::Delete => format!("delete from {type_name} {alias}"),
        };

        for join in &q.joins {
            sql.push(' ');
            sql.push_str(join);
        }

        let filter = self.expression(alias, &q.params)?;
        match (filter.is_empty(), &q.raw_where) {
            (true, None) => {}
            (false, None) => {
                sql.push_str(" where ");
                sql.push_str(&filter);
            }
            (true, Some(raw)) => {
                sql.push_str(" where ");
                sql.push_str(raw);
            }
            // Both sides are parenthesized so an `or` on either side cannot
            // escape the conjunction.
            (false, Some(raw)) => {
                sql.push_str(&format!(" where ({filter}) and ({raw})"));
            }
        }

        if matches!(
            q.kind,
            StatementKind::Select(_) | StatementKind::Projection(Projection::Distinct(_))
        ) {
            sql.push_str(&order_by(alias, q.params.order()));
        }
        Ok(sql)
    }

    fn expression(&mut self, alias: &str, params: &ParameterSet) -> CompileResult<String> {
        let mut out = String::new();
        for clause in params.clauses() {
            let fragment = match clause {
                Clause::Param { name, condition } => self.condition(alias, name, condition)?,
                Clause::Group { params, .. } => {
                    if params.is_empty() {
                        continue;
                    }
                    format!("({})", self.expression(alias, params)?)
                }
            };
            if !out.is_empty() {
                out.push(' ');
                out.push_str(clause.join().as_sql());
                out.push(' ');
            }
            out.push_str(&fragment);
        }
        Ok(out)
    }

    fn condition(&mut self, alias: &str, name: &str, c: &Condition) -> CompileResult<String> {
        validate_condition(name, c)?;
        let path = format!("{alias}.{name}");

        if let Some(sub) = c.subselect() {
            let keyword = match c.op() {
                Operator::NotIn => "not in",
                _ => "in",
            };
            let inner = match sub {
                SubSelect::Raw(sql) => sql.clone(),
                SubSelect::Select {
                    type_name,
                    alias: sub_alias,
                    field,
                    params,
                } => {
                    let q = Query::select_fields(Target::new(type_name, sub_alias), [field.clone()])
                        .filter((**params).clone());
                    self.statement(&q)?
                }
            };
            return Ok(format!("{path} {keyword} ({inner})"));
        }

        let sql = match c.op() {
            Operator::IsNull => format!("{path} is null"),
            Operator::IsNotNull => format!("{path} is not null"),
            Operator::Eq => match operand(c, 0)? {
                Value::Null => format!("{path} is null"),
                v @ Value::String(_) => format!("{path} like :{}", self.bind(name, v)?),
                v => format!("{path} = :{}", self.bind(name, v)?),
            },
            Operator::NotEq => match operand(c, 0)? {
                Value::Null => format!("{path} is not null"),
                v => format!("{path} <> :{}", self.bind(name, v)?),
            },
            Operator::Like => format!("{path} like :{}", self.bind(name, operand(c, 0)?)?),
            Operator::Gt => format!("{path} > :{}", self.bind(name, operand(c, 0)?)?),
            Operator::Geq => format!("{path} >= :{}", self.bind(name, operand(c, 0)?)?),
            Operator::Lt => format!("{path} < :{}", self.bind(name, operand(c, 0)?)?),
            Operator::Leq => format!("{path} <= :{}", self.bind(name, operand(c, 0)?)?),
            Operator::Between => {
                let low = self.bind(&format!("{name}1"), operand(c, 0)?)?;
                let high = self.bind(&format!("{name}2"), operand(c, 1)?)?;
                format!("{path} between :{low} and :{high}")
            }
            Operator::In => {
                let ph = self.bind(name, Value::List(flatten_in(c.values())))?;
                format!("{path} in (:{ph})")
            }
            Operator::NotIn => {
                let ph = self.bind(name, Value::List(flatten_in(c.values())))?;
                format!("{path} not in (:{ph})")
            }
        };
        Ok(sql)
    }
}

fn order_by(alias: &str, order: &[OrderKey]) -> String {
    if order.is_empty() {
        return String::new();
    }
    let keys: Vec<String> = order
        .iter()
        .map(|k| match k.dir {
            SortDir::Asc => format!("{alias}.{}", k.field),
            SortDir::Desc => format!("{alias}.{} DESC", k.field),
        })
        .collect();
    format!(" order by {}", keys.join(", "))
}

#[cfg(test)]
#[path = "compile_tests.rs"]
mod compile_tests;
