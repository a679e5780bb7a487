//! Direct evaluation of a [`ParameterSet`] against records.
//!
//! Mirrors the compiled statement: AND binds tighter than OR, LIKE uses SQL
//! wildcards, and a null hop in a path never matches.

use std::cmp::Ordering;

use query_core::{Clause, Condition, Operator, OrderKey, ParameterSet, SortDir, Value};

use crate::compile::{flatten_in, validate_condition};
use crate::entity::{resolve_path, PropertyAccess, Resolved};
use crate::errors::{CompileError, CompileResult};

/// True when `record` satisfies every clause of `params` (an empty set matches).
///
/// Every clause is evaluated, so a malformed condition fails regardless of
/// where it sits in the set.
pub fn matches(record: &dyn PropertyAccess, params: &ParameterSet) -> CompileResult<bool> {
    let mut any = false;
    let mut current: Option<bool> = None;
    for clause in params.clauses() {
        let hit = match clause {
            Clause::Param { name, condition } => condition_matches(record, name, condition)?,
            Clause::Group { params, .. } => {
                if params.is_empty() {
                    continue;
                }
                matches(record, params)?
            }
        };
        current = Some(match (current, clause.join()) {
            (None, _) => hit,
            (Some(acc), query_core::BoolOp::And) => acc && hit,
            (Some(acc), query_core::BoolOp::Or) => {
                any |= acc;
                hit
            }
        });
    }
    Ok(match current {
        None => true,
        Some(last) => any || last,
    })
}

fn condition_matches(
    record: &dyn PropertyAccess,
    name: &str,
    condition: &Condition,
) -> CompileResult<bool> {
    validate_condition(name, condition)?;
    if condition.subselect().is_some() {
        return Err(CompileError::Unsupported("sub-select in in-memory evaluation"));
    }
    let actual = match resolve_path(record, name)? {
        Resolved::Missing => return Ok(false),
        Resolved::Value(v) => v,
    };
    let values = condition.values();
    let first = values.first().unwrap_or(&Value::Null);

    Ok(match condition.op() {
        Operator::IsNull => actual.is_null(),
        Operator::IsNotNull => !actual.is_null(),
        Operator::Eq if first.is_null() => actual.is_null(),
        Operator::NotEq if first.is_null() => !actual.is_null(),
        _ if actual.is_null() => false,
        Operator::Eq => match first {
            Value::String(pattern) => like_value(&actual, pattern),
            v => actual.same_as(v),
        },
        Operator::NotEq => !actual.same_as(first),
        Operator::Like => first.as_str().is_some_and(|p| like_value(&actual, p)),
        Operator::Gt => actual.compare(first) == Some(Ordering::Greater),
        Operator::Geq => matches!(
            actual.compare(first),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        Operator::Lt => actual.compare(first) == Some(Ordering::Less),
        Operator::Leq => matches!(actual.compare(first), Some(Ordering::Less | Ordering::Equal)),
        Operator::Between => {
            let high = values.get(1).unwrap_or(&Value::Null);
            matches!(
                actual.compare(first),
                Some(Ordering::Greater | Ordering::Equal)
            ) && matches!(actual.compare(high), Some(Ordering::Less | Ordering::Equal))
        }
        Operator::In => flatten_in(values).iter().any(|v| actual.same_as(v)),
        // `x not in (.., null)` is never true in SQL
        Operator::NotIn => {
            let operands = flatten_in(values);
            !operands.iter().any(Value::is_null) && !operands.iter().any(|v| actual.same_as(v))
        }
    })
}

/// Strings match directly; other scalars match on their display form.
fn like_value(actual: &Value, pattern: &str) -> bool {
    match actual {
        Value::String(s) => like_match(s, pattern),
        Value::Null | Value::List(_) => false,
        other => like_match(&other.to_string(), pattern),
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Token {
    AnyRun,
    AnyOne,
    Lit(char),
}

fn tokenize(pattern: &str) -> Vec<Token> {
    let mut out = Vec::with_capacity(pattern.len());
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        out.push(match c {
            '%' => Token::AnyRun,
            '_' => Token::AnyOne,
            // trailing backslash stands for itself
            '\\' => Token::Lit(chars.next().unwrap_or('\\')),
            c => Token::Lit(c),
        });
    }
    out
}

/// Case-sensitive SQL LIKE: `%` any run, `_` one char, `\` escapes.
pub fn like_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern = tokenize(pattern);
    let (mut ti, mut pi) = (0usize, 0usize);
    let mut backtrack: Option<(usize, usize)> = None;

    while ti < text.len() {
        match pattern.get(pi) {
            Some(Token::AnyRun) => {
                backtrack = Some((pi, ti));
                pi += 1;
            }
            Some(Token::AnyOne) => {
                ti += 1;
                pi += 1;
            }
            Some(Token::Lit(c)) if *c == text[ti] => {
                ti += 1;
                pi += 1;
            }
            _ => match backtrack {
                Some((star, from)) => {
                    pi = star + 1;
                    ti = from + 1;
                    backtrack = Some((star, from + 1));
                }
                None => return false,
            },
        }
    }
    pattern[pi..].iter().all(|t| *t == Token::AnyRun)
}

/// Stable multi-key sort. Nulls and empty paths sort first ascending.
pub fn sort_records<T: PropertyAccess>(rows: &mut Vec<T>, order: &[OrderKey]) -> CompileResult<()> {
    if order.is_empty() || rows.len() < 2 {
        return Ok(());
    }
    let mut keyed = Vec::with_capacity(rows.len());
    for row in rows.drain(..) {
        let mut keys = Vec::with_capacity(order.len());
        for key in order {
            keys.push(match resolve_path(&row, &key.field)? {
                Resolved::Value(Value::Null) | Resolved::Missing => None,
                Resolved::Value(v) => Some(v),
            });
        }
        keyed.push((keys, row));
    }
    keyed.sort_by(|(a, _), (b, _)| {
        for ((x, y), key) in a.iter().zip(b.iter()).zip(order) {
            let ord = match (x, y) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(x), Some(y)) => x.compare(y).unwrap_or(Ordering::Equal),
            };
            let ord = match key.dir {
                SortDir::Asc => ord,
                SortDir::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
    rows.extend(keyed.into_iter().map(|(_, row)| row));
    Ok(())
}
