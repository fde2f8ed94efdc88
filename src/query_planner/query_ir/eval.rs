//! In-memory evaluator for expanded queries.
//!
//! Only used by tests, to check that a rewritten query returns the same rows
//! as the navigation semantics of the original over small tables. Equality
//! follows object semantics (`null == null`), join keys never match on null.

use std::collections::HashMap;

use super::{BinaryOperator, Expr, Literal, OperatorCall, QueryOperator};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Record(Vec<(String, Value)>),
    Tuple(Vec<Value>),
    List(Vec<Value>),
}

impl Value {
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Record(fields) => fields.iter().find(|(n, _)| n == name).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    fn is_true(&self) -> bool {
        matches!(self, Value::Bool(true))
    }

    fn contains_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Tuple(items) => items.iter().any(Value::contains_null),
            _ => false,
        }
    }
}

/// Build an entity row.
pub fn row(fields: &[(&str, Value)]) -> Value {
    Value::Record(
        fields
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect(),
    )
}

#[derive(Debug, Clone, Default)]
pub struct Tables {
    tables: HashMap<String, Vec<Value>>,
}

impl Tables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, entity: &str, rows: Vec<Value>) -> Self {
        self.tables.insert(entity.to_string(), rows);
        self
    }
}

pub fn evaluate(expr: &Expr, tables: &Tables) -> Result<Value, String> {
    Evaluator {
        tables,
        scope: Vec::new(),
    }
    .eval(expr)
}

struct Evaluator<'t> {
    tables: &'t Tables,
    scope: Vec<(String, Value)>,
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => (*a as f64) == *b,
        (Value::Tuple(a), Value::Tuple(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        _ => left == right,
    }
}

fn compare(left: &Value, right: &Value) -> Option<std::cmp::Ordering> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
        (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
        (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Sort order for OrderBy; nulls first.
fn sort_order(left: &Value, right: &Value) -> std::cmp::Ordering {
    match (left, right) {
        (Value::Null, Value::Null) => std::cmp::Ordering::Equal,
        (Value::Null, _) => std::cmp::Ordering::Less,
        (_, Value::Null) => std::cmp::Ordering::Greater,
        _ => compare(left, right).unwrap_or(std::cmp::Ordering::Equal),
    }
}

impl Evaluator<'_> {
    fn eval(&mut self, expr: &Expr) -> Result<Value, String> {
        match expr {
            Expr::EntitySet(set) => self
                .tables
                .tables
                .get(&set.entity)
                .map(|rows| Value::List(rows.clone()))
                .ok_or_else(|| format!("no table for {}", set.entity)),
            Expr::Constant(literal) => Ok(match literal {
                Literal::Null => Value::Null,
                Literal::Boolean(b) => Value::Bool(*b),
                Literal::Integer(i) => Value::Int(*i),
                Literal::Float(f) => Value::Float(*f),
                Literal::String(s) => Value::Str(s.clone()),
            }),
            Expr::Parameter(name) => self
                .scope
                .iter()
                .rev()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.clone())
                .ok_or_else(|| format!("unbound parameter {}", name)),
            Expr::Member(m) => match self.eval(&m.target)? {
                Value::Null => Ok(Value::Null),
                record @ Value::Record(_) => record
                    .field(&m.member)
                    .cloned()
                    .ok_or_else(|| format!("no member {} on {:?}", m.member, record)),
                other => Err(format!("member {} on non-record {:?}", m.member, other)),
            },
            Expr::Binary(b) => {
                let left = self.eval(&b.left)?;
                let right = self.eval(&b.right)?;
                Ok(match b.op {
                    BinaryOperator::Equal => Value::Bool(values_equal(&left, &right)),
                    BinaryOperator::NotEqual => Value::Bool(!values_equal(&left, &right)),
                    BinaryOperator::And => Value::Bool(left.is_true() && right.is_true()),
                    BinaryOperator::Or => Value::Bool(left.is_true() || right.is_true()),
                    BinaryOperator::LessThan
                    | BinaryOperator::LessThanOrEqual
                    | BinaryOperator::GreaterThan
                    | BinaryOperator::GreaterThanOrEqual => {
                        let ordering = compare(&left, &right);
                        Value::Bool(ordering.is_some_and(|o| match b.op {
                            BinaryOperator::LessThan => o.is_lt(),
                            BinaryOperator::LessThanOrEqual => o.is_le(),
                            BinaryOperator::GreaterThan => o.is_gt(),
                            _ => o.is_ge(),
                        }))
                    }
                    BinaryOperator::Add | BinaryOperator::Subtract => {
                        let sign = if b.op == BinaryOperator::Add { 1 } else { -1 };
                        match (left, right) {
                            (Value::Int(a), Value::Int(c)) => Value::Int(a + sign * c),
                            (Value::Float(a), Value::Float(c)) => Value::Float(a + sign as f64 * c),
                            _ => Value::Null,
                        }
                    }
                })
            }
            Expr::Not(inner) => Ok(match self.eval(inner)? {
                Value::Bool(b) => Value::Bool(!b),
                _ => Value::Null,
            }),
            Expr::Conditional(c) => {
                if self.eval(&c.test)?.is_true() {
                    self.eval(&c.if_true)
                } else {
                    self.eval(&c.if_false)
                }
            }
            Expr::Record(fields) => Ok(Value::Record(
                fields
                    .iter()
                    .map(|f| Ok((f.name.clone(), self.eval(&f.value)?)))
                    .collect::<Result<_, String>>()?,
            )),
            Expr::Tuple(items) => Ok(Value::Tuple(
                items
                    .iter()
                    .map(|i| self.eval(i))
                    .collect::<Result<_, _>>()?,
            )),
            Expr::Convert(c) => self.eval(&c.operand),
            Expr::Function(f) if f.name == "Equals" && f.arguments.len() == 2 => {
                let left = self.eval(&f.arguments[0])?;
                let right = self.eval(&f.arguments[1])?;
                Ok(Value::Bool(values_equal(&left, &right)))
            }
            Expr::NullSafeEqual(n) => {
                for guard in &n.guards {
                    if self.eval(guard)? == Value::Null {
                        return Ok(Value::Bool(false));
                    }
                }
                let left = self.eval(&n.left)?;
                let right = self.eval(&n.right)?;
                Ok(Value::Bool(values_equal(&left, &right)))
            }
            Expr::EntityShape(shape) => self.eval(&shape.source),
            Expr::Call(call) => self.eval_call(call),
            other => Err(format!("cannot evaluate {}", other)),
        }
    }

    fn apply(&mut self, lambda: &Expr, args: Vec<Value>) -> Result<Value, String> {
        let Expr::Lambda(l) = lambda else {
            return Err(format!("expected lambda, got {}", lambda));
        };
        if l.params.len() != args.len() {
            return Err(format!("arity mismatch applying {}", lambda));
        }
        let depth = self.scope.len();
        self.scope.extend(l.params.iter().cloned().zip(args));
        let result = self.eval(&l.body);
        self.scope.truncate(depth);
        result
    }

    fn list(&mut self, expr: &Expr) -> Result<Vec<Value>, String> {
        match self.eval(expr)? {
            Value::List(items) => Ok(items),
            other => Err(format!("expected a sequence, got {:?}", other)),
        }
    }

    fn int_arg(&mut self, expr: &Expr) -> Result<usize, String> {
        match self.eval(expr)? {
            Value::Int(n) if n >= 0 => Ok(n as usize),
            other => Err(format!("expected a count, got {:?}", other)),
        }
    }

    fn eval_call(&mut self, call: &OperatorCall) -> Result<Value, String> {
        let args = &call.arguments;
        match call.operator {
            QueryOperator::Where => {
                let mut out = Vec::new();
                for row in self.list(&args[0])? {
                    if self.apply(&args[1], vec![row.clone()])?.is_true() {
                        out.push(row);
                    }
                }
                Ok(Value::List(out))
            }
            QueryOperator::Select => {
                let rows = self.list(&args[0])?;
                Ok(Value::List(
                    rows.into_iter()
                        .map(|row| self.apply(&args[1], vec![row]))
                        .collect::<Result<_, _>>()?,
                ))
            }
            QueryOperator::Join | QueryOperator::GroupJoin => {
                let outer = self.list(&args[0])?;
                let inner = self.list(&args[1])?;
                let mut inner_keys = Vec::with_capacity(inner.len());
                for row in &inner {
                    inner_keys.push(self.apply(&args[3], vec![row.clone()])?);
                }
                let mut out = Vec::new();
                for row in outer {
                    let key = self.apply(&args[2], vec![row.clone()])?;
                    let matches: Vec<Value> = inner
                        .iter()
                        .zip(&inner_keys)
                        .filter(|(_, ik)| !key.contains_null() && values_equal(&key, ik))
                        .map(|(r, _)| r.clone())
                        .collect();
                    if call.operator == QueryOperator::GroupJoin {
                        out.push(self.apply(&args[4], vec![row, Value::List(matches)])?);
                    } else {
                        for m in matches {
                            out.push(self.apply(&args[4], vec![row.clone(), m])?);
                        }
                    }
                }
                Ok(Value::List(out))
            }
            QueryOperator::SelectMany => {
                let mut out = Vec::new();
                for row in self.list(&args[0])? {
                    let elements = match self.apply(&args[1], vec![row.clone()])? {
                        Value::List(items) => items,
                        other => return Err(format!("collection selector returned {:?}", other)),
                    };
                    for element in elements {
                        out.push(match args.get(2) {
                            Some(result) => self.apply(result, vec![row.clone(), element])?,
                            None => element,
                        });
                    }
                }
                Ok(Value::List(out))
            }
            QueryOperator::DefaultIfEmpty => {
                let rows = self.list(&args[0])?;
                Ok(Value::List(if rows.is_empty() {
                    vec![Value::Null]
                } else {
                    rows
                }))
            }
            QueryOperator::OrderBy | QueryOperator::OrderByDescending => {
                let rows = self.list(&args[0])?;
                let mut keyed = Vec::with_capacity(rows.len());
                for row in rows {
                    keyed.push((self.apply(&args[1], vec![row.clone()])?, row));
                }
                keyed.sort_by(|(a, _), (b, _)| sort_order(a, b));
                if call.operator == QueryOperator::OrderByDescending {
                    keyed.reverse();
                }
                Ok(Value::List(keyed.into_iter().map(|(_, row)| row).collect()))
            }
            QueryOperator::AsOrdered | QueryOperator::AsTracking => self.eval(&args[0]),
            QueryOperator::Distinct => {
                let mut out: Vec<Value> = Vec::new();
                for row in self.list(&args[0])? {
                    if !out.iter().any(|seen| values_equal(seen, &row)) {
                        out.push(row);
                    }
                }
                Ok(Value::List(out))
            }
            QueryOperator::Take | QueryOperator::Skip => {
                let rows = self.list(&args[0])?;
                let n = self.int_arg(&args[1])?;
                Ok(Value::List(if call.operator == QueryOperator::Take {
                    rows.into_iter().take(n).collect()
                } else {
                    rows.into_iter().skip(n).collect()
                }))
            }
            QueryOperator::Count => Ok(Value::Int(self.list(&args[0])?.len() as i64)),
            QueryOperator::Any => Ok(Value::Bool(!self.list(&args[0])?.is_empty())),
            QueryOperator::Contains => {
                let rows = self.list(&args[0])?;
                let value = self.eval(&args[1])?;
                Ok(Value::Bool(rows.iter().any(|r| values_equal(r, &value))))
            }
            QueryOperator::First | QueryOperator::Single => self
                .list(&args[0])?
                .into_iter()
                .next()
                .ok_or_else(|| "sequence contains no elements".to_string()),
            QueryOperator::FirstOrDefault | QueryOperator::SingleOrDefault => {
                Ok(self.list(&args[0])?.into_iter().next().unwrap_or(Value::Null))
            }
            ref other => Err(format!("evaluator does not support {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_left_join_idiom_keeps_unmatched_rows() {
        let tables = Tables::new()
            .with(
                "A",
                vec![row(&[("Id", Value::Int(1))]), row(&[("Id", Value::Int(2))])],
            )
            .with("B", vec![row(&[("AId", Value::Int(1))])]);

        let query = Expr::operator_call(
            QueryOperator::SelectMany,
            vec![
                Expr::operator_call(
                    QueryOperator::GroupJoin,
                    vec![
                        Expr::entity_set("A"),
                        Expr::entity_set("B"),
                        Expr::lambda(&["a"], Expr::param("a").member("Id")),
                        Expr::lambda(&["b"], Expr::param("b").member("AId")),
                        Expr::lambda(
                            &["a", "g"],
                            Expr::flattening_record(Expr::param("a"), Expr::param("g")),
                        ),
                    ],
                    None,
                ),
                Expr::lambda(
                    &["t"],
                    Expr::param("t").member("inner").call("DefaultIfEmpty", vec![]),
                ),
                Expr::lambda(
                    &["t", "b"],
                    Expr::flattening_record(Expr::param("t"), Expr::param("b")),
                ),
            ],
            None,
        );

        let result = evaluate(&query, &tables).unwrap();
        let rows = result.as_list().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].field("inner"), Some(&Value::Null));
    }

    #[test]
    fn test_null_safe_equality_rejects_missing_guard() {
        let expr = Expr::NullSafeEqual(super::super::NullSafeEquality {
            guards: vec![Expr::null()],
            left: Box::new(Expr::null()),
            right: Box::new(Expr::null()),
        });
        assert_eq!(evaluate(&expr, &Tables::new()), Ok(Value::Bool(false)));
        assert_eq!(
            evaluate(&Expr::null().equals(Expr::null()), &Tables::new()),
            Ok(Value::Bool(true))
        );
    }
}
