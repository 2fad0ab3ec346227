//! Row at a time expression evaluation.

use std::sync::Arc;

use relplan_error::{DbError, OptionExt, Result};

use super::Expression;
use super::conjunction_expr::ConjunctionOperator;
use super::subquery_expr::{SubqueryExpr, SubqueryType};
use crate::functions::scalar::ScalarFunction;
use crate::schema::{ColumnName, Schema};
use crate::tuple::Tuple;
use crate::types::ScalarValue;

/// Bindings of (schema, row) pairs visible while evaluating an expression.
///
/// Built fresh for each row. Names not resolved by the local bindings are
/// looked up in the parent scope, if there is one.
#[derive(Debug, Default)]
pub struct Environment<'a> {
    bindings: Vec<(&'a Schema, &'a Tuple)>,
    parent: Option<&'a Arc<OuterScope>>,
}

impl<'a> Environment<'a> {
    pub fn new() -> Self {
        Environment {
            bindings: Vec::new(),
            parent: None,
        }
    }

    pub fn with_parent(parent: Option<&'a Arc<OuterScope>>) -> Self {
        Environment {
            bindings: Vec::new(),
            parent,
        }
    }

    /// Environment with a single row bound.
    pub fn for_row(schema: &'a Schema, tuple: &'a Tuple, parent: Option<&'a Arc<OuterScope>>) -> Self {
        Environment {
            bindings: vec![(schema, tuple)],
            parent,
        }
    }

    pub fn add_tuple(&mut self, schema: &'a Schema, tuple: &'a Tuple) {
        self.bindings.push((schema, tuple));
    }

    pub fn clear(&mut self) {
        self.bindings.clear();
    }

    pub fn lookup(&self, name: &ColumnName) -> Result<ScalarValue> {
        let mut found = None;
        for (schema, tuple) in &self.bindings {
            if let Some(idx) = schema.find_column(name)? {
                if found.is_some() {
                    return Err(DbError::eval(format!("Ambiguous column reference '{name}'")));
                }
                found = Some(tuple.get(idx).required("tuple value")?);
            }
        }

        match found {
            Some(v) => Ok(v.clone()),
            None => match self.parent {
                Some(parent) => parent.lookup(name),
                None => Err(DbError::eval(format!("Unknown column '{name}'"))),
            },
        }
    }

    /// Snapshot the current bindings so a subquery can reference them.
    pub fn snapshot(&self) -> Arc<OuterScope> {
        let mut schema = Schema::empty();
        let mut tuple = Tuple::default();
        for (s, t) in &self.bindings {
            schema = schema.concat(s);
            tuple = tuple.concat(t);
        }
        Arc::new(OuterScope {
            schema,
            tuple,
            parent: self.parent.cloned(),
        })
    }
}

/// Owned copy of an enclosing query's current row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OuterScope {
    schema: Schema,
    tuple: Tuple,
    parent: Option<Arc<OuterScope>>,
}

impl OuterScope {
    pub fn new(schema: Schema, tuple: Tuple, parent: Option<Arc<OuterScope>>) -> Self {
        OuterScope {
            schema,
            tuple,
            parent,
        }
    }

    pub fn lookup(&self, name: &ColumnName) -> Result<ScalarValue> {
        match self.schema.find_column(name)? {
            Some(idx) => Ok(self.tuple.get(idx).required("tuple value")?.clone()),
            None => match &self.parent {
                Some(parent) => parent.lookup(name),
                None => Err(DbError::eval(format!("Unknown column '{name}'"))),
            },
        }
    }
}

/// Evaluate an expression to a value.
pub fn evaluate(expr: &Expression, env: &Environment) -> Result<ScalarValue> {
    match expr {
        Expression::Column(col) => env.lookup(col),
        Expression::Literal(v) => Ok(v.clone()),
        Expression::Comparison(cmp) => {
            let left = evaluate(&cmp.left, env)?;
            let right = evaluate(&cmp.right, env)?;
            Ok(match left.compare(&right)? {
                Some(ord) => ScalarValue::Boolean(cmp.op.matches(ord)),
                None => ScalarValue::Null,
            })
        }
        Expression::Conjunction(conj) => {
            // Three valued logic, short circuiting on the deciding value.
            let deciding = conj.op == ConjunctionOperator::Or;
            let mut saw_null = false;
            for e in &conj.expressions {
                match evaluate(e, env)? {
                    ScalarValue::Null => saw_null = true,
                    v => {
                        if v.try_as_bool()? == deciding {
                            return Ok(ScalarValue::Boolean(deciding));
                        }
                    }
                }
            }
            if saw_null {
                Ok(ScalarValue::Null)
            } else {
                Ok(ScalarValue::Boolean(!deciding))
            }
        }
        Expression::Not(e) => match evaluate(e, env)? {
            ScalarValue::Null => Ok(ScalarValue::Null),
            v => Ok(ScalarValue::Boolean(!v.try_as_bool()?)),
        },
        Expression::Arith(arith) => {
            let left = evaluate(&arith.left, env)?;
            let right = evaluate(&arith.right, env)?;
            arith.op.apply(&left, &right)
        }
        Expression::IsNull(is_null) => {
            let v = evaluate(&is_null.expr, env)?;
            Ok(ScalarValue::Boolean(v.is_null() != is_null.negated))
        }
        Expression::InValues(in_vals) => {
            let needle = evaluate(&in_vals.expr, env)?;
            let mut candidates = Vec::with_capacity(in_vals.values.len());
            for v in &in_vals.values {
                candidates.push(evaluate(v, env)?);
            }
            membership(&needle, candidates.into_iter().map(Ok), in_vals.negated)
        }
        Expression::Function(call) => {
            if call.is_aggregate() {
                return Err(DbError::eval(format!(
                    "Aggregate '{call}' cannot be evaluated per row"
                )));
            }
            let func = ScalarFunction::try_from_name(&call.name)?;
            let args = call
                .args
                .iter()
                .map(|arg| evaluate(arg, env))
                .collect::<Result<Vec<_>>>()?;
            func.invoke(&args)
        }
        Expression::Subquery(subquery) => evaluate_subquery(subquery, env),
    }
}

/// Evaluate a predicate. NULL is treated as false.
pub fn evaluate_predicate(expr: &Expression, env: &Environment) -> Result<bool> {
    match evaluate(expr, env)? {
        ScalarValue::Null => Ok(false),
        ScalarValue::Boolean(b) => Ok(b),
        other => Err(DbError::eval(format!(
            "Predicate '{expr}' produced a non-boolean value: {other}"
        ))),
    }
}

/// SQL `IN` semantics over an iterator of candidates.
fn membership<I>(needle: &ScalarValue, candidates: I, negated: bool) -> Result<ScalarValue>
where
    I: Iterator<Item = Result<ScalarValue>>,
{
    if needle.is_null() {
        return Ok(ScalarValue::Null);
    }
    let mut saw_null = false;
    for candidate in candidates {
        match needle.compare(&candidate?)? {
            Some(std::cmp::Ordering::Equal) => return Ok(ScalarValue::Boolean(!negated)),
            Some(_) => (),
            None => saw_null = true,
        }
    }
    if saw_null {
        Ok(ScalarValue::Null)
    } else {
        Ok(ScalarValue::Boolean(negated))
    }
}

fn evaluate_subquery(subquery: &SubqueryExpr, env: &Environment) -> Result<ScalarValue> {
    let planned = subquery
        .plan
        .as_deref()
        .ok_or_else(|| DbError::eval(format!("Subquery has not been planned: {subquery}")))?;
    let mut plan = planned.clone();

    plan.set_outer_scope(env.snapshot());
    plan.initialize()?;
    let result = run_subquery(subquery, &mut plan, env);
    plan.clean_up();
    result
}

fn run_subquery(
    subquery: &SubqueryExpr,
    plan: &mut crate::execution::operators::PlanNode,
    env: &Environment,
) -> Result<ScalarValue> {
    match &subquery.subquery_type {
        SubqueryType::Scalar => {
            if plan.schema().num_columns() != 1 {
                return Err(DbError::eval("Scalar subquery must produce exactly one column")
                    .with_field("columns", plan.schema().num_columns()));
            }
            let first = match plan.next_tuple()? {
                Some(tuple) => tuple,
                None => return Ok(ScalarValue::Null),
            };
            if plan.next_tuple()?.is_some() {
                return Err(DbError::eval("Scalar subquery produced more than one row"));
            }
            Ok(first.get(0).required("subquery value")?.clone())
        }
        SubqueryType::Exists => Ok(ScalarValue::Boolean(plan.next_tuple()?.is_some())),
        SubqueryType::In { expr, negated } => {
            if plan.schema().num_columns() != 1 {
                return Err(DbError::eval("IN subquery must produce exactly one column")
                    .with_field("columns", plan.schema().num_columns()));
            }
            let needle = evaluate(expr, env)?;
            let candidates = std::iter::from_fn(|| match plan.next_tuple() {
                Ok(Some(tuple)) => Some(tuple.get(0).cloned().required("subquery value")),
                Ok(None) => None,
                Err(e) => Some(Err(e)),
            });
            membership(&needle, candidates, *negated)
        }
    }
}
