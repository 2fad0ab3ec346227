//! Replacing aggregate calls with references to the columns that will hold
//! their results.

use indexmap::IndexMap;
use relplan_error::{DbError, Result};

use crate::ast::OrderByExpr;
use crate::expr::Expression;
use crate::functions::aggregate::AggregateCall;

/// Collects the aggregate calls of a select block.
///
/// Each call is named by its text, so the same call appearing twice is only
/// computed once.
#[derive(Debug, Default)]
pub struct AggregateExtractor {
    calls: IndexMap<String, AggregateCall>,
}

impl AggregateExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every aggregate call in `expr` with an unqualified column
    /// reference named after the call.
    pub fn extract(&mut self, expr: Expression) -> Result<Expression> {
        let mut nested = None;
        expr.walk(&mut |e| {
            if let Expression::Function(call) = e {
                if call.is_aggregate() && call.args.iter().any(|arg| arg.contains_aggregate()) {
                    nested.get_or_insert_with(|| call.to_string());
                }
            }
        });
        if let Some(call) = nested {
            return Err(DbError::planning(format!(
                "Aggregate calls cannot be nested: {call}"
            )));
        }

        expr.rewrite_post_order(&mut |e| match e {
            Expression::Function(call) if call.is_aggregate() => {
                let name = call.to_string();
                if !self.calls.contains_key(&name) {
                    let agg = AggregateCall::try_from_call(name.clone(), &call)?;
                    self.calls.insert(name.clone(), agg);
                }
                Ok(Expression::unqualified_column(&name))
            }
            other => Ok(other),
        })
    }

    /// Rewrite aggregate calls in an ORDER BY expression to the names already
    /// produced for the select list.
    pub fn rewrite_order_by(&self, order: OrderByExpr) -> Result<OrderByExpr> {
        let expr = order.expr.rewrite_post_order(&mut |e| match e {
            Expression::Function(call) if call.is_aggregate() => {
                let name = call.to_string();
                if self.calls.contains_key(&name) {
                    Ok(Expression::unqualified_column(&name))
                } else {
                    Err(DbError::planning(format!(
                        "ORDER BY aggregate {name} must also appear in the select list"
                    )))
                }
            }
            other => Ok(other),
        })?;
        Ok(OrderByExpr {
            expr,
            ascending: order.ascending,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn into_calls(self) -> Vec<AggregateCall> {
        self.calls.into_values().collect()
    }
}

/// Replace expressions equal to a non-column GROUP BY expression with a
/// reference to the column the aggregate produces for it.
pub fn replace_group_by_exprs(expr: Expression, group_by: &[Expression]) -> Result<Expression> {
    if group_by.iter().all(|g| g.as_column().is_some()) {
        return Ok(expr);
    }

    expr.rewrite_post_order(&mut |e| {
        if e.as_column().is_none() && group_by.contains(&e) {
            Ok(Expression::unqualified_column(&e.to_string()))
        } else {
            Ok(e)
        }
    })
}
