//! Planning subqueries that appear inside expressions.

use relplan_error::{DbError, Result};
use tracing::debug;

use super::Planner;
use crate::ast::SelectClause;
use crate::expr::Expression;

/// Plan every subquery in `expr` and attach the plan to it.
///
/// `enclosing` should start with the select block `expr` belongs to. The
/// attached plans resolve correlated references through the row being
/// evaluated when the subquery runs.
pub fn plan_subqueries(
    planner: &dyn Planner,
    expr: Expression,
    enclosing: &[&SelectClause],
) -> Result<Expression> {
    expr.rewrite_post_order(&mut |e| match e {
        Expression::Subquery(mut subquery) => {
            debug!(%subquery, depth = enclosing.len(), "planning subquery");
            let plan = planner.make_plan(&subquery.query, enclosing)?;
            subquery.plan = Some(Box::new(plan));
            Ok(Expression::Subquery(subquery))
        }
        other => Ok(other),
    })
}

/// Error if an expression in a clause that can't hold subqueries has one.
pub fn reject_subqueries<'a>(
    clause: &str,
    exprs: impl IntoIterator<Item = &'a Expression>,
) -> Result<()> {
    for expr in exprs {
        if expr.contains_subquery() {
            return Err(
                DbError::planning(format!("{clause} clause contains a subquery"))
                    .with_field("expression", expr),
            );
        }
    }
    Ok(())
}
