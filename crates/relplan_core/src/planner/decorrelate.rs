//! Rewriting simple correlated scalar subqueries in the select list into
//! outer joins.
//!
//! Only lookups of the form `(SELECT t.v FROM t WHERE t.k = outer.k)` are
//! rewritten. The subquery becomes `LEFT JOIN t AS subq_N ON subq_N.k =
//! outer.k` and the select value becomes `subq_N.v`. If `t.k` isn't unique
//! the join produces a row per match where the subquery would have failed at
//! runtime.

use tracing::debug;

use crate::ast::{FromClause, FromKind, JoinType, SelectClause, SelectValue};
use crate::expr::Expression;
use crate::expr::comparison_expr::ComparisonOperator;
use crate::expr::subquery_expr::SubqueryType;
use crate::schema::ColumnName;

#[derive(Debug, PartialEq)]
struct ScalarLookup {
    table: String,
    value_column: String,
    local_key: String,
    outer_key: ColumnName,
}

fn same_name(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

fn match_scalar_lookup(expr: &Expression) -> Option<ScalarLookup> {
    let Expression::Subquery(subquery) = expr else {
        return None;
    };
    if subquery.subquery_type != SubqueryType::Scalar {
        return None;
    }

    let query = &subquery.query;
    if !query.group_by.is_empty()
        || query.having.is_some()
        || !query.order_by.is_empty()
        || query.limit.is_some()
        || query.offset.is_some()
    {
        return None;
    }

    let from = query.from.as_ref()?;
    let FromKind::BaseTable { name: table } = &from.kind else {
        return None;
    };
    let local_name = from.result_name()?;

    let value = match query.select_values.as_slice() {
        [SelectValue::Expression {
            expr: Expression::Column(col),
            ..
        }] => col,
        _ => return None,
    };
    if value.table.as_deref().is_some_and(|t| !same_name(t, local_name)) {
        return None;
    }

    let Some(Expression::Comparison(cmp)) = &query.where_expr else {
        return None;
    };
    if cmp.op != ComparisonOperator::Eq {
        return None;
    }
    let (Some(left), Some(right)) = (cmp.left.as_column(), cmp.right.as_column()) else {
        return None;
    };
    let (Some(left_table), Some(right_table)) = (left.table.as_deref(), right.table.as_deref())
    else {
        return None;
    };
    if same_name(left_table, right_table) {
        return None;
    }

    let (local, outer) = if same_name(left_table, local_name) {
        (left, right)
    } else if same_name(right_table, local_name) {
        (right, left)
    } else {
        return None;
    };

    Some(ScalarLookup {
        table: table.clone(),
        value_column: value.column.clone(),
        local_key: local.column.clone(),
        outer_key: outer.clone(),
    })
}

/// Rewrite scalar lookups in the select list into LEFT joins against the
/// select's from clause.
pub fn decorrelate_select_scalar(mut select: SelectClause) -> SelectClause {
    let Some(mut from) = select.from.take() else {
        return select;
    };

    let mut rewritten = 0;
    for value in &mut select.select_values {
        let SelectValue::Expression { expr, alias } = value else {
            continue;
        };
        let Some(lookup) = match_scalar_lookup(expr) else {
            continue;
        };

        let join_alias = format!("subq_{rewritten}");
        rewritten += 1;
        debug!(subquery = %expr, alias = %join_alias, "decorrelating scalar subquery");

        let condition = Expression::eq(
            Expression::column(&join_alias, &lookup.local_key),
            Expression::Column(lookup.outer_key),
        );
        from = FromClause::join(
            from,
            FromClause::base_table(lookup.table).with_alias(join_alias.clone()),
            JoinType::Left,
            Some(condition),
        );

        // Keep the output column named as it would have been.
        let name = alias.take().unwrap_or_else(|| expr.to_string());
        *value = SelectValue::aliased(Expression::column(&join_alias, &lookup.value_column), name);
    }

    select.from = Some(from);
    select
}
