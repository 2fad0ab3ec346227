//! Turning select blocks into prepared plans.
//!
//! Both planners share the same pipeline and only differ in how they plan
//! the from clause:
//!
//! 1. Rewrite simple correlated scalar subqueries in the select list into
//!    joins.
//! 2. Replace aggregate calls with references to the aggregate's output.
//! 3. Plan subqueries found in the select list, WHERE and HAVING.
//! 4. Plan the from clause.
//! 5. Filter by whatever of WHERE the from clause didn't apply.
//! 6. Group and aggregate.
//! 7. Filter by HAVING.
//! 8. Project, unless the select list is a bare `*`.
//! 9. Sort.
//! 10. Apply LIMIT and OFFSET.
//! 11. Prepare the plan.

pub mod conjuncts;
pub mod cost_based;
pub mod decorrelate;
pub mod extract;
pub mod join_order;
pub mod simple;
pub mod subquery;

use std::fmt::Debug;

use cost_based::CostBasedPlanner;
use decorrelate::decorrelate_select_scalar;
use extract::{AggregateExtractor, replace_group_by_exprs};
use relplan_error::{DbError, Result, not_implemented};
use simple::SimplePlanner;
use subquery::{plan_subqueries, reject_subqueries};
use tracing::{Level, debug, info, warn};

use crate::ast::{FromClause, OrderByExpr, SelectClause, SelectValue};
use crate::config::PlannerConfig;
use crate::execution::operators::PlanNode;
use crate::explain::node::{ExplainFormat, format_plan_for_explain};
use crate::expr::Expression;
use crate::storage::TableProvider;

/// Plans select blocks.
pub trait Planner: Debug {
    /// Plan a select block.
    ///
    /// `enclosing` holds the select blocks this one is nested in, innermost
    /// first. Columns not found in the block's own from clause are looked up
    /// in the rows of the enclosing blocks when the plan runs.
    fn make_plan(&self, select: &SelectClause, enclosing: &[&SelectClause]) -> Result<PlanNode>;

    /// Plan `SELECT * FROM table WHERE predicate`.
    ///
    /// Used to find the rows targeted by UPDATE and DELETE.
    fn make_simple_select(
        &self,
        table: &str,
        predicate: Option<Expression>,
        enclosing: &[&SelectClause],
    ) -> Result<PlanNode>;
}

/// What a planner needs from the rest of the system.
#[derive(Debug, Clone, Copy)]
pub struct PlannerContext<'a> {
    pub tables: &'a dyn TableProvider,
    pub config: &'a PlannerConfig,
}

/// Create the planner selected by the config.
pub fn create_planner<'a>(
    tables: &'a dyn TableProvider,
    config: &'a PlannerConfig,
) -> Box<dyn Planner + 'a> {
    let ctx = PlannerContext { tables, config };
    if config.enable_join_reorder {
        Box::new(CostBasedPlanner::new(ctx))
    } else {
        Box::new(SimplePlanner::new(ctx))
    }
}

/// The part of planning that differs between planners.
pub(crate) trait FromClausePlanner: Planner + Sized {
    fn context(&self) -> PlannerContext<'_>;

    /// Plan a from clause.
    ///
    /// The planner may take `where_expr` if it applies it. Anything left is
    /// applied as a filter on top of the returned plan.
    fn plan_from_clause(
        &self,
        from: &FromClause,
        trivial_project: bool,
        where_expr: &mut Option<Expression>,
        enclosing: &[&SelectClause],
    ) -> Result<PlanNode>;
}

pub(crate) fn plan_select_block<P: FromClausePlanner>(
    planner: &P,
    original: &SelectClause,
    enclosing: &[&SelectClause],
) -> Result<PlanNode> {
    let ctx = planner.context();
    debug!(select = %original, depth = enclosing.len(), "planning select");

    let mut select = original.clone();
    if ctx.config.enable_subquery_decorrelation {
        select = decorrelate_select_scalar(select);
    }

    if let Some(expr) = &select.where_expr {
        if expr.contains_aggregate() {
            return Err(DbError::planning("WHERE clause cannot contain aggregates")
                .with_field("expression", expr));
        }
    }
    if let Some(expr) = select.group_by.iter().find(|e| e.contains_aggregate()) {
        return Err(DbError::planning("GROUP BY clause cannot contain aggregates")
            .with_field("expression", expr));
    }
    reject_subqueries("GROUP BY", &select.group_by)?;
    reject_subqueries("ORDER BY", select.order_by.iter().map(|o| &o.expr))?;

    let mut extractor = AggregateExtractor::new();
    let values = std::mem::take(&mut select.select_values);
    for value in values {
        let value = match value {
            SelectValue::Expression { expr, alias } => {
                let expr = extractor.extract(expr)?;
                SelectValue::Expression {
                    expr: replace_group_by_exprs(expr, &select.group_by)?,
                    alias,
                }
            }
            wildcard => wildcard,
        };
        select.select_values.push(value);
    }
    select.having = match select.having.take() {
        Some(having) => Some(replace_group_by_exprs(
            extractor.extract(having)?,
            &select.group_by,
        )?),
        None => None,
    };
    select.order_by = std::mem::take(&mut select.order_by)
        .into_iter()
        .map(|order| {
            let order = extractor.rewrite_order_by(order)?;
            Ok(OrderByExpr {
                expr: replace_group_by_exprs(order.expr, &select.group_by)?,
                ascending: order.ascending,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut nested = Vec::with_capacity(enclosing.len() + 1);
    nested.push(original);
    nested.extend_from_slice(enclosing);

    let values = std::mem::take(&mut select.select_values);
    for value in values {
        let value = match value {
            SelectValue::Expression { expr, alias } => SelectValue::Expression {
                expr: plan_subqueries(planner, expr, &nested)?,
                alias,
            },
            wildcard => wildcard,
        };
        select.select_values.push(value);
    }
    let mut where_expr = select
        .where_expr
        .take()
        .map(|expr| plan_subqueries(planner, expr, &nested))
        .transpose()?;
    let having = select
        .having
        .take()
        .map(|expr| plan_subqueries(planner, expr, &nested))
        .transpose()?;

    let trivial_project = select.is_trivial_project();
    let mut plan = match &select.from {
        Some(from) => planner.plan_from_clause(from, trivial_project, &mut where_expr, enclosing)?,
        None => not_implemented!("SELECT without a FROM clause"),
    };

    if let Some(predicate) = where_expr {
        plan = PlanNode::filter(plan, predicate);
    }

    let aggregates = extractor.into_calls();
    if !select.group_by.is_empty() || !aggregates.is_empty() {
        plan = PlanNode::hash_aggregate(plan, select.group_by, aggregates);
    }

    if let Some(predicate) = having {
        plan = PlanNode::filter(plan, predicate);
    }

    if !trivial_project {
        plan = PlanNode::project(plan, select.select_values);
    }

    if !select.order_by.is_empty() {
        plan = PlanNode::sort(plan, select.order_by);
    }

    if select.limit.is_some() || select.offset.is_some() {
        plan = PlanNode::limit_offset(plan, select.limit, select.offset)?;
    }

    plan.prepare()?;
    log_plan(ctx.config, &plan);

    Ok(plan)
}

pub(crate) fn plan_simple_select(
    ctx: PlannerContext<'_>,
    table: &str,
    predicate: Option<Expression>,
    enclosing: &[&SelectClause],
) -> Result<PlanNode> {
    if !enclosing.is_empty() {
        warn!(
            table,
            depth = enclosing.len(),
            "simple select with enclosing selects, outer references resolve when the plan runs"
        );
    }

    let handle = ctx.tables.open_table(table)?;
    let mut plan = PlanNode::file_scan(handle, predicate);
    plan.prepare()?;
    Ok(plan)
}

fn log_plan(config: &PlannerConfig, plan: &PlanNode) {
    if !config.explain_plans && !tracing::enabled!(Level::DEBUG) {
        return;
    }
    match format_plan_for_explain(plan, ExplainFormat::Text, true) {
        Ok(text) if config.explain_plans => info!("planned query\n{text}"),
        Ok(text) => debug!("planned query\n{text}"),
        Err(e) => warn!(%e, "failed to format plan"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::FromClause;
    use crate::execution::operators::testutil::{collect_rows, opt_int_rows, test_tables};
    use crate::expr::comparison_expr::ComparisonOperator;
    use crate::tuple::Tuple;
    use crate::types::ScalarValue;

    fn groups() -> FromClause {
        FromClause::base_table("groups")
    }

    #[test]
    fn group_having_order() {
        let tables = test_tables();
        let config = PlannerConfig::default();
        let planner = create_planner(&tables, &config);

        // SELECT g, SUM(v) FROM groups GROUP BY g HAVING SUM(v) > 20 ORDER BY g DESC
        let sum_v = || Expression::function("sum", vec![Expression::column("groups", "v")]);
        let select = SelectClause::new(vec![
            SelectValue::expr(Expression::column("groups", "g")),
            SelectValue::expr(sum_v()),
        ])
        .with_from(groups())
        .with_group_by(vec![Expression::column("groups", "g")])
        .with_having(Expression::compare(
            ComparisonOperator::Gt,
            sum_v(),
            Expression::lit(20i64),
        ))
        .with_order_by(vec![OrderByExpr::desc(Expression::column("groups", "g"))]);

        let mut plan = planner.make_plan(&select, &[]).unwrap();
        assert_eq!("Sort", plan.operator_name());
        assert_eq!("[groups.g, SUM(groups.v)]", plan.schema().to_string());

        // Group 3 only has a NULL so its sum is NULL and doesn't pass HAVING.
        let expected = vec![
            Tuple::new([ScalarValue::Int32(2), ScalarValue::Int64(25)]),
            Tuple::new([ScalarValue::Int32(1), ScalarValue::Int64(40)]),
        ];
        assert_eq!(expected, collect_rows(&mut plan).unwrap());
    }

    #[test]
    fn trivial_project_skips_project() {
        let tables = test_tables();
        let config = PlannerConfig::default();
        let planner = create_planner(&tables, &config);

        let mut plan = planner
            .make_plan(&SelectClause::star(FromClause::base_table("t1")), &[])
            .unwrap();
        assert_eq!("FileScan", plan.operator_name());
        assert_eq!(opt_int_rows(&[&[Some(1)], &[Some(3)]]), collect_rows(&mut plan).unwrap());
    }

    #[test]
    fn limit_offset_on_top() {
        let tables = test_tables();
        let config = PlannerConfig::default();
        let planner = create_planner(&tables, &config);

        let select = SelectClause::star(groups()).with_limit(2).with_offset(1);
        let mut plan = planner.make_plan(&select, &[]).unwrap();
        assert_eq!("LimitOffset", plan.operator_name());
        assert_eq!(
            opt_int_rows(&[&[Some(2), Some(20)], &[Some(1), Some(30)]]),
            collect_rows(&mut plan).unwrap()
        );

        let negative = SelectClause::star(groups()).with_limit(-1);
        planner.make_plan(&negative, &[]).unwrap_err();
    }

    #[test]
    fn clause_errors() {
        let tables = test_tables();
        let config = PlannerConfig::default();
        let planner = create_planner(&tables, &config);

        let no_from = SelectClause::new(vec![SelectValue::expr(Expression::lit(1))]);
        planner.make_plan(&no_from, &[]).unwrap_err();

        let agg_in_where = SelectClause::star(groups()).with_where(Expression::compare(
            ComparisonOperator::Gt,
            Expression::count_star(),
            Expression::lit(1i64),
        ));
        planner.make_plan(&agg_in_where, &[]).unwrap_err();

        let subquery_in_order = SelectClause::star(groups()).with_order_by(vec![OrderByExpr::asc(
            Expression::scalar_subquery(SelectClause::star(FromClause::base_table("t1"))),
        )]);
        let err = planner.make_plan(&subquery_in_order, &[]).unwrap_err();
        assert!(err.to_string().starts_with("ORDER BY clause contains a subquery"));

        planner
            .make_plan(&SelectClause::star(FromClause::base_table("missing")), &[])
            .unwrap_err();
    }

    #[test]
    fn simple_select_is_prepared_scan() {
        let tables = test_tables();
        let config = PlannerConfig::default();
        let planner = create_planner(&tables, &config);

        let predicate = Expression::eq(Expression::column("t2", "b"), Expression::lit(5));
        let mut plan = planner.make_simple_select("t2", Some(predicate), &[]).unwrap();
        assert!(plan.is_prepared());
        assert_eq!(opt_int_rows(&[&[Some(5)]]), collect_rows(&mut plan).unwrap());
    }
}
