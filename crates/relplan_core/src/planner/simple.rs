//! Planner that joins tables in the order they were written.

use relplan_error::{DbError, Result};

use super::{FromClausePlanner, Planner, PlannerContext, plan_select_block, plan_simple_select};
use crate::ast::{FromClause, FromKind, SelectClause};
use crate::execution::operators::PlanNode;
use crate::expr::Expression;

/// Plans the from clause as written, with every join condition evaluated by
/// its join and WHERE filtered on top.
#[derive(Debug)]
pub struct SimplePlanner<'a> {
    ctx: PlannerContext<'a>,
}

impl<'a> SimplePlanner<'a> {
    pub fn new(ctx: PlannerContext<'a>) -> Self {
        SimplePlanner { ctx }
    }

    fn plan_from(&self, from: &FromClause) -> Result<PlanNode> {
        let plan = match &from.kind {
            FromKind::BaseTable { name } => self.make_simple_select(name, None, &[])?,
            FromKind::Derived { query } => {
                if from.alias.is_none() {
                    return Err(DbError::planning("Derived table requires an alias")
                        .with_field("query", query));
                }
                self.make_plan(query, &[])?
            }
            FromKind::Join {
                left,
                right,
                join_type,
                condition,
            } => PlanNode::nested_loop_join(
                self.plan_from(left)?,
                self.plan_from(right)?,
                *join_type,
                condition.clone(),
            )?,
        };

        Ok(match &from.alias {
            Some(alias) => PlanNode::rename(plan, alias),
            None => plan,
        })
    }
}

impl Planner for SimplePlanner<'_> {
    fn make_plan(&self, select: &SelectClause, enclosing: &[&SelectClause]) -> Result<PlanNode> {
        plan_select_block(self, select, enclosing)
    }

    fn make_simple_select(
        &self,
        table: &str,
        predicate: Option<Expression>,
        enclosing: &[&SelectClause],
    ) -> Result<PlanNode> {
        plan_simple_select(self.ctx, table, predicate, enclosing)
    }
}

impl FromClausePlanner for SimplePlanner<'_> {
    fn context(&self) -> PlannerContext<'_> {
        self.ctx
    }

    fn plan_from_clause(
        &self,
        from: &FromClause,
        _trivial_project: bool,
        _where_expr: &mut Option<Expression>,
        _enclosing: &[&SelectClause],
    ) -> Result<PlanNode> {
        self.plan_from(from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::JoinType;
    use crate::config::PlannerConfig;
    use crate::execution::operators::testutil::{collect_rows, opt_int_rows, test_tables};

    #[test]
    fn joins_as_written_with_where_on_top() {
        let tables = test_tables();
        let config = PlannerConfig {
            enable_join_reorder: false,
            ..Default::default()
        };
        let planner = SimplePlanner::new(PlannerContext {
            tables: &tables,
            config: &config,
        });

        let from = FromClause::join(
            FromClause::base_table("t1"),
            FromClause::base_table("t2"),
            JoinType::Right,
            Some(Expression::eq(
                Expression::column("t1", "a"),
                Expression::column("t2", "b"),
            )),
        );
        let select = SelectClause::star(from)
            .with_where(Expression::is_null(Expression::column("t1", "a"), true));

        let mut plan = planner.make_plan(&select, &[]).unwrap();
        assert_eq!("Filter", plan.operator_name());
        assert_eq!("NestedLoopJoin", plan.children()[0].operator_name());
        assert_eq!(
            opt_int_rows(&[&[Some(1), Some(1)]]),
            collect_rows(&mut plan).unwrap()
        );
    }

    #[test]
    fn renamed_table() {
        let tables = test_tables();
        let config = PlannerConfig::default();
        let planner = SimplePlanner::new(PlannerContext {
            tables: &tables,
            config: &config,
        });

        let select = SelectClause::star(FromClause::base_table("t1").with_alias("x"))
            .with_where(Expression::eq(Expression::column("x", "a"), Expression::lit(1)));
        let mut plan = planner.make_plan(&select, &[]).unwrap();
        assert_eq!("[x.a]", plan.schema().to_string());
        assert_eq!(opt_int_rows(&[&[Some(1)]]), collect_rows(&mut plan).unwrap());
    }
}
