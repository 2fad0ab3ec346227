//! Planner that picks a join order using estimated costs.

use std::collections::BTreeSet;

use indexmap::IndexSet;
use relplan_error::{DbError, Result};
use tracing::{debug, trace};

use super::conjuncts::{add_predicate_to_plan, collect_conjuncts, make_predicate, uses_only};
use super::join_order::{JoinComponent, generate_optimal_join};
use super::{
    FromClausePlanner, Planner, PlannerContext, plan_select_block, plan_simple_select,
};
use crate::ast::{FromClause, FromKind, JoinType, SelectClause, SelectValue};
use crate::execution::operators::PlanNode;
use crate::expr::Expression;
use crate::schema::Schema;

/// Conjuncts gathered from a join tree, with their indices split by how
/// they'll be applied.
#[derive(Debug)]
struct JoinConjuncts {
    all: Vec<Expression>,
    /// Placed by leaves or the join search.
    candidates: Vec<usize>,
    /// Applied in a filter above the joins.
    deferred: Vec<usize>,
}

impl JoinConjuncts {
    /// Take every candidate not already used that only references columns in
    /// `schema`.
    fn take_applicable(
        &self,
        schema: &Schema,
        used: &mut BTreeSet<usize>,
    ) -> Vec<Expression> {
        let mut taken = Vec::new();
        for &idx in &self.candidates {
            if !used.contains(&idx) && uses_only(&self.all[idx], schema) {
                taken.push(self.all[idx].clone());
                used.insert(idx);
            }
        }
        taken
    }
}

/// Plans from clauses by flattening inner joins into leaves and searching
/// for the cheapest join order.
///
/// WHERE conjuncts and join conditions are pushed as far down as the columns
/// they reference allow. Outer joins are never reordered, their sides are
/// planned separately.
#[derive(Debug)]
pub struct CostBasedPlanner<'a> {
    ctx: PlannerContext<'a>,
}

impl<'a> CostBasedPlanner<'a> {
    pub fn new(ctx: PlannerContext<'a>) -> Self {
        CostBasedPlanner { ctx }
    }

    /// Plan a join tree, applying `extra` conjuncts along with the tree's
    /// own join conditions.
    ///
    /// With `allow_outer_refs`, conjuncts referencing columns produced by no
    /// leaf are assumed to reference enclosing selects and are filtered on
    /// after the joins. Otherwise they're an error.
    fn make_join_plan(
        &self,
        from: &FromClause,
        extra: Vec<Expression>,
        allow_outer_refs: bool,
    ) -> Result<PlanNode> {
        // The leaves of a renamed inner join don't see its alias, conjuncts
        // written against the alias are applied once it's renamed.
        let renamed_root = from.is_renamed() && is_inner_join(from);
        let (extra, after_rename) = if renamed_root {
            (Vec::new(), extra)
        } else {
            (extra, Vec::new())
        };

        let mut leaves = Vec::new();
        let mut collected = IndexSet::new();
        for expr in extra {
            collect_conjuncts(expr, &mut collected);
        }
        collect_details(from, true, &mut leaves, &mut collected);

        debug!(leaves = leaves.len(), conjuncts = collected.len(), "collected join details");
        for conjunct in &collected {
            trace!(%conjunct, "join conjunct");
        }

        let max_leaves = self.ctx.config.max_join_leaves;
        if leaves.len() > max_leaves {
            return Err(DbError::planning(format!(
                "From clause has {} leaves, more than the maximum of {max_leaves}",
                leaves.len()
            ))
            .with_field("from", from));
        }

        // Subqueries are only evaluated once all joins are done.
        let all: Vec<Expression> = collected.into_iter().collect();
        let (deferred, candidates) = (0..all.len()).partition(|&idx| all[idx].contains_subquery());
        let mut conjuncts = JoinConjuncts {
            all,
            candidates,
            deferred,
        };

        let mut used_by_leaves = BTreeSet::new();
        let mut components = Vec::with_capacity(leaves.len());
        for (idx, leaf) in leaves.iter().enumerate() {
            let before = used_by_leaves.clone();
            let plan = self.make_leaf_plan(leaf, &conjuncts, &mut used_by_leaves)?;
            trace!(%leaf, cost = %plan.cost(), "planned join leaf");
            let used = used_by_leaves.difference(&before).copied().collect();
            components.push(JoinComponent::leaf(idx, plan, used));
        }

        if allow_outer_refs {
            let produced = components
                .iter()
                .fold(Schema::empty(), |schema, c| schema.concat(c.plan.schema()));
            let (local, outer): (Vec<usize>, Vec<usize>) =
                conjuncts.candidates.iter().copied().partition(|&idx| {
                    used_by_leaves.contains(&idx) || uses_only(&conjuncts.all[idx], &produced)
                });
            conjuncts.candidates = local;
            conjuncts.deferred.extend(outer);
        }

        let component = generate_optimal_join(components, &conjuncts.all, &conjuncts.candidates)?;

        let leftover: Vec<String> = conjuncts
            .candidates
            .iter()
            .filter(|idx| !component.conjuncts_used.contains(idx))
            .map(|&idx| conjuncts.all[idx].to_string())
            .collect();
        if !leftover.is_empty() {
            return Err(DbError::planning("Some conjuncts weren't recognised")
                .with_field("conjuncts", leftover.join(", ")));
        }

        let mut plan = component.plan;
        conjuncts.deferred.sort_unstable();
        let deferred = conjuncts
            .deferred
            .iter()
            .map(|&idx| conjuncts.all[idx].clone());
        if let Some(predicate) = make_predicate(deferred) {
            plan = PlanNode::filter(plan, predicate);
        }

        if renamed_root {
            if let Some(alias) = &from.alias {
                plan = PlanNode::rename(plan, alias);
            }
            if let Some(predicate) = make_predicate(after_rename) {
                plan = PlanNode::filter(plan, predicate);
            }
        }

        plan.prepare()?;
        Ok(plan)
    }

    /// Plan a single leaf, renamed by its alias, applying every conjunct it
    /// can.
    ///
    /// `used` holds the conjuncts already applied, the ones this leaf
    /// applies are added to it. The returned plan is prepared.
    fn make_leaf_plan(
        &self,
        leaf: &FromClause,
        conjuncts: &JoinConjuncts,
        used: &mut BTreeSet<usize>,
    ) -> Result<PlanNode> {
        let mut plan = match &leaf.kind {
            FromKind::BaseTable { name } => {
                PlanNode::file_scan(self.ctx.tables.open_table(name)?, None)
            }
            FromKind::Derived { query } => {
                if leaf.alias.is_none() {
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
            } if join_type.is_outer() => {
                self.make_outer_join_plan(left, right, *join_type, condition.clone(), conjuncts, used)?
            }
            // Renamed inner join, renamed by the nested planning.
            FromKind::Join { .. } => self.make_join_plan(leaf, Vec::new(), false)?,
        };
        if !is_inner_join(leaf) {
            if let Some(alias) = &leaf.alias {
                plan = PlanNode::rename(plan, alias);
            }
        }
        plan.prepare()?;

        if let Some(predicate) = make_predicate(conjuncts.take_applicable(plan.schema(), used)) {
            plan = add_predicate_to_plan(plan, predicate);
            plan.prepare()?;
        }

        Ok(plan)
    }

    /// Plan an outer join without reordering its sides.
    ///
    /// Conjuncts are only pushed into a side when that side is never padded
    /// with NULLs.
    fn make_outer_join_plan(
        &self,
        left: &FromClause,
        right: &FromClause,
        join_type: JoinType,
        condition: Option<Expression>,
        conjuncts: &JoinConjuncts,
        used: &mut BTreeSet<usize>,
    ) -> Result<PlanNode> {
        let left_extra = if join_type.has_outer_join_on_left() {
            Vec::new()
        } else {
            conjuncts.take_applicable(&self.from_clause_schema(left)?, used)
        };
        let right_extra = if join_type.has_outer_join_on_right() {
            Vec::new()
        } else {
            conjuncts.take_applicable(&self.from_clause_schema(right)?, used)
        };

        let left = self.make_join_plan(left, left_extra, false)?;
        let right = self.make_join_plan(right, right_extra, false)?;
        PlanNode::nested_loop_join(left, right, join_type, condition)
    }

    /// Schema a from clause produces when planned as written.
    fn from_clause_schema(&self, from: &FromClause) -> Result<Schema> {
        let schema = match &from.kind {
            FromKind::BaseTable { name } => self.ctx.tables.open_table(name)?.schema().clone(),
            FromKind::Derived { query } => self.make_plan(query, &[])?.schema().clone(),
            FromKind::Join { left, right, .. } => self
                .from_clause_schema(left)?
                .concat(&self.from_clause_schema(right)?),
        };
        Ok(match &from.alias {
            Some(alias) => schema.with_table_alias(alias),
            None => schema,
        })
    }
}

fn is_inner_join(from: &FromClause) -> bool {
    matches!(&from.kind, FromKind::Join { join_type, .. } if !join_type.is_outer())
}

/// Flatten a from clause into join leaves, collecting the conditions of the
/// inner joins.
///
/// Base tables, derived tables, outer joins and renamed inner joins below
/// the root are leaves.
fn collect_details<'a>(
    from: &'a FromClause,
    is_root: bool,
    leaves: &mut Vec<&'a FromClause>,
    conjuncts: &mut IndexSet<Expression>,
) {
    match &from.kind {
        FromKind::Join {
            left,
            right,
            join_type,
            condition,
        } if !join_type.is_outer() && (is_root || !from.is_renamed()) => {
            collect_details(left, false, leaves, conjuncts);
            collect_details(right, false, leaves, conjuncts);
            if let Some(condition) = condition {
                collect_conjuncts(condition.clone(), conjuncts);
            }
        }
        _ => leaves.push(from),
    }
}

impl Planner for CostBasedPlanner<'_> {
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

impl FromClausePlanner for CostBasedPlanner<'_> {
    fn context(&self) -> PlannerContext<'_> {
        self.ctx
    }

    fn plan_from_clause(
        &self,
        from: &FromClause,
        trivial_project: bool,
        where_expr: &mut Option<Expression>,
        enclosing: &[&SelectClause],
    ) -> Result<PlanNode> {
        let plan = match &from.kind {
            FromKind::BaseTable { name } if !from.is_renamed() => {
                let predicate = match where_expr.take() {
                    Some(expr) if expr.contains_subquery() => {
                        *where_expr = Some(expr);
                        None
                    }
                    other => other,
                };
                self.make_simple_select(name, predicate, &[])?
            }
            FromKind::BaseTable { name } => {
                let scan = PlanNode::file_scan(self.ctx.tables.open_table(name)?, None);
                PlanNode::rename(scan, from.alias.as_deref().unwrap_or(name))
            }
            FromKind::Derived { query } => {
                let alias = from.alias.as_ref().ok_or_else(|| {
                    DbError::planning("Derived table requires an alias").with_field("query", query)
                })?;
                PlanNode::rename(self.make_plan(query, &[])?, alias)
            }
            FromKind::Join { .. } => {
                let extra = where_expr.take().into_iter().collect();
                let mut plan = self.make_join_plan(from, extra, !enclosing.is_empty())?;

                // Join ordering can move columns around, put them back in the
                // order they were written.
                if trivial_project {
                    let written = self.from_clause_schema(from)?;
                    if plan.schema() != &written {
                        let values = written
                            .columns()
                            .iter()
                            .map(|col| SelectValue::expr(Expression::Column(col.column_name())))
                            .collect();
                        plan = PlanNode::project(plan, values);
                    }
                }
                plan
            }
        };
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlannerConfig;
    use crate::execution::operators::testutil::{collect_rows, opt_int_rows, test_tables};

    fn a_eq_b() -> Expression {
        Expression::eq(Expression::column("t1", "a"), Expression::column("t2", "b"))
    }

    fn join(join_type: JoinType, condition: Option<Expression>) -> FromClause {
        FromClause::join(
            FromClause::base_table("t1"),
            FromClause::base_table("t2"),
            join_type,
            condition,
        )
    }

    #[test]
    fn collect_details_flattens_inner_joins() {
        let from = FromClause::join(
            join(JoinType::Inner, Some(a_eq_b())),
            join(JoinType::Left, Some(a_eq_b())).with_alias("j"),
            JoinType::Cross,
            None,
        );

        let mut leaves = Vec::new();
        let mut conjuncts = IndexSet::new();
        collect_details(&from, true, &mut leaves, &mut conjuncts);

        assert_eq!(3, leaves.len());
        assert_eq!(Some("t1"), leaves[0].table_name());
        assert_eq!(Some("j"), leaves[2].result_name());
        assert!(leaves[2].is_outer_join());
        assert_eq!(1, conjuncts.len());
    }

    #[test]
    fn where_merged_into_scan() {
        let tables = test_tables();
        let config = PlannerConfig::default();
        let planner = CostBasedPlanner::new(PlannerContext {
            tables: &tables,
            config: &config,
        });

        let select = SelectClause::star(FromClause::base_table("t1"))
            .with_where(Expression::eq(Expression::column("t1", "a"), Expression::lit(3)));
        let mut plan = planner.make_plan(&select, &[]).unwrap();

        assert_eq!("FileScan", plan.operator_name());
        assert_eq!(opt_int_rows(&[&[Some(3)]]), collect_rows(&mut plan).unwrap());
    }

    #[test]
    fn where_pushed_to_preserved_side_of_left_join() {
        let tables = test_tables();
        let config = PlannerConfig::default();
        let planner = CostBasedPlanner::new(PlannerContext {
            tables: &tables,
            config: &config,
        });

        let select = SelectClause::star(join(JoinType::Left, Some(a_eq_b())))
            .with_where(Expression::eq(Expression::column("t1", "a"), Expression::lit(3)));
        let mut plan = planner.make_plan(&select, &[]).unwrap();

        assert_eq!("NestedLoopJoin", plan.operator_name());
        assert_eq!("FileScan", plan.children()[0].operator_name());
        assert_eq!(
            opt_int_rows(&[&[Some(3), None]]),
            collect_rows(&mut plan).unwrap()
        );
    }

    #[test]
    fn too_many_leaves() {
        let tables = test_tables();
        let config = PlannerConfig {
            max_join_leaves: 1,
            ..Default::default()
        };
        let planner = CostBasedPlanner::new(PlannerContext {
            tables: &tables,
            config: &config,
        });

        let err = planner
            .make_plan(&SelectClause::star(join(JoinType::Cross, None)), &[])
            .unwrap_err();
        assert!(err.to_string().contains("more than the maximum of 1"));
    }

    #[test]
    fn unknown_column_in_join_condition() {
        let tables = test_tables();
        let config = PlannerConfig::default();
        let planner = CostBasedPlanner::new(PlannerContext {
            tables: &tables,
            config: &config,
        });

        let bad = Expression::eq(Expression::column("t1", "a"), Expression::column("t3", "c"));
        let err = planner
            .make_plan(&SelectClause::star(join(JoinType::Inner, Some(bad))), &[])
            .unwrap_err();
        assert!(err.to_string().starts_with("Some conjuncts weren't recognised"));
    }
}
