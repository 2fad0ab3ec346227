//! Splitting predicates into conjuncts and putting them back together.

use indexmap::IndexSet;

use crate::execution::operators::PlanNode;
use crate::expr::Expression;
use crate::expr::conjunction_expr::{ConjunctionExpr, ConjunctionOperator};
use crate::schema::Schema;

/// Split a predicate on AND, adding each term to `out`.
///
/// Nested ANDs are flattened. Duplicate terms are only kept once.
pub fn collect_conjuncts(expr: Expression, out: &mut IndexSet<Expression>) {
    match expr {
        Expression::Conjunction(ConjunctionExpr {
            op: ConjunctionOperator::And,
            expressions,
        }) => {
            for expr in expressions {
                collect_conjuncts(expr, out);
            }
        }
        other => {
            out.insert(other);
        }
    }
}

/// AND together conjuncts, None if there are none.
pub fn make_predicate(conjuncts: impl IntoIterator<Item = Expression>) -> Option<Expression> {
    let conjuncts: Vec<_> = conjuncts.into_iter().collect();
    if conjuncts.is_empty() {
        None
    } else {
        Some(Expression::and(conjuncts))
    }
}

/// If every column the expression references resolves against `schema`.
pub fn uses_only(expr: &Expression, schema: &Schema) -> bool {
    schema.contains_all(expr.column_refs())
}

/// Apply a predicate to a plan.
///
/// Scans take the predicate directly, ANDed with any predicate they already
/// have. Other plans get a filter on top. The returned plan is unprepared.
pub fn add_predicate_to_plan(plan: PlanNode, predicate: Expression) -> PlanNode {
    match plan {
        PlanNode::FileScan(mut node) => {
            node.op.predicate = Some(match node.op.predicate.take() {
                Some(existing) => {
                    let mut conjuncts = IndexSet::new();
                    collect_conjuncts(existing, &mut conjuncts);
                    collect_conjuncts(predicate, &mut conjuncts);
                    Expression::and(conjuncts.into_iter().collect())
                }
                None => predicate,
            });
            node.prepared = false;
            PlanNode::FileScan(node)
        }
        other => PlanNode::filter(other, predicate),
    }
}
