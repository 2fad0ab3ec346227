use std::sync::Arc;

use relplan_error::Result;

use super::{ExecutableNode, NodeProps, PlanNode};
use crate::ast::OrderByExpr;
use crate::explain::explainable::{EntryBuilder, ExplainConfig, ExplainEntry, Explainable};
use crate::expr::Expression;
use crate::expr::eval::{Environment, OuterScope, evaluate_predicate};
use crate::statistics::assumptions::CPU_OPERATOR_COST;
use crate::statistics::selectivity::estimate_selectivity;
use crate::tuple::Tuple;

/// Passes through rows of its input that satisfy a predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicalFilter {
    pub(crate) input: Box<PlanNode>,
    pub(crate) predicate: Expression,
}

impl PhysicalFilter {
    pub fn new(input: PlanNode, predicate: Expression) -> Self {
        PhysicalFilter {
            input: Box::new(input),
            predicate,
        }
    }
}

impl ExecutableNode for PhysicalFilter {
    const OPERATOR_NAME: &'static str = "Filter";

    fn children(&self) -> Vec<&PlanNode> {
        vec![&self.input]
    }

    fn children_mut(&mut self) -> Vec<&mut PlanNode> {
        vec![&mut self.input]
    }

    fn compute_props(&self) -> Result<NodeProps> {
        let mut props = self.input.props().clone();
        let selectivity = estimate_selectivity(&self.predicate, &props.schema, &props.stats);

        props.cost.cpu_cost += props.cost.num_tuples * CPU_OPERATOR_COST;
        props.cost.num_tuples *= selectivity;

        Ok(props)
    }

    fn reset_state(&mut self) -> Result<()> {
        Ok(())
    }

    fn poll_next(&mut self, outer: Option<&Arc<OuterScope>>) -> Result<Option<Tuple>> {
        while let Some(tuple) = self.input.next_tuple()? {
            let env = Environment::for_row(self.input.schema(), &tuple, outer);
            if evaluate_predicate(&self.predicate, &env)? {
                return Ok(Some(tuple));
            }
        }
        Ok(None)
    }

    fn release_state(&mut self) {}

    fn supports_marking(&self) -> bool {
        self.input.supports_marking()
    }

    fn mark(&mut self) -> Result<()> {
        self.input.mark()
    }

    fn reset_to_mark(&mut self) -> Result<()> {
        self.input.reset_to_mark()
    }

    fn results_ordered_by(&self) -> Vec<OrderByExpr> {
        self.input.results_ordered_by()
    }
}

impl Explainable for PhysicalFilter {
    fn explain_entry(&self, conf: ExplainConfig) -> ExplainEntry {
        EntryBuilder::new(Self::OPERATOR_NAME, conf)
            .with_value("predicate", &self.predicate)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::operators::testutil::{collect_rows, opt_int_rows, scan, test_tables};
    use crate::expr::comparison_expr::ComparisonOperator;

    #[test]
    fn filter_rows() {
        let tables = test_tables();
        let pred = Expression::compare(
            ComparisonOperator::Gt,
            Expression::column("groups", "v"),
            Expression::lit(9),
        );
        let mut plan = PlanNode::filter(scan(&tables, "groups"), pred);
        plan.prepare().unwrap();

        let expected = opt_int_rows(&[
            &[Some(1), Some(10)],
            &[Some(2), Some(20)],
            &[Some(1), Some(30)],
        ]);
        assert_eq!(expected, collect_rows(&mut plan).unwrap());
    }

    #[test]
    fn filter_cost_scales_rows() {
        let tables = test_tables();
        let pred = Expression::eq(Expression::column("groups", "g"), Expression::lit(1));
        let mut plan = PlanNode::filter(scan(&tables, "groups"), pred);
        plan.prepare().unwrap();

        let child_cost = *plan.children()[0].cost();
        let cost = plan.cost();
        // Three distinct values for g.
        assert!((cost.num_tuples - 5.0 / 3.0).abs() < 1e-9);
        assert!(cost.cpu_cost > child_cost.cpu_cost);
        assert_eq!(child_cost.io_cost, cost.io_cost);
    }

    #[test]
    fn filter_delegates_marking() {
        let tables = test_tables();
        let pred = Expression::eq(Expression::lit(1), Expression::lit(1));
        let mut plan = PlanNode::filter(scan(&tables, "t1"), pred);
        plan.prepare().unwrap();
        assert!(plan.supports_marking());

        plan.initialize().unwrap();
        let first = plan.next_tuple().unwrap();
        plan.mark().unwrap();
        plan.next_tuple().unwrap();
        plan.reset_to_mark().unwrap();
        assert_eq!(first, plan.next_tuple().unwrap());
    }
}
