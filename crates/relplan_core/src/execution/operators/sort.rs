use std::cmp::Ordering;
use std::sync::Arc;

use relplan_error::Result;

use super::{ExecState, ExecutableNode, NodeProps, PlanNode};
use crate::ast::OrderByExpr;
use crate::explain::explainable::{EntryBuilder, ExplainConfig, ExplainEntry, Explainable};
use crate::expr::eval::{Environment, OuterScope, evaluate};
use crate::statistics::assumptions::CPU_OPERATOR_COST;
use crate::tuple::Tuple;
use crate::types::ScalarValue;

#[derive(Debug, Default)]
pub struct SortState {
    /// Sorted input, filled on the first pull.
    rows: Option<Vec<Tuple>>,
    /// Index of the next row to return.
    pos: usize,
    mark: Option<usize>,
}

/// Materializes and sorts its input.
///
/// NULLs sort before all other values in ascending order.
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicalSort {
    pub(crate) input: Box<PlanNode>,
    pub(crate) order_by: Vec<OrderByExpr>,
    state: ExecState<SortState>,
}

impl PhysicalSort {
    pub fn new(input: PlanNode, order_by: Vec<OrderByExpr>) -> Self {
        PhysicalSort {
            input: Box::new(input),
            order_by,
            state: ExecState::default(),
        }
    }

    fn sorted_input(&mut self, outer: Option<&Arc<OuterScope>>) -> Result<Vec<Tuple>> {
        let mut keyed = Vec::new();
        while let Some(tuple) = self.input.next_tuple()? {
            let env = Environment::for_row(self.input.schema(), &tuple, outer);
            let key = self
                .order_by
                .iter()
                .map(|order| evaluate(&order.expr, &env))
                .collect::<Result<Vec<_>>>()?;
            keyed.push((key, tuple));
        }

        // Comparison errors can't escape sort_by, remember the first one.
        let mut error = None;
        keyed.sort_by(|(a, _), (b, _)| {
            for ((a, b), order) in a.iter().zip(b).zip(&self.order_by) {
                let ord = match compare_nulls_first(a, b) {
                    Ok(ord) => ord,
                    Err(e) => {
                        error.get_or_insert(e);
                        Ordering::Equal
                    }
                };
                let ord = if order.ascending { ord } else { ord.reverse() };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });

        if let Some(error) = error {
            return Err(error);
        }

        Ok(keyed.into_iter().map(|(_, tuple)| tuple).collect())
    }
}

fn compare_nulls_first(a: &ScalarValue, b: &ScalarValue) -> Result<Ordering> {
    Ok(match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.compare(b)?.unwrap_or(Ordering::Equal),
    })
}

impl ExecutableNode for PhysicalSort {
    const OPERATOR_NAME: &'static str = "Sort";

    fn children(&self) -> Vec<&PlanNode> {
        vec![&self.input]
    }

    fn children_mut(&mut self) -> Vec<&mut PlanNode> {
        vec![&mut self.input]
    }

    fn compute_props(&self) -> Result<NodeProps> {
        let mut props = self.input.props().clone();
        let n = props.cost.num_tuples;
        if n > 1.0 {
            props.cost.cpu_cost += n * n.log2() * CPU_OPERATOR_COST;
        }
        Ok(props)
    }

    fn reset_state(&mut self) -> Result<()> {
        self.state.set(SortState::default());
        Ok(())
    }

    fn poll_next(&mut self, outer: Option<&Arc<OuterScope>>) -> Result<Option<Tuple>> {
        if self.state.get_mut(Self::OPERATOR_NAME)?.rows.is_none() {
            let rows = self.sorted_input(outer)?;
            self.state.get_mut(Self::OPERATOR_NAME)?.rows = Some(rows);
        }

        let state = self.state.get_mut(Self::OPERATOR_NAME)?;
        let row = state.rows.as_ref().and_then(|rows| rows.get(state.pos)).cloned();
        if row.is_some() {
            state.pos += 1;
        }
        Ok(row)
    }

    fn release_state(&mut self) {
        self.state.clear();
    }

    fn supports_marking(&self) -> bool {
        true
    }

    fn mark(&mut self) -> Result<()> {
        let state = self.state.get_mut(Self::OPERATOR_NAME)?;
        state.mark = Some(state.pos.saturating_sub(1));
        Ok(())
    }

    fn reset_to_mark(&mut self) -> Result<()> {
        let state = self.state.get_mut(Self::OPERATOR_NAME)?;
        state.pos = state.mark.unwrap_or(0);
        Ok(())
    }

    fn results_ordered_by(&self) -> Vec<OrderByExpr> {
        self.order_by.clone()
    }
}

impl Explainable for PhysicalSort {
    fn explain_entry(&self, conf: ExplainConfig) -> ExplainEntry {
        EntryBuilder::new(Self::OPERATOR_NAME, conf)
            .with_values("order_by", &self.order_by)
            .build()
    }
}
