use std::sync::Arc;

use relplan_error::{DbError, Result};

use super::{ExecState, ExecutableNode, NodeProps, PlanNode};
use crate::ast::OrderByExpr;
use crate::explain::explainable::{EntryBuilder, ExplainConfig, ExplainEntry, Explainable};
use crate::expr::eval::OuterScope;
use crate::statistics::assumptions::CPU_TUPLE_COST;
use crate::tuple::Tuple;

#[derive(Debug, Default)]
pub struct LimitOffsetState {
    /// Number of rows pulled from the input so far, including skipped rows.
    cursor: u64,
    mark: u64,
}

/// Skips `offset` rows of its input then emits at most `limit` rows.
///
/// Reset only restores this node's own cursor. The input is asked to mark
/// but never reset, so this node can't be used inside a marked scope that
/// later resets.
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicalLimitOffset {
    pub(crate) input: Box<PlanNode>,
    /// None for no limit.
    pub(crate) limit: Option<u64>,
    pub(crate) offset: u64,
    state: ExecState<LimitOffsetState>,
}

impl PhysicalLimitOffset {
    pub fn try_new(input: PlanNode, limit: Option<i64>, offset: Option<i64>) -> Result<Self> {
        let limit = limit
            .map(|limit| {
                u64::try_from(limit).map_err(|_| {
                    DbError::planning("LIMIT must not be negative").with_field("limit", limit)
                })
            })
            .transpose()?;
        let offset = match offset {
            Some(offset) => u64::try_from(offset).map_err(|_| {
                DbError::planning("OFFSET must not be negative").with_field("offset", offset)
            })?,
            None => 0,
        };

        Ok(PhysicalLimitOffset {
            input: Box::new(input),
            limit,
            offset,
            state: ExecState::default(),
        })
    }
}

impl ExecutableNode for PhysicalLimitOffset {
    const OPERATOR_NAME: &'static str = "LimitOffset";

    fn children(&self) -> Vec<&PlanNode> {
        vec![&self.input]
    }

    fn children_mut(&mut self) -> Vec<&mut PlanNode> {
        vec![&mut self.input]
    }

    fn compute_props(&self) -> Result<NodeProps> {
        let mut props = self.input.props().clone();
        let remaining = (props.cost.num_tuples - self.offset as f64).max(0.0);
        let produced = match self.limit {
            Some(limit) => remaining.min(limit as f64),
            None => remaining,
        };
        props.cost.cpu_cost += (self.offset as f64 + produced) * CPU_TUPLE_COST;
        props.cost.num_tuples = produced;
        Ok(props)
    }

    fn reset_state(&mut self) -> Result<()> {
        self.state.set(LimitOffsetState::default());
        Ok(())
    }

    fn poll_next(&mut self, _outer: Option<&Arc<OuterScope>>) -> Result<Option<Tuple>> {
        let state = self.state.get_mut(Self::OPERATOR_NAME)?;

        while state.cursor < self.offset {
            if self.input.next_tuple()?.is_none() {
                return Ok(None);
            }
            state.cursor += 1;
        }

        if let Some(limit) = self.limit {
            if state.cursor - self.offset >= limit {
                return Ok(None);
            }
        }

        let tuple = self.input.next_tuple()?;
        if tuple.is_some() {
            state.cursor += 1;
        }
        Ok(tuple)
    }

    fn release_state(&mut self) {
        self.state.clear();
    }

    fn supports_marking(&self) -> bool {
        self.input.supports_marking()
    }

    fn mark(&mut self) -> Result<()> {
        self.input.mark()?;
        let state = self.state.get_mut(Self::OPERATOR_NAME)?;
        state.mark = state.cursor;
        Ok(())
    }

    fn reset_to_mark(&mut self) -> Result<()> {
        let state = self.state.get_mut(Self::OPERATOR_NAME)?;
        state.cursor = state.mark;
        Ok(())
    }

    fn results_ordered_by(&self) -> Vec<OrderByExpr> {
        self.input.results_ordered_by()
    }
}

impl Explainable for PhysicalLimitOffset {
    fn explain_entry(&self, conf: ExplainConfig) -> ExplainEntry {
        EntryBuilder::new(Self::OPERATOR_NAME, conf)
            .with_value_opt("limit", self.limit)
            .with_value("offset", self.offset)
            .build()
    }
}
