use std::sync::Arc;

use relplan_error::{DbError, Result, not_implemented};
use tracing::trace;

use super::{ExecState, ExecutableNode, NodeProps, PlanNode};
use crate::ast::JoinType;
use crate::execution::cost::PlanCost;
use crate::explain::explainable::{EntryBuilder, ExplainConfig, ExplainEntry, Explainable};
use crate::expr::Expression;
use crate::expr::eval::{Environment, OuterScope, evaluate_predicate};
use crate::statistics::assumptions::{
    CPU_OPERATOR_COST,
    CPU_TUPLE_COST,
    RANDOM_PAGE_COST,
    SEQ_PAGE_COST,
};
use crate::statistics::selectivity::estimate_optional;
use crate::tuple::Tuple;

#[derive(Debug, Default)]
pub struct NestedLoopJoinState {
    /// Current row from the left input, None if the next pull should advance
    /// the left side.
    left_tuple: Option<Tuple>,
    /// If the current left row matched at least one right row.
    matched: bool,
    done: bool,
    /// Rows pulled from the right input for the current left row.
    right_pos: usize,
    /// If the left input has returned a row since initialization.
    left_started: bool,
    /// Last row returned, replayed after a reset.
    last_output: Option<Tuple>,
    /// Row to return before pulling from the inputs again.
    replay: Option<Tuple>,
    mark: Option<JoinMark>,
}

/// Join state saved by `mark`.
///
/// The right input is rewound by reinitializing it and skipping `right_pos`
/// rows, so only the left input needs to support marking.
#[derive(Debug, Clone)]
struct JoinMark {
    left_tuple: Option<Tuple>,
    matched: bool,
    done: bool,
    right_pos: usize,
    left_started: bool,
    last_output: Option<Tuple>,
}

/// Joins every left row against a full scan of the right input.
///
/// RIGHT joins are executed as LEFT joins with the inputs swapped. Output
/// rows always have the columns in the original left/right order.
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicalNestedLoopJoin {
    pub(crate) left: Box<PlanNode>,
    pub(crate) right: Box<PlanNode>,
    /// Join type being executed, never RIGHT.
    pub(crate) join_type: JoinType,
    pub(crate) condition: Option<Expression>,
    /// If the inputs were swapped to execute a RIGHT join.
    pub(crate) schema_swapped: bool,
    state: ExecState<NestedLoopJoinState>,
}

impl PhysicalNestedLoopJoin {
    pub fn try_new(
        left: PlanNode,
        right: PlanNode,
        join_type: JoinType,
        condition: Option<Expression>,
    ) -> Result<Self> {
        let (left, right, join_type, schema_swapped) = match join_type {
            JoinType::Inner | JoinType::Cross | JoinType::Left => (left, right, join_type, false),
            JoinType::Right => (right, left, JoinType::Left, true),
            JoinType::Full => not_implemented!("FULL join"),
        };

        Ok(PhysicalNestedLoopJoin {
            left: Box::new(left),
            right: Box::new(right),
            join_type,
            condition,
            schema_swapped,
            state: ExecState::default(),
        })
    }

    /// Join type as originally requested.
    pub fn original_join_type(&self) -> JoinType {
        if self.schema_swapped {
            JoinType::Right
        } else {
            self.join_type
        }
    }

    /// Inputs in their original (unswapped) order.
    fn original_inputs(&self) -> (&PlanNode, &PlanNode) {
        if self.schema_swapped {
            (&self.right, &self.left)
        } else {
            (&self.left, &self.right)
        }
    }

    fn output_row(schema_swapped: bool, left: &Tuple, right: &Tuple) -> Tuple {
        if schema_swapped {
            right.concat(left)
        } else {
            left.concat(right)
        }
    }
}

impl ExecutableNode for PhysicalNestedLoopJoin {
    const OPERATOR_NAME: &'static str = "NestedLoopJoin";

    fn children(&self) -> Vec<&PlanNode> {
        vec![&self.left, &self.right]
    }

    fn children_mut(&mut self) -> Vec<&mut PlanNode> {
        vec![&mut self.left, &mut self.right]
    }

    fn compute_props(&self) -> Result<NodeProps> {
        let (orig_left, orig_right) = self.original_inputs();
        let schema = orig_left.schema().concat(orig_right.schema());
        let mut stats = orig_left.stats().to_vec();
        stats.extend_from_slice(orig_right.stats());

        let left = self.left.cost();
        let right = self.right.cost();

        let cross_product = left.num_tuples * right.num_tuples;
        let selectivity = estimate_optional(self.condition.as_ref(), &schema, &stats);

        let mut cost = PlanCost::new(
            0.0,
            left.tuple_size + right.tuple_size,
            left.cpu_cost + left.num_tuples * right.cpu_cost,
            (left.num_block_ios as f64 + left.num_tuples * right.num_block_ios as f64) as u64,
            left.num_block_ios as f64 * RANDOM_PAGE_COST
                + left.num_tuples * right.num_block_ios as f64 * SEQ_PAGE_COST
                + RANDOM_PAGE_COST
                - SEQ_PAGE_COST,
        );
        cost.cpu_cost += cross_product * CPU_OPERATOR_COST;

        let mut created = selectivity * cross_product;
        if self.join_type == JoinType::Left {
            created += (1.0 - selectivity) * left.num_tuples;
        }
        cost.cpu_cost += created * CPU_TUPLE_COST;
        cost.num_tuples = created;

        Ok(NodeProps {
            schema,
            stats,
            cost,
        })
    }

    fn reset_state(&mut self) -> Result<()> {
        self.state.set(NestedLoopJoinState::default());
        Ok(())
    }

    fn poll_next(&mut self, outer: Option<&Arc<OuterScope>>) -> Result<Option<Tuple>> {
        loop {
            let state = self.state.get_mut(Self::OPERATOR_NAME)?;
            if let Some(tuple) = state.replay.take() {
                return Ok(Some(tuple));
            }
            if state.done {
                return Ok(None);
            }

            if state.left_tuple.is_none() {
                match self.left.next_tuple()? {
                    Some(tuple) => {
                        state.left_tuple = Some(tuple);
                        state.left_started = true;
                        state.matched = false;
                        state.right_pos = 0;
                        self.right.initialize()?;
                    }
                    None => {
                        state.done = true;
                        return Ok(None);
                    }
                }
            }

            let right_tuple = self.right.next_tuple()?;

            // Borrow state again, pulling from the right may have required
            // a mutable borrow of self.
            let state = self.state.get_mut(Self::OPERATOR_NAME)?;
            let left_tuple = match &state.left_tuple {
                Some(tuple) => tuple,
                None => continue,
            };

            match right_tuple {
                Some(right_tuple) => {
                    state.right_pos += 1;
                    let matches = match &self.condition {
                        None => true,
                        Some(condition) => {
                            let mut env = Environment::with_parent(outer);
                            env.add_tuple(self.left.schema(), left_tuple);
                            env.add_tuple(self.right.schema(), &right_tuple);
                            evaluate_predicate(condition, &env)?
                        }
                    };
                    if matches {
                        state.matched = true;
                        let out = Self::output_row(self.schema_swapped, left_tuple, &right_tuple);
                        state.last_output = Some(out.clone());
                        return Ok(Some(out));
                    }
                }
                None => {
                    let left_tuple = state.left_tuple.take();
                    if self.join_type == JoinType::Left && !state.matched {
                        if let Some(left_tuple) = left_tuple {
                            trace!(%left_tuple, "emitting unmatched left row");
                            let padding = Tuple::nulls(self.right.schema().num_columns());
                            let out = Self::output_row(self.schema_swapped, &left_tuple, &padding);
                            state.last_output = Some(out.clone());
                            return Ok(Some(out));
                        }
                    }
                }
            }
        }
    }

    fn release_state(&mut self) {
        self.state.clear();
    }

    fn supports_marking(&self) -> bool {
        self.left.supports_marking()
    }

    fn mark(&mut self) -> Result<()> {
        let state = self.state.get_mut(Self::OPERATOR_NAME)?;
        self.left.mark()?;
        state.mark = Some(JoinMark {
            left_tuple: state.left_tuple.clone(),
            matched: state.matched,
            done: state.done,
            right_pos: state.right_pos,
            left_started: state.left_started,
            last_output: state.last_output.clone(),
        });
        Ok(())
    }

    fn reset_to_mark(&mut self) -> Result<()> {
        let mark = self
            .state
            .get_mut(Self::OPERATOR_NAME)?
            .mark
            .clone()
            .ok_or_else(|| DbError::state("Reset called on a join without a mark"))?;

        self.left.reset_to_mark()?;
        if mark.left_started {
            // The left input replays the row it returned last, which is
            // either held in the mark or already fully joined.
            self.left.next_tuple()?;
        }
        self.right.initialize()?;
        if mark.left_tuple.is_some() {
            for _ in 0..mark.right_pos {
                if self.right.next_tuple()?.is_none() {
                    return Err(DbError::state(
                        "Right input ended early while returning to mark",
                    )
                    .with_field("rows", mark.right_pos));
                }
            }
        }

        let state = self.state.get_mut(Self::OPERATOR_NAME)?;
        state.left_tuple = mark.left_tuple;
        state.matched = mark.matched;
        state.done = mark.done;
        state.right_pos = mark.right_pos;
        state.left_started = mark.left_started;
        state.replay = mark.last_output.clone();
        state.last_output = mark.last_output;
        Ok(())
    }
}

impl Explainable for PhysicalNestedLoopJoin {
    fn explain_entry(&self, conf: ExplainConfig) -> ExplainEntry {
        EntryBuilder::new(Self::OPERATOR_NAME, conf)
            .with_value("join_type", self.original_join_type())
            .with_value_opt("condition", self.condition.as_ref())
            .with_value_if_verbose("schema_swapped", self.schema_swapped)
            .build()
    }
}
