use std::sync::Arc;

use indexmap::IndexMap;
use relplan_error::Result;
use tracing::debug;

use super::{ExecState, ExecutableNode, NodeProps, PlanNode};
use crate::execution::cost::PlanCost;
use crate::explain::explainable::{EntryBuilder, ExplainConfig, ExplainEntry, Explainable};
use crate::expr::Expression;
use crate::expr::eval::{Environment, OuterScope, evaluate};
use crate::functions::aggregate::{Accumulator, AggregateCall};
use crate::schema::{ColumnInfo, Schema};
use crate::statistics::ColumnStats;
use crate::statistics::assumptions::{CPU_OPERATOR_COST, CPU_TUPLE_COST};
use crate::tuple::Tuple;
use crate::types::ScalarValue;

#[derive(Debug, Default)]
pub struct HashAggregateState {
    /// Group key to accumulators, in first seen order. Built on the first pull.
    groups: Option<IndexMap<Tuple, Vec<Accumulator>>>,
    /// Next group to emit.
    pos: usize,
}

/// Groups rows of its input and computes aggregates for each group.
///
/// Output columns are the group by expressions followed by the aggregates.
/// Output is one row per group in first seen order. Without group by
/// expressions all input rows form one group, so empty input produces no
/// rows.
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicalHashAggregate {
    pub(crate) input: Box<PlanNode>,
    pub(crate) group_by: Vec<Expression>,
    pub(crate) aggregates: Vec<AggregateCall>,
    state: ExecState<HashAggregateState>,
}

impl PhysicalHashAggregate {
    pub fn new(input: PlanNode, group_by: Vec<Expression>, aggregates: Vec<AggregateCall>) -> Self {
        PhysicalHashAggregate {
            input: Box::new(input),
            group_by,
            aggregates,
            state: ExecState::default(),
        }
    }

    /// Estimate the number of groups from the distinct counts of the grouping
    /// columns, capped at the number of input rows.
    fn estimate_groups(&self, input: &NodeProps) -> f64 {
        if self.group_by.is_empty() {
            return input.cost.num_tuples.min(1.0);
        }

        let mut groups: Option<f64> = None;
        for expr in &self.group_by {
            let distinct = expr
                .as_column()
                .and_then(|col| input.schema.find_unambiguous(col))
                .and_then(|idx| input.stats.get(idx))
                .and_then(|stats| stats.distinct_count);
            if let Some(distinct) = distinct {
                groups = Some(groups.unwrap_or(1.0) * distinct as f64);
            }
        }

        match groups {
            Some(groups) => groups.min(input.cost.num_tuples),
            None => input.cost.num_tuples,
        }
    }

    fn build_groups(
        &mut self,
        outer: Option<&Arc<OuterScope>>,
    ) -> Result<IndexMap<Tuple, Vec<Accumulator>>> {
        let mut groups: IndexMap<Tuple, Vec<Accumulator>> = IndexMap::new();
        let mut input_rows = 0;

        while let Some(tuple) = self.input.next_tuple()? {
            input_rows += 1;
            let env = Environment::for_row(self.input.schema(), &tuple, outer);

            let key = self
                .group_by
                .iter()
                .map(|expr| evaluate(expr, &env))
                .collect::<Result<Tuple>>()?;

            let accumulators = groups.entry(key).or_insert_with(|| {
                self.aggregates
                    .iter()
                    .map(|agg| agg.new_accumulator())
                    .collect()
            });

            for (agg, acc) in self.aggregates.iter().zip(accumulators.iter_mut()) {
                let value = match &agg.arg {
                    Some(arg) => evaluate(arg, &env)?,
                    None => ScalarValue::Null,
                };
                acc.update(value)?;
            }
        }

        debug!(input_rows, groups = groups.len(), "built aggregate groups");

        Ok(groups)
    }
}

impl ExecutableNode for PhysicalHashAggregate {
    const OPERATOR_NAME: &'static str = "HashAggregate";

    fn children(&self) -> Vec<&PlanNode> {
        vec![&self.input]
    }

    fn children_mut(&mut self) -> Vec<&mut PlanNode> {
        vec![&mut self.input]
    }

    fn compute_props(&self) -> Result<NodeProps> {
        let input = self.input.props();

        let mut schema = Schema::empty();
        let mut stats = Vec::with_capacity(self.group_by.len() + self.aggregates.len());

        for expr in &self.group_by {
            match expr
                .as_column()
                .map(|col| input.schema.find_column(col))
                .transpose()?
                .flatten()
            {
                Some(idx) => {
                    schema.push(input.schema.columns()[idx].clone());
                    stats.push(input.stats.get(idx).cloned().unwrap_or_default());
                }
                None => {
                    schema.push(ColumnInfo::new(
                        None,
                        expr.to_string(),
                        expr.datatype(&input.schema)?,
                    ));
                    stats.push(ColumnStats::unknown());
                }
            }
        }

        for agg in &self.aggregates {
            let arg_type = agg
                .arg
                .as_ref()
                .map(|arg| arg.datatype(&input.schema))
                .transpose()?;
            schema.push(ColumnInfo::new(
                None,
                agg.name.clone(),
                agg.function.return_type(arg_type),
            ));
            stats.push(ColumnStats::unknown());
        }

        let n = input.cost.num_tuples;
        let groups = self.estimate_groups(input);
        let cost = PlanCost {
            num_tuples: groups,
            tuple_size: schema.estimated_tuple_size() as f64,
            cpu_cost: input.cost.cpu_cost
                + n * CPU_TUPLE_COST
                + n * self.aggregates.len() as f64 * CPU_OPERATOR_COST,
            num_block_ios: input.cost.num_block_ios,
            io_cost: input.cost.io_cost,
        };

        Ok(NodeProps {
            schema,
            stats,
            cost,
        })
    }

    fn reset_state(&mut self) -> Result<()> {
        self.state.set(HashAggregateState::default());
        Ok(())
    }

    fn poll_next(&mut self, outer: Option<&Arc<OuterScope>>) -> Result<Option<Tuple>> {
        if self.state.get_mut(Self::OPERATOR_NAME)?.groups.is_none() {
            let groups = self.build_groups(outer)?;
            self.state.get_mut(Self::OPERATOR_NAME)?.groups = Some(groups);
        }

        let state = self.state.get_mut(Self::OPERATOR_NAME)?;
        let Some((key, accumulators)) = state.groups.as_ref().and_then(|g| g.get_index(state.pos))
        else {
            return Ok(None);
        };
        state.pos += 1;

        let mut values = key.values().to_vec();
        values.extend(accumulators.iter().map(|acc| acc.finish()));

        Ok(Some(Tuple::from(values)))
    }

    fn release_state(&mut self) {
        self.state.clear();
    }
}

impl Explainable for PhysicalHashAggregate {
    fn explain_entry(&self, conf: ExplainConfig) -> ExplainEntry {
        EntryBuilder::new(Self::OPERATOR_NAME, conf)
            .with_values("group_by", &self.group_by)
            .with_values("aggregates", &self.aggregates)
            .build()
    }
}
