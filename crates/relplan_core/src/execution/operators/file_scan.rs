use std::sync::Arc;

use relplan_error::Result;

use super::{ExecState, ExecutableNode, NodeProps, PlanNode};
use crate::execution::cost::PlanCost;
use crate::explain::explainable::{EntryBuilder, ExplainConfig, ExplainEntry, Explainable};
use crate::expr::Expression;
use crate::expr::eval::{Environment, OuterScope, evaluate_predicate};
use crate::statistics::assumptions::{CPU_OPERATOR_COST, CPU_TUPLE_COST, SEQ_PAGE_COST};
use crate::statistics::selectivity::estimate_selectivity;
use crate::storage::{TableHandle, TupleStream};
use crate::tuple::Tuple;

/// Table handle compared by table name.
#[derive(Debug, Clone)]
pub struct TableRef(pub Arc<dyn TableHandle>);

impl PartialEq for TableRef {
    fn eq(&self, other: &Self) -> bool {
        self.0.name().eq_ignore_ascii_case(other.0.name())
    }
}

#[derive(Debug)]
pub struct FileScanState {
    stream: Box<dyn TupleStream>,
}

/// Leaf node reading every row of a table.
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicalFileScan {
    pub(crate) table: TableRef,
    pub(crate) predicate: Option<Expression>,
    state: ExecState<FileScanState>,
}

impl PhysicalFileScan {
    pub fn new(table: Arc<dyn TableHandle>, predicate: Option<Expression>) -> Self {
        PhysicalFileScan {
            table: TableRef(table),
            predicate,
            state: ExecState::default(),
        }
    }

    pub fn table_name(&self) -> &str {
        self.table.0.name()
    }
}

impl ExecutableNode for PhysicalFileScan {
    const OPERATOR_NAME: &'static str = "FileScan";

    fn children(&self) -> Vec<&PlanNode> {
        Vec::new()
    }

    fn children_mut(&mut self) -> Vec<&mut PlanNode> {
        Vec::new()
    }

    fn compute_props(&self) -> Result<NodeProps> {
        let table = &self.table.0;
        let schema = table.schema().clone();
        let table_stats = table.stats();

        let mut stats = table_stats.columns.clone();
        stats.resize(schema.num_columns(), Default::default());

        let num_tuples = table_stats.row_count as f64;
        let mut cost = PlanCost::new(
            num_tuples,
            table_stats.avg_tuple_size,
            num_tuples * CPU_TUPLE_COST,
            table_stats.page_count,
            table_stats.page_count as f64 * SEQ_PAGE_COST,
        );

        if let Some(predicate) = &self.predicate {
            let selectivity = estimate_selectivity(predicate, &schema, &stats);
            cost.cpu_cost += num_tuples * CPU_OPERATOR_COST;
            cost.num_tuples *= selectivity;
        }

        Ok(NodeProps {
            schema,
            stats,
            cost,
        })
    }

    fn reset_state(&mut self) -> Result<()> {
        let stream = self.table.0.scan()?;
        self.state.set(FileScanState { stream });
        Ok(())
    }

    fn poll_next(&mut self, outer: Option<&Arc<OuterScope>>) -> Result<Option<Tuple>> {
        let state = self.state.get_mut(Self::OPERATOR_NAME)?;
        loop {
            let tuple = match state.stream.next_tuple()? {
                Some(tuple) => tuple,
                None => return Ok(None),
            };

            match &self.predicate {
                None => return Ok(Some(tuple)),
                Some(predicate) => {
                    let env = Environment::for_row(self.table.0.schema(), &tuple, outer);
                    if evaluate_predicate(predicate, &env)? {
                        return Ok(Some(tuple));
                    }
                }
            }
        }
    }

    fn release_state(&mut self) {
        self.state.clear();
    }

    fn supports_marking(&self) -> bool {
        true
    }

    fn mark(&mut self) -> Result<()> {
        self.state.get_mut(Self::OPERATOR_NAME)?.stream.mark()
    }

    fn reset_to_mark(&mut self) -> Result<()> {
        self.state.get_mut(Self::OPERATOR_NAME)?.stream.reset()
    }
}

impl Explainable for PhysicalFileScan {
    fn explain_entry(&self, conf: ExplainConfig) -> ExplainEntry {
        EntryBuilder::new(Self::OPERATOR_NAME, conf)
            .with_value("table", self.table_name())
            .with_value_opt("predicate", self.predicate.as_ref())
            .build()
    }
}
