use std::sync::Arc;

use relplan_error::Result;

use super::{ExecutableNode, NodeProps, PlanNode};
use crate::ast::OrderByExpr;
use crate::explain::explainable::{EntryBuilder, ExplainConfig, ExplainEntry, Explainable};
use crate::expr::eval::OuterScope;
use crate::tuple::Tuple;

/// Re-qualifies every input column with a new table name.
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicalRename {
    pub(crate) input: Box<PlanNode>,
    pub(crate) alias: String,
}

impl PhysicalRename {
    pub fn new(input: PlanNode, alias: impl Into<String>) -> Self {
        PhysicalRename {
            input: Box::new(input),
            alias: alias.into(),
        }
    }
}

impl ExecutableNode for PhysicalRename {
    const OPERATOR_NAME: &'static str = "Rename";

    fn children(&self) -> Vec<&PlanNode> {
        vec![&self.input]
    }

    fn children_mut(&mut self) -> Vec<&mut PlanNode> {
        vec![&mut self.input]
    }

    fn compute_props(&self) -> Result<NodeProps> {
        let input = self.input.props();
        Ok(NodeProps {
            schema: input.schema.with_table_alias(&self.alias),
            stats: input.stats.clone(),
            cost: input.cost,
        })
    }

    fn reset_state(&mut self) -> Result<()> {
        Ok(())
    }

    fn poll_next(&mut self, _outer: Option<&Arc<OuterScope>>) -> Result<Option<Tuple>> {
        self.input.next_tuple()
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

    // Ordering expressions refer to the old names, so they're dropped.
    fn results_ordered_by(&self) -> Vec<OrderByExpr> {
        Vec::new()
    }
}

impl Explainable for PhysicalRename {
    fn explain_entry(&self, conf: ExplainConfig) -> ExplainEntry {
        EntryBuilder::new(Self::OPERATOR_NAME, conf)
            .with_value("alias", &self.alias)
            .build()
    }
}
