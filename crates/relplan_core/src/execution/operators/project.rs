use std::sync::Arc;

use relplan_error::{DbError, Result};

use super::{ExecState, ExecutableNode, NodeProps, PlanNode};
use crate::ast::{OrderByExpr, SelectValue};
use crate::execution::cost::PlanCost;
use crate::explain::explainable::{EntryBuilder, ExplainConfig, ExplainEntry, Explainable};
use crate::expr::Expression;
use crate::expr::eval::{Environment, OuterScope, evaluate};
use crate::schema::{ColumnInfo, Schema};
use crate::statistics::ColumnStats;
use crate::statistics::assumptions::CPU_TUPLE_COST;
use crate::tuple::Tuple;

/// How to produce one output column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProjectItem {
    /// Copy an input column.
    Input(usize),
    /// Evaluate the expression of the select value at this index.
    Expr(usize),
}

#[derive(Debug)]
pub struct ProjectState {
    items: Vec<ProjectItem>,
}

/// Computes the select list for each input row.
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicalProject {
    pub(crate) input: Box<PlanNode>,
    pub(crate) values: Vec<SelectValue>,
    state: ExecState<ProjectState>,
}

impl PhysicalProject {
    pub fn new(input: PlanNode, values: Vec<SelectValue>) -> Self {
        PhysicalProject {
            input: Box::new(input),
            values,
            state: ExecState::default(),
        }
    }

    /// Resolve the select list against the input schema.
    ///
    /// Wildcards expand to input columns, simple column references keep the
    /// input column's name and table, other expressions are named by their
    /// alias or their text.
    fn plan_items(&self, input: &Schema) -> Result<Vec<(ProjectItem, ColumnInfo)>> {
        let mut items = Vec::new();

        for (value_idx, value) in self.values.iter().enumerate() {
            match value {
                SelectValue::Wildcard { table: None } => {
                    items.extend(
                        input
                            .columns()
                            .iter()
                            .enumerate()
                            .map(|(idx, col)| (ProjectItem::Input(idx), col.clone())),
                    );
                }
                SelectValue::Wildcard { table: Some(table) } => {
                    let before = items.len();
                    items.extend(
                        input
                            .columns()
                            .iter()
                            .enumerate()
                            .filter(|(_, col)| {
                                col.table
                                    .as_deref()
                                    .is_some_and(|t| t.eq_ignore_ascii_case(table))
                            })
                            .map(|(idx, col)| (ProjectItem::Input(idx), col.clone())),
                    );
                    if items.len() == before {
                        return Err(DbError::planning(format!(
                            "Wildcard '{table}.*' matches no columns"
                        ))
                        .with_field("schema", input));
                    }
                }
                SelectValue::Expression { expr, alias } => {
                    let input_idx = match expr {
                        Expression::Column(col) => input.find_column(col)?,
                        _ => None,
                    };

                    let item = match input_idx {
                        Some(idx) => ProjectItem::Input(idx),
                        None => ProjectItem::Expr(value_idx),
                    };

                    let info = match (alias, input_idx) {
                        (Some(alias), _) => {
                            ColumnInfo::new(None, alias.clone(), expr.datatype(input)?)
                        }
                        (None, Some(idx)) => input.columns()[idx].clone(),
                        (None, None) => match expr {
                            Expression::Column(col) => ColumnInfo::new(
                                col.table.as_deref(),
                                col.column.clone(),
                                expr.datatype(input)?,
                            ),
                            _ => ColumnInfo::new(None, expr.to_string(), expr.datatype(input)?),
                        },
                    };

                    items.push((item, info));
                }
            }
        }

        Ok(items)
    }
}

impl ExecutableNode for PhysicalProject {
    const OPERATOR_NAME: &'static str = "Project";

    fn children(&self) -> Vec<&PlanNode> {
        vec![&self.input]
    }

    fn children_mut(&mut self) -> Vec<&mut PlanNode> {
        vec![&mut self.input]
    }

    fn compute_props(&self) -> Result<NodeProps> {
        let input = self.input.props();
        let items = self.plan_items(&input.schema)?;

        let stats = items
            .iter()
            .map(|(item, _)| match item {
                ProjectItem::Input(idx) => input.stats.get(*idx).cloned().unwrap_or_default(),
                ProjectItem::Expr(_) => ColumnStats::unknown(),
            })
            .collect();
        let schema = Schema::new(items.into_iter().map(|(_, info)| info));

        let cost = PlanCost {
            tuple_size: schema.estimated_tuple_size() as f64,
            cpu_cost: input.cost.cpu_cost + input.cost.num_tuples * CPU_TUPLE_COST,
            ..input.cost
        };

        Ok(NodeProps {
            schema,
            stats,
            cost,
        })
    }

    fn reset_state(&mut self) -> Result<()> {
        let items = self
            .plan_items(self.input.schema())?
            .into_iter()
            .map(|(item, _)| item)
            .collect();
        self.state.set(ProjectState { items });
        Ok(())
    }

    fn poll_next(&mut self, outer: Option<&Arc<OuterScope>>) -> Result<Option<Tuple>> {
        let state = self.state.get_mut(Self::OPERATOR_NAME)?;
        let tuple = match self.input.next_tuple()? {
            Some(tuple) => tuple,
            None => return Ok(None),
        };

        let env = Environment::for_row(self.input.schema(), &tuple, outer);
        let mut values = Vec::with_capacity(state.items.len());
        for item in &state.items {
            let value = match item {
                ProjectItem::Input(idx) => tuple.get(*idx).cloned().ok_or_else(|| {
                    DbError::state("Input row shorter than its schema").with_field("index", idx)
                })?,
                ProjectItem::Expr(value_idx) => match self.values.get(*value_idx) {
                    Some(SelectValue::Expression { expr, .. }) => evaluate(expr, &env)?,
                    _ => return Err(DbError::state("Projection item is not an expression")),
                },
            };
            values.push(value);
        }

        Ok(Some(Tuple::from(values)))
    }

    fn release_state(&mut self) {
        self.state.clear();
    }

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

impl Explainable for PhysicalProject {
    fn explain_entry(&self, conf: ExplainConfig) -> ExplainEntry {
        EntryBuilder::new(Self::OPERATOR_NAME, conf)
            .with_values("values", &self.values)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::JoinType;
    use crate::execution::operators::testutil::{collect_rows, int_rows, scan, test_tables};
    use crate::expr::arith_expr::ArithOperator;
    use crate::types::{DataType, ScalarValue};

    fn joined(tables: &crate::storage::memory::MemoryTableManager) -> PlanNode {
        PlanNode::nested_loop_join(scan(tables, "t1"), scan(tables, "t2"), JoinType::Cross, None)
            .unwrap()
    }

    #[test]
    fn project_expressions_and_aliases() {
        let tables = test_tables();
        let mut plan = PlanNode::project(
            scan(&tables, "t1"),
            vec![
                SelectValue::expr(Expression::column("t1", "a")),
                SelectValue::aliased(
                    Expression::arith(
                        ArithOperator::Mul,
                        Expression::column("t1", "a"),
                        Expression::lit(10),
                    ),
                    "x",
                ),
                SelectValue::expr(Expression::lit("k")),
            ],
        );
        plan.prepare().unwrap();

        assert_eq!("[t1.a, x, 'k']", plan.schema().to_string());
        assert_eq!(DataType::Utf8, plan.schema().columns()[2].datatype);

        let rows = collect_rows(&mut plan).unwrap();
        assert_eq!(
            vec![
                Tuple::new([ScalarValue::Int32(1), ScalarValue::Int32(10), "k".into()]),
                Tuple::new([ScalarValue::Int32(3), ScalarValue::Int32(30), "k".into()]),
            ],
            rows
        );
    }

    #[test]
    fn project_qualified_wildcard() {
        let tables = test_tables();
        let mut plan = PlanNode::project(
            joined(&tables),
            vec![SelectValue::Wildcard {
                table: Some("t2".to_string()),
            }],
        );
        plan.prepare().unwrap();
        assert_eq!("[t2.b]", plan.schema().to_string());
        assert_eq!(
            int_rows(&[&[1], &[5], &[1], &[5]]),
            collect_rows(&mut plan).unwrap()
        );
    }

    #[test]
    fn project_reorders_columns() {
        let tables = test_tables();
        let mut plan = PlanNode::project(
            joined(&tables),
            vec![
                SelectValue::expr(Expression::column("t2", "b")),
                SelectValue::expr(Expression::column("t1", "a")),
            ],
        );
        plan.prepare().unwrap();
        assert_eq!("[t2.b, t1.a]", plan.schema().to_string());
        assert_eq!(
            int_rows(&[&[1, 1], &[5, 1], &[1, 3], &[5, 3]]),
            collect_rows(&mut plan).unwrap()
        );
    }

    #[test]
    fn unknown_wildcard_table() {
        let tables = test_tables();
        let mut plan = PlanNode::project(
            scan(&tables, "t1"),
            vec![SelectValue::Wildcard {
                table: Some("nope".to_string()),
            }],
        );
        plan.prepare().unwrap_err();
    }
}
