//! Plan nodes and the pull based protocol they implement.
//!
//! A plan is a tree of `PlanNode`s. Lifecycle of a tree:
//!
//! 1. `prepare` computes schemas, statistics and costs, children first.
//! 2. `initialize` resets execution state. May be called again to rerun.
//! 3. `next_tuple` pulls rows until it returns None.
//! 4. `clean_up` releases execution state. Safe to call more than once.

pub mod file_scan;
pub mod filter;
pub mod hash_aggregate;
pub mod limit;
pub mod nested_loop_join;
pub mod project;
pub mod rename;
pub mod sort;

#[cfg(test)]
pub(crate) mod testutil;

use std::fmt::Debug;
use std::sync::Arc;

use file_scan::PhysicalFileScan;
use filter::PhysicalFilter;
use hash_aggregate::PhysicalHashAggregate;
use limit::PhysicalLimitOffset;
use nested_loop_join::PhysicalNestedLoopJoin;
use project::PhysicalProject;
use relplan_error::{DbError, Result};
use rename::PhysicalRename;
use serde::Serialize;
use sort::PhysicalSort;

use super::cost::PlanCost;
use crate::ast::{JoinType, OrderByExpr, SelectValue};
use crate::explain::explainable::{ExplainConfig, ExplainEntry, Explainable};
use crate::expr::Expression;
use crate::expr::eval::OuterScope;
use crate::functions::aggregate::AggregateCall;
use crate::schema::Schema;
use crate::statistics::ColumnStats;
use crate::storage::TableHandle;
use crate::tuple::Tuple;

/// Properties of a node computed during prepare.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NodeProps {
    pub schema: Schema,
    /// One entry per column in `schema`.
    pub stats: Vec<ColumnStats>,
    pub cost: PlanCost,
}

/// Execution state for an operator.
///
/// Empty until the operator is initialized. Cloning a node never clones its
/// execution state, a cloned plan needs to be initialized before use.
#[derive(Debug)]
pub struct ExecState<S>(Option<S>);

impl<S> ExecState<S> {
    pub fn set(&mut self, state: S) {
        self.0 = Some(state);
    }

    pub fn clear(&mut self) {
        self.0 = None;
    }

    pub fn is_initialized(&self) -> bool {
        self.0.is_some()
    }

    pub fn get_mut(&mut self, operator: &'static str) -> Result<&mut S> {
        self.0.as_mut().ok_or_else(|| {
            DbError::state(format!("{operator} pulled before initialize"))
        })
    }
}

impl<S> Default for ExecState<S> {
    fn default() -> Self {
        ExecState(None)
    }
}

impl<S> Clone for ExecState<S> {
    fn clone(&self) -> Self {
        ExecState(None)
    }
}

impl<S> PartialEq for ExecState<S> {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

/// Per operator behavior, wrapped by `Node` which handles the parts common to
/// every operator.
pub trait ExecutableNode: Explainable + Debug + Clone + PartialEq {
    const OPERATOR_NAME: &'static str;

    fn children(&self) -> Vec<&PlanNode>;

    fn children_mut(&mut self) -> Vec<&mut PlanNode>;

    /// Compute schema, stats and cost. Children are already prepared.
    fn compute_props(&self) -> Result<NodeProps>;

    /// Reset execution state. Children are already initialized.
    fn reset_state(&mut self) -> Result<()>;

    /// Pull the next row.
    fn poll_next(&mut self, outer: Option<&Arc<OuterScope>>) -> Result<Option<Tuple>>;

    /// Drop execution state.
    fn release_state(&mut self);

    fn supports_marking(&self) -> bool {
        false
    }

    fn requires_left_marking(&self) -> bool {
        false
    }

    fn requires_right_marking(&self) -> bool {
        false
    }

    fn mark(&mut self) -> Result<()> {
        Err(DbError::unsupported(format!(
            "{} does not support marking",
            Self::OPERATOR_NAME
        )))
    }

    fn reset_to_mark(&mut self) -> Result<()> {
        Err(DbError::unsupported(format!(
            "{} does not support marking",
            Self::OPERATOR_NAME
        )))
    }

    fn results_ordered_by(&self) -> Vec<OrderByExpr> {
        Vec::new()
    }
}

#[derive(Debug, Clone)]
pub struct Node<T> {
    pub(crate) op: T,
    pub(crate) props: NodeProps,
    pub(crate) prepared: bool,
    pub(crate) outer_scope: Option<Arc<OuterScope>>,
}

impl<T: PartialEq> PartialEq for Node<T> {
    fn eq(&self, other: &Self) -> bool {
        self.op == other.op
    }
}

impl<T: ExecutableNode> Node<T> {
    pub fn new(op: T) -> Self {
        Node {
            op,
            props: NodeProps::default(),
            prepared: false,
            outer_scope: None,
        }
    }

    pub fn operator(&self) -> &T {
        &self.op
    }

    fn prepare(&mut self) -> Result<()> {
        for child in self.op.children_mut() {
            child.prepare()?;
        }
        self.props = self.op.compute_props()?;
        self.prepared = true;
        Ok(())
    }

    fn initialize(&mut self) -> Result<()> {
        if !self.prepared {
            return Err(DbError::state(format!(
                "{} initialized before prepare",
                T::OPERATOR_NAME
            )));
        }
        for child in self.op.children_mut() {
            child.initialize()?;
        }
        self.op.reset_state()
    }

    fn next_tuple(&mut self) -> Result<Option<Tuple>> {
        self.op.poll_next(self.outer_scope.as_ref())
    }

    fn set_outer_scope(&mut self, scope: Arc<OuterScope>) {
        for child in self.op.children_mut() {
            child.set_outer_scope(scope.clone());
        }
        self.outer_scope = Some(scope);
    }

    fn clean_up(&mut self) {
        self.op.release_state();
        for child in self.op.children_mut() {
            child.clean_up();
        }
    }
}

/// An executable plan node.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanNode {
    FileScan(Node<PhysicalFileScan>),
    Filter(Node<PhysicalFilter>),
    NestedLoopJoin(Node<PhysicalNestedLoopJoin>),
    HashAggregate(Node<PhysicalHashAggregate>),
    Project(Node<PhysicalProject>),
    Sort(Node<PhysicalSort>),
    LimitOffset(Node<PhysicalLimitOffset>),
    Rename(Node<PhysicalRename>),
}

macro_rules! dispatch {
    ($self:expr, $node:ident => $body:expr) => {
        match $self {
            PlanNode::FileScan($node) => $body,
            PlanNode::Filter($node) => $body,
            PlanNode::NestedLoopJoin($node) => $body,
            PlanNode::HashAggregate($node) => $body,
            PlanNode::Project($node) => $body,
            PlanNode::Sort($node) => $body,
            PlanNode::LimitOffset($node) => $body,
            PlanNode::Rename($node) => $body,
        }
    };
}

impl PlanNode {
    /// Scan every row of a table, optionally filtered by a predicate.
    pub fn file_scan(table: Arc<dyn TableHandle>, predicate: Option<Expression>) -> Self {
        PlanNode::FileScan(Node::new(PhysicalFileScan::new(table, predicate)))
    }

    pub fn filter(input: PlanNode, predicate: Expression) -> Self {
        PlanNode::Filter(Node::new(PhysicalFilter::new(input, predicate)))
    }

    pub fn nested_loop_join(
        left: PlanNode,
        right: PlanNode,
        join_type: JoinType,
        condition: Option<Expression>,
    ) -> Result<Self> {
        Ok(PlanNode::NestedLoopJoin(Node::new(
            PhysicalNestedLoopJoin::try_new(left, right, join_type, condition)?,
        )))
    }

    pub fn hash_aggregate(
        input: PlanNode,
        group_by: Vec<Expression>,
        aggregates: Vec<AggregateCall>,
    ) -> Self {
        PlanNode::HashAggregate(Node::new(PhysicalHashAggregate::new(
            input, group_by, aggregates,
        )))
    }

    pub fn project(input: PlanNode, values: Vec<SelectValue>) -> Self {
        PlanNode::Project(Node::new(PhysicalProject::new(input, values)))
    }

    pub fn sort(input: PlanNode, order_by: Vec<OrderByExpr>) -> Self {
        PlanNode::Sort(Node::new(PhysicalSort::new(input, order_by)))
    }

    /// Errors if either value is negative.
    pub fn limit_offset(input: PlanNode, limit: Option<i64>, offset: Option<i64>) -> Result<Self> {
        Ok(PlanNode::LimitOffset(Node::new(
            PhysicalLimitOffset::try_new(input, limit, offset)?,
        )))
    }

    pub fn rename(input: PlanNode, alias: impl Into<String>) -> Self {
        PlanNode::Rename(Node::new(PhysicalRename::new(input, alias)))
    }

    pub fn operator_name(&self) -> &'static str {
        match self {
            Self::FileScan(_) => PhysicalFileScan::OPERATOR_NAME,
            Self::Filter(_) => PhysicalFilter::OPERATOR_NAME,
            Self::NestedLoopJoin(_) => PhysicalNestedLoopJoin::OPERATOR_NAME,
            Self::HashAggregate(_) => PhysicalHashAggregate::OPERATOR_NAME,
            Self::Project(_) => PhysicalProject::OPERATOR_NAME,
            Self::Sort(_) => PhysicalSort::OPERATOR_NAME,
            Self::LimitOffset(_) => PhysicalLimitOffset::OPERATOR_NAME,
            Self::Rename(_) => PhysicalRename::OPERATOR_NAME,
        }
    }

    /// Recursively compute schemas, stats and costs for this tree.
    pub fn prepare(&mut self) -> Result<()> {
        dispatch!(self, node => node.prepare())
    }

    pub fn is_prepared(&self) -> bool {
        dispatch!(self, node => node.prepared)
    }

    /// Reset execution state for this tree so rows can be pulled from the
    /// start.
    pub fn initialize(&mut self) -> Result<()> {
        dispatch!(self, node => node.initialize())
    }

    /// Pull the next output row, None once exhausted.
    pub fn next_tuple(&mut self) -> Result<Option<Tuple>> {
        dispatch!(self, node => node.next_tuple())
    }

    /// Release execution state for this tree.
    pub fn clean_up(&mut self) {
        dispatch!(self, node => node.clean_up())
    }

    /// Set the enclosing row used to resolve correlated column references.
    pub fn set_outer_scope(&mut self, scope: Arc<OuterScope>) {
        dispatch!(self, node => node.set_outer_scope(scope))
    }

    pub fn outer_scope(&self) -> Option<&Arc<OuterScope>> {
        dispatch!(self, node => node.outer_scope.as_ref())
    }

    /// Output schema. Empty until prepared.
    pub fn schema(&self) -> &Schema {
        dispatch!(self, node => &node.props.schema)
    }

    pub fn stats(&self) -> &[ColumnStats] {
        dispatch!(self, node => &node.props.stats)
    }

    pub fn cost(&self) -> &PlanCost {
        dispatch!(self, node => &node.props.cost)
    }

    pub fn props(&self) -> &NodeProps {
        dispatch!(self, node => &node.props)
    }

    pub fn children(&self) -> Vec<&PlanNode> {
        dispatch!(self, node => node.op.children())
    }

    pub fn supports_marking(&self) -> bool {
        dispatch!(self, node => node.op.supports_marking())
    }

    pub fn requires_left_marking(&self) -> bool {
        dispatch!(self, node => node.op.requires_left_marking())
    }

    pub fn requires_right_marking(&self) -> bool {
        dispatch!(self, node => node.op.requires_right_marking())
    }

    /// Remember the current position so `reset_to_mark` can return to it.
    pub fn mark(&mut self) -> Result<()> {
        dispatch!(self, node => node.op.mark())
    }

    pub fn reset_to_mark(&mut self) -> Result<()> {
        dispatch!(self, node => node.op.reset_to_mark())
    }

    /// Ordering guaranteed for this node's output, empty if unordered.
    pub fn results_ordered_by(&self) -> Vec<OrderByExpr> {
        dispatch!(self, node => node.op.results_ordered_by())
    }
}

impl Explainable for PlanNode {
    fn explain_entry(&self, conf: ExplainConfig) -> ExplainEntry {
        dispatch!(self, node => node.op.explain_entry(conf))
    }
}
