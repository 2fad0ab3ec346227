use std::fmt;
use std::hash::{Hash, Hasher};

use super::Expression;
use crate::ast::SelectClause;
use crate::execution::operators::PlanNode;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubqueryType {
    /// Subquery producing a single value.
    Scalar,
    /// `EXISTS (...)`
    Exists,
    /// `expr [NOT] IN (...)`
    In {
        expr: Box<Expression>,
        negated: bool,
    },
}

/// A nested select block used as a value.
///
/// The plan is attached by the planner. Equality and hashing only consider
/// the query, not whether a plan has been attached.
#[derive(Debug, Clone)]
pub struct SubqueryExpr {
    pub subquery_type: SubqueryType,
    pub query: Box<SelectClause>,
    pub plan: Option<Box<PlanNode>>,
}

impl SubqueryExpr {
    pub fn new(subquery_type: SubqueryType, query: SelectClause) -> Self {
        SubqueryExpr {
            subquery_type,
            query: Box::new(query),
            plan: None,
        }
    }
}

impl PartialEq for SubqueryExpr {
    fn eq(&self, other: &Self) -> bool {
        self.subquery_type == other.subquery_type && self.query == other.query
    }
}

impl Eq for SubqueryExpr {}

impl Hash for SubqueryExpr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.subquery_type.hash(state);
        self.query.hash(state);
    }
}

impl fmt::Display for SubqueryExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.subquery_type {
            SubqueryType::Scalar => write!(f, "({})", self.query),
            SubqueryType::Exists => write!(f, "EXISTS ({})", self.query),
            SubqueryType::In { expr, negated } => {
                let not = if *negated { "NOT " } else { "" };
                write!(f, "{expr} {not}IN ({})", self.query)
            }
        }
    }
}
