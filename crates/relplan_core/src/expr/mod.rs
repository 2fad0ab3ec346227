//! Scalar and boolean expression trees.

pub mod arith_expr;
pub mod comparison_expr;
pub mod conjunction_expr;
pub mod eval;
pub mod function_expr;
pub mod in_expr;
pub mod subquery_expr;

use std::fmt;

use arith_expr::{ArithExpr, ArithOperator};
use comparison_expr::{ComparisonExpr, ComparisonOperator};
use conjunction_expr::{ConjunctionExpr, ConjunctionOperator};
use function_expr::FunctionCallExpr;
use in_expr::{InValuesExpr, IsNullExpr};
use relplan_error::Result;
use subquery_expr::{SubqueryExpr, SubqueryType};

use crate::ast::SelectClause;
use crate::functions::aggregate::AggregateFunction;
use crate::functions::scalar::ScalarFunction;
use crate::schema::{ColumnName, Schema};
use crate::types::{DataType, ScalarValue};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expression {
    Column(ColumnName),
    Literal(ScalarValue),
    Comparison(ComparisonExpr),
    Conjunction(ConjunctionExpr),
    Not(Box<Expression>),
    Arith(ArithExpr),
    IsNull(IsNullExpr),
    InValues(InValuesExpr),
    Function(FunctionCallExpr),
    Subquery(SubqueryExpr),
}

impl Expression {
    pub fn column(table: &str, column: &str) -> Self {
        Expression::Column(ColumnName::new(table, column))
    }

    pub fn unqualified_column(column: &str) -> Self {
        Expression::Column(ColumnName::unqualified(column))
    }

    pub fn lit(value: impl Into<ScalarValue>) -> Self {
        Expression::Literal(value.into())
    }

    pub fn null() -> Self {
        Expression::Literal(ScalarValue::Null)
    }

    pub fn compare(op: ComparisonOperator, left: Expression, right: Expression) -> Self {
        Expression::Comparison(ComparisonExpr {
            left: Box::new(left),
            right: Box::new(right),
            op,
        })
    }

    pub fn eq(left: Expression, right: Expression) -> Self {
        Self::compare(ComparisonOperator::Eq, left, right)
    }

    /// AND together expressions. A single expression is returned as is.
    pub fn and(mut expressions: Vec<Expression>) -> Self {
        if expressions.len() == 1 {
            if let Some(expr) = expressions.pop() {
                return expr;
            }
        }
        Expression::Conjunction(ConjunctionExpr {
            op: ConjunctionOperator::And,
            expressions,
        })
    }

    /// OR together expressions. A single expression is returned as is.
    pub fn or(mut expressions: Vec<Expression>) -> Self {
        if expressions.len() == 1 {
            if let Some(expr) = expressions.pop() {
                return expr;
            }
        }
        Expression::Conjunction(ConjunctionExpr {
            op: ConjunctionOperator::Or,
            expressions,
        })
    }

    pub fn not(expr: Expression) -> Self {
        Expression::Not(Box::new(expr))
    }

    pub fn arith(op: ArithOperator, left: Expression, right: Expression) -> Self {
        Expression::Arith(ArithExpr {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn is_null(expr: Expression, negated: bool) -> Self {
        Expression::IsNull(IsNullExpr {
            expr: Box::new(expr),
            negated,
        })
    }

    pub fn in_values(expr: Expression, values: Vec<Expression>, negated: bool) -> Self {
        Expression::InValues(InValuesExpr {
            expr: Box::new(expr),
            values,
            negated,
        })
    }

    pub fn function(name: &str, args: Vec<Expression>) -> Self {
        Expression::Function(FunctionCallExpr::new(name, args))
    }

    pub fn function_distinct(name: &str, args: Vec<Expression>) -> Self {
        let mut call = FunctionCallExpr::new(name, args);
        call.distinct = true;
        Expression::Function(call)
    }

    pub fn count_star() -> Self {
        let mut call = FunctionCallExpr::new("COUNT", Vec::new());
        call.star = true;
        Expression::Function(call)
    }

    pub fn scalar_subquery(query: SelectClause) -> Self {
        Expression::Subquery(SubqueryExpr::new(SubqueryType::Scalar, query))
    }

    pub fn exists(query: SelectClause) -> Self {
        Expression::Subquery(SubqueryExpr::new(SubqueryType::Exists, query))
    }

    pub fn in_subquery(expr: Expression, query: SelectClause, negated: bool) -> Self {
        Expression::Subquery(SubqueryExpr::new(
            SubqueryType::In {
                expr: Box::new(expr),
                negated,
            },
            query,
        ))
    }

    pub fn as_column(&self) -> Option<&ColumnName> {
        match self {
            Self::Column(col) => Some(col),
            _ => None,
        }
    }

    /// Visit every expression in the tree, parents before children.
    ///
    /// Does not descend into the select block of a subquery since that is a
    /// different scope. The left side of `IN (subquery)` is visited.
    pub fn walk<F>(&self, f: &mut F)
    where
        F: FnMut(&Expression),
    {
        f(self);
        match self {
            Self::Column(_) | Self::Literal(_) => (),
            Self::Comparison(cmp) => {
                cmp.left.walk(f);
                cmp.right.walk(f);
            }
            Self::Conjunction(conj) => {
                for expr in &conj.expressions {
                    expr.walk(f);
                }
            }
            Self::Not(expr) => expr.walk(f),
            Self::Arith(arith) => {
                arith.left.walk(f);
                arith.right.walk(f);
            }
            Self::IsNull(is_null) => is_null.expr.walk(f),
            Self::InValues(in_vals) => {
                in_vals.expr.walk(f);
                for v in &in_vals.values {
                    v.walk(f);
                }
            }
            Self::Function(call) => {
                for arg in &call.args {
                    arg.walk(f);
                }
            }
            Self::Subquery(subquery) => {
                if let SubqueryType::In { expr, .. } = &subquery.subquery_type {
                    expr.walk(f);
                }
            }
        }
    }

    /// Rebuild the tree bottom up, replacing each node with the output of `f`.
    ///
    /// Children are rewritten before `f` sees their parent. Same scoping rules
    /// as `walk`.
    pub fn rewrite_post_order<F>(self, f: &mut F) -> Result<Expression>
    where
        F: FnMut(Expression) -> Result<Expression>,
    {
        let rewritten = match self {
            Self::Column(_) | Self::Literal(_) => self,
            Self::Comparison(cmp) => Self::Comparison(ComparisonExpr {
                left: Box::new(cmp.left.rewrite_post_order(f)?),
                right: Box::new(cmp.right.rewrite_post_order(f)?),
                op: cmp.op,
            }),
            Self::Conjunction(conj) => Self::Conjunction(ConjunctionExpr {
                op: conj.op,
                expressions: conj
                    .expressions
                    .into_iter()
                    .map(|e| e.rewrite_post_order(f))
                    .collect::<Result<Vec<_>>>()?,
            }),
            Self::Not(expr) => Self::Not(Box::new(expr.rewrite_post_order(f)?)),
            Self::Arith(arith) => Self::Arith(ArithExpr {
                op: arith.op,
                left: Box::new(arith.left.rewrite_post_order(f)?),
                right: Box::new(arith.right.rewrite_post_order(f)?),
            }),
            Self::IsNull(is_null) => Self::IsNull(IsNullExpr {
                expr: Box::new(is_null.expr.rewrite_post_order(f)?),
                negated: is_null.negated,
            }),
            Self::InValues(in_vals) => Self::InValues(InValuesExpr {
                expr: Box::new(in_vals.expr.rewrite_post_order(f)?),
                values: in_vals
                    .values
                    .into_iter()
                    .map(|e| e.rewrite_post_order(f))
                    .collect::<Result<Vec<_>>>()?,
                negated: in_vals.negated,
            }),
            Self::Function(call) => Self::Function(FunctionCallExpr {
                name: call.name,
                args: call
                    .args
                    .into_iter()
                    .map(|e| e.rewrite_post_order(f))
                    .collect::<Result<Vec<_>>>()?,
                distinct: call.distinct,
                star: call.star,
            }),
            Self::Subquery(mut subquery) => {
                if let SubqueryType::In { expr, negated } = subquery.subquery_type {
                    subquery.subquery_type = SubqueryType::In {
                        expr: Box::new(expr.rewrite_post_order(f)?),
                        negated,
                    };
                }
                Self::Subquery(subquery)
            }
        };
        f(rewritten)
    }

    /// Column references in this expression's scope.
    pub fn column_refs(&self) -> Vec<&ColumnName> {
        let mut cols = Vec::new();
        collect_column_refs(self, &mut cols);
        cols
    }

    pub fn contains_subquery(&self) -> bool {
        let mut found = false;
        self.walk(&mut |expr| {
            if matches!(expr, Expression::Subquery(_)) {
                found = true;
            }
        });
        found
    }

    pub fn contains_aggregate(&self) -> bool {
        let mut found = false;
        self.walk(&mut |expr| {
            if let Expression::Function(call) = expr {
                if call.is_aggregate() {
                    found = true;
                }
            }
        });
        found
    }

    /// Output type of this expression when evaluated against `schema`.
    ///
    /// Columns not found in the schema resolve through an outer scope at
    /// runtime, so their type is reported as `Null` here.
    pub fn datatype(&self, schema: &Schema) -> Result<DataType> {
        Ok(match self {
            Self::Column(col) => match schema.find_column(col)? {
                Some(idx) => schema.columns()[idx].datatype,
                None => DataType::Null,
            },
            Self::Literal(v) => v.datatype(),
            Self::Comparison(_)
            | Self::Conjunction(_)
            | Self::Not(_)
            | Self::IsNull(_)
            | Self::InValues(_) => DataType::Boolean,
            Self::Arith(arith) => arith
                .op
                .return_type(arith.left.datatype(schema)?, arith.right.datatype(schema)?)?,
            Self::Function(call) => {
                let arg_types = call
                    .args
                    .iter()
                    .map(|arg| arg.datatype(schema))
                    .collect::<Result<Vec<_>>>()?;
                match AggregateFunction::from_name(&call.name, call.star) {
                    Some(agg) => agg.return_type(arg_types.first().copied()),
                    None => ScalarFunction::try_from_name(&call.name)?.return_type(&arg_types)?,
                }
            }
            Self::Subquery(subquery) => match subquery.subquery_type {
                SubqueryType::Scalar => subquery
                    .plan
                    .as_ref()
                    .and_then(|plan| plan.schema().column(0).map(|c| c.datatype))
                    .unwrap_or(DataType::Null),
                SubqueryType::Exists | SubqueryType::In { .. } => DataType::Boolean,
            },
        })
    }
}

fn collect_column_refs<'a>(expr: &'a Expression, out: &mut Vec<&'a ColumnName>) {
    match expr {
        Expression::Column(col) => out.push(col),
        Expression::Literal(_) => (),
        Expression::Comparison(cmp) => {
            collect_column_refs(&cmp.left, out);
            collect_column_refs(&cmp.right, out);
        }
        Expression::Conjunction(conj) => {
            for e in &conj.expressions {
                collect_column_refs(e, out);
            }
        }
        Expression::Not(e) => collect_column_refs(e, out),
        Expression::Arith(arith) => {
            collect_column_refs(&arith.left, out);
            collect_column_refs(&arith.right, out);
        }
        Expression::IsNull(is_null) => collect_column_refs(&is_null.expr, out),
        Expression::InValues(in_vals) => {
            collect_column_refs(&in_vals.expr, out);
            for v in &in_vals.values {
                collect_column_refs(v, out);
            }
        }
        Expression::Function(call) => {
            for arg in &call.args {
                collect_column_refs(arg, out);
            }
        }
        Expression::Subquery(subquery) => {
            if let SubqueryType::In { expr, .. } = &subquery.subquery_type {
                collect_column_refs(expr, out);
            }
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Column(col) => write!(f, "{col}"),
            Self::Literal(ScalarValue::Utf8(s)) => write!(f, "'{s}'"),
            Self::Literal(v) => write!(f, "{v}"),
            Self::Comparison(cmp) => write!(f, "{cmp}"),
            Self::Conjunction(conj) => write!(f, "{conj}"),
            Self::Not(expr) => write!(f, "NOT {expr}"),
            Self::Arith(arith) => write!(f, "{arith}"),
            Self::IsNull(is_null) => write!(f, "{is_null}"),
            Self::InValues(in_vals) => write!(f, "{in_vals}"),
            Self::Function(call) => write!(f, "{call}"),
            Self::Subquery(subquery) => write!(f, "{subquery}"),
        }
    }
}
