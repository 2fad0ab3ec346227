//! Parsed representation of a single select block.
//!
//! Produced by a SQL frontend and consumed by the planners.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::expr::Expression;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinType {
    /// Standard INNER join.
    Inner,
    /// Join with no condition.
    Cross,
    /// Standard LEFT join.
    Left,
    /// Standard RIGHT join.
    Right,
    /// Standard full/outer join.
    Full,
}

impl JoinType {
    pub const fn is_outer(&self) -> bool {
        matches!(self, Self::Left | Self::Right | Self::Full)
    }

    /// If rows from the left input may be padded with NULLs.
    pub const fn has_outer_join_on_left(&self) -> bool {
        matches!(self, Self::Right | Self::Full)
    }

    /// If rows from the right input may be padded with NULLs.
    pub const fn has_outer_join_on_right(&self) -> bool {
        matches!(self, Self::Left | Self::Full)
    }
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inner => write!(f, "INNER"),
            Self::Cross => write!(f, "CROSS"),
            Self::Left => write!(f, "LEFT"),
            Self::Right => write!(f, "RIGHT"),
            Self::Full => write!(f, "FULL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FromKind {
    BaseTable {
        name: String,
    },
    Derived {
        query: Box<SelectClause>,
    },
    Join {
        left: Box<FromClause>,
        right: Box<FromClause>,
        join_type: JoinType,
        condition: Option<Expression>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FromClause {
    pub kind: FromKind,
    pub alias: Option<String>,
}

impl FromClause {
    pub fn base_table(name: impl Into<String>) -> Self {
        FromClause {
            kind: FromKind::BaseTable { name: name.into() },
            alias: None,
        }
    }

    pub fn derived(query: SelectClause, alias: impl Into<String>) -> Self {
        FromClause {
            kind: FromKind::Derived {
                query: Box::new(query),
            },
            alias: Some(alias.into()),
        }
    }

    pub fn join(
        left: FromClause,
        right: FromClause,
        join_type: JoinType,
        condition: Option<Expression>,
    ) -> Self {
        FromClause {
            kind: FromKind::Join {
                left: Box::new(left),
                right: Box::new(right),
                join_type,
                condition,
            },
            alias: None,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn is_base_table(&self) -> bool {
        matches!(self.kind, FromKind::BaseTable { .. })
    }

    pub fn is_derived(&self) -> bool {
        matches!(self.kind, FromKind::Derived { .. })
    }

    pub fn is_join(&self) -> bool {
        matches!(self.kind, FromKind::Join { .. })
    }

    pub fn is_outer_join(&self) -> bool {
        matches!(&self.kind, FromKind::Join { join_type, .. } if join_type.is_outer())
    }

    pub fn is_renamed(&self) -> bool {
        self.alias.is_some()
    }

    pub fn table_name(&self) -> Option<&str> {
        match &self.kind {
            FromKind::BaseTable { name } => Some(name.as_str()),
            _ => None,
        }
    }

    /// Name the rows of this clause are visible as, if any.
    pub fn result_name(&self) -> Option<&str> {
        self.alias.as_deref().or_else(|| self.table_name())
    }
}

impl fmt::Display for FromClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            FromKind::BaseTable { name } => write!(f, "{name}")?,
            FromKind::Derived { query } => write!(f, "({query})")?,
            FromKind::Join {
                left,
                right,
                join_type,
                condition,
            } => {
                write!(f, "{left} {join_type} JOIN {right}")?;
                if let Some(cond) = condition {
                    write!(f, " ON {cond}")?;
                }
            }
        }
        if let Some(alias) = &self.alias {
            write!(f, " AS {alias}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SelectValue {
    /// `*` or `t.*`.
    Wildcard { table: Option<String> },
    Expression {
        expr: Expression,
        alias: Option<String>,
    },
}

impl SelectValue {
    pub fn expr(expr: Expression) -> Self {
        SelectValue::Expression { expr, alias: None }
    }

    pub fn aliased(expr: Expression, alias: impl Into<String>) -> Self {
        SelectValue::Expression {
            expr,
            alias: Some(alias.into()),
        }
    }

    pub fn expression(&self) -> Option<&Expression> {
        match self {
            Self::Expression { expr, .. } => Some(expr),
            Self::Wildcard { .. } => None,
        }
    }

    pub fn is_simple_column(&self) -> bool {
        matches!(
            self,
            Self::Expression {
                expr: Expression::Column(_),
                ..
            }
        )
    }
}

impl fmt::Display for SelectValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wildcard { table: Some(t) } => write!(f, "{t}.*"),
            Self::Wildcard { table: None } => write!(f, "*"),
            Self::Expression { expr, alias } => {
                write!(f, "{expr}")?;
                if let Some(alias) = alias {
                    write!(f, " AS {alias}")?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrderByExpr {
    pub expr: Expression,
    pub ascending: bool,
}

impl OrderByExpr {
    pub fn asc(expr: Expression) -> Self {
        OrderByExpr {
            expr,
            ascending: true,
        }
    }

    pub fn desc(expr: Expression) -> Self {
        OrderByExpr {
            expr,
            ascending: false,
        }
    }
}

impl fmt::Display for OrderByExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = if self.ascending { "ASC" } else { "DESC" };
        write!(f, "{} {dir}", self.expr)
    }
}

/// One `SELECT ... FROM ... WHERE ...` block.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SelectClause {
    pub select_values: Vec<SelectValue>,
    pub from: Option<FromClause>,
    pub where_expr: Option<Expression>,
    pub group_by: Vec<Expression>,
    pub having: Option<Expression>,
    pub order_by: Vec<OrderByExpr>,
    /// Raw values, validated when the plan is built.
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl SelectClause {
    pub fn new(select_values: Vec<SelectValue>) -> Self {
        SelectClause {
            select_values,
            from: None,
            where_expr: None,
            group_by: Vec::new(),
            having: None,
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    /// `SELECT * FROM <from>`
    pub fn star(from: FromClause) -> Self {
        Self::new(vec![SelectValue::Wildcard { table: None }]).with_from(from)
    }

    pub fn with_from(mut self, from: FromClause) -> Self {
        self.from = Some(from);
        self
    }

    pub fn with_where(mut self, expr: Expression) -> Self {
        self.where_expr = Some(expr);
        self
    }

    pub fn with_group_by(mut self, exprs: Vec<Expression>) -> Self {
        self.group_by = exprs;
        self
    }

    pub fn with_having(mut self, expr: Expression) -> Self {
        self.having = Some(expr);
        self
    }

    pub fn with_order_by(mut self, exprs: Vec<OrderByExpr>) -> Self {
        self.order_by = exprs;
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// If the select list is a bare `*`.
    pub fn is_trivial_project(&self) -> bool {
        matches!(
            self.select_values.as_slice(),
            [SelectValue::Wildcard { table: None }]
        )
    }
}

impl fmt::Display for SelectClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SELECT ")?;
        for (idx, v) in self.select_values.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{v}")?;
        }
        if let Some(from) = &self.from {
            write!(f, " FROM {from}")?;
        }
        if let Some(expr) = &self.where_expr {
            write!(f, " WHERE {expr}")?;
        }
        if !self.group_by.is_empty() {
            write!(f, " GROUP BY ")?;
            for (idx, e) in self.group_by.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{e}")?;
            }
        }
        if let Some(expr) = &self.having {
            write!(f, " HAVING {expr}")?;
        }
        if !self.order_by.is_empty() {
            write!(f, " ORDER BY ")?;
            for (idx, e) in self.order_by.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{e}")?;
            }
        }
        if let Some(limit) = self.limit {
            write!(f, " LIMIT {limit}")?;
        }
        if let Some(offset) = self.offset {
            write!(f, " OFFSET {offset}")?;
        }
        Ok(())
    }
}
