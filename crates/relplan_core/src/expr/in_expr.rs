use std::fmt;

use super::Expression;

/// `expr [NOT] IN (v1, v2, ...)`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InValuesExpr {
    pub expr: Box<Expression>,
    pub values: Vec<Expression>,
    pub negated: bool,
}

impl fmt::Display for InValuesExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let not = if self.negated { "NOT " } else { "" };
        write!(f, "{} {not}IN (", self.expr)?;
        for (idx, v) in self.values.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{v}")?;
        }
        write!(f, ")")
    }
}

/// `expr IS [NOT] NULL`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IsNullExpr {
    pub expr: Box<Expression>,
    pub negated: bool,
}

impl fmt::Display for IsNullExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            write!(f, "{} IS NOT NULL", self.expr)
        } else {
            write!(f, "{} IS NULL", self.expr)
        }
    }
}
