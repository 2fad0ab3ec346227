use std::fmt;

use super::Expression;
use crate::functions::aggregate::AggregateFunction;

/// Call to a scalar or aggregate function.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionCallExpr {
    /// Upper cased function name.
    pub name: String,
    pub args: Vec<Expression>,
    /// `COUNT(DISTINCT a)`
    pub distinct: bool,
    /// `COUNT(*)`
    pub star: bool,
}

impl FunctionCallExpr {
    pub fn new(name: &str, args: Vec<Expression>) -> Self {
        FunctionCallExpr {
            name: name.to_ascii_uppercase(),
            args,
            distinct: false,
            star: false,
        }
    }

    pub fn is_aggregate(&self) -> bool {
        AggregateFunction::from_name(&self.name, self.star).is_some()
    }
}

impl fmt::Display for FunctionCallExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        if self.star {
            write!(f, "*")?;
        } else {
            if self.distinct {
                write!(f, "DISTINCT ")?;
            }
            for (idx, arg) in self.args.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{arg}")?;
            }
        }
        write!(f, ")")
    }
}
