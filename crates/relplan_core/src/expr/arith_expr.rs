use std::fmt;

use relplan_error::{DbError, Result};

use super::Expression;
use crate::types::{DataType, ScalarValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithOperator {
    Add,
    Sub,
    Div,
    Mul,
    Mod,
}

impl ArithOperator {
    /// Result type of applying this operator to the given input types.
    pub fn return_type(self, left: DataType, right: DataType) -> Result<DataType> {
        Ok(match (left, right) {
            (DataType::Null, other) | (other, DataType::Null) => other,
            (DataType::Int32, DataType::Int32) => DataType::Int32,
            (a, b) if a.is_integer() && b.is_integer() => DataType::Int64,
            (a, b) if a.is_numeric() && b.is_numeric() => DataType::Float64,
            (a, b) => {
                return Err(DbError::eval(format!(
                    "Cannot apply '{self}' to {a} and {b}"
                )));
            }
        })
    }

    /// Apply the operator. NULL on either side produces NULL.
    pub fn apply(self, left: &ScalarValue, right: &ScalarValue) -> Result<ScalarValue> {
        if left.is_null() || right.is_null() {
            return Ok(ScalarValue::Null);
        }

        match (left, right) {
            (ScalarValue::Int32(a), ScalarValue::Int32(b)) => {
                let v = self.apply_i64(*a as i64, *b as i64)?;
                let v = i32::try_from(v).map_err(|_| {
                    DbError::eval("Integer overflow").with_field("op", self)
                })?;
                Ok(ScalarValue::Int32(v))
            }
            (ScalarValue::Int32(_) | ScalarValue::Int64(_), ScalarValue::Int32(_) | ScalarValue::Int64(_)) => {
                let v = self.apply_i64(left.try_as_i64()?, right.try_as_i64()?)?;
                Ok(ScalarValue::Int64(v))
            }
            (a, b) => match (a.to_f64(), b.to_f64()) {
                (Some(a), Some(b)) => Ok(ScalarValue::Float64(self.apply_f64(a, b)?)),
                _ => Err(DbError::eval(format!("Cannot apply '{self}'"))
                    .with_field("left", a.datatype())
                    .with_field("right", b.datatype())),
            },
        }
    }

    fn apply_i64(self, a: i64, b: i64) -> Result<i64> {
        let v = match self {
            Self::Add => a.checked_add(b),
            Self::Sub => a.checked_sub(b),
            Self::Mul => a.checked_mul(b),
            Self::Div => {
                if b == 0 {
                    return Err(DbError::eval("Division by zero"));
                }
                a.checked_div(b)
            }
            Self::Mod => {
                if b == 0 {
                    return Err(DbError::eval("Division by zero"));
                }
                a.checked_rem(b)
            }
        };
        v.ok_or_else(|| DbError::eval("Integer overflow").with_field("op", self))
    }

    fn apply_f64(self, a: f64, b: f64) -> Result<f64> {
        Ok(match self {
            Self::Add => a + b,
            Self::Sub => a - b,
            Self::Mul => a * b,
            Self::Div => {
                if b == 0.0 {
                    return Err(DbError::eval("Division by zero"));
                }
                a / b
            }
            Self::Mod => {
                if b == 0.0 {
                    return Err(DbError::eval("Division by zero"));
                }
                a % b
            }
        })
    }
}

impl fmt::Display for ArithOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add => write!(f, "+"),
            Self::Sub => write!(f, "-"),
            Self::Div => write!(f, "/"),
            Self::Mul => write!(f, "*"),
            Self::Mod => write!(f, "%"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArithExpr {
    pub op: ArithOperator,
    pub left: Box<Expression>,
    pub right: Box<Expression>,
}

impl fmt::Display for ArithExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} {} {})", self.left, self.op, self.right)
    }
}
