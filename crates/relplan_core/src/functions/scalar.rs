use relplan_error::{DbError, Result};

use crate::types::{DataType, ScalarValue};

/// Built in row level functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarFunction {
    Abs,
    Upper,
    Lower,
    Coalesce,
}

impl ScalarFunction {
    pub fn try_from_name(name: &str) -> Result<Self> {
        Ok(match name.to_ascii_uppercase().as_str() {
            "ABS" => Self::Abs,
            "UPPER" => Self::Upper,
            "LOWER" => Self::Lower,
            "COALESCE" => Self::Coalesce,
            other => return Err(DbError::planning(format!("Unknown function '{other}'"))),
        })
    }

    pub fn return_type(&self, inputs: &[DataType]) -> Result<DataType> {
        match self {
            Self::Abs => {
                let input = Self::single_arg(self, inputs)?;
                if input.is_numeric() || input == DataType::Null {
                    Ok(input)
                } else {
                    Err(DbError::planning(format!("ABS does not accept {input}")))
                }
            }
            Self::Upper | Self::Lower => {
                let input = Self::single_arg(self, inputs)?;
                if matches!(input, DataType::Utf8 | DataType::Null) {
                    Ok(DataType::Utf8)
                } else {
                    Err(DbError::planning(format!("{self:?} does not accept {input}")))
                }
            }
            Self::Coalesce => Ok(inputs
                .iter()
                .copied()
                .find(|t| *t != DataType::Null)
                .unwrap_or(DataType::Null)),
        }
    }

    fn single_arg(&self, inputs: &[DataType]) -> Result<DataType> {
        match inputs {
            [input] => Ok(*input),
            _ => Err(DbError::planning(format!("{self:?} expects one argument"))
                .with_field("got", inputs.len())),
        }
    }

    pub fn invoke(&self, args: &[ScalarValue]) -> Result<ScalarValue> {
        match self {
            Self::Coalesce => Ok(args
                .iter()
                .find(|v| !v.is_null())
                .cloned()
                .unwrap_or(ScalarValue::Null)),
            _ => {
                let arg = match args {
                    [arg] => arg,
                    _ => {
                        return Err(DbError::eval(format!("{self:?} expects one argument"))
                            .with_field("got", args.len()));
                    }
                };
                match (self, arg) {
                    (_, ScalarValue::Null) => Ok(ScalarValue::Null),
                    (Self::Abs, ScalarValue::Int32(v)) => v
                        .checked_abs()
                        .map(ScalarValue::Int32)
                        .ok_or_else(|| DbError::eval("Integer overflow in ABS")),
                    (Self::Abs, ScalarValue::Int64(v)) => v
                        .checked_abs()
                        .map(ScalarValue::Int64)
                        .ok_or_else(|| DbError::eval("Integer overflow in ABS")),
                    (Self::Abs, ScalarValue::Float64(v)) => Ok(ScalarValue::Float64(v.abs())),
                    (Self::Upper, ScalarValue::Utf8(s)) => Ok(ScalarValue::Utf8(s.to_uppercase())),
                    (Self::Lower, ScalarValue::Utf8(s)) => Ok(ScalarValue::Utf8(s.to_lowercase())),
                    (func, other) => Err(DbError::eval(format!(
                        "{func:?} does not accept value {other}"
                    ))),
                }
            }
        }
    }
}
