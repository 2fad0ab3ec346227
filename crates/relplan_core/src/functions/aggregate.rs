use std::fmt;

use hashbrown::HashSet;
use relplan_error::{DbError, Result};

use crate::expr::Expression;
use crate::expr::arith_expr::ArithOperator;
use crate::expr::function_expr::FunctionCallExpr;
use crate::types::{DataType, ScalarValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFunction {
    /// `COUNT(*)`, counts every row including NULLs.
    CountStar,
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunction {
    pub fn from_name(name: &str, star: bool) -> Option<Self> {
        let func = match name.to_ascii_uppercase().as_str() {
            "COUNT" if star => Self::CountStar,
            "COUNT" => Self::Count,
            "SUM" => Self::Sum,
            "AVG" => Self::Avg,
            "MIN" => Self::Min,
            "MAX" => Self::Max,
            _ => return None,
        };
        Some(func)
    }

    pub fn return_type(&self, input: Option<DataType>) -> DataType {
        match self {
            Self::CountStar | Self::Count => DataType::Int64,
            Self::Avg => DataType::Float64,
            Self::Sum => match input {
                Some(DataType::Int32 | DataType::Int64) => DataType::Int64,
                Some(DataType::Float64) => DataType::Float64,
                _ => DataType::Null,
            },
            Self::Min | Self::Max => input.unwrap_or(DataType::Null),
        }
    }
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CountStar => write!(f, "COUNT(*)"),
            Self::Count => write!(f, "COUNT"),
            Self::Sum => write!(f, "SUM"),
            Self::Avg => write!(f, "AVG"),
            Self::Min => write!(f, "MIN"),
            Self::Max => write!(f, "MAX"),
        }
    }
}

/// An aggregate call extracted from a select block, with the synthetic column
/// name its result is exposed as.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AggregateCall {
    pub name: String,
    pub function: AggregateFunction,
    pub arg: Option<Expression>,
    pub distinct: bool,
}

impl AggregateCall {
    pub fn try_from_call(name: impl Into<String>, call: &FunctionCallExpr) -> Result<Self> {
        let function = AggregateFunction::from_name(&call.name, call.star)
            .ok_or_else(|| DbError::planning(format!("'{}' is not an aggregate function", call.name)))?;

        let arg = match function {
            AggregateFunction::CountStar => None,
            _ => {
                if call.args.len() != 1 {
                    return Err(DbError::planning(format!(
                        "{} expects exactly one argument",
                        call.name
                    ))
                    .with_field("got", call.args.len()));
                }
                let arg = call.args[0].clone();
                if arg.contains_aggregate() {
                    return Err(DbError::planning(format!(
                        "Aggregate calls cannot be nested: {call}"
                    )));
                }
                Some(arg)
            }
        };

        Ok(AggregateCall {
            name: name.into(),
            function,
            arg,
            distinct: call.distinct,
        })
    }

    /// Fresh running state for one group.
    pub fn new_accumulator(&self) -> Accumulator {
        Accumulator::new(self.function, self.distinct)
    }
}

impl fmt::Display for AggregateCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum AccumulatorState {
    Count(i64),
    Sum(Option<ScalarValue>),
    Avg { sum: f64, count: i64 },
    Min(Option<ScalarValue>),
    Max(Option<ScalarValue>),
}

/// Running state of an aggregate over a single group.
#[derive(Debug, Clone)]
pub struct Accumulator {
    function: AggregateFunction,
    /// Values already folded in, for DISTINCT aggregates.
    seen: Option<HashSet<ScalarValue>>,
    state: AccumulatorState,
}

impl Accumulator {
    pub fn new(function: AggregateFunction, distinct: bool) -> Self {
        let state = match function {
            AggregateFunction::CountStar | AggregateFunction::Count => AccumulatorState::Count(0),
            AggregateFunction::Sum => AccumulatorState::Sum(None),
            AggregateFunction::Avg => AccumulatorState::Avg { sum: 0.0, count: 0 },
            AggregateFunction::Min => AccumulatorState::Min(None),
            AggregateFunction::Max => AccumulatorState::Max(None),
        };
        Accumulator {
            function,
            seen: if distinct { Some(HashSet::new()) } else { None },
            state,
        }
    }

    /// Fold one input value in.
    ///
    /// NULLs are ignored by everything but `COUNT(*)`.
    pub fn update(&mut self, value: ScalarValue) -> Result<()> {
        if self.function == AggregateFunction::CountStar {
            if let AccumulatorState::Count(n) = &mut self.state {
                *n += 1;
            }
            return Ok(());
        }

        if value.is_null() {
            return Ok(());
        }

        if let Some(seen) = &mut self.seen {
            if !seen.insert(value.clone()) {
                return Ok(());
            }
        }

        match &mut self.state {
            AccumulatorState::Count(n) => *n += 1,
            AccumulatorState::Sum(sum) => {
                let value = match value {
                    ScalarValue::Int32(v) => ScalarValue::Int64(v as i64),
                    ScalarValue::Int64(_) | ScalarValue::Float64(_) => value,
                    other => {
                        return Err(DbError::eval(format!("Cannot SUM value: {other}"))
                            .with_field("type", other.datatype()));
                    }
                };
                *sum = Some(match sum.take() {
                    Some(current) => ArithOperator::Add.apply(&current, &value)?,
                    None => value,
                });
            }
            AccumulatorState::Avg { sum, count } => {
                let v = value
                    .to_f64()
                    .ok_or_else(|| DbError::eval(format!("Cannot AVG value: {value}")))?;
                *sum += v;
                *count += 1;
            }
            AccumulatorState::Min(current) => {
                if Self::replaces(current.as_ref(), &value, std::cmp::Ordering::Less)? {
                    *current = Some(value);
                }
            }
            AccumulatorState::Max(current) => {
                if Self::replaces(current.as_ref(), &value, std::cmp::Ordering::Greater)? {
                    *current = Some(value);
                }
            }
        }

        Ok(())
    }

    fn replaces(
        current: Option<&ScalarValue>,
        candidate: &ScalarValue,
        wanted: std::cmp::Ordering,
    ) -> Result<bool> {
        match current {
            None => Ok(true),
            Some(current) => Ok(candidate.compare(current)? == Some(wanted)),
        }
    }

    /// Final value. Aggregates over no non-NULL input produce NULL, counts
    /// produce zero.
    pub fn finish(&self) -> ScalarValue {
        match &self.state {
            AccumulatorState::Count(n) => ScalarValue::Int64(*n),
            AccumulatorState::Sum(sum) => sum.clone().unwrap_or(ScalarValue::Null),
            AccumulatorState::Avg { sum, count } => {
                if *count == 0 {
                    ScalarValue::Null
                } else {
                    ScalarValue::Float64(sum / *count as f64)
                }
            }
            AccumulatorState::Min(v) | AccumulatorState::Max(v) => {
                v.clone().unwrap_or(ScalarValue::Null)
            }
        }
    }
}
